//! The default route planner.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::address::{Address, Route};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::finder::RoutePlanner;

use super::connect_plan::{ConnectPlan, ConnectionPlan};
use super::connector::ConnectContext;
use super::selector::RouteSelector;

/// Plans connections to one address for one call.
///
/// Plans come from, in order: an idle pooled connection for the address,
/// the deferred queue, and finally the next route. Resolving a new batch of
/// routes can take a while, so the pool gets a second look, restricted to
/// the resolved routes, before a fresh connect plan is made. Connections
/// are never shared across addresses, so that second look only pays off
/// when a connection to this address was released during resolution.
pub struct RealRoutePlanner {
    context: Arc<ConnectContext>,
    address: Address,
    cancel: CancelToken,
    selector: RouteSelector,
    selection: VecDeque<Route>,
    selection_routes: Vec<Route>,
    deferred: VecDeque<ConnectionPlan>,
}

impl RealRoutePlanner {
    pub(crate) fn new(context: Arc<ConnectContext>, address: Address, cancel: CancelToken) -> Self {
        let selector = RouteSelector::new(
            address.clone(),
            context.dns.clone(),
            context.route_database.clone(),
        );

        Self {
            context,
            address,
            cancel,
            selector,
            selection: VecDeque::new(),
            selection_routes: Vec::new(),
            deferred: VecDeque::new(),
        }
    }

    /// Get the address being planned for.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Get the cancellation token.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn reuse_pooled(&self, routes: Option<&[Route]>) -> Option<ConnectionPlan> {
        let connection = self.context.pool.acquire(&self.address, routes)?;
        trace!(id = connection.id(), route = %connection.route(), "planned reuse");
        Some(ConnectionPlan::Reuse(connection))
    }

    fn next_route(&mut self) -> Result<Route> {
        if self.selection.is_empty() {
            if !self.selector.has_next() {
                return Err(Error::NoMoreRoutes(self.address.to_string()));
            }
            let routes = self.selector.next()?;
            self.selection = routes.iter().cloned().collect();
            self.selection_routes = routes;
        }

        self.selection
            .pop_front()
            .ok_or_else(|| Error::NoMoreRoutes(self.address.to_string()))
    }
}

impl RoutePlanner for RealRoutePlanner {
    type Plan = ConnectionPlan;

    fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    fn plan(&mut self) -> Result<ConnectionPlan> {
        if let Some(reuse) = self.reuse_pooled(None) {
            return Ok(reuse);
        }

        if let Some(deferred) = self.deferred.pop_front() {
            return Ok(deferred);
        }

        let route = self.next_route()?;

        // Both lookups share the address key, so this only finds a
        // connection another call released while routes were resolving
        if let Some(reuse) = self.reuse_pooled(Some(self.selection_routes.as_slice())) {
            self.selection.push_front(route);
            return Ok(reuse);
        }

        Ok(ConnectionPlan::Connect(Box::new(ConnectPlan::new(
            self.context.clone(),
            route,
            self.cancel.clone(),
        ))))
    }

    fn has_next(&self) -> bool {
        !self.deferred.is_empty() || !self.selection.is_empty() || self.selector.has_next()
    }

    fn deferred_plans(&mut self) -> &mut VecDeque<ConnectionPlan> {
        &mut self.deferred
    }
}

impl std::fmt::Debug for RealRoutePlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealRoutePlanner")
            .field("address", &self.address)
            .field("selector", &self.selector)
            .field("pending_routes", &self.selection.len())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}
