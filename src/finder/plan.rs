//! Collaborator contracts consumed by the exchange finder.

use std::collections::VecDeque;

use crate::error::{Error, Result};

/// Outcome of driving a plan through one connect stage.
///
/// Exactly one shape holds. `Success` means the plan itself now carries a
/// usable result and can move on to the next stage or to
/// [`Plan::handle_success`].
#[derive(Debug)]
pub enum ConnectResult<P> {
    /// The stage completed.
    Success,
    /// No connection yet; this follow-up plan must be tried next.
    Deferred(P),
    /// The stage could not proceed on this route.
    Failure(Error),
}

impl<P> ConnectResult<P> {
    /// Check if the stage completed.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check if the stage produced a follow-up plan.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// Check if the stage failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// One way of obtaining a connection.
///
/// A plan is consumed at most once: it either succeeds through
/// [`handle_success`](Plan::handle_success), fails, or hands back a
/// replacement plan.
pub trait Plan: Sized {
    /// The live connection produced on success.
    type Connection;

    /// True when the plan already holds a pooled connection and needs no
    /// connect stages.
    fn is_ready(&self) -> bool;

    /// Open the underlying transport.
    fn connect_transport(&mut self) -> ConnectResult<Self>;

    /// Layer tunnels and TLS on top of a connected transport.
    fn connect_secure_layer(&mut self) -> ConnectResult<Self>;

    /// Register the new connection with the pool (if needed) and hand it
    /// out.
    fn handle_success(self) -> Result<Self::Connection>;
}

/// Produces plans for one logical call.
pub trait RoutePlanner {
    /// The plans this planner produces.
    type Plan: Plan;

    /// True once the call has been canceled.
    fn is_canceled(&self) -> bool;

    /// Produce the next plan, preferring deferred plans over fresh routes.
    fn plan(&mut self) -> Result<Self::Plan>;

    /// True if another plan may still be produced.
    fn has_next(&self) -> bool;

    /// Follow-up plans waiting to be tried. The front is tried first.
    fn deferred_plans(&mut self) -> &mut VecDeque<Self::Plan>;
}
