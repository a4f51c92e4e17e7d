//! Connection pooling keyed by address.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::address::{Address, Route};

use super::config::PoolConfig;
use super::real::{PooledConnection, RealConnection};

/// Inner pool state.
struct PoolInner {
    /// Configuration.
    config: PoolConfig,
    /// Connections by address.
    connections: HashMap<Address, Vec<Arc<RealConnection>>>,
}

impl PoolInner {
    fn new(config: PoolConfig) -> Self {
        Self {
            config,
            connections: HashMap::new(),
        }
    }

    /// Claim an idle connection for the address.
    fn acquire(&mut self, address: &Address, routes: Option<&[Route]>) -> Option<Arc<RealConnection>> {
        let config = &self.config;
        let entries = self.connections.get_mut(address)?;

        // Drop idle connections that expired or were closed by the peer
        entries.retain(|conn| {
            let stale = !conn.is_in_use() && (conn.is_expired(config) || !conn.is_healthy());
            if stale {
                debug!(id = conn.id(), route = %conn.route(), "evicting pooled connection");
            }
            !stale
        });

        let found = entries
            .iter()
            .filter(|conn| routes.is_none_or(|routes| routes.contains(conn.route())))
            .find(|conn| conn.try_claim())
            .cloned();

        if entries.is_empty() {
            self.connections.remove(address);
        }
        found
    }

    /// Register a connection. Returns false if the address is full.
    fn put(&mut self, connection: Arc<RealConnection>) -> bool {
        let max = self.config.max_connections_per_address;
        let entries = self
            .connections
            .entry(connection.route().address().clone())
            .or_default();

        if entries.len() < max {
            entries.push(connection);
            true
        } else {
            false
        }
    }

    /// Get the count of connections for an address.
    fn connection_count(&self, address: &Address) -> usize {
        self.connections.get(address).map_or(0, |e| e.len())
    }

    /// Get total count of all pooled connections.
    fn total_connections(&self) -> usize {
        self.connections.values().map(|e| e.len()).sum()
    }

    /// Get count of pooled connections nobody holds.
    fn idle_connections(&self) -> usize {
        self.connections
            .values()
            .flatten()
            .filter(|conn| !conn.is_in_use())
            .count()
    }

    /// Remove expired idle connections across all addresses.
    fn cleanup(&mut self) -> usize {
        let config = &self.config;
        let mut removed = 0;
        for entries in self.connections.values_mut() {
            let before = entries.len();
            entries.retain(|conn| conn.is_in_use() || !conn.is_expired(config));
            removed += before - entries.len();
        }
        self.connections.retain(|_, v| !v.is_empty());
        removed
    }
}

/// A pool of established connections shared by all calls.
///
/// The pool provides:
/// - Reuse keyed by [`Address`], optionally restricted to resolved routes
/// - Atomic lookup-and-claim, so a connection serves one caller at a time
/// - Idle timeout and maximum lifetime
/// - Maximum connections per address
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner::new(config))),
        }
    }

    /// Create a new connection pool with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(PoolConfig::default())
    }

    /// Get the pool configuration.
    pub fn config(&self) -> PoolConfig {
        self.lock().config.clone()
    }

    /// Claim an idle pooled connection for the address.
    ///
    /// When `routes` is given, only connections established on one of
    /// those routes qualify.
    pub fn acquire(&self, address: &Address, routes: Option<&[Route]>) -> Option<PooledConnection> {
        let connection = self.lock().acquire(address, routes)?;
        trace!(id = connection.id(), route = %connection.route(), "claimed pooled connection");
        Some(PooledConnection::new(connection))
    }

    /// Register a newly established connection the caller has claimed.
    ///
    /// Past the per-address limit the connection is not pooled, but the
    /// returned handle is still usable.
    pub fn put(&self, connection: Arc<RealConnection>) -> PooledConnection {
        if !self.lock().put(connection.clone()) {
            debug!(route = %connection.route(), "pool full; connection will not be reused");
        }
        PooledConnection::new(connection)
    }

    /// Get the number of pooled connections for an address.
    pub fn connection_count(&self, address: &Address) -> usize {
        self.lock().connection_count(address)
    }

    /// Get total count of all pooled connections.
    pub fn total_connections(&self) -> usize {
        self.lock().total_connections()
    }

    /// Get count of pooled connections nobody holds.
    pub fn idle_connections(&self) -> usize {
        self.lock().idle_connections()
    }

    /// Clean up expired connections.
    ///
    /// Returns the number of connections removed.
    pub fn cleanup(&self) -> usize {
        self.lock().cleanup()
    }

    /// Clear all pooled connections.
    pub fn clear(&self) {
        self.lock().connections.clear();
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pool = self.lock();
        f.debug_struct("ConnectionPool")
            .field("addresses", &pool.connections.len())
            .field("total_connections", &pool.total_connections())
            .finish()
    }
}
