//! Memory of routes that recently failed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::address::Route;

/// Routes that failed to connect, shared by every call of a connector.
///
/// Failed routes are postponed behind their healthy siblings until one of
/// them connects again.
#[derive(Debug, Clone, Default)]
pub struct RouteDatabase {
    failed: Arc<Mutex<HashSet<Route>>>,
}

impl RouteDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure on a route.
    pub fn failed(&self, route: &Route) {
        self.lock().insert(route.clone());
    }

    /// Record a successful connection on a route.
    pub fn connected(&self, route: &Route) {
        self.lock().remove(route);
    }

    /// Check if a route should be tried after its siblings.
    pub fn should_postpone(&self, route: &Route) -> bool {
        self.lock().contains(route)
    }

    /// Get the number of failed routes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if no route has failed.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Route>> {
        self.failed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, Proxy};

    #[test]
    fn test_failed_then_connected() {
        let db = RouteDatabase::new();
        let route = Route::new(
            Address::https("example.com"),
            Proxy::Direct,
            "10.0.0.1:443".parse().unwrap(),
        );

        assert!(!db.should_postpone(&route));
        db.failed(&route);
        assert!(db.clone().should_postpone(&route));
        assert_eq!(db.len(), 1);

        db.connected(&route);
        assert!(db.is_empty());
    }
}
