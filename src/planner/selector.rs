//! Lazy enumeration of routes for one address.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::debug;

use crate::address::{Address, Proxy, Route};
use crate::error::{Error, Result};

use super::dns::Dns;
use super::route_database::RouteDatabase;

/// Walks an address's proxies in order, resolving one proxy at a time.
pub struct RouteSelector {
    address: Address,
    proxies: Vec<Proxy>,
    next_proxy: usize,
    dns: Arc<dyn Dns>,
    route_database: RouteDatabase,
}

impl RouteSelector {
    /// Create a selector. An address without proxies connects directly.
    pub fn new(address: Address, dns: Arc<dyn Dns>, route_database: RouteDatabase) -> Self {
        let proxies = if address.proxies().is_empty() {
            vec![Proxy::Direct]
        } else {
            address.proxies().to_vec()
        };

        Self {
            address,
            proxies,
            next_proxy: 0,
            dns,
            route_database,
        }
    }

    /// Check if proxies remain to be resolved.
    pub fn has_next(&self) -> bool {
        self.next_proxy < self.proxies.len()
    }

    /// Resolve the next proxy into routes.
    ///
    /// Routes that recently failed come last.
    pub fn next(&mut self) -> Result<Vec<Route>> {
        let proxy = self
            .proxies
            .get(self.next_proxy)
            .cloned()
            .ok_or_else(|| Error::NoMoreRoutes(self.address.to_string()))?;
        self.next_proxy += 1;

        let (host, port) = match &proxy {
            Proxy::Direct => (self.address.host().to_string(), self.address.port()),
            Proxy::Http { host, port } => (host.clone(), *port),
        };

        let ips = self
            .dns
            .lookup(&host)
            .map_err(|source| Error::UnknownHost {
                host: host.clone(),
                source,
            })?;

        let (postponed, mut routes): (Vec<Route>, Vec<Route>) = ips
            .into_iter()
            .map(|ip| Route::new(self.address.clone(), proxy.clone(), SocketAddr::new(ip, port)))
            .partition(|route| self.route_database.should_postpone(route));
        routes.extend(postponed);

        debug!(proxy = %proxy, routes = routes.len(), "resolved routes");
        Ok(routes)
    }
}

impl std::fmt::Debug for RouteSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteSelector")
            .field("address", &self.address)
            .field("proxies", &self.proxies)
            .field("next_proxy", &self.next_proxy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::net::IpAddr;

    struct MapDns(HashMap<&'static str, Vec<IpAddr>>);

    impl Dns for MapDns {
        fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
            self.0
                .get(host)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, host.to_string()))
        }
    }

    fn dns() -> Arc<dyn Dns> {
        Arc::new(MapDns(HashMap::from([
            (
                "origin.test",
                vec![IpAddr::from([10, 0, 0, 1]), IpAddr::from([10, 0, 0, 2])],
            ),
            ("proxy.test", vec![IpAddr::from([10, 0, 1, 1])]),
        ])))
    }

    #[test]
    fn test_direct_without_proxies() {
        let mut selector =
            RouteSelector::new(Address::https("origin.test"), dns(), RouteDatabase::new());
        assert!(selector.has_next());

        let routes = selector.next().unwrap();
        assert_eq!(routes.len(), 2);
        assert!(routes.iter().all(|r| r.proxy().is_direct()));
        assert_eq!(routes[0].socket_addr(), "10.0.0.1:443".parse().unwrap());
        assert!(!selector.has_next());
        assert!(matches!(selector.next(), Err(Error::NoMoreRoutes(_))));
    }

    #[test]
    fn test_proxies_in_order() {
        let address = Address::https("origin.test")
            .with_proxy(Proxy::http("proxy.test", 3128))
            .with_proxy(Proxy::Direct);
        let mut selector = RouteSelector::new(address, dns(), RouteDatabase::new());

        let first = selector.next().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].socket_addr(), "10.0.1.1:3128".parse().unwrap());
        assert!(first[0].requires_tunnel());

        let second = selector.next().unwrap();
        assert_eq!(second.len(), 2);
        assert!(!selector.has_next());
    }

    #[test]
    fn test_failed_routes_postponed() {
        let db = RouteDatabase::new();
        let address = Address::https("origin.test");
        db.failed(&Route::new(
            address.clone(),
            Proxy::Direct,
            "10.0.0.1:443".parse().unwrap(),
        ));

        let mut selector = RouteSelector::new(address, dns(), db);
        let routes = selector.next().unwrap();
        assert_eq!(routes[0].socket_addr(), "10.0.0.2:443".parse().unwrap());
        assert_eq!(routes[1].socket_addr(), "10.0.0.1:443".parse().unwrap());
    }

    #[test]
    fn test_unknown_host() {
        let address = Address::https("origin.test").with_proxy(Proxy::http("missing.test", 8080));
        let mut selector = RouteSelector::new(address, dns(), RouteDatabase::new());

        match selector.next() {
            Err(Error::UnknownHost { host, .. }) => assert_eq!(host, "missing.test"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!selector.has_next());
    }
}
