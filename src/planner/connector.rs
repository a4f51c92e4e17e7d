//! Shared connection context and the caller-facing entry point.

use std::sync::Arc;

use rustls::RootCertStore;

use crate::address::Address;
use crate::cancel::CancelToken;
use crate::connection::{ConnectionConfig, ConnectionPool, PoolConfig, PooledConnection};
use crate::error::Result;
use crate::finder::ExchangeFinder;

use super::auth::ProxyAuthenticator;
use super::dns::{Dns, SystemDns};
use super::route_database::RouteDatabase;
use super::route_planner::RealRoutePlanner;
use super::tls::TlsContext;

/// State shared by every plan a connector produces.
pub(crate) struct ConnectContext {
    pub(crate) pool: ConnectionPool,
    pub(crate) config: ConnectionConfig,
    pub(crate) dns: Arc<dyn Dns>,
    pub(crate) route_database: RouteDatabase,
    pub(crate) authenticator: Option<Arc<dyn ProxyAuthenticator>>,
    pub(crate) tls: TlsContext,
}

/// Obtains connections for addresses, reusing pooled ones when possible.
///
/// Cloning is cheap; clones share the pool, the route database and the TLS
/// configuration.
#[derive(Clone)]
pub struct Connector {
    context: Arc<ConnectContext>,
}

impl Connector {
    /// Create a builder.
    pub fn builder() -> ConnectorBuilder {
        ConnectorBuilder::default()
    }

    /// Create a connector with default configuration.
    pub fn with_defaults() -> Self {
        Self::builder().build()
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.context.pool
    }

    /// Get the configuration for new connections.
    pub fn config(&self) -> &ConnectionConfig {
        &self.context.config
    }

    /// Get the database of failed routes.
    pub fn route_database(&self) -> &RouteDatabase {
        &self.context.route_database
    }

    /// Create a planner for one call to an address.
    pub fn route_planner(&self, address: Address, cancel: CancelToken) -> RealRoutePlanner {
        RealRoutePlanner::new(self.context.clone(), address, cancel)
    }

    /// Find a connection to an address.
    ///
    /// Each call plans its routes afresh; only the pool and the route
    /// database carry over between calls.
    pub fn connect(&self, address: Address, cancel: &CancelToken) -> Result<PooledConnection> {
        let mut finder = ExchangeFinder::new(self.route_planner(address, cancel.clone()));
        finder.find()
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("pool", &self.context.pool)
            .field("config", &self.context.config)
            .finish()
    }
}

/// Builder for [`Connector`].
#[derive(Default)]
pub struct ConnectorBuilder {
    pool: Option<ConnectionPool>,
    dns: Option<Arc<dyn Dns>>,
    route_database: Option<RouteDatabase>,
    authenticator: Option<Arc<dyn ProxyAuthenticator>>,
    roots: Option<RootCertStore>,
}

impl ConnectorBuilder {
    /// Use an existing pool. Its configuration also governs new connections.
    pub fn with_pool(mut self, pool: ConnectionPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Create a new pool from a configuration.
    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool = Some(ConnectionPool::new(config));
        self
    }

    /// Use a custom resolver.
    pub fn with_dns(mut self, dns: impl Dns + 'static) -> Self {
        self.dns = Some(Arc::new(dns));
        self
    }

    /// Share a route database with other connectors.
    pub fn with_route_database(mut self, route_database: RouteDatabase) -> Self {
        self.route_database = Some(route_database);
        self
    }

    /// Answer proxy authentication challenges.
    pub fn with_authenticator(mut self, authenticator: impl ProxyAuthenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Trust these roots instead of the Mozilla root program.
    pub fn with_root_certificates(mut self, roots: RootCertStore) -> Self {
        self.roots = Some(roots);
        self
    }

    /// Build the connector.
    pub fn build(self) -> Connector {
        let pool = self.pool.unwrap_or_else(ConnectionPool::with_defaults);
        let config = pool.config().connection_config;
        let tls = match self.roots {
            Some(roots) => TlsContext::new(roots),
            None => TlsContext::with_webpki_roots(),
        };

        Connector {
            context: Arc::new(ConnectContext {
                pool,
                config,
                dns: self.dns.unwrap_or_else(|| Arc::new(SystemDns)),
                route_database: self.route_database.unwrap_or_default(),
                authenticator: self.authenticator,
                tls,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionSpec;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let connector = Connector::with_defaults();
        assert_eq!(connector.config().connect_timeout, Duration::from_secs(10));
        assert_eq!(
            connector.config().connection_specs,
            vec![ConnectionSpec::ModernTls, ConnectionSpec::CompatibleTls]
        );
        assert_eq!(connector.pool().total_connections(), 0);
        assert!(connector.route_database().is_empty());
    }

    #[test]
    fn test_pool_config_governs_connections() {
        let config = PoolConfig::default()
            .with_connection_config(ConnectionConfig::simple().with_max_tunnel_attempts(3));
        let connector = Connector::builder().with_pool_config(config).build();
        assert_eq!(connector.config().max_tunnel_attempts, 3);
        assert_eq!(connector.config().connection_specs.len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let shared = RouteDatabase::new();
        let connector = Connector::builder()
            .with_route_database(shared.clone())
            .build();
        let clone = connector.clone();

        let route = crate::address::Route::new(
            Address::http("example.com"),
            crate::address::Proxy::Direct,
            "127.0.0.1:80".parse().unwrap(),
        );
        clone.route_database().failed(&route);
        assert!(connector.route_database().should_postpone(&route));
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn test_planner_per_call() {
        let connector = Connector::with_defaults();
        let cancel = CancelToken::new();
        let planner = connector.route_planner(Address::https("example.com"), cancel.clone());
        assert_eq!(planner.address().port(), 443);

        cancel.cancel();
        assert!(planner.cancel_token().is_canceled());
    }
}
