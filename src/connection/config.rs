//! Connection and pool configuration types.

use std::time::Duration;

/// Default limit on `CONNECT` attempts for one route.
pub const DEFAULT_MAX_TUNNEL_ATTEMPTS: u32 = 21;

static TLS12_ONLY: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS12];

/// TLS protocol versions offered during a handshake.
///
/// A configuration lists specs in fallback order: when a handshake fails
/// for a reason other than the certificate, the next spec is tried on a
/// fresh connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionSpec {
    /// TLS 1.3 and TLS 1.2.
    ModernTls,
    /// TLS 1.2 only.
    CompatibleTls,
}

impl ConnectionSpec {
    /// Get the protocol versions this spec offers.
    pub fn protocol_versions(&self) -> &'static [&'static rustls::SupportedProtocolVersion] {
        match self {
            ConnectionSpec::ModernTls => rustls::ALL_VERSIONS,
            ConnectionSpec::CompatibleTls => TLS12_ONLY,
        }
    }
}

/// Configuration for new connections.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Transport connect timeout.
    pub connect_timeout: Duration,
    /// Limit on the proxy tunnel and TLS handshake of one attempt.
    pub handshake_timeout: Duration,
    /// Read timeout applied to new sockets.
    pub read_timeout: Option<Duration>,
    /// Write timeout applied to new sockets.
    pub write_timeout: Option<Duration>,
    /// Disable Nagle's algorithm.
    pub tcp_nodelay: bool,
    /// TLS specs in fallback order.
    pub connection_specs: Vec<ConnectionSpec>,
    /// Maximum `CONNECT` attempts for one route.
    pub max_tunnel_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            read_timeout: None,
            write_timeout: None,
            tcp_nodelay: true,
            connection_specs: vec![ConnectionSpec::ModernTls, ConnectionSpec::CompatibleTls],
            max_tunnel_attempts: DEFAULT_MAX_TUNNEL_ATTEMPTS,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration without TLS fallback.
    pub fn simple() -> Self {
        Self {
            connection_specs: vec![ConnectionSpec::ModernTls],
            ..Self::default()
        }
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the limit on tunnel and TLS handshakes.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Enable or disable `TCP_NODELAY`.
    pub fn with_tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    /// Set the TLS specs, in fallback order.
    pub fn with_connection_specs(mut self, specs: Vec<ConnectionSpec>) -> Self {
        self.connection_specs = specs;
        self
    }

    /// Set the maximum number of `CONNECT` attempts per route.
    pub fn with_max_tunnel_attempts(mut self, attempts: u32) -> Self {
        self.max_tunnel_attempts = attempts;
        self
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum pooled connections per address.
    pub max_connections_per_address: usize,
    /// Idle timeout before a connection is evicted.
    pub idle_timeout: Duration,
    /// Maximum lifetime of a connection.
    pub max_lifetime: Option<Duration>,
    /// Configuration for new connections.
    pub connection_config: ConnectionConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_address: 5,
            idle_timeout: Duration::from_secs(300),
            max_lifetime: None,
            connection_config: ConnectionConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Set the maximum pooled connections per address.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections_per_address = max;
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum lifetime.
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Disable maximum lifetime.
    pub fn without_max_lifetime(mut self) -> Self {
        self.max_lifetime = None;
        self
    }

    /// Set the configuration for new connections.
    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection_config = config;
        self
    }
}
