//! Destinations and the concrete routes that reach them.

use std::fmt;
use std::net::SocketAddr;

/// Default port for cleartext HTTP.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default port for HTTPS.
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// How a route reaches its destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Proxy {
    /// Connect straight to the destination.
    Direct,
    /// Tunnel through an HTTP proxy using `CONNECT`.
    Http {
        /// Proxy host name or IP literal.
        host: String,
        /// Proxy port.
        port: u16,
    },
}

impl Proxy {
    /// Create an HTTP proxy.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self::Http {
            host: host.into(),
            port,
        }
    }

    /// Check if this is a direct connection.
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proxy::Direct => write!(f, "DIRECT"),
            Proxy::Http { host, port } => write!(f, "HTTP @ {host}:{port}"),
        }
    }
}

/// A destination that connections can be pooled for.
///
/// Two calls with equal addresses may share pooled connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    host: String,
    port: u16,
    secure: bool,
    proxies: Vec<Proxy>,
}

impl Address {
    /// Create an address.
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
            proxies: Vec::new(),
        }
    }

    /// Create a cleartext address on the default HTTP port.
    pub fn http(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_HTTP_PORT, false)
    }

    /// Create a TLS address on the default HTTPS port.
    pub fn https(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_HTTPS_PORT, true)
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Append a proxy to try, in order.
    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.proxies.push(proxy);
        self
    }

    /// Replace the proxy list.
    pub fn with_proxies(mut self, proxies: Vec<Proxy>) -> Self {
        self.proxies = proxies;
        self
    }

    /// Get the destination host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the destination port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Check if connections to this address use TLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Get the configured proxies. Empty means direct.
    pub fn proxies(&self) -> &[Proxy] {
        &self.proxies
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One concrete network path to an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    address: Address,
    proxy: Proxy,
    socket_addr: SocketAddr,
}

impl Route {
    /// Create a route. `socket_addr` is the resolved destination for
    /// direct routes, or the resolved proxy otherwise.
    pub fn new(address: Address, proxy: Proxy, socket_addr: SocketAddr) -> Self {
        Self {
            address,
            proxy,
            socket_addr,
        }
    }

    /// Get the destination.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Get the proxy used.
    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    /// Get the socket address the transport connects to.
    pub fn socket_addr(&self) -> SocketAddr {
        self.socket_addr
    }

    /// Check if a `CONNECT` tunnel must be set up before use.
    pub fn requires_tunnel(&self) -> bool {
        matches!(self.proxy, Proxy::Http { .. })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.proxy {
            Proxy::Direct => write!(f, "{} ({})", self.address, self.socket_addr),
            Proxy::Http { .. } => {
                write!(f, "{} via proxy {}", self.address, self.socket_addr)
            }
        }
    }
}
