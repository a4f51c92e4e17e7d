//! Plans produced by the real route planner.

use std::net::TcpStream;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::address::Route;
use crate::cancel::CancelToken;
use crate::connection::{ConnectionSpec, PooledConnection, RealConnection, Stream};
use crate::error::{Error, Result};
use crate::finder::{ConnectResult, Plan};

use super::connector::ConnectContext;
use super::stage_io::{self, StageIo};
use super::tls;
use super::tunnel::{self, TunnelResponse};

/// A plan either backed by a pooled connection or still to be connected.
pub enum ConnectionPlan {
    /// A pooled connection, already claimed for this call.
    Reuse(PooledConnection),
    /// A route to connect through the transport and secure-layer stages.
    Connect(Box<ConnectPlan>),
}

impl Plan for ConnectionPlan {
    type Connection = PooledConnection;

    fn is_ready(&self) -> bool {
        matches!(self, ConnectionPlan::Reuse(_))
    }

    fn connect_transport(&mut self) -> ConnectResult<Self> {
        match self {
            ConnectionPlan::Reuse(_) => {
                ConnectResult::Failure(Error::InvalidState("reused connection is already connected"))
            }
            ConnectionPlan::Connect(plan) => plan.connect_transport(),
        }
    }

    fn connect_secure_layer(&mut self) -> ConnectResult<Self> {
        match self {
            ConnectionPlan::Reuse(_) => {
                ConnectResult::Failure(Error::InvalidState("reused connection is already connected"))
            }
            ConnectionPlan::Connect(plan) => plan.connect_secure_layer(),
        }
    }

    fn handle_success(self) -> Result<PooledConnection> {
        match self {
            ConnectionPlan::Reuse(connection) => Ok(connection),
            ConnectionPlan::Connect(plan) => (*plan).handle_success(),
        }
    }
}

impl std::fmt::Debug for ConnectionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionPlan::Reuse(connection) => f.debug_tuple("Reuse").field(connection).finish(),
            ConnectionPlan::Connect(plan) => f.debug_tuple("Connect").field(plan).finish(),
        }
    }
}

/// Connects one route: TCP, then an optional `CONNECT` tunnel, then
/// optional TLS.
///
/// A stage that needs another try on a fresh socket (proxy credentials,
/// TLS version fallback) yields a follow-up plan instead of retrying in
/// place.
pub struct ConnectPlan {
    context: Arc<ConnectContext>,
    route: Route,
    cancel: CancelToken,
    attempt: u32,
    proxy_authorization: Option<String>,
    spec_index: usize,
    is_tls_fallback: bool,
    socket: Option<TcpStream>,
    connection: Option<Arc<RealConnection>>,
}

impl ConnectPlan {
    pub(crate) fn new(context: Arc<ConnectContext>, route: Route, cancel: CancelToken) -> Self {
        Self {
            context,
            route,
            cancel,
            attempt: 0,
            proxy_authorization: None,
            spec_index: 0,
            is_tls_fallback: false,
            socket: None,
            connection: None,
        }
    }

    /// Get the route this plan connects.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Get the tunnel attempt number, starting at 0.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Get the TLS spec this plan will offer.
    pub fn connection_spec(&self) -> ConnectionSpec {
        self.context
            .config
            .connection_specs
            .get(self.spec_index)
            .copied()
            .unwrap_or(ConnectionSpec::ModernTls)
    }

    /// Check if this plan retries TLS with an older spec.
    pub fn is_tls_fallback(&self) -> bool {
        self.is_tls_fallback
    }

    fn follow_up(
        &self,
        attempt: u32,
        proxy_authorization: Option<String>,
        spec_index: usize,
        is_tls_fallback: bool,
    ) -> ConnectionPlan {
        ConnectionPlan::Connect(Box::new(Self {
            context: self.context.clone(),
            route: self.route.clone(),
            cancel: self.cancel.clone(),
            attempt,
            proxy_authorization,
            spec_index,
            is_tls_fallback,
            socket: None,
            connection: None,
        }))
    }

    fn connect_transport(&mut self) -> ConnectResult<ConnectionPlan> {
        if self.socket.is_some() || self.connection.is_some() {
            return ConnectResult::Failure(Error::InvalidState("transport already connected"));
        }

        let config = &self.context.config;
        debug!(route = %self.route, attempt = self.attempt, "connecting");

        let connected = TcpStream::connect_timeout(&self.route.socket_addr(), config.connect_timeout)
            .and_then(|socket| {
                socket.set_read_timeout(config.read_timeout)?;
                socket.set_write_timeout(config.write_timeout)?;
                socket.set_nodelay(config.tcp_nodelay)?;
                Ok(socket)
            });

        match connected {
            Ok(socket) => {
                self.socket = Some(socket);
                ConnectResult::Success
            }
            Err(source) => {
                self.context.route_database.failed(&self.route);
                ConnectResult::Failure(Error::Connect {
                    route: self.route.clone(),
                    source,
                })
            }
        }
    }

    fn connect_secure_layer(&mut self) -> ConnectResult<ConnectionPlan> {
        let Some(socket) = self.socket.take() else {
            return ConnectResult::Failure(Error::InvalidState("transport not connected"));
        };

        if self.route.requires_tunnel() {
            match self.open_tunnel(&socket) {
                Ok(None) => {}
                Ok(Some(next)) => return ConnectResult::Deferred(next),
                Err(_) if self.cancel.is_canceled() => return ConnectResult::Failure(Error::Canceled),
                Err(e) => {
                    self.context.route_database.failed(&self.route);
                    return ConnectResult::Failure(e);
                }
            }
        }

        let stream = if self.route.address().is_secure() {
            match self.connect_tls(socket) {
                Ok(stream) => stream,
                Err(result) => return result,
            }
        } else {
            Stream::Plain(socket)
        };

        self.context.route_database.connected(&self.route);
        self.connection = Some(RealConnection::new_claimed(self.route.clone(), stream));
        ConnectResult::Success
    }

    /// Send `CONNECT`. `Ok(Some(_))` is a retry with proxy credentials.
    fn open_tunnel(&self, socket: &TcpStream) -> Result<Option<ConnectionPlan>> {
        let address = self.route.address();
        let timeout = self.context.config.handshake_timeout;
        let mut io = StageIo::new(socket, &self.cancel, timeout)?;
        tunnel::write_connect_request(&mut io, address, self.proxy_authorization.as_deref())?;
        let response = tunnel::read_connect_response(&mut io)?;

        if response.is_established() {
            return Ok(None);
        }
        match response.status {
            407 => self.authenticate(&response).map(Some),
            status => Err(Error::TunnelStatus(status)),
        }
    }

    fn authenticate(&self, response: &TunnelResponse) -> Result<ConnectionPlan> {
        let authorization = self.context.authenticator.as_ref().and_then(|authenticator| {
            authenticator.authenticate(&self.route, response, self.proxy_authorization.as_deref())
        });
        let Some(authorization) = authorization else {
            return Err(Error::ProxyAuthRequired(self.route.proxy().to_string()));
        };

        let next_attempt = self.attempt + 1;
        if next_attempt >= self.context.config.max_tunnel_attempts {
            return Err(Error::TooManyTunnelAttempts(next_attempt));
        }

        debug!(route = %self.route, attempt = next_attempt, "retrying tunnel with credentials");
        Ok(self.follow_up(
            next_attempt,
            Some(authorization),
            self.spec_index,
            self.is_tls_fallback,
        ))
    }

    fn connect_tls(
        &self,
        socket: TcpStream,
    ) -> std::result::Result<Stream, ConnectResult<ConnectionPlan>> {
        let host = self.route.address().host();
        let spec = self.connection_spec();

        let prepared = self
            .context
            .tls
            .client_config(spec)
            .and_then(|config| Ok((config, tls::server_name(host)?)));
        let (config, server_name) = prepared.map_err(ConnectResult::Failure)?;

        let timeout = self.context.config.handshake_timeout;
        match tls::handshake(socket, server_name, config, &self.cancel, timeout) {
            Ok(stream) => Ok(Stream::Tls(Box::new(stream))),
            Err(source) if stage_io::is_canceled_error(&source) => {
                Err(ConnectResult::Failure(Error::Canceled))
            }
            Err(source) => {
                let next_spec = self.spec_index + 1;
                let can_fall_back = next_spec < self.context.config.connection_specs.len()
                    && !tls::is_certificate_error(&source);

                if can_fall_back {
                    debug!(route = %self.route, ?spec, error = %source, "TLS handshake failed; falling back");
                    return Err(ConnectResult::Deferred(self.follow_up(
                        self.attempt,
                        self.proxy_authorization.clone(),
                        next_spec,
                        true,
                    )));
                }

                warn!(route = %self.route, ?spec, error = %source, "TLS handshake failed");
                self.context.route_database.failed(&self.route);
                Err(ConnectResult::Failure(Error::Tls {
                    host: host.to_string(),
                    source,
                }))
            }
        }
    }

    fn handle_success(self) -> Result<PooledConnection> {
        let connection = self
            .connection
            .ok_or(Error::InvalidState("plan has no connection"))?;
        Ok(self.context.pool.put(connection))
    }
}

impl std::fmt::Debug for ConnectPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectPlan")
            .field("route", &self.route)
            .field("attempt", &self.attempt)
            .field("spec", &self.connection_spec())
            .field("is_tls_fallback", &self.is_tls_fallback)
            .finish()
    }
}
