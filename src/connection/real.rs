//! Established connections and the handles callers hold.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::address::Route;

use super::config::PoolConfig;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// TLS session over TCP.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// The byte stream of an established connection.
pub enum Stream {
    /// Cleartext TCP, possibly through a tunnel.
    Plain(TcpStream),
    /// TLS over TCP, possibly through a tunnel.
    Tls(Box<TlsStream>),
}

impl Stream {
    /// Get the underlying socket.
    pub fn tcp(&self) -> &TcpStream {
        match self {
            Stream::Plain(stream) => stream,
            Stream::Tls(stream) => stream.get_ref(),
        }
    }

    /// Check if the stream is encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, Stream::Tls(_))
    }

    /// Get the negotiated TLS version, if any.
    pub fn tls_version(&self) -> Option<rustls::ProtocolVersion> {
        match self {
            Stream::Plain(_) => None,
            Stream::Tls(stream) => stream.conn.protocol_version(),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(stream) => stream.read(buf),
            Stream::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(stream) => stream.write(buf),
            Stream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(stream) => stream.flush(),
            Stream::Tls(stream) => stream.flush(),
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("tls", &self.is_tls())
            .field("peer", &self.tcp().peer_addr().ok())
            .finish()
    }
}

/// A connection that has completed every connect stage.
///
/// Connections live in the pool behind an `Arc`. At most one caller holds a
/// connection at a time; the claim is taken atomically by the pool and
/// released when the caller's [`PooledConnection`] is dropped.
pub struct RealConnection {
    id: u64,
    route: Route,
    stream: Mutex<Stream>,
    created_at: Instant,
    idle_at: Mutex<Instant>,
    in_use: AtomicBool,
}

impl RealConnection {
    /// Wrap a connected stream. The connection starts claimed by its
    /// creator.
    pub(crate) fn new_claimed(route: Route, stream: Stream) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            route,
            stream: Mutex::new(stream),
            created_at: now,
            idle_at: Mutex::new(now),
            in_use: AtomicBool::new(true),
        })
    }

    /// Get the connection ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the route this connection was established on.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Check if the connection is encrypted.
    pub fn is_tls(&self) -> bool {
        self.lock_stream().is_tls()
    }

    /// Get the negotiated TLS version, if any.
    pub fn tls_version(&self) -> Option<rustls::ProtocolVersion> {
        self.lock_stream().tls_version()
    }

    /// Get the local socket address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.lock_stream().tcp().local_addr()
    }

    /// Get when the connection was established.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Check if a caller currently holds this connection.
    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    /// Get how long the connection has been idle.
    pub fn idle_duration(&self) -> Duration {
        self.idle_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Check if an idle connection outlived the pool's limits.
    pub fn is_expired(&self, config: &PoolConfig) -> bool {
        if self.idle_duration() > config.idle_timeout {
            return true;
        }

        if let Some(max_lifetime) = config.max_lifetime {
            if self.created_at.elapsed() > max_lifetime {
                return true;
            }
        }

        false
    }

    /// Check if the peer has not closed the connection.
    ///
    /// Reads whatever is pending without blocking. Cleartext data is only
    /// peeked; TLS records are buffered inside the session, so a
    /// `close_notify` from the peer marks the connection unhealthy.
    pub fn is_healthy(&self) -> bool {
        let mut stream = self.lock_stream();
        if stream.tcp().set_nonblocking(true).is_err() {
            return false;
        }

        let open = match &mut *stream {
            Stream::Plain(tcp) => {
                let mut byte = [0u8; 1];
                match tcp.peek(&mut byte) {
                    Ok(0) => false,
                    Ok(_) => true,
                    Err(e) => e.kind() == io::ErrorKind::WouldBlock,
                }
            }
            Stream::Tls(tls) => tls_peer_open(tls),
        };

        stream.tcp().set_nonblocking(false).is_ok() && open
    }

    /// Shut the socket down in both directions.
    pub fn shutdown(&self) -> io::Result<()> {
        self.lock_stream().tcp().shutdown(Shutdown::Both)
    }

    /// Take the claim if nobody holds it.
    pub(crate) fn try_claim(&self) -> bool {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Give the claim back and start the idle clock.
    pub(crate) fn release(&self) {
        *self.idle_at.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.in_use.store(false, Ordering::Release);
    }

    fn lock_stream(&self) -> MutexGuard<'_, Stream> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn tls_peer_open(tls: &mut TlsStream) -> bool {
    loop {
        match tls.conn.read_tls(&mut tls.sock) {
            Ok(0) => return false,
            Ok(_) => match tls.conn.process_new_packets() {
                Ok(state) if state.peer_has_closed() => return false,
                Ok(_) => {}
                Err(_) => return false,
            },
            Err(e) => return e.kind() == io::ErrorKind::WouldBlock,
        }
    }
}

impl std::fmt::Debug for RealConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealConnection")
            .field("id", &self.id)
            .field("route", &self.route)
            .field("in_use", &self.is_in_use())
            .finish()
    }
}

/// A claimed connection that releases back to the pool when dropped.
pub struct PooledConnection {
    connection: Arc<RealConnection>,
}

impl PooledConnection {
    /// Wrap a connection whose claim the caller already holds.
    pub(crate) fn new(connection: Arc<RealConnection>) -> Self {
        Self { connection }
    }

    /// Get the underlying connection.
    pub fn connection(&self) -> &Arc<RealConnection> {
        &self.connection
    }

    /// Get the connection ID.
    pub fn id(&self) -> u64 {
        self.connection.id()
    }

    /// Get the route this connection was established on.
    pub fn route(&self) -> &Route {
        self.connection.route()
    }

    /// Set the read timeout.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.connection.lock_stream().tcp().set_read_timeout(timeout)
    }

    /// Set the write timeout.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.connection.lock_stream().tcp().set_write_timeout(timeout)
    }
}

impl Read for PooledConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.connection.lock_stream().read(buf)
    }
}

impl Write for PooledConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.connection.lock_stream().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.connection.lock_stream().flush()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.connection.release();
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id())
            .field("route", self.route())
            .finish()
    }
}
