//! Error types for connection acquisition.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::address::Route;

/// Errors that can occur while finding a connection.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The call was canceled before a connection was found.
    #[error("Canceled")]
    Canceled,

    /// A transport-level connect to one route failed.
    #[error("Failed to connect to {route}: {source}")]
    Connect {
        route: Route,
        #[source]
        source: io::Error,
    },

    /// Host name resolution failed.
    #[error("Unable to resolve host {host}: {source}")]
    UnknownHost {
        host: String,
        #[source]
        source: io::Error,
    },

    /// TLS handshake failed.
    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Host name not usable as a TLS server name.
    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// TLS client configuration could not be built.
    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] rustls::Error),

    /// Proxy answered CONNECT with an unexpected status.
    #[error("Unexpected response code for CONNECT: {0}")]
    TunnelStatus(u16),

    /// Proxy demanded credentials and none were available.
    #[error("Failed to authenticate with proxy {0}")]
    ProxyAuthRequired(String),

    /// Too many CONNECT attempts for one route.
    #[error("Too many tunnel connections attempted: {0}")]
    TooManyTunnelAttempts(u32),

    /// Proxy response could not be parsed.
    #[error("Malformed tunnel response: {0}")]
    InvalidTunnelResponse(String),

    /// No routes remain to be tried.
    #[error("No more routes to {0}")]
    NoMoreRoutes(String),

    /// A plan was driven in a way its variant does not support.
    #[error("Invalid plan state: {0}")]
    InvalidState(&'static str),

    /// Every route failed.
    #[error("{0}")]
    Exhausted(Box<ConnectFailures>),
}

/// Result type alias for connection acquisition.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Check if another route may succeed after this failure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Canceled | Self::Exhausted(_) | Self::InvalidState(_)
        )
    }

    /// Get the aggregated failures if this is an exhaustion error.
    pub fn failures(&self) -> Option<&ConnectFailures> {
        match self {
            Self::Exhausted(failures) => Some(failures),
            _ => None,
        }
    }
}

/// The failure history of one `find()` call.
///
/// The first failure stays primary; every later failure is kept, in
/// encounter order, as a suppressed secondary cause.
#[derive(Debug)]
pub struct ConnectFailures {
    primary: Error,
    suppressed: Vec<Error>,
}

impl ConnectFailures {
    /// Start a history with its first failure.
    pub fn new(primary: Error) -> Self {
        Self {
            primary,
            suppressed: Vec::new(),
        }
    }

    /// Attach a later failure.
    pub fn suppress(&mut self, error: Error) {
        self.suppressed.push(error);
    }

    /// The first failure encountered.
    pub fn primary(&self) -> &Error {
        &self.primary
    }

    /// Later failures, in encounter order.
    pub fn suppressed(&self) -> &[Error] {
        &self.suppressed
    }

    /// Total number of recorded failures.
    pub fn len(&self) -> usize {
        1 + self.suppressed.len()
    }

    /// Always false; a history holds at least its primary failure.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate over all failures, primary first.
    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        std::iter::once(&self.primary).chain(self.suppressed.iter())
    }

    /// Split into the primary failure and the suppressed ones.
    pub fn into_parts(self) -> (Error, Vec<Error>) {
        (self.primary, self.suppressed)
    }
}

impl fmt::Display for ConnectFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if !self.suppressed.is_empty() {
            write!(f, " ({} more failed attempts suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for ConnectFailures {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.primary)
    }
}

impl From<ConnectFailures> for Error {
    fn from(failures: ConnectFailures) -> Self {
        Self::Exhausted(Box::new(failures))
    }
}
