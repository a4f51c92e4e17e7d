//! TLS client setup and handshakes.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore};

use crate::cancel::CancelToken;
use crate::connection::{ConnectionSpec, TlsStream};
use crate::error::{Error, Result};

use super::stage_io::StageIo;

/// Trust roots and per-spec client configurations.
pub struct TlsContext {
    roots: Arc<RootCertStore>,
    configs: Mutex<HashMap<ConnectionSpec, Arc<ClientConfig>>>,
}

impl TlsContext {
    /// Create a context trusting the given roots.
    pub fn new(roots: RootCertStore) -> Self {
        Self {
            roots: Arc::new(roots),
            configs: Mutex::new(HashMap::new()),
        }
    }

    /// Create a context trusting the Mozilla root program.
    pub fn with_webpki_roots() -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::new(roots)
    }

    /// Get the client configuration for a spec, building it on first use.
    pub fn client_config(&self, spec: ConnectionSpec) -> Result<Arc<ClientConfig>> {
        let mut configs = self.configs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(config) = configs.get(&spec) {
            return Ok(config.clone());
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(spec.protocol_versions())?
            .with_root_certificates(self.roots.clone())
            .with_no_client_auth();

        let config = Arc::new(config);
        configs.insert(spec, config.clone());
        Ok(config)
    }
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext")
            .field("roots", &self.roots.len())
            .finish()
    }
}

/// Convert a host into a TLS server name.
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(literal.to_string()).map_err(|_| Error::InvalidServerName(host.to_string()))
}

/// Run a TLS handshake to completion over a connected socket.
///
/// Gives up once `timeout` passes or the call is canceled.
pub fn handshake(
    tcp: TcpStream,
    server_name: ServerName<'static>,
    config: Arc<ClientConfig>,
    cancel: &CancelToken,
    timeout: Duration,
) -> io::Result<TlsStream> {
    let mut conn = ClientConnection::new(config, server_name).map_err(io::Error::other)?;

    {
        let mut io = StageIo::new(&tcp, cancel, timeout)?;
        while conn.is_handshaking() {
            let (read, written) = conn.complete_io(&mut io)?;
            if read == 0 && written == 0 && conn.is_handshaking() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the connection during the TLS handshake",
                ));
            }
        }

        // The final handshake flight may still be queued
        while conn.wants_write() {
            conn.write_tls(&mut io)?;
        }
        io.flush()?;
    }

    Ok(TlsStream::new(conn, tcp))
}

/// Check if a handshake failed on the peer's certificate.
///
/// Certificate problems do not improve with an older protocol version.
pub fn is_certificate_error(error: &io::Error) -> bool {
    error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|e| {
            matches!(
                e,
                rustls::Error::InvalidCertificate(_)
                    | rustls::Error::NoCertificatesPresented
                    | rustls::Error::UnsupportedNameType
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_cached_per_spec() {
        let tls = TlsContext::with_webpki_roots();
        let modern = tls.client_config(ConnectionSpec::ModernTls).unwrap();
        let again = tls.client_config(ConnectionSpec::ModernTls).unwrap();
        assert!(Arc::ptr_eq(&modern, &again));

        let compatible = tls.client_config(ConnectionSpec::CompatibleTls).unwrap();
        assert!(!Arc::ptr_eq(&modern, &compatible));
    }

    #[test]
    fn test_server_name() {
        assert!(server_name("example.com").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("[::1]").is_ok());
        assert!(matches!(
            server_name("not a host"),
            Err(Error::InvalidServerName(_))
        ));
    }

    #[test]
    fn test_certificate_errors() {
        let cert = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::InvalidCertificate(rustls::CertificateError::Expired),
        );
        assert!(is_certificate_error(&cert));

        let protocol = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::HandshakeNotComplete,
        );
        assert!(!is_certificate_error(&protocol));
        assert!(!is_certificate_error(&io::Error::from(
            io::ErrorKind::UnexpectedEof
        )));
    }
}
