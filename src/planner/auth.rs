//! Proxy authentication for `CONNECT` tunnels.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::address::Route;

use super::tunnel::TunnelResponse;

/// Answers a proxy's `407` challenge.
pub trait ProxyAuthenticator: Send + Sync {
    /// Return a `Proxy-Authorization` value to retry with, or `None` to
    /// give up. `previous` is the value the rejected request carried.
    fn authenticate(
        &self,
        route: &Route,
        response: &TunnelResponse,
        previous: Option<&str>,
    ) -> Option<String>;
}

/// HTTP Basic credentials.
#[derive(Clone)]
pub struct BasicAuthenticator {
    header: String,
}

impl BasicAuthenticator {
    /// Create an authenticator for a user name and password.
    pub fn new(username: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        Self {
            header: format!("Basic {encoded}"),
        }
    }

    /// Get the header value this authenticator sends.
    pub fn header(&self) -> &str {
        &self.header
    }
}

impl ProxyAuthenticator for BasicAuthenticator {
    fn authenticate(
        &self,
        _route: &Route,
        response: &TunnelResponse,
        previous: Option<&str>,
    ) -> Option<String> {
        // Same credentials already rejected
        if previous == Some(self.header.as_str()) {
            return None;
        }

        let offers_basic = response
            .challenges()
            .iter()
            .any(|scheme| scheme.eq_ignore_ascii_case("Basic"));
        offers_basic.then(|| self.header.clone())
    }
}

impl std::fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthenticator").finish_non_exhaustive()
    }
}
