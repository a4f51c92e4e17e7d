//! Host name resolution.

use std::io;
use std::net::{IpAddr, ToSocketAddrs};

/// Resolves host names to IP addresses.
pub trait Dns: Send + Sync {
    /// Resolve a host name. An empty answer is an error.
    fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolution through the operating system's resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDns;

impl Dns for SystemDns {
    fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = literal.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in (host, 0).to_socket_addrs()? {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }

        if ips.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {host}"),
            ));
        }
        Ok(ips)
    }
}
