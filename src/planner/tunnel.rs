//! HTTP `CONNECT` tunnel framing.

use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::address::Address;
use crate::error::{Error, Result};

/// Maximum size of a proxy's response head.
pub const MAX_RESPONSE_HEAD: usize = 8192;

/// User agent sent to proxies.
pub const USER_AGENT: &str = concat!("exchange-finder/", env!("CARGO_PKG_VERSION"));

/// A proxy's response to `CONNECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelResponse {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    headers: Vec<(String, String)>,
}

impl TunnelResponse {
    /// Get the first value of a header, ignoring case.
    pub fn header<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.headers(name).next()
    }

    /// Get every value of a header, ignoring case.
    pub fn headers<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Get the authentication schemes offered in `Proxy-Authenticate`.
    pub fn challenges(&self) -> Vec<&str> {
        self.headers("Proxy-Authenticate")
            .filter_map(|value| value.split_whitespace().next())
            .collect()
    }

    /// Check if the proxy opened the tunnel. Only `200` counts.
    pub fn is_established(&self) -> bool {
        self.status == 200
    }
}

/// Encode a `CONNECT` request for the address.
pub fn encode_connect_request(address: &Address, authorization: Option<&str>) -> Bytes {
    let authority = if address.host().contains(':') {
        format!("[{}]:{}", address.host(), address.port())
    } else {
        format!("{}:{}", address.host(), address.port())
    };

    let mut buf = BytesMut::with_capacity(256);
    buf.put_slice(format!("CONNECT {authority} HTTP/1.1\r\n").as_bytes());
    buf.put_slice(format!("Host: {authority}\r\n").as_bytes());
    buf.put_slice(b"Proxy-Connection: Keep-Alive\r\n");
    buf.put_slice(format!("User-Agent: {USER_AGENT}\r\n").as_bytes());
    if let Some(authorization) = authorization {
        buf.put_slice(format!("Proxy-Authorization: {authorization}\r\n").as_bytes());
    }
    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Write a `CONNECT` request to a stream.
pub fn write_connect_request<W: Write>(
    writer: &mut W,
    address: &Address,
    authorization: Option<&str>,
) -> Result<()> {
    writer.write_all(&encode_connect_request(address, authorization))?;
    writer.flush()?;
    Ok(())
}

/// Read a proxy's response head from a stream.
///
/// Reads one byte at a time so nothing past the head is consumed; the
/// bytes that follow belong to the tunneled connection.
pub fn read_connect_response<R: Read>(reader: &mut R) -> Result<TunnelResponse> {
    let mut head = BytesMut::with_capacity(512);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(Error::InvalidTunnelResponse(format!(
                "response head exceeds {MAX_RESPONSE_HEAD} bytes"
            )));
        }
        match reader.read(&mut byte) {
            Ok(0) => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "proxy closed the connection during CONNECT",
                )));
            }
            Ok(_) => head.put_u8(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    parse_response_head(&head)
}

/// Parse a response head terminated by an empty line.
pub fn parse_response_head(head: &[u8]) -> Result<TunnelResponse> {
    let text = std::str::from_utf8(head)
        .map_err(|_| Error::InvalidTunnelResponse("response head is not UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(Error::InvalidTunnelResponse(format!(
            "unexpected status line: {status_line}"
        )));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            Error::InvalidTunnelResponse(format!("unexpected status line: {status_line}"))
        })?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    for line in lines.take_while(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidTunnelResponse(format!("malformed header: {line}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(TunnelResponse {
        status,
        reason,
        headers,
    })
}
