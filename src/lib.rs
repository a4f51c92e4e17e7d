//! Connection acquisition built on std::net.
//!
//! This crate finds a live connection for a call by trying candidate
//! routes one after another: pooled connections first, then each proxy's
//! resolved addresses, through TCP, an optional HTTP `CONNECT` tunnel and
//! optional TLS.
//!
//! # Features
//!
//! - Sequential route attempts with aggregated failures
//! - Follow-up plans for proxy authentication and TLS version fallback
//! - Connection pooling with atomic claim and release
//! - Cooperative cancellation between attempts
//! - Recently failed routes tried last
//!
//! # Example
//!
//! ```no_run
//! use exchange_finder::{Address, CancelToken, Connector};
//! use std::io::{Read, Write};
//!
//! let connector = Connector::with_defaults();
//! let mut conn = connector
//!     .connect(Address::https("example.com"), &CancelToken::new())
//!     .unwrap();
//!
//! conn.write_all(b"HEAD / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n")
//!     .unwrap();
//! let mut response = String::new();
//! conn.read_to_string(&mut response).unwrap();
//! println!("{response}");
//! ```
//!
//! # Attempt Flow
//!
//! ```text
//!   plan() ──► ready? ──yes──────────────────────────► handle_success
//!                │ no                                        ▲
//!                ▼                                           │
//!        connect_transport ──ok──► connect_secure_layer ──ok─┘
//!                │                          │
//!             failure              deferred │ failure
//!                │                    ▼     │
//!                │        push to front of  │
//!                │        deferred queue    │
//!                ▼                          ▼
//!          record failure, try next route while has_next()
//! ```

pub mod address;
pub mod cancel;
pub mod connection;
pub mod error;
pub mod finder;
pub mod planner;

// Re-export commonly used types at the crate root
pub use address::{Address, Proxy, Route};
pub use cancel::CancelToken;
pub use connection::{ConnectionConfig, ConnectionPool, PoolConfig, PooledConnection};
pub use error::{ConnectFailures, Error, Result};
pub use finder::{ConnectResult, ExchangeFinder, FindStats, FinderState, Plan, RoutePlanner};
pub use planner::{Connector, ConnectorBuilder};
