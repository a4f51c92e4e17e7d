//! Established connections and the pool that shares them.
//!
//! This module provides:
//! - [`RealConnection`], a connection that finished every connect stage
//! - [`PooledConnection`], the caller's claim on a connection
//! - [`ConnectionPool`], shared storage with atomic lookup-and-claim
//! - Configuration for timeouts, TLS fallback and pool limits
//!
//! # Connection Pooling
//!
//! ```no_run
//! use exchange_finder::connection::{ConnectionPool, PoolConfig};
//! use exchange_finder::Address;
//! use std::time::Duration;
//!
//! let config = PoolConfig::default()
//!     .with_max_connections(10)
//!     .with_idle_timeout(Duration::from_secs(60));
//!
//! let pool = ConnectionPool::new(config);
//!
//! if let Some(conn) = pool.acquire(&Address::https("example.com"), None) {
//!     println!("reusing {}", conn.route());
//!     // The claim is released when the handle is dropped
//! }
//! ```

mod config;
mod pool;
mod real;

pub use config::{ConnectionConfig, ConnectionSpec, DEFAULT_MAX_TUNNEL_ATTEMPTS, PoolConfig};
pub use pool::ConnectionPool;
pub use real::{PooledConnection, RealConnection, Stream, TlsStream};
