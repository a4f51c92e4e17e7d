//! Connection acquisition core.
//!
//! [`ExchangeFinder`] drives a [`RoutePlanner`] until one of its plans
//! yields a connection:
//!
//! 1. stop with [`Error::Canceled`](crate::Error::Canceled) if the call was
//!    canceled;
//! 2. take the next plan (deferred follow-ups first);
//! 3. reuse it directly if it is already backed by a pooled connection;
//! 4. otherwise connect the transport, then the secure layer, queueing any
//!    follow-up plan and looping;
//! 5. register and return the connection.
//!
//! Failures are collected and the next route is tried while the planner
//! has more.
//!
//! # Example
//!
//! ```no_run
//! use exchange_finder::{Address, CancelToken, Connector, ExchangeFinder};
//!
//! let connector = Connector::with_defaults();
//! let planner = connector.route_planner(Address::https("example.com"), CancelToken::new());
//!
//! let mut finder = ExchangeFinder::new(planner);
//! let connection = finder.find().unwrap();
//! println!("connected via {}", connection.route());
//! ```

mod exchange;
mod plan;
mod state;

pub use exchange::{ExchangeFinder, PlannedConnection};
pub use plan::{ConnectResult, Plan, RoutePlanner};
pub use state::{FindStats, FinderState};
