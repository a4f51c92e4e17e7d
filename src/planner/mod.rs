//! Route planning over TCP, `CONNECT` tunnels and TLS.
//!
//! [`Connector`] owns the pieces shared between calls: the connection
//! pool, the resolver, the [`RouteDatabase`] of recently failed routes and
//! the TLS configuration. Each call gets its own [`RealRoutePlanner`],
//! which walks the address's proxies through a [`RouteSelector`] and hands
//! out [`ConnectionPlan`]s to the exchange finder.
//!
//! # Proxies
//!
//! ```no_run
//! use exchange_finder::planner::{BasicAuthenticator, Connector};
//! use exchange_finder::{Address, CancelToken, Proxy};
//!
//! let connector = Connector::builder()
//!     .with_authenticator(BasicAuthenticator::new("user", "secret"))
//!     .build();
//!
//! let address = Address::https("example.com")
//!     .with_proxy(Proxy::http("proxy.internal", 3128))
//!     .with_proxy(Proxy::Direct);
//!
//! let connection = connector.connect(address, &CancelToken::new()).unwrap();
//! println!("connected via {}", connection.route());
//! ```

mod auth;
mod connect_plan;
mod connector;
mod dns;
mod route_database;
mod route_planner;
mod selector;
mod stage_io;
pub mod tls;
pub mod tunnel;

pub use auth::{BasicAuthenticator, ProxyAuthenticator};
pub use connect_plan::{ConnectPlan, ConnectionPlan};
pub use connector::{Connector, ConnectorBuilder};
pub use dns::{Dns, SystemDns};
pub use route_database::RouteDatabase;
pub use route_planner::RealRoutePlanner;
pub use selector::RouteSelector;
pub use tls::TlsContext;
pub use tunnel::TunnelResponse;
