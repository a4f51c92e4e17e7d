//! Connect example.
//!
//! This example finds a connection to an HTTPS origin, optionally through
//! an HTTP proxy, sends a request over it and then shows the pooled
//! connection being reused.
//!
//! Run with: cargo run --example connect -- [host] [proxy_host:proxy_port]
//! Set RUST_LOG=exchange_finder=debug to watch each attempt.

use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use exchange_finder::{
    Address, CancelToken, ConnectionConfig, Connector, ExchangeFinder, PoolConfig, Proxy,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "example.com".to_string());

    let mut address = Address::https(&host);
    if let Some(proxy) = args.next() {
        let (proxy_host, proxy_port) = proxy.rsplit_once(':').expect("proxy must be host:port");
        let proxy_port = proxy_port.parse().expect("invalid proxy port");
        address = address
            .with_proxy(Proxy::http(proxy_host, proxy_port))
            .with_proxy(Proxy::Direct);
    }

    println!("=== Connecting to {address} ===\n");

    let config = PoolConfig::default()
        .with_idle_timeout(Duration::from_secs(30))
        .with_connection_config(
            ConnectionConfig::default().with_connect_timeout(Duration::from_secs(5)),
        );
    let connector = Connector::builder().with_pool_config(config).build();

    // First call: fresh connection
    println!("--- First call ---");
    let mut finder = ExchangeFinder::new(connector.route_planner(address.clone(), CancelToken::new()));
    let mut conn = match finder.find() {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("Failed to connect: {e}");
            if let Some(failures) = e.failures() {
                for (i, failure) in failures.iter().enumerate() {
                    eprintln!("  attempt {}: {failure}", i + 1);
                }
            }
            std::process::exit(1);
        }
    };

    println!("Route: {}", conn.route());
    println!("TLS: {:?}", conn.connection().tls_version());
    println!("Stats: {:?}", finder.stats());

    let request = format!("HEAD / HTTP/1.1\r\nHost: {host}\r\nUser-Agent: exchange-finder-demo\r\n\r\n");
    conn.write_all(request.as_bytes()).expect("Failed to send request");

    let mut reader = BufReader::new(&mut conn);
    let mut status = String::new();
    reader.read_line(&mut status).expect("Failed to read response");
    println!("Response: {}", status.trim_end());

    // Drain the head so the connection is clean for reuse
    let mut line = String::new();
    while reader.read_line(&mut line).expect("Failed to read headers") > 2 {
        line.clear();
    }
    let first_id = conn.id();
    drop(conn);

    // Second call: served from the pool
    println!("\n--- Second call ---");
    let conn = connector
        .connect(address, &CancelToken::new())
        .expect("Failed to connect");
    println!(
        "Connection {} (reused: {})",
        conn.id(),
        conn.id() == first_id
    );
    println!("Pool: {:?}", connector.pool());
}
