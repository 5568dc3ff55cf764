//! hotrod-probe
//!
//! Starts a transport factory against a cluster, pings it and shows where
//! a key would be routed.

use std::sync::Arc;

use clap::Parser;
use hotrod_transport::operations::PingOperation;
use hotrod_transport::protocol::BinaryCodec;
use hotrod_transport::transport::Transport;
use hotrod_transport::{Configuration, TransportFactory};
use tracing_subscriber::{fmt, EnvFilter};

/// Hot Rod transport probe
#[derive(Parser, Debug)]
#[command(name = "hotrod-probe")]
#[command(about = "Ping a cluster and show key routing")]
#[command(version)]
struct Args {
    /// Server address (host:port), may be repeated
    #[arg(short, long, default_value = "127.0.0.1:11222")]
    server: Vec<String>,

    /// Cache name (empty = default cache)
    #[arg(short, long, default_value = "")]
    cache: String,

    /// Key to route
    #[arg(short, long)]
    key: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long, default_value = "5000")]
    connect_timeout_ms: u64,
}

fn parse_server(value: &str) -> Option<(String, u16)> {
    let (host, port) = value.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hotrod_transport=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("hotrod-probe v{}", hotrod_transport::VERSION);

    let mut builder = Configuration::builder().connect_timeout_ms(args.connect_timeout_ms);
    for server in &args.server {
        match parse_server(server) {
            Some((host, port)) => builder = builder.add_server(host, port),
            None => {
                tracing::error!("Invalid server address: {}", server);
                std::process::exit(2);
            }
        }
    }

    let factory = match TransportFactory::start(builder.build(), Arc::new(BinaryCodec), 0) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("Failed to start transport factory: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Known servers: {:?}", factory.servers());
    tracing::info!("Topology id: {}", factory.topology_id());

    let cache = args.cache.as_bytes();
    let transport = match &args.key {
        Some(key) => factory.get_transport_for_key(key.as_bytes(), cache),
        None => factory.get_transport(cache),
    };

    let mut transport = match transport {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("No transport: {}", e);
            factory.destroy();
            std::process::exit(1);
        }
    };

    tracing::info!("Routed to {}", transport.server());

    let ping = PingOperation::new(factory.operation_context(cache));
    match ping.execute(&mut *transport) {
        Ok(topology) => {
            tracing::info!("Ping ok (pushed topology: {:?})", topology);
            factory.release_transport(transport);
        }
        Err(e) => {
            tracing::error!("Ping failed: {}", e);
            factory.invalidate_transport(transport);
        }
    }

    factory.destroy();
}
