//! MPDB Server Binary
//!
//! Starts the TCP server for MPDB.

use std::sync::Arc;
use clap::Parser;
use mpdb::{Config, Engine};
use mpdb::network::Server;
use tracing_subscriber::{fmt, EnvFilter};

/// MPDB Server
#[derive(Parser, Debug)]
#[command(name = "mpdb-server")]
#[command(about = "Lightweight hierarchical document store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./mpdb_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8008")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Username of the administrator created on first start
    #[arg(long, env = "MPDB_ADMIN_USER")]
    admin_user: Option<String>,

    /// Password of the administrator created on first start
    #[arg(long, env = "MPDB_ADMIN_PASSWORD", requires = "admin_user")]
    admin_password: Option<String>,

    /// Idle read timeout per connection in milliseconds (0 disables)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,

    /// Write timeout per connection in milliseconds (0 disables)
    #[arg(long, default_value = "5000")]
    write_timeout_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mpdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("MPDB Server v{}", mpdb::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let mut builder = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .read_timeout_ms(args.read_timeout_ms)
        .write_timeout_ms(args.write_timeout_ms);
    if let (Some(user), Some(password)) = (&args.admin_user, &args.admin_password) {
        builder = builder.bootstrap_admin(user, password);
    }
    let config = builder.build();

    // Open engine
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine initialized successfully");

    let server = match Server::bind(config, engine) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
