//! imagehub-server: host imagehub repositories over TCP.
//!
//! # Usage
//!
//! ```bash
//! # Serve with defaults (0.0.0.0:50051, ./images, ./archive, in-memory records)
//! imagehub-server
//!
//! # Serve with a config file and persistent records
//! imagehub-server --config server.toml --database-dir ./db
//! ```

use clap::Parser;
use env_logger::Env;
use imagehub_server::{serve, EngineConfig, LocalStore, RecordStore, ServerConfig, SyncEngine};
use log::{error, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Host imagehub repositories.
#[derive(Parser, Debug)]
#[command(name = "imagehub-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Directory for persistent records (overrides the config file)
    #[arg(long, value_name = "DIR")]
    database_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    let mut config = match &args.config {
        Some(path) => match ServerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config: {}", e);
                process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(dir) = args.database_dir {
        config.database_dir = Some(dir);
    }

    let store = match &config.database_dir {
        Some(dir) => match LocalStore::open(dir) {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to open record store at {}: {}", dir.display(), e);
                process::exit(1);
            }
        },
        None => {
            info!("No database_dir configured; records are kept in memory");
            LocalStore::in_memory()
        }
    };
    let store = Arc::new(store);

    info!("Canonical store: {}", config.images_root.display());
    info!("Archive directory: {}", config.archive_root.display());
    info!("Base URL: {}", config.base_url);

    let shared: Arc<dyn RecordStore> = store.clone();
    let engine = Arc::new(SyncEngine::new(EngineConfig::from(&config), shared));

    let exit_code = tokio::select! {
        result = serve(config.listen_addr, engine) => match result {
            Ok(()) => 0,
            Err(e) => {
                error!("Server error: {}", e);
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            0
        }
    };

    if let Err(e) = store.close() {
        error!("Failed to close record store: {}", e);
        process::exit(1);
    }
    process::exit(exit_code);
}
