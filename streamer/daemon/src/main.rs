//! Streamer Daemon - REST and WebSocket Host
//!
//! Serves the stream controller over HTTP: REST endpoints under `/api` for
//! start/stop/configure and event management, and a WebSocket at `/ws` that
//! pushes every event, error and status message to connected clients.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:3001, in-memory storage)
//! streamer-daemon
//!
//! # Custom listen address and interval
//! streamer-daemon --listen 0.0.0.0:8080 --interval 2000
//!
//! # Postgres storage
//! streamer-daemon --storage postgres --database-url postgres://localhost/streamer
//!
//! # Verbose logging
//! RUST_LOG=debug streamer-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `STREAMER_CONFIG`: config file path
//! - `STREAMER_LISTEN`, `STREAMER_INTERVAL_MS`, `STREAMER_STORAGE`, `DATABASE_URL`
//! - `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`: provider credentials
//! - `OLLAMA_HOST`, `OLLAMA_PORT`: local Ollama server
//! - `RUST_LOG`: log filter
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: stop the stream, close subscribers, exit

mod api;
mod server;
mod socket;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use streamer_core::{
    default_config_path, load_config_from_path, ConfigOverrides, EventStore, HttpGenerationClient,
    MemoryStore, SettingsStore, StorageBackend, StreamController, StreamerConfig,
};

use server::AppState;

/// Streamer Daemon - synthetic error event stream over REST and WebSocket
#[derive(Parser, Debug)]
#[command(name = "streamer-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "STREAMER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short = 'L', long, value_name = "ADDR")]
    listen: Option<String>,

    /// Tick interval in milliseconds
    #[arg(short = 'i', long, value_name = "MS")]
    interval: Option<u64>,

    /// Storage backend (memory, postgres)
    #[arg(long, value_name = "BACKEND")]
    storage: Option<StorageBackend>,

    /// Postgres connection URL
    #[arg(long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "STREAMER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.listen.clone(),
            interval_ms: self.interval,
            storage: self.storage,
            database_url: self.database_url.clone(),
        }
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "streamer_daemon={level},streamer_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Open the configured event and settings stores
async fn open_stores(
    config: &StreamerConfig,
) -> Result<(Arc<dyn EventStore>, Arc<dyn SettingsStore>)> {
    match config.storage.backend {
        StorageBackend::Memory => {
            let store = Arc::new(MemoryStore::new());
            info!("Using in-memory storage");
            Ok((store.clone(), store))
        }
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres => {
            let url = config
                .storage
                .database_url
                .as_deref()
                .context("postgres storage needs a database URL")?;
            let store = Arc::new(
                streamer_core::PostgresStore::connect(
                    url,
                    &config.storage.table_prefix,
                    config.storage.max_connections,
                )
                .await
                .context("Failed to open Postgres storage")?,
            );
            info!(prefix = %config.storage.table_prefix, "Using Postgres storage");
            Ok((store.clone(), store))
        }
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres => {
            anyhow::bail!("postgres storage requested but this build has no postgres support")
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = args.config.clone().or_else(default_config_path);
    let mut config =
        load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        source = ?config.source(),
        listen = %config.listen,
        interval_ms = config.stream.interval_ms,
        storage = %config.storage.backend,
        "Configuration loaded"
    );

    let listen = config.listen_addr()?;
    let (events, settings) = open_stores(&config).await?;
    let backend = Arc::new(HttpGenerationClient::new().context("Failed to build HTTP client")?);

    let controller = StreamController::builder(backend, events, settings)
        .config(config.stream.clone())
        .build();

    let state = AppState::new(controller, config.subscriber_buffer);
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;

    info!(addr = %listen, "Listening for connections");
    server::serve(listener, state, server::shutdown_signal()).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "Streamer daemon starting"
    );

    match run(args).await {
        Ok(()) => {
            info!("Streamer daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}
