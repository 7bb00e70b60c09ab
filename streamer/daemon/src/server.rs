//! Daemon Server Implementation
//!
//! Builds the axum router, tracks live WebSocket connections and runs the
//! server until a shutdown signal arrives.
//!
//! ```text
//!                      axum Router
//!                          │
//!        ┌─────────────────┼──────────────────┐
//!        │                 │                  │
//!   /api/* (REST)       /health            /ws (WebSocket)
//!        │                                    │
//!        ▼                                    ▼
//!  StreamController ──── BroadcastHub ──► per-connection task
//! ```
//!
//! # Shutdown
//!
//! On SIGINT/SIGTERM the stream is stopped, every WebSocket task is told to
//! close through a watch channel, and axum drains the remaining requests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use streamer_core::{StreamController, SubscriberId};

use crate::{api, socket};

/// Per-connection bookkeeping, separate from the hub's subscriber handle
#[derive(Debug, Clone)]
pub struct ConnectionState {
    /// When the connection was established
    pub connected_at: std::time::Instant,
    /// Remote peer address
    pub peer: SocketAddr,
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// The stream controller
    pub controller: StreamController,
    /// Live WebSocket connections
    pub connections: Arc<DashMap<SubscriberId, ConnectionState>>,
    /// Per-subscriber channel capacity
    pub subscriber_buffer: usize,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl AppState {
    /// Wrap a controller
    pub fn new(controller: StreamController, subscriber_buffer: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            controller,
            connections: Arc::new(DashMap::new()),
            subscriber_buffer,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Receiver that flips to true once shutdown starts
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Stop streaming and tell every connection task to close
    pub fn begin_shutdown(&self) {
        self.controller.stop();
        self.shutdown_tx.send_replace(true);
        info!(
            connections = self.connection_count(),
            "Closing subscriber connections"
        );
    }

    /// Number of live WebSocket connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Per-connection statistics
    pub fn connection_stats(&self) -> Vec<ConnectionStats> {
        self.connections
            .iter()
            .map(|r| ConnectionStats {
                id: *r.key(),
                peer: r.value().peer,
                uptime_secs: r.value().connected_at.elapsed().as_secs(),
            })
            .collect()
    }
}

/// Statistics for a single connection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// Subscriber id
    pub id: SubscriberId,
    /// Remote peer address
    pub peer: SocketAddr,
    /// Connection uptime in seconds
    pub uptime_secs: u64,
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/stream/start", post(api::start_stream))
        .route("/api/stream/stop", post(api::stop_stream))
        .route(
            "/api/config",
            get(api::get_config)
                .post(api::update_config)
                .put(api::update_config),
        )
        .route("/api/generate", post(api::generate))
        .route(
            "/api/events",
            get(api::recent_events).delete(api::purge_events),
        )
        .route("/api/status", get(api::status))
        .route("/ws", get(socket::ws_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state.clone());
    let draining = state.clone();

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        draining.begin_shutdown();
    })
    .await
    .context("server terminated with error")?;

    info!(
        ticks = state.controller.tick_count(),
        failed_writes = state.controller.failed_writes(),
        "Shutdown complete"
    );
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
