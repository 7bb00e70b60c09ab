//! WebSocket subscriber connections
//!
//! Each connection gets its own bounded channel registered with the hub.
//! The connection task forwards queued messages as text frames and watches
//! the socket only for close; inbound data frames are ignored.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use streamer_core::{StreamMessage, SubscriberHandle};

use crate::server::{AppState, ConnectionState};

/// `GET /ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let (handle, rx) = SubscriberHandle::channel(state.subscriber_buffer);
        let id = handle.id;
        handle_socket(socket, peer, state, handle, rx)
            .instrument(tracing::info_span!("subscriber", %id))
    })
}

async fn handle_socket(
    socket: WebSocket,
    peer: SocketAddr,
    state: AppState,
    handle: SubscriberHandle,
    mut outbound: mpsc::Receiver<StreamMessage>,
) {
    let id = handle.id;
    let mut shutdown = state.shutdown_rx();
    if *shutdown.borrow_and_update() {
        return;
    }

    let hub = state.controller.hub();
    if !hub.register(handle) {
        return;
    }
    state.connections.insert(
        id,
        ConnectionState {
            connected_at: std::time::Instant::now(),
            peer,
        },
    );
    info!(peer = %peer, "Subscriber connected");

    let (mut sink, mut inbound) = socket.split();

    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else {
                    debug!("Dropped by hub");
                    break;
                };
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(kind = message.kind(), error = %e, "Failed to encode message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!(error = %e, "Write failed");
                    break;
                }
            }

            frame = inbound.next() => match frame {
                None | Some(Ok(Message::Close(_))) => {
                    debug!("Client closed connection");
                    break;
                }
                // pings are answered by the socket itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Read failed");
                    break;
                }
            },

            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    hub.unregister(&id);
    let uptime_secs = state
        .connections
        .remove(&id)
        .map(|(_, conn)| conn.connected_at.elapsed().as_secs())
        .unwrap_or_default();

    info!(
        uptime_secs,
        active_connections = state.connections.len(),
        "Subscriber disconnected"
    );
}
