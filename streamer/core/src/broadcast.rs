//! Broadcast Hub - Subscriber Fan-out
//!
//! Keeps the set of live subscribers and pushes every [`StreamMessage`] to
//! each of them.
//!
//! # Architecture
//!
//! ```text
//!                        BroadcastHub
//!                 ┌───────────────────────────────────────────┐
//!                 │ HashMap<SubscriberId, SubscriberHandle>   │
//!                 │ status board: StatusSnapshot              │
//!                 └───────────────┬───────────────────────────┘
//!                                 │ try_send
//!              ┌──────────────────┼──────────────────┐
//!              │                  │                  │
//!       ┌──────▼──────┐    ┌──────▼──────┐    ┌──────▼──────┐
//!       │  WebSocket  │    │  WebSocket  │    │  test sink  │
//!       │   sub-1     │    │   sub-2     │    │   sub-3     │
//!       └─────────────┘    └─────────────┘    └─────────────┘
//! ```
//!
//! # Delivery
//!
//! Best effort. Publishing never waits on a subscriber: each one gets a
//! bounded channel and a `try_send`. A closed or full channel drops that
//! subscriber from the set; delivery to the others continues.
//!
//! New subscribers get the current status snapshot before anything else, so
//! they never have to wait for the next tick to know what is going on.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::messages::{StatusSnapshot, StreamMessage};

/// Default per-subscriber channel capacity
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Unique identifier for a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate a new unique id
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Sending side of one subscriber
#[derive(Debug)]
pub struct SubscriberHandle {
    /// Subscriber id
    pub id: SubscriberId,
    tx: mpsc::Sender<StreamMessage>,
    connected_at: std::time::Instant,
}

impl SubscriberHandle {
    /// Wrap a channel sender
    #[must_use]
    pub fn new(id: SubscriberId, tx: mpsc::Sender<StreamMessage>) -> Self {
        Self {
            id,
            tx,
            connected_at: std::time::Instant::now(),
        }
    }

    /// Create a handle plus the receiver the transport drains
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<StreamMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(SubscriberId::new(), tx), rx)
    }

    /// Try to queue a message without waiting
    #[must_use]
    pub fn try_send(&self, message: StreamMessage) -> bool {
        self.tx.try_send(message).is_ok()
    }

    /// Whether the receiving side is still around
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Seconds since registration
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.connected_at.elapsed().as_secs()
    }
}

/// Outcome of one publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Subscribers that accepted the message
    pub successful: usize,
    /// Subscribers that were dropped
    pub failed: usize,
    /// Ids of the dropped subscribers
    pub failed_ids: Vec<SubscriberId>,
}

impl BroadcastResult {
    /// Whether every subscriber accepted the message
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Subscriber set plus the status board
#[derive(Clone)]
pub struct BroadcastHub {
    subscribers: Arc<RwLock<HashMap<SubscriberId, SubscriberHandle>>>,
    status: Arc<RwLock<StatusSnapshot>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            status: Arc::new(RwLock::new(StatusSnapshot::default())),
        }
    }

    /// Register a subscriber and send it the current status
    ///
    /// Returns false if the subscriber was gone before it could be greeted;
    /// it is not added in that case.
    pub fn register(&self, handle: SubscriberHandle) -> bool {
        let id = handle.id;
        let mut subscribers = self.subscribers.write();

        // Greeting goes out under the write lock so no publish can overtake it
        let greeting = self.status.read().to_message();
        if !handle.try_send(greeting) {
            tracing::debug!(subscriber = %id, "Subscriber closed before registration");
            return false;
        }

        subscribers.insert(id, handle);
        tracing::info!(
            subscriber = %id,
            subscribers = subscribers.len(),
            "Subscriber registered"
        );
        true
    }

    /// Remove a subscriber
    pub fn unregister(&self, id: &SubscriberId) -> Option<SubscriberHandle> {
        let mut subscribers = self.subscribers.write();
        let handle = subscribers.remove(id);
        if let Some(handle) = &handle {
            tracing::info!(
                subscriber = %id,
                uptime_secs = handle.uptime_secs(),
                subscribers = subscribers.len(),
                "Subscriber unregistered"
            );
        }
        handle
    }

    /// Number of live subscribers
    #[must_use]
    pub fn count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Whether a subscriber is registered
    #[must_use]
    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.read().contains_key(id)
    }

    /// Push a message to every subscriber
    ///
    /// Subscribers whose channel is closed or full are removed.
    pub fn publish(&self, message: StreamMessage) -> BroadcastResult {
        let mut result = BroadcastResult::default();

        {
            let subscribers = self.subscribers.read();
            for (id, handle) in subscribers.iter() {
                if handle.try_send(message.clone()) {
                    result.successful += 1;
                } else {
                    result.failed += 1;
                    result.failed_ids.push(*id);
                }
            }
        }

        if !result.failed_ids.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in &result.failed_ids {
                subscribers.remove(id);
            }
            tracing::debug!(
                kind = message.kind(),
                dropped = result.failed,
                remaining = subscribers.len(),
                "Dropped unresponsive subscribers"
            );
        }

        result
    }

    /// Current status board
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        self.status.read().clone()
    }

    /// Update the status board without publishing
    pub fn set_status(&self, snapshot: StatusSnapshot) {
        *self.status.write() = snapshot;
    }

    /// Update the status board and publish it
    pub fn publish_status(&self, snapshot: StatusSnapshot) -> BroadcastResult {
        let message = snapshot.to_message();
        *self.status.write() = snapshot;
        self.publish(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::sample_record;
    use pretty_assertions::assert_eq;

    fn status(is_streaming: bool) -> StatusSnapshot {
        StatusSnapshot {
            is_streaming,
            interval: 1000,
            provider: None,
        }
    }

    #[test]
    fn test_subscriber_ids_unique() {
        let a = SubscriberId::new();
        let b = SubscriberId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("sub-"));
    }

    #[test]
    fn test_register_sends_status_first() {
        let hub = BroadcastHub::new();
        hub.publish_status(status(true));

        let (handle, mut rx) = SubscriberHandle::channel(4);
        assert!(hub.register(handle));
        assert_eq!(hub.count(), 1);

        assert_eq!(rx.try_recv().unwrap(), status(true).to_message());
    }

    #[test]
    fn test_register_closed_subscriber_is_skipped() {
        let hub = BroadcastHub::new();
        let (handle, rx) = SubscriberHandle::channel(4);
        drop(rx);
        assert!(!hub.register(handle));
        assert_eq!(hub.count(), 0);
    }

    #[test]
    fn test_publish_drops_dead_subscribers_only() {
        let hub = BroadcastHub::new();
        let (alive, mut alive_rx) = SubscriberHandle::channel(4);
        let (dead, dead_rx) = SubscriberHandle::channel(4);
        let dead_id = dead.id;
        hub.register(alive);
        hub.register(dead);
        drop(dead_rx);

        let result = hub.publish(StreamMessage::event(sample_record()));
        assert_eq!(result.successful, 1);
        assert_eq!(result.failed_ids, vec![dead_id]);
        assert_eq!(hub.count(), 1);
        assert!(!hub.contains(&dead_id));

        // greeting, then the event
        assert_eq!(alive_rx.try_recv().unwrap().kind(), "status");
        assert_eq!(alive_rx.try_recv().unwrap().kind(), "event");
    }

    #[test]
    fn test_full_subscriber_is_dropped() {
        let hub = BroadcastHub::new();
        let (slow, _slow_rx) = SubscriberHandle::channel(1);
        hub.register(slow);

        // the greeting filled the only slot
        let result = hub.publish(StreamMessage::error("boom", None));
        assert_eq!(result.failed, 1);
        assert_eq!(hub.count(), 0);
    }

    #[test]
    fn test_unregister() {
        let hub = BroadcastHub::new();
        let (handle, _rx) = SubscriberHandle::channel(4);
        let id = handle.id;
        hub.register(handle);

        assert!(hub.unregister(&id).is_some());
        assert!(hub.unregister(&id).is_none());
        assert!(hub.publish(StreamMessage::error("x", None)).all_succeeded());
    }
}
