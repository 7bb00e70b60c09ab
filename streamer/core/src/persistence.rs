//! Best-effort event persistence
//!
//! The live stream must not stall or drop an event because the database is
//! down, so [`PersistenceGateway::write`] swallows store errors after logging
//! them. Purge and recent-read are caller-facing and do propagate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::record::{EventRecord, StoredEvent};
use crate::store::{EventStore, StoreError};

/// Largest page of recent events handed out
pub const MAX_RECENT_EVENTS: usize = 500;

/// Non-fatal writer in front of an [`EventStore`]
pub struct PersistenceGateway {
    store: Arc<dyn EventStore>,
    failed_writes: AtomicU64,
}

impl PersistenceGateway {
    /// Wrap a store
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            failed_writes: AtomicU64::new(0),
        }
    }

    /// Try one insert; failures are logged and counted, never returned
    ///
    /// Returns whether the write succeeded.
    pub async fn write(&self, record: &EventRecord) -> bool {
        match self.store.insert(record).await {
            Ok(()) => {
                tracing::debug!(
                    store = self.store.name(),
                    code = %record.code,
                    "Event persisted"
                );
                true
            }
            Err(e) => {
                let failed = self.failed_writes.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    store = self.store.name(),
                    code = %record.code,
                    error = %e,
                    failed_writes = failed,
                    "Failed to persist event, continuing"
                );
                false
            }
        }
    }

    /// Number of writes that failed since start
    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    /// Delete every stored event
    pub async fn purge(&self) -> Result<u64, StoreError> {
        let deleted = self.store.purge().await?;
        tracing::info!(store = self.store.name(), deleted, "Purged stored events");
        Ok(deleted)
    }

    /// Most recent events, newest first; `limit` is clamped to `1..=500`
    pub async fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        self.store
            .recent(limit.clamp(1, MAX_RECENT_EVENTS))
            .await
    }
}
