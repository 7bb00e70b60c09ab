//! Storage Abstractions
//!
//! Two narrow async traits separate the core from whatever database sits
//! behind it:
//!
//! - [`EventStore`]: append-only event log with purge and recent-read
//! - [`SettingsStore`]: provider settings and the key/value app config
//!
//! # Available Stores
//!
//! - **Memory**: process-local, the default for development and tests
//! - **Postgres**: durable store behind the `postgres` feature
//!
//! # Atomicity
//!
//! [`SettingsStore::apply`] must apply provider and app-config changes all or
//! nothing, and marking a provider active must deactivate every other one in
//! the same unit of work.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{EventRecord, StoredEvent};
use crate::settings::{AppConfig, ProviderSettings, SettingsUpdate};

/// Storage failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the operation
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be encoded or decoded
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// The update violates a store-enforced constraint
    #[error("storage constraint violated: {0}")]
    Constraint(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Durable event log
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Store name for logs
    fn name(&self) -> &str;

    /// Append one event
    async fn insert(&self, record: &EventRecord) -> Result<(), StoreError>;

    /// Most recent events, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError>;

    /// Delete every stored event, returning how many were removed
    async fn purge(&self) -> Result<u64, StoreError>;
}

/// Durable provider settings and app config
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current provider settings
    async fn provider_settings(&self) -> Result<ProviderSettings, StoreError>;

    /// Current app config
    async fn app_config(&self) -> Result<AppConfig, StoreError>;

    /// Apply provider and app-config changes atomically
    ///
    /// Returns the settings and app config as stored after the update.
    async fn apply(
        &self,
        update: &SettingsUpdate,
    ) -> Result<(ProviderSettings, AppConfig), StoreError>;

    /// Set one app-config value
    async fn set_app_value(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
