//! In-memory store
//!
//! Process-local implementation of both storage traits. Each operation runs
//! under a single write lock, which gives `apply` its atomicity.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{EventStore, SettingsStore, StoreError};
use crate::record::{EventRecord, StoredEvent};
use crate::settings::{merge_app_config, AppConfig, ProviderSettings, SettingsUpdate};

/// Default cap on retained events
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

#[derive(Default)]
struct Inner {
    events: VecDeque<StoredEvent>,
    next_id: i64,
    settings: ProviderSettings,
    app_config: AppConfig,
}

/// In-memory event and settings store
pub struct MemoryStore {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with the default event capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create an empty store retaining at most `capacity` events
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Seed provider settings and app config
    #[must_use]
    pub fn with_settings(self, settings: ProviderSettings, app_config: AppConfig) -> Self {
        {
            let mut inner = self.inner.write();
            inner.settings = settings;
            inner.app_config = app_config;
        }
        self
    }

    /// Number of retained events
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.inner.read().events.len()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, record: &EventRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let stored = StoredEvent {
            id: inner.next_id,
            received_at: Utc::now(),
            event: record.clone(),
        };
        inner.events.push_back(stored);
        while inner.events.len() > self.capacity {
            inner.events.pop_front();
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.events.iter().rev().take(limit).cloned().collect())
    }

    async fn purge(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.write();
        let removed = inner.events.len() as u64;
        inner.events.clear();
        Ok(removed)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn provider_settings(&self) -> Result<ProviderSettings, StoreError> {
        Ok(self.inner.read().settings.clone())
    }

    async fn app_config(&self) -> Result<AppConfig, StoreError> {
        Ok(self.inner.read().app_config.clone())
    }

    async fn apply(
        &self,
        update: &SettingsUpdate,
    ) -> Result<(ProviderSettings, AppConfig), StoreError> {
        let mut inner = self.inner.write();
        let settings = inner.settings.merged(&update.providers);
        if let Some(active) = &settings.active_provider_id {
            if !settings.providers.contains_key(active) {
                return Err(StoreError::Constraint(format!(
                    "active provider '{active}' has no stored config"
                )));
            }
        }
        let app_config = merge_app_config(&inner.app_config, &update.app_config);

        inner.settings = settings.clone();
        inner.app_config = app_config.clone();
        Ok((settings, app_config))
    }

    async fn set_app_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .app_config
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::sample_record;
    use crate::settings::{ProviderConfig, ProviderSettingsUpdate};

    #[tokio::test]
    async fn test_insert_recent_purge() {
        let store = MemoryStore::new();
        store.insert(&sample_record()).await.unwrap();
        store.insert(&sample_record()).await.unwrap();

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].id > recent[1].id, "newest first");

        assert_eq!(store.purge().await.unwrap(), 2);
        assert_eq!(store.event_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let store = MemoryStore::with_capacity(2);
        for _ in 0..3 {
            store.insert(&sample_record()).await.unwrap();
        }
        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].id, 2);
    }

    #[tokio::test]
    async fn test_apply_is_all_or_nothing() {
        let store = MemoryStore::new();

        let mut update = SettingsUpdate::default();
        update.app_config.insert("KEY".to_string(), Some("v".to_string()));
        update.providers = ProviderSettingsUpdate {
            active_provider_id: Some("missing".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            store.apply(&update).await,
            Err(StoreError::Constraint(_))
        ));
        assert!(store.app_config().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_switches_active_provider() {
        let store = MemoryStore::new();
        let mut update = SettingsUpdate::default();
        update
            .providers
            .providers
            .insert("ollama".to_string(), ProviderConfig::default());
        update
            .providers
            .providers
            .insert("openai".to_string(), ProviderConfig::default());
        update.providers.active_provider_id = Some("ollama".to_string());
        store.apply(&update).await.unwrap();

        let switch = SettingsUpdate {
            providers: ProviderSettingsUpdate {
                active_provider_id: Some("openai".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let (settings, _) = store.apply(&switch).await.unwrap();
        assert_eq!(settings.active_provider_id.as_deref(), Some("openai"));
        assert_eq!(settings.providers.len(), 2);
    }
}
