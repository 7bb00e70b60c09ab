//! Postgres store
//!
//! Durable implementation of both storage traits on a `sqlx` pool. Tables are
//! created on connect and share a configurable prefix:
//!
//! - `{prefix}_events`: one row per generated event
//! - `{prefix}_providers`: provider configs, at most one `is_active` row
//!   (partial unique index)
//! - `{prefix}_app_config`: key/value app config

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{EventStore, SettingsStore, StoreError};
use crate::record::{ErrorCategory, EventRecord, StoredEvent};
use crate::settings::{AppConfig, ProviderConfig, ProviderKind, ProviderSettings, SettingsUpdate};

/// Postgres-backed event and settings store
pub struct PostgresStore {
    pool: PgPool,
    events_table: String,
    providers_table: String,
    app_config_table: String,
}

impl PostgresStore {
    /// Connect and create tables if needed
    pub async fn connect(
        connection_url: &str,
        table_prefix: &str,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(connection_url)
            .await
            .map_err(unavailable)?;
        let prefix = normalize_table_prefix(table_prefix);
        let store = Self {
            pool,
            events_table: format!("{prefix}_events"),
            providers_table: format!("{prefix}_providers"),
            app_config_table: format!("{prefix}_app_config"),
        };
        store.init_schema().await?;
        tracing::info!(prefix = %prefix, "Postgres store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id BIGSERIAL PRIMARY KEY,
                    received_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    event_timestamp TIMESTAMPTZ NOT NULL,
                    code TEXT NOT NULL,
                    category TEXT NOT NULL,
                    location TEXT NOT NULL,
                    service TEXT NOT NULL,
                    correlation_id UUID NOT NULL,
                    order_id UUID NOT NULL,
                    message TEXT NOT NULL,
                    stack_trace TEXT NOT NULL
                )",
                self.events_table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {0}_received_idx ON {0} (received_at DESC)",
                self.events_table
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    kind TEXT NULL,
                    model_name TEXT NULL,
                    endpoint_url TEXT NULL,
                    credential TEXT NULL,
                    is_active BOOLEAN NOT NULL DEFAULT FALSE
                )",
                self.providers_table
            ),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {0}_one_active_idx ON {0} (is_active) WHERE is_active",
                self.providers_table
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                )",
                self.app_config_table
            ),
        ];

        for sql in &statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
        }
        Ok(())
    }

    fn decode_event(&self, row: &PgRow) -> Result<StoredEvent, StoreError> {
        let category: String = row.try_get("category").map_err(serialization)?;
        let category = category
            .parse::<ErrorCategory>()
            .map_err(StoreError::Serialization)?;
        Ok(StoredEvent {
            id: row.try_get("id").map_err(serialization)?,
            received_at: row.try_get("received_at").map_err(serialization)?,
            event: EventRecord {
                timestamp: row
                    .try_get::<DateTime<Utc>, _>("event_timestamp")
                    .map_err(serialization)?,
                code: row.try_get("code").map_err(serialization)?,
                category,
                location: row.try_get("location").map_err(serialization)?,
                service: row.try_get("service").map_err(serialization)?,
                correlation_id: row
                    .try_get::<Uuid, _>("correlation_id")
                    .map_err(serialization)?,
                order_id: row.try_get::<Uuid, _>("order_id").map_err(serialization)?,
                message: row.try_get("message").map_err(serialization)?,
                stack_trace: row.try_get("stack_trace").map_err(serialization)?,
            },
        })
    }
}

#[async_trait]
impl EventStore for PostgresStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn insert(&self, record: &EventRecord) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (
                event_timestamp, code, category, location, service,
                correlation_id, order_id, message, stack_trace
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            self.events_table
        );
        sqlx::query(&sql)
            .bind(record.timestamp)
            .bind(&record.code)
            .bind(record.category.as_str())
            .bind(&record.location)
            .bind(&record.service)
            .bind(record.correlation_id)
            .bind(record.order_id)
            .bind(&record.message)
            .bind(&record.stack_trace)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        let sql = format!(
            "SELECT id, received_at, event_timestamp, code, category, location, service,
                    correlation_id, order_id, message, stack_trace
             FROM {} ORDER BY id DESC LIMIT $1",
            self.events_table
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        rows.iter().map(|row| self.decode_event(row)).collect()
    }

    async fn purge(&self) -> Result<u64, StoreError> {
        let sql = format!("DELETE FROM {}", self.events_table);
        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SettingsStore for PostgresStore {
    async fn provider_settings(&self) -> Result<ProviderSettings, StoreError> {
        let sql = format!(
            "SELECT id, kind, model_name, endpoint_url, credential, is_active FROM {} ORDER BY id",
            self.providers_table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        let mut settings = ProviderSettings::default();
        for row in rows {
            let id: String = row.try_get("id").map_err(serialization)?;
            let kind: Option<String> = row.try_get("kind").map_err(serialization)?;
            let kind = kind
                .map(|k| k.parse::<ProviderKind>())
                .transpose()
                .map_err(StoreError::Serialization)?;
            let is_active: bool = row.try_get("is_active").map_err(serialization)?;
            if is_active {
                settings.active_provider_id = Some(id.clone());
            }
            settings.providers.insert(
                id,
                ProviderConfig {
                    kind,
                    model_name: row.try_get("model_name").map_err(serialization)?,
                    endpoint_url: row.try_get("endpoint_url").map_err(serialization)?,
                    credential: row.try_get("credential").map_err(serialization)?,
                },
            );
        }
        Ok(settings)
    }

    async fn app_config(&self) -> Result<AppConfig, StoreError> {
        let sql = format!("SELECT key, value FROM {}", self.app_config_table);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("key").map_err(serialization)?,
                    row.try_get::<String, _>("value").map_err(serialization)?,
                ))
            })
            .collect()
    }

    async fn apply(
        &self,
        update: &SettingsUpdate,
    ) -> Result<(ProviderSettings, AppConfig), StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let delete_sql = format!("DELETE FROM {} WHERE id = $1", self.providers_table);
        for id in &update.providers.remove {
            sqlx::query(&delete_sql)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }

        let upsert_sql = format!(
            "INSERT INTO {0} AS p (id, kind, model_name, endpoint_url, credential)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET
                kind = COALESCE(EXCLUDED.kind, p.kind),
                model_name = COALESCE(EXCLUDED.model_name, p.model_name),
                endpoint_url = COALESCE(EXCLUDED.endpoint_url, p.endpoint_url),
                credential = COALESCE(EXCLUDED.credential, p.credential)",
            self.providers_table
        );
        for (id, cfg) in &update.providers.providers {
            sqlx::query(&upsert_sql)
                .bind(id)
                .bind(cfg.kind.map(|k| k.as_str()))
                .bind(&cfg.model_name)
                .bind(&cfg.endpoint_url)
                .bind(&cfg.credential)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }

        if let Some(active) = update.providers.active_provider_id.as_deref().map(str::trim) {
            // Deactivate first so the partial unique index never sees two rows.
            let deactivate_sql = format!(
                "UPDATE {} SET is_active = FALSE WHERE is_active AND id <> $1",
                self.providers_table
            );
            sqlx::query(&deactivate_sql)
                .bind(active)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;

            if !active.is_empty() {
                let activate_sql = format!(
                    "UPDATE {} SET is_active = TRUE WHERE id = $1",
                    self.providers_table
                );
                let result = sqlx::query(&activate_sql)
                    .bind(active)
                    .execute(&mut *tx)
                    .await
                    .map_err(unavailable)?;
                if result.rows_affected() != 1 {
                    return Err(StoreError::Constraint(format!(
                        "active provider '{active}' has no stored config"
                    )));
                }
            }
        }

        let set_sql = format!(
            "INSERT INTO {} (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
            self.app_config_table
        );
        let unset_sql = format!("DELETE FROM {} WHERE key = $1", self.app_config_table);
        for (key, value) in &update.app_config {
            match value {
                Some(value) => sqlx::query(&set_sql).bind(key).bind(value),
                None => sqlx::query(&unset_sql).bind(key),
            }
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        }

        tx.commit().await.map_err(unavailable)?;

        Ok((self.provider_settings().await?, self.app_config().await?))
    }

    async fn set_app_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
            self.app_config_table
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn serialization(err: sqlx::Error) -> StoreError {
    StoreError::Serialization(err.to_string())
}

/// Keep only identifier-safe characters so the prefix can be spliced into SQL
fn normalize_table_prefix(prefix: &str) -> String {
    let cleaned: String = prefix
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "streamer".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_table_prefix() {
        assert_eq!(normalize_table_prefix("Streamer"), "streamer");
        assert_eq!(normalize_table_prefix("app-events; DROP"), "app_events__drop");
        assert_eq!(normalize_table_prefix("  "), "streamer");
    }
}
