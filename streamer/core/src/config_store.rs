//! Stream configuration
//!
//! [`ConfigStore`] is the single in-memory source of truth for the running
//! stream: tick interval, prompt template and variation limit, plus the last
//! app-config snapshot read from the settings store.
//!
//! Updates go through [`ConfigStore::validated`] first, which computes the
//! next [`StreamConfig`] without touching the current one. Callers persist
//! whatever else the update needs and only then [`ConfigStore::replace`], so
//! a rejected update leaves everything as it was.

use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};
use crate::factory::DEFAULT_PROMPT_TEMPLATE;
use crate::settings::AppConfig;

/// Shortest accepted tick interval
pub const MIN_INTERVAL_MS: u64 = 1_000;

/// Longest accepted tick interval
pub const MAX_INTERVAL_MS: u64 = 10_000;

/// Interval used when nothing else is configured
pub const DEFAULT_INTERVAL_MS: u64 = 3_000;

/// Lower bound of the variation limit
pub const MIN_VARIATION_LIMIT: u32 = 1;

/// Upper bound of the variation limit
pub const MAX_VARIATION_LIMIT: u32 = 10;

/// Variation limit used for missing or unreadable input
pub const DEFAULT_VARIATION_LIMIT: u32 = 10;

/// Streaming configuration read by every tick
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    /// Milliseconds between ticks
    pub interval_ms: u64,
    /// Prompt template sent to the backend
    pub prompt_template: String,
    /// Upper bound of the random variation number in prompts
    pub variation_limit: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            variation_limit: DEFAULT_VARIATION_LIMIT,
        }
    }
}

impl StreamConfig {
    /// Tick interval as a duration
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Partial stream-config update
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamConfigUpdate {
    /// New interval; signed so out-of-range input reaches validation
    pub interval_ms: Option<i64>,
    /// New prompt template
    pub prompt_template: Option<String>,
    /// New variation limit, raw; normalised rather than rejected
    pub variation_limit: Option<String>,
}

impl StreamConfigUpdate {
    /// Whether the update changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interval_ms.is_none()
            && self.prompt_template.is_none()
            && self.variation_limit.is_none()
    }
}

/// Check an interval against the accepted range
pub fn validate_interval(interval_ms: i64) -> StreamResult<u64> {
    u64::try_from(interval_ms)
        .ok()
        .filter(|ms| (MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(ms))
        .ok_or_else(|| {
            StreamError::validation(format!(
                "interval must be between {MIN_INTERVAL_MS} and {MAX_INTERVAL_MS} ms, got {interval_ms}"
            ))
        })
}

/// Normalise raw variation-limit input into `[1, 10]`
///
/// Integers are clamped, decimals are truncated first, anything unreadable
/// falls back to the default.
#[must_use]
pub fn normalize_variation_limit(raw: &str) -> u32 {
    let raw = raw.trim();
    let parsed = raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    });

    match parsed {
        Some(n) => n.clamp(i64::from(MIN_VARIATION_LIMIT), i64::from(MAX_VARIATION_LIMIT)) as u32,
        None => DEFAULT_VARIATION_LIMIT,
    }
}

/// Holder of the live stream config and app-config snapshot
#[derive(Debug, Default)]
pub struct ConfigStore {
    stream: RwLock<StreamConfig>,
    app_config: RwLock<AppConfig>,
}

impl ConfigStore {
    /// Create a store seeded with `config`
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self {
            stream: RwLock::new(config),
            app_config: RwLock::new(AppConfig::new()),
        }
    }

    /// Copy of the current stream config
    #[must_use]
    pub fn stream(&self) -> StreamConfig {
        self.stream.read().clone()
    }

    /// Current tick interval in milliseconds
    #[must_use]
    pub fn interval_ms(&self) -> u64 {
        self.stream.read().interval_ms
    }

    /// Compute the config an update would produce, without applying it
    pub fn validated(&self, update: &StreamConfigUpdate) -> StreamResult<StreamConfig> {
        let mut next = self.stream();

        if let Some(ms) = update.interval_ms {
            next.interval_ms = validate_interval(ms)?;
        }
        if let Some(template) = &update.prompt_template {
            if template.trim().is_empty() {
                return Err(StreamError::validation("prompt template must not be empty"));
            }
            next.prompt_template = template.clone();
        }
        if let Some(raw) = &update.variation_limit {
            next.variation_limit = normalize_variation_limit(raw);
        }

        Ok(next)
    }

    /// Install a new stream config, returning the previous one
    pub fn replace(&self, next: StreamConfig) -> StreamConfig {
        std::mem::replace(&mut *self.stream.write(), next)
    }

    /// Set the interval of an already validated value
    pub fn set_interval_ms(&self, interval_ms: u64) {
        self.stream.write().interval_ms = interval_ms;
    }

    /// Set the variation limit (normalised by the caller)
    pub fn set_variation_limit(&self, limit: u32) {
        self.stream.write().variation_limit =
            limit.clamp(MIN_VARIATION_LIMIT, MAX_VARIATION_LIMIT);
    }

    /// Last app-config snapshot
    #[must_use]
    pub fn app_config(&self) -> AppConfig {
        self.app_config.read().clone()
    }

    /// Replace the app-config snapshot
    pub fn set_app_config(&self, app_config: AppConfig) {
        *self.app_config.write() = app_config;
    }

    /// Record one app-config value in the snapshot
    pub fn set_app_value(&self, key: &str, value: &str) {
        self.app_config
            .write()
            .insert(key.to_string(), value.to_string());
    }
}
