//! Stream Controller - The Orchestration Core
//!
//! The controller owns the run state and the timer, and sequences every tick:
//!
//! ```text
//! resolve provider -> generate -> parse -> persist (best effort) -> broadcast
//! ```
//!
//! Any failure before the broadcast becomes an `error` message instead; a
//! tick never fails past the controller and never cancels the timer.
//!
//! # Concurrency
//!
//! - Ticks never overlap: each one holds the tick gate for its whole run and
//!   the timer task awaits a tick before waiting for the next interval.
//! - Run state, timer handle and config sit behind `parking_lot` locks that
//!   are never held across an `.await`.
//! - Stopping signals the timer task, which only listens while it is idle,
//!   so a tick already in flight completes (persist and broadcast included).
//! - `stop` and `configure` never wait on a tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::backend::GenerationBackend;
use crate::broadcast::BroadcastHub;
use crate::config_store::{validate_interval, ConfigStore, StreamConfig, StreamConfigUpdate};
use crate::error::{StreamError, StreamResult};
use crate::factory::{EventFactory, PayloadError};
use crate::messages::{StatusSnapshot, StreamMessage};
use crate::persistence::PersistenceGateway;
use crate::record::{EventRecord, StoredEvent};
use crate::resolver::{ProviderEnvironment, ProviderResolver, ProviderSummary};
use crate::settings::{
    AppConfig, AppConfigUpdate, ProviderSettings, ProviderSettingsUpdate, SettingsUpdate,
    VARIATION_LIMIT_KEY,
};
use crate::store::{EventStore, SettingsStore};

/// Whether the timer is running
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// No timer
    Stopped,
    /// Timer scheduled
    Running,
}

/// Result of [`StreamController::start`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartOutcome {
    /// False if the stream was already running
    pub started: bool,
    /// Interval in effect
    pub interval_ms: u64,
}

/// Everything a configure call may change
#[derive(Clone, Debug, Default)]
pub struct ConfigureRequest {
    /// Stream config changes
    pub stream: StreamConfigUpdate,
    /// Provider settings changes
    pub providers: ProviderSettingsUpdate,
    /// App-config changes
    pub app_config: AppConfigUpdate,
}

/// Configuration as reported to API clients
///
/// Credentials are masked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// Tick interval in milliseconds
    pub interval: u64,
    /// Prompt template
    pub template: String,
    /// Variation limit
    pub variation_limit: u32,
    /// Whether the timer is running
    pub is_streaming: bool,
    /// Stored provider settings
    pub provider_settings: ProviderSettings,
    /// Stored app config
    pub app_config: AppConfig,
    /// Resolved provider, if known
    pub provider: Option<ProviderSummary>,
}

struct TimerHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Ask the timer task to exit once it is idle
    fn cancel(mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        tracing::debug!(finished = self.task.is_finished(), "Timer cancelled");
    }
}

struct RunState {
    state: StreamState,
    timer: Option<TimerHandle>,
    /// Bumped on every start/stop so a stale start cannot install a timer
    epoch: u64,
}

struct ControllerInner {
    config: ConfigStore,
    resolver: ProviderResolver,
    backend: Arc<dyn GenerationBackend>,
    persistence: PersistenceGateway,
    settings: Arc<dyn SettingsStore>,
    hub: BroadcastHub,
    run: Mutex<RunState>,
    tick_gate: tokio::sync::Mutex<()>,
    configure_gate: tokio::sync::Mutex<()>,
    ticks: AtomicU64,
}

/// A tick or generate-once failure plus the provider in use, if known
struct Failure {
    error: StreamError,
    provider: Option<ProviderSummary>,
}

impl ControllerInner {
    fn is_running(&self) -> bool {
        self.run.lock().state == StreamState::Running
    }

    fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            is_streaming: self.is_running(),
            interval: self.config.interval_ms(),
            provider: self.resolver.summary(),
        }
    }

    fn publish_status(&self) {
        let result = self.hub.publish_status(self.status());
        tracing::debug!(delivered = result.successful, "Status broadcast");
    }

    /// Resolve, generate and parse one event
    async fn produce(&self) -> Result<(EventRecord, ProviderSummary), Failure> {
        let provider = self
            .resolver
            .resolve(&self.config)
            .await
            .map_err(|e| Failure {
                error: e.into(),
                provider: None,
            })?;
        let summary = provider.summary();

        let request = EventFactory::request(&self.config.stream());
        let raw = self
            .backend
            .generate(&provider, &request)
            .await
            .map_err(|e| Failure {
                error: e.into(),
                provider: Some(summary.clone()),
            })?;

        let record = EventFactory::parse(&raw).map_err(|e| Failure {
            error: e.into(),
            provider: Some(summary.clone()),
        })?;

        Ok((record, summary))
    }

    /// One generate -> persist -> broadcast cycle
    async fn run_tick(&self) {
        let _gate = self.tick_gate.lock().await;
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        match self.produce().await {
            Ok((record, provider)) => {
                self.persistence.write(&record).await;

                if self.hub.status().provider.as_ref() != Some(&provider) {
                    self.hub.set_status(self.status());
                }

                let code = record.code.clone();
                let result = self.hub.publish(StreamMessage::event(record));
                tracing::debug!(
                    tick,
                    provider = %provider,
                    code = %code,
                    delivered = result.successful,
                    dropped = result.failed,
                    "Tick broadcast event"
                );
            }
            Err(Failure { error, provider }) => {
                log_tick_failure(tick, &error, provider.as_ref());
                self.hub
                    .publish(StreamMessage::error(error.to_string(), provider));
            }
        }
    }
}

fn log_tick_failure(tick: u64, error: &StreamError, provider: Option<&ProviderSummary>) {
    let provider = provider.map(|p| p.id.as_str()).unwrap_or("none");
    match error {
        StreamError::Payload(PayloadError::Malformed { reason, excerpt }) => tracing::warn!(
            tick,
            provider,
            reason = %reason,
            excerpt = %excerpt,
            "Backend returned an unparseable payload"
        ),
        StreamError::Payload(e) => {
            tracing::warn!(tick, provider, error = %e, "Backend returned an invalid event")
        }
        StreamError::Backend(e) => tracing::warn!(
            tick,
            provider,
            rate_limited = e.is_rate_limit(),
            unauthorized = e.is_auth(),
            error = %e,
            "Generation call failed"
        ),
        other => tracing::warn!(
            tick,
            provider,
            kind = other.kind(),
            error = %other,
            "Tick failed"
        ),
    }
}

fn spawn_timer(inner: Weak<ControllerInner>, first_due: Instant, period: Duration) -> TimerHandle {
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(first_due, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                // Fires on cancel and when the handle is dropped
                _ = &mut cancel_rx => break,
                _ = ticker.tick() => {}
            }

            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.run_tick().await;
        }

        tracing::debug!(period_ms = period.as_millis() as u64, "Timer task exited");
    });

    TimerHandle {
        cancel: Some(cancel_tx),
        task,
    }
}

/// Builder for [`StreamController`]
pub struct StreamControllerBuilder {
    backend: Arc<dyn GenerationBackend>,
    events: Arc<dyn EventStore>,
    settings: Arc<dyn SettingsStore>,
    env: Option<ProviderEnvironment>,
    config: StreamConfig,
    hub: Option<BroadcastHub>,
}

impl StreamControllerBuilder {
    /// Use this environment instead of the process environment
    #[must_use]
    pub fn environment(mut self, env: ProviderEnvironment) -> Self {
        self.env = Some(env);
        self
    }

    /// Initial stream config
    #[must_use]
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing hub
    #[must_use]
    pub fn hub(mut self, hub: BroadcastHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Build the controller (stopped)
    #[must_use]
    pub fn build(self) -> StreamController {
        let env = self.env.unwrap_or_else(ProviderEnvironment::from_env);
        let hub = self.hub.unwrap_or_default();
        let config = ConfigStore::new(self.config);

        hub.set_status(StatusSnapshot {
            is_streaming: false,
            interval: config.interval_ms(),
            provider: None,
        });

        StreamController {
            inner: Arc::new(ControllerInner {
                resolver: ProviderResolver::new(self.settings.clone(), env),
                config,
                backend: self.backend,
                persistence: PersistenceGateway::new(self.events),
                settings: self.settings,
                hub,
                run: Mutex::new(RunState {
                    state: StreamState::Stopped,
                    timer: None,
                    epoch: 0,
                }),
                tick_gate: tokio::sync::Mutex::new(()),
                configure_gate: tokio::sync::Mutex::new(()),
                ticks: AtomicU64::new(0),
            }),
        }
    }
}

/// The stream controller
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct StreamController {
    inner: Arc<ControllerInner>,
}

impl StreamController {
    /// Start building a controller
    pub fn builder(
        backend: Arc<dyn GenerationBackend>,
        events: Arc<dyn EventStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> StreamControllerBuilder {
        StreamControllerBuilder {
            backend,
            events,
            settings,
            env: None,
            config: StreamConfig::default(),
            hub: None,
        }
    }

    /// The hub subscribers register with
    #[must_use]
    pub fn hub(&self) -> &BroadcastHub {
        &self.inner.hub
    }

    /// Current run state
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.inner.run.lock().state
    }

    /// Whether the timer is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Current stream config
    #[must_use]
    pub fn stream_config(&self) -> StreamConfig {
        self.inner.config.stream()
    }

    /// Current run state, interval and provider
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        self.inner.status()
    }

    /// Ticks run since creation
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }

    /// Start streaming
    ///
    /// A valid `interval_override` becomes the configured interval. Runs one
    /// tick before returning, then schedules the timer with its first tick
    /// one interval after the call.
    pub async fn start(&self, interval_override: Option<i64>) -> StreamResult<StartOutcome> {
        let override_ms = interval_override.map(validate_interval).transpose()?;

        let epoch = {
            let mut run = self.inner.run.lock();
            if run.state == StreamState::Running {
                return Ok(StartOutcome {
                    started: false,
                    interval_ms: self.inner.config.interval_ms(),
                });
            }
            if let Some(ms) = override_ms {
                self.inner.config.set_interval_ms(ms);
            }
            run.state = StreamState::Running;
            run.epoch += 1;
            run.epoch
        };

        let interval = self.inner.config.stream().interval();
        let first_due = Instant::now() + interval;

        // Best effort so the status carries the provider; the tick reports failures
        if let Err(e) = self.inner.resolver.resolve(&self.inner.config).await {
            tracing::debug!(error = %e, "No provider before first tick");
        }

        tracing::info!(interval_ms = interval.as_millis() as u64, "Stream started");
        self.inner.publish_status();

        self.inner.run_tick().await;

        {
            let mut run = self.inner.run.lock();
            if run.state == StreamState::Running && run.epoch == epoch && run.timer.is_none() {
                run.timer = Some(spawn_timer(
                    Arc::downgrade(&self.inner),
                    first_due,
                    interval,
                ));
            }
        }

        Ok(StartOutcome {
            started: true,
            interval_ms: interval.as_millis() as u64,
        })
    }

    /// Stop streaming
    ///
    /// Returns false if already stopped. A tick in flight still completes.
    pub fn stop(&self) -> bool {
        let timer = {
            let mut run = self.inner.run.lock();
            if run.state == StreamState::Stopped {
                return false;
            }
            run.state = StreamState::Stopped;
            run.epoch += 1;
            run.timer.take()
        };

        if let Some(timer) = timer {
            timer.cancel();
        }

        tracing::info!(ticks = self.tick_count(), "Stream stopped");
        self.inner.publish_status();
        true
    }

    /// Replace the running timer so the next tick is one `period` from now
    fn reschedule(&self, period: Duration) {
        let mut run = self.inner.run.lock();
        if run.state != StreamState::Running {
            return;
        }
        if let Some(old) = run.timer.take() {
            old.cancel();
        }
        run.timer = Some(spawn_timer(
            Arc::downgrade(&self.inner),
            Instant::now() + period,
            period,
        ));
        tracing::info!(
            interval_ms = period.as_millis() as u64,
            "Timer rescheduled"
        );
    }

    /// Apply a configuration change
    ///
    /// All input is validated before anything is persisted; provider and
    /// app-config changes are persisted atomically before in-memory fields
    /// change. On success the provider is re-resolved and a status message
    /// is broadcast. A failed configure changes and broadcasts nothing.
    pub async fn configure(&self, request: ConfigureRequest) -> StreamResult<ConfigSnapshot> {
        let _gate = self.inner.configure_gate.lock().await;
        let inner = &self.inner;

        let mut next = inner.config.validated(&request.stream)?;

        let mut app_update = request.app_config;
        match (&request.stream.variation_limit, app_update.get(VARIATION_LIMIT_KEY)) {
            (Some(_), _) => {
                app_update.insert(
                    VARIATION_LIMIT_KEY.to_string(),
                    Some(next.variation_limit.to_string()),
                );
            }
            (None, Some(Some(raw))) => {
                next.variation_limit = crate::config_store::normalize_variation_limit(raw);
            }
            _ => {}
        }

        let update = SettingsUpdate {
            providers: request.providers.without_masked_credentials(),
            app_config: app_update,
        };

        let (settings, app_config) = if update.is_empty() {
            (
                inner.settings.provider_settings().await?,
                inner.settings.app_config().await?,
            )
        } else {
            let current = inner.settings.provider_settings().await?;
            validate_provider_update(&current, &update.providers)?;
            inner.settings.apply(&update).await?
        };

        inner.config.set_app_config(app_config);
        let previous = inner.config.replace(next.clone());

        if previous.interval_ms != next.interval_ms {
            self.reschedule(next.interval());
        }

        inner.resolver.invalidate();
        if let Err(e) = inner.resolver.resolve(&inner.config).await {
            tracing::warn!(error = %e, "Provider unresolved after configure");
        }

        tracing::info!(
            interval_ms = next.interval_ms,
            variation_limit = inner.config.stream().variation_limit,
            providers = settings.providers.len(),
            "Configuration updated"
        );
        inner.publish_status();

        Ok(self.snapshot_from(settings, inner.config.app_config()))
    }

    fn snapshot_from(&self, settings: ProviderSettings, app_config: AppConfig) -> ConfigSnapshot {
        let stream = self.inner.config.stream();
        ConfigSnapshot {
            interval: stream.interval_ms,
            template: stream.prompt_template,
            variation_limit: stream.variation_limit,
            is_streaming: self.is_running(),
            provider_settings: settings.masked(),
            app_config,
            provider: self.inner.resolver.summary(),
        }
    }

    /// Current configuration with masked credentials
    pub async fn snapshot(&self) -> StreamResult<ConfigSnapshot> {
        let settings = self.inner.settings.provider_settings().await?;
        let app_config = self.inner.settings.app_config().await?;
        Ok(self.snapshot_from(settings, app_config))
    }

    /// Generate and persist one event outside the timer
    ///
    /// Does not touch run state or broadcast anything; failures are
    /// returned to the caller.
    pub async fn generate_once(&self) -> StreamResult<EventRecord> {
        let (record, provider) = self.inner.produce().await.map_err(|f| f.error)?;
        self.inner.persistence.write(&record).await;
        tracing::info!(provider = %provider, code = %record.code, "Generated one event");
        Ok(record)
    }

    /// Delete every stored event
    pub async fn purge_events(&self) -> StreamResult<u64> {
        Ok(self.inner.persistence.purge().await?)
    }

    /// Most recent stored events, newest first
    pub async fn recent_events(&self, limit: usize) -> StreamResult<Vec<StoredEvent>> {
        Ok(self.inner.persistence.recent(limit).await?)
    }

    /// Stored events whose write failed since start
    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.inner.persistence.failed_writes()
    }
}

/// Reject provider updates the store would refuse, before anything is written
fn validate_provider_update(
    current: &ProviderSettings,
    update: &ProviderSettingsUpdate,
) -> StreamResult<()> {
    for id in update.providers.keys() {
        if id.trim().is_empty() {
            return Err(StreamError::validation("provider id must not be empty"));
        }
    }

    let merged = current.merged(update);
    if let Some(active) = &merged.active_provider_id {
        if !merged.providers.contains_key(active) {
            return Err(StreamError::validation(format!(
                "active provider '{active}' is not configured"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, GenerationRequest};
    use crate::record::sample_record;
    use crate::resolver::ResolvedProvider;
    use crate::settings::{ProviderConfig, ProviderKind};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    // Mock backend for testing
    struct MockBackend;

    #[async_trait]
    impl GenerationBackend for MockBackend {
        fn name(&self) -> &str {
            "Mock"
        }

        async fn generate(
            &self,
            _provider: &ResolvedProvider,
            _request: &GenerationRequest,
        ) -> Result<String, BackendError> {
            Ok(serde_json::to_string(&sample_record()).unwrap_or_default())
        }
    }

    fn ollama_store() -> Arc<MemoryStore> {
        let mut settings = ProviderSettings::default();
        settings.providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                kind: Some(ProviderKind::Ollama),
                ..Default::default()
            },
        );
        settings.active_provider_id = Some("ollama".to_string());
        Arc::new(MemoryStore::new().with_settings(settings, AppConfig::new()))
    }

    fn controller(store: Arc<MemoryStore>) -> StreamController {
        StreamController::builder(Arc::new(MockBackend), store.clone(), store)
            .environment(ProviderEnvironment::new())
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let controller = controller(ollama_store());
        assert_eq!(controller.state(), StreamState::Stopped);
        assert!(!controller.stop());

        let outcome = controller.start(None).await.unwrap();
        assert!(outcome.started);
        assert_eq!(outcome.interval_ms, 3000);
        assert_eq!(controller.tick_count(), 1);

        let again = controller.start(Some(1000)).await.unwrap();
        assert!(!again.started);
        assert_eq!(again.interval_ms, 3000);

        assert!(controller.stop());
        assert!(!controller.stop());
    }

    #[tokio::test]
    async fn test_start_rejects_bad_interval() {
        let controller = controller(ollama_store());
        let err = controller.start(Some(500)).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(controller.state(), StreamState::Stopped);
        assert_eq!(controller.tick_count(), 0);
    }

    #[tokio::test]
    async fn test_configure_rejects_unknown_active_provider() {
        let store = ollama_store();
        let controller = controller(store.clone());

        let request = ConfigureRequest {
            stream: StreamConfigUpdate {
                interval_ms: Some(2000),
                ..Default::default()
            },
            providers: ProviderSettingsUpdate {
                active_provider_id: Some("missing".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = controller.configure(request).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(controller.stream_config().interval_ms, 3000);
        assert_eq!(
            store.provider_settings().await.unwrap().active_provider_id.as_deref(),
            Some("ollama")
        );
    }

    #[tokio::test]
    async fn test_configure_masks_credentials_and_resolves() {
        let store = ollama_store();
        let controller = controller(store);

        let mut providers = ProviderSettingsUpdate {
            active_provider_id: Some("openai".to_string()),
            ..Default::default()
        };
        providers.providers.insert(
            "openai".to_string(),
            ProviderConfig {
                credential: Some("sk-abcdefghijklmnop".to_string()),
                ..Default::default()
            },
        );

        let snapshot = controller
            .configure(ConfigureRequest {
                providers,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            snapshot.provider_settings.providers["openai"].credential.as_deref(),
            Some("****mnop")
        );
        assert_eq!(snapshot.provider.map(|p| p.id), Some("openai".to_string()));
        assert_eq!(
            snapshot.app_config.get("ACTIVE_PROVIDER").map(String::as_str),
            Some("openai")
        );
    }

    #[tokio::test]
    async fn test_masked_settings_round_trip_keeps_credential() {
        let store = ollama_store();
        let controller = controller(store.clone());

        let mut providers = ProviderSettingsUpdate::default();
        providers.providers.insert(
            "openai".to_string(),
            ProviderConfig {
                kind: Some(ProviderKind::OpenAi),
                credential: Some("sk-real-secret-key-1234".to_string()),
                ..Default::default()
            },
        );
        controller
            .configure(ConfigureRequest {
                providers,
                ..Default::default()
            })
            .await
            .unwrap();

        // A client edits the model and posts the masked settings back
        let snapshot = controller.snapshot().await.unwrap();
        let json = serde_json::to_value(&snapshot.provider_settings).unwrap();
        let mut echoed: ProviderSettingsUpdate = serde_json::from_value(json).unwrap();
        assert_eq!(
            echoed.providers["openai"].credential.as_deref(),
            Some("****1234")
        );
        if let Some(cfg) = echoed.providers.get_mut("openai") {
            cfg.model_name = Some("gpt-4.1-mini".to_string());
        }
        controller
            .configure(ConfigureRequest {
                providers: echoed,
                ..Default::default()
            })
            .await
            .unwrap();

        let stored = store.provider_settings().await.unwrap();
        let openai = &stored.providers["openai"];
        assert_eq!(openai.credential.as_deref(), Some("sk-real-secret-key-1234"));
        assert_eq!(openai.model_name.as_deref(), Some("gpt-4.1-mini"));
    }

    #[tokio::test]
    async fn test_rejected_configure_broadcasts_nothing() {
        let controller = controller(ollama_store());
        let (handle, mut rx) = crate::broadcast::SubscriberHandle::channel(8);
        controller.hub().register(handle);
        let _greeting = rx.try_recv().unwrap();

        let request = ConfigureRequest {
            stream: StreamConfigUpdate {
                interval_ms: Some(500),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(controller.configure(request).await.is_err());

        let request = ConfigureRequest {
            providers: ProviderSettingsUpdate {
                active_provider_id: Some("missing".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(controller.configure(request).await.is_err());

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_accepted_configure_broadcasts_one_status() {
        let controller = controller(ollama_store());
        let (handle, mut rx) = crate::broadcast::SubscriberHandle::channel(8);
        controller.hub().register(handle);
        let _greeting = rx.try_recv().unwrap();

        let request = ConfigureRequest {
            stream: StreamConfigUpdate {
                interval_ms: Some(5000),
                ..Default::default()
            },
            ..Default::default()
        };
        controller.configure(request).await.unwrap();

        match rx.try_recv().unwrap() {
            StreamMessage::Status {
                is_streaming,
                interval,
                provider,
            } => {
                assert!(!is_streaming);
                assert_eq!(interval, 5000);
                assert_eq!(provider.map(|p| p.id), Some("ollama".to_string()));
            }
            other => panic!("expected status, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_generate_once_does_not_broadcast() {
        let store = ollama_store();
        let controller = controller(store.clone());
        let (handle, mut rx) = crate::broadcast::SubscriberHandle::channel(8);
        controller.hub().register(handle);
        let _greeting = rx.try_recv().unwrap();

        let record = controller.generate_once().await.unwrap();
        assert_eq!(record.code, "PAY-4021");
        assert!(rx.try_recv().is_err());
        assert_eq!(store.event_count(), 1);
        assert_eq!(controller.state(), StreamState::Stopped);
    }
}
