//! REST handlers
//!
//! Thin wrappers over [`StreamController`] operations. Request bodies are
//! parsed leniently (an empty body is an empty request, numbers may arrive as
//! strings) and every failure maps to a JSON error body: 400 for validation
//! problems, 500 for everything else.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use streamer_core::{
    AppConfigUpdate, ConfigSnapshot, ConfigureRequest, EventRecord, ProviderSettingsUpdate,
    StatusSnapshot, StoredEvent, StreamConfigUpdate, StreamError, StreamController,
};

use crate::server::{AppState, ConnectionStats};

/// Events returned by `GET /api/events` when no limit is given
pub const DEFAULT_EVENTS_LIMIT: usize = 50;

/// Errors surfaced to REST clients
#[derive(Debug, Error)]
pub enum ApiError {
    /// The body was not valid JSON for this endpoint
    #[error("invalid request body: {0}")]
    BadBody(String),

    /// A controller operation failed
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadBody(_) => StatusCode::BAD_REQUEST,
            Self::Stream(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            Self::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::BadBody(_) => "bad_request",
            Self::Stream(e) => e.kind(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(kind = self.kind(), error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                success: false,
                error: self.kind(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Handler result
pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Parse a JSON body, treating an empty body as the default request
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadBody(e.to_string()))
}

/// Integer that may arrive as a JSON number or a numeric string
fn integer_field(name: &str, value: &Value) -> Result<i64, StreamError> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| StreamError::validation(format!("{name} must be an integer")))
}

/// Scalar rendered as text; `null` means absent
fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// `POST /api/stream/start` body
#[derive(Debug, Default, Deserialize)]
pub struct StartBody {
    #[serde(default)]
    interval: Option<Value>,
}

/// `POST /api/stream/start` response
#[derive(Debug, Serialize)]
pub struct StartResponse {
    success: bool,
    message: String,
    interval: u64,
}

/// `POST /api/stream/stop` response
#[derive(Debug, Serialize)]
pub struct StopResponse {
    success: bool,
    message: String,
}

/// `POST|PUT /api/config` body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureBody {
    #[serde(default, alias = "intervalMs")]
    interval: Option<Value>,
    #[serde(default, alias = "promptTemplate")]
    template: Option<String>,
    #[serde(default)]
    variation_limit: Option<Value>,
    #[serde(default)]
    provider_settings: Option<ProviderSettingsUpdate>,
    #[serde(default)]
    app_config: Option<BTreeMap<String, Value>>,
}

impl ConfigureBody {
    fn into_request(self) -> Result<ConfigureRequest, StreamError> {
        let interval_ms = self
            .interval
            .as_ref()
            .filter(|v| !v.is_null())
            .map(|v| integer_field("interval", v))
            .transpose()?;

        let app_config: AppConfigUpdate = self
            .app_config
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, text_field(&value)))
            .collect();

        Ok(ConfigureRequest {
            stream: StreamConfigUpdate {
                interval_ms,
                prompt_template: self.template,
                variation_limit: self.variation_limit.as_ref().and_then(text_field),
            },
            providers: self.provider_settings.unwrap_or_default(),
            app_config,
        })
    }
}

/// `POST /api/generate` response
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    event: EventRecord,
}

/// `DELETE /api/events` response
#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    success: bool,
    deleted: u64,
}

/// `GET /api/events` query
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    limit: Option<usize>,
}

/// `GET /api/events` response
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    events: Vec<StoredEvent>,
}

/// `GET /api/status` response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    status: StatusSnapshot,
    subscribers: usize,
    connections: Vec<ConnectionStats>,
    ticks: u64,
    failed_writes: u64,
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /api/stream/start`
pub async fn start_stream(State(state): State<AppState>, body: Bytes) -> ApiResult<StartResponse> {
    let body: StartBody = parse_body(&body)?;
    let interval = body
        .interval
        .as_ref()
        .filter(|v| !v.is_null())
        .map(|v| integer_field("interval", v))
        .transpose()?;

    let outcome = state.controller.start(interval).await?;
    let message = if outcome.started {
        "Stream started"
    } else {
        "Stream already running"
    };
    Ok(Json(StartResponse {
        success: outcome.started,
        message: message.to_string(),
        interval: outcome.interval_ms,
    }))
}

/// `POST /api/stream/stop`
pub async fn stop_stream(State(state): State<AppState>) -> Json<StopResponse> {
    let stopped = state.controller.stop();
    let message = if stopped {
        "Stream stopped"
    } else {
        "Stream not running"
    };
    Json(StopResponse {
        success: stopped,
        message: message.to_string(),
    })
}

/// `GET /api/config`
pub async fn get_config(State(state): State<AppState>) -> ApiResult<ConfigSnapshot> {
    Ok(Json(state.controller.snapshot().await?))
}

/// `POST|PUT /api/config`
pub async fn update_config(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<ConfigSnapshot> {
    let body: ConfigureBody = parse_body(&body)?;
    let request = body.into_request()?;
    Ok(Json(state.controller.configure(request).await?))
}

/// `POST /api/generate`
pub async fn generate(State(state): State<AppState>) -> ApiResult<GenerateResponse> {
    let event = state.controller.generate_once().await?;
    Ok(Json(GenerateResponse { event }))
}

/// `DELETE /api/events`
pub async fn purge_events(State(state): State<AppState>) -> ApiResult<PurgeResponse> {
    let deleted = state.controller.purge_events().await?;
    info!(deleted, "Events purged");
    Ok(Json(PurgeResponse {
        success: true,
        deleted,
    }))
}

/// `GET /api/events?limit=N`
pub async fn recent_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<EventsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENTS_LIMIT);
    let events = state.controller.recent_events(limit).await?;
    Ok(Json(EventsResponse { events }))
}

/// `GET /api/status`
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let controller: &StreamController = &state.controller;
    Json(StatusResponse {
        status: controller.status(),
        subscribers: controller.hub().count(),
        connections: state.connection_stats(),
        ticks: controller.tick_count(),
        failed_writes: controller.failed_writes(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use streamer_core::{
        AppConfig, BackendError, GenerationBackend, GenerationRequest, MemoryStore,
        ProviderConfig, ProviderEnvironment, ProviderKind, ProviderSettings, ResolvedProvider,
    };

    const EVENT_JSON: &str = r#"{
        "timestamp": "2024-05-01T12:00:00Z",
        "code": "DB-5003",
        "category": "DATABASE",
        "location": "orders/repository.rs:212",
        "service": "order-service",
        "correlationId": "6f1c2a4e-8b3d-4c5e-9a7f-1b2c3d4e5f60",
        "orderId": "0a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d",
        "message": "Connection pool exhausted",
        "stackTrace": "PoolTimeout\n  at acquire (pool.rs:40)"
    }"#;

    struct CannedBackend;

    #[async_trait]
    impl GenerationBackend for CannedBackend {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(
            &self,
            _provider: &ResolvedProvider,
            _request: &GenerationRequest,
        ) -> Result<String, BackendError> {
            Ok(EVENT_JSON.to_string())
        }
    }

    pub(crate) fn test_state() -> AppState {
        let mut settings = ProviderSettings::default();
        settings.providers.insert(
            "local".to_string(),
            ProviderConfig {
                kind: Some(ProviderKind::Ollama),
                ..Default::default()
            },
        );
        settings.active_provider_id = Some("local".to_string());
        let store = Arc::new(MemoryStore::new().with_settings(settings, AppConfig::new()));

        let controller = StreamController::builder(Arc::new(CannedBackend), store.clone(), store)
            .environment(ProviderEnvironment::new())
            .build();
        AppState::new(controller, 16)
    }

    fn body(json: &str) -> Bytes {
        Bytes::from(json.to_string())
    }

    #[test]
    fn test_parse_body_empty_is_default() {
        let parsed: StartBody = parse_body(&Bytes::new()).unwrap();
        assert!(parsed.interval.is_none());

        let err = parse_body::<StartBody>(&body("{not json")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_integer_field_accepts_numeric_strings() {
        assert_eq!(integer_field("interval", &serde_json::json!(2000)).unwrap(), 2000);
        assert_eq!(integer_field("interval", &serde_json::json!("1500")).unwrap(), 1500);
        assert_eq!(integer_field("interval", &serde_json::json!(2000.0)).unwrap(), 2000);
        assert!(integer_field("interval", &serde_json::json!("fast"))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_configure_body_conversion() {
        let parsed: ConfigureBody = parse_body(&body(
            r#"{"interval": "2500", "variationLimit": 4, "appConfig": {"THEME": "dark", "OLD": null}}"#,
        ))
        .unwrap();
        let request = parsed.into_request().unwrap();

        assert_eq!(request.stream.interval_ms, Some(2500));
        assert_eq!(request.stream.variation_limit.as_deref(), Some("4"));
        assert_eq!(request.app_config.get("THEME"), Some(&Some("dark".to_string())));
        assert_eq!(request.app_config.get("OLD"), Some(&None));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            ApiError::from(StreamError::validation("bad")).status_code(),
            StatusCode::BAD_REQUEST
        );
        let store = StreamError::Store(streamer_core::StoreError::Unavailable("down".into()));
        assert_eq!(
            ApiError::from(store).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_start_rejects_out_of_range_interval() {
        let state = test_state();
        let err = start_stream(State(state.clone()), body(r#"{"interval": 500}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!state.controller.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_then_stop_twice() {
        let state = test_state();

        let first = start_stream(State(state.clone()), body(r#"{"interval": 2000}"#))
            .await
            .unwrap();
        assert!(first.0.success);
        assert_eq!(first.0.interval, 2000);

        let second = start_stream(State(state.clone()), Bytes::new()).await.unwrap();
        assert!(!second.0.success);
        assert_eq!(second.0.message, "Stream already running");

        assert!(stop_stream(State(state.clone())).await.0.success);
        assert!(!stop_stream(State(state)).await.0.success);
    }

    #[tokio::test]
    async fn test_update_config_returns_snapshot() {
        let state = test_state();
        let snapshot = update_config(
            State(state.clone()),
            body(r#"{"interval": 4000, "variationLimit": "15"}"#),
        )
        .await
        .unwrap()
        .0;

        assert_eq!(snapshot.interval, 4000);
        assert_eq!(snapshot.variation_limit, 10);
        assert_eq!(snapshot.provider.map(|p| p.id), Some("local".to_string()));

        let err = update_config(State(state), body(r#"{"interval": 20000}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_then_list_and_purge() {
        let state = test_state();

        let generated = generate(State(state.clone())).await.unwrap().0;
        assert_eq!(generated.event.code, "DB-5003");

        let listed = recent_events(State(state.clone()), Query(EventsQuery::default()))
            .await
            .unwrap()
            .0;
        assert_eq!(listed.events.len(), 1);

        let purged = purge_events(State(state)).await.unwrap().0;
        assert!(purged.success);
        assert_eq!(purged.deleted, 1);
    }

    #[tokio::test]
    async fn test_status_reports_stopped() {
        let state = test_state();
        let response = status(State(state)).await.0;
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["isStreaming"], false);
        assert_eq!(json["interval"], 3000);
        assert_eq!(json["subscribers"], 0);
    }

    #[tokio::test]
    async fn test_health() {
        assert_eq!(health().await.0, serde_json::json!({ "status": "ok" }));
    }
}
