//! HTTP Generation Client
//!
//! One reqwest client that speaks each provider's dialect:
//!
//! - `openai` / `openai-compatible`: chat completions (`choices[0].message.content`)
//! - `anthropic`: messages API (`content[].text`)
//! - `gemini`: `{model}:generateContent` (`candidates[0].content.parts[].text`)
//! - `ollama`: `/api/generate` with `stream: false` (`response`)
//!
//! Non-success statuses become typed [`BackendError`]s so rate limiting and
//! rejected credentials stay distinguishable in logs and error broadcasts.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde_json::{json, Value};

use super::error::BackendError;
use super::traits::{GenerationBackend, GenerationRequest};
use crate::resolver::ResolvedProvider;
use crate::settings::ProviderKind;

/// Transport timeout for a single generation call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Longest provider error body kept in an error message
const MAX_ERROR_BODY: usize = 512;

/// HTTP generation client
#[derive(Clone)]
pub struct HttpGenerationClient {
    http_client: reqwest::Client,
}

impl HttpGenerationClient {
    /// Create a client with the default transport timeout
    pub fn new() -> Result<Self, BackendError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom transport timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }

    /// Wrap an existing reqwest client
    #[must_use]
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    fn request_builder(&self, provider: &ResolvedProvider) -> reqwest::RequestBuilder {
        let url = request_url(provider);
        let builder = self.http_client.post(url);
        let credential = provider.credential.as_deref();

        match (provider.kind, credential) {
            (ProviderKind::OpenAi | ProviderKind::OpenAiCompatible, Some(key)) => {
                builder.bearer_auth(key)
            }
            (ProviderKind::Anthropic, Some(key)) => builder
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            (ProviderKind::Anthropic, None) => {
                builder.header("anthropic-version", ANTHROPIC_VERSION)
            }
            (ProviderKind::Gemini, Some(key)) => builder.header("x-goog-api-key", key),
            _ => builder,
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(
        &self,
        provider: &ResolvedProvider,
        request: &GenerationRequest,
    ) -> Result<String, BackendError> {
        let start = Instant::now();
        let body = build_body(provider.kind, &provider.model, request);

        let response = self.request_builder(provider).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            let err = BackendError::from_status(status.as_u16(), truncate(&body), retry_after);
            tracing::warn!(
                provider = %provider.id,
                status = status.as_u16(),
                error = %err,
                "Generation call failed"
            );
            return Err(err);
        }

        let body = response.bytes().await?;
        let data = parse_envelope(&body)?;
        let text = extract_text(provider.kind, &data)?;

        tracing::debug!(
            provider = %provider.id,
            model = %provider.model,
            duration_ms = start.elapsed().as_millis() as u64,
            bytes = text.len(),
            "Generation call completed"
        );
        Ok(text)
    }
}

/// Full request URL for a provider
///
/// Gemini endpoints are a model collection; the model and method are
/// appended unless the configured URL already names a method.
#[must_use]
pub fn request_url(provider: &ResolvedProvider) -> String {
    match provider.kind {
        ProviderKind::Gemini if !provider.endpoint.contains(":generateContent") => {
            format!(
                "{}/{}:generateContent",
                provider.endpoint.trim_end_matches('/'),
                provider.model
            )
        }
        _ => provider.endpoint.clone(),
    }
}

/// Build the JSON body for a provider kind
#[must_use]
pub fn build_body(kind: ProviderKind, model: &str, request: &GenerationRequest) -> Value {
    match kind {
        ProviderKind::OpenAi | ProviderKind::OpenAiCompatible => {
            let mut messages = Vec::new();
            if let Some(system) = &request.system {
                messages.push(json!({"role": "system", "content": system}));
            }
            messages.push(json!({"role": "user", "content": request.prompt}));

            let mut body = json!({
                "model": model,
                "messages": messages,
                "temperature": request.temperature,
            });
            if request.max_tokens > 0 {
                body["max_tokens"] = json!(request.max_tokens);
            }
            body
        }
        ProviderKind::Anthropic => {
            let mut body = json!({
                "model": model,
                "max_tokens": if request.max_tokens > 0 { request.max_tokens } else { 1024 },
                "temperature": request.temperature.min(1.0),
                "messages": [{"role": "user", "content": request.prompt}],
            });
            if let Some(system) = &request.system {
                body["system"] = json!(system);
            }
            body
        }
        ProviderKind::Gemini => {
            let mut generation_config = json!({"temperature": request.temperature});
            if request.max_tokens > 0 {
                generation_config["maxOutputTokens"] = json!(request.max_tokens);
            }
            let mut body = json!({
                "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
                "generationConfig": generation_config,
            });
            if let Some(system) = &request.system {
                body["systemInstruction"] = json!({"parts": [{"text": system}]});
            }
            body
        }
        ProviderKind::Ollama => {
            let mut options = json!({"temperature": request.temperature});
            if request.max_tokens > 0 {
                options["num_predict"] = json!(request.max_tokens);
            }
            json!({
                "model": model,
                "prompt": build_prompt(request),
                "stream": false,
                "format": "json",
                "options": options,
            })
        }
    }
}

/// Pull the generated text out of a provider response
pub fn extract_text(kind: ProviderKind, data: &Value) -> Result<String, BackendError> {
    let text = match kind {
        ProviderKind::OpenAi | ProviderKind::OpenAiCompatible => data
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(String::from),
        ProviderKind::Anthropic => join_text_parts(data.get("content"), |block| {
            (block.get("type").and_then(Value::as_str) == Some("text"))
                .then(|| block.get("text").and_then(Value::as_str))
                .flatten()
        }),
        ProviderKind::Gemini => {
            join_text_parts(data.pointer("/candidates/0/content/parts"), |part| {
                part.get("text").and_then(Value::as_str)
            })
        }
        ProviderKind::Ollama => data
            .get("response")
            .and_then(Value::as_str)
            .map(String::from),
    };

    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(BackendError::InvalidResponse(format!(
            "{kind} response carried no text"
        ))),
    }
}

fn join_text_parts<'a, F>(parts: Option<&'a Value>, pick: F) -> Option<String>
where
    F: Fn(&'a Value) -> Option<&'a str>,
{
    let parts = parts?.as_array()?;
    let joined: String = parts.iter().filter_map(pick).collect();
    (!joined.is_empty()).then_some(joined)
}

/// Ollama's generate endpoint has no system role; prepend it
fn build_prompt(request: &GenerationRequest) -> String {
    match &request.system {
        Some(system) => format!("{system}\n\n{}", request.prompt),
        None => request.prompt.clone(),
    }
}

/// Decode a provider's JSON envelope
fn parse_envelope(body: &[u8]) -> Result<Value, BackendError> {
    serde_json::from_slice(body).map_err(|e| {
        BackendError::InvalidResponse(format!(
            "response body is not JSON ({e}): {}",
            truncate(&String::from_utf8_lossy(body))
        ))
    })
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
