//! Event Factory
//!
//! Both ends of the backend format contract: the prompt that asks for one
//! JSON event, and the parser that turns the raw answer back into an
//! [`EventRecord`].

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use thiserror::Error;

use crate::backend::GenerationRequest;
use crate::config_store::StreamConfig;
use crate::record::{ErrorCategory, EventRecord};

/// Prompt template used until one is configured
///
/// Placeholders: `{{variation}}`, `{{categories}}`, `{{timestamp}}`.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Generate one realistic application error event \
from an e-commerce platform. Choose the category from: {{categories}}. \
This is variation #{{variation}}; make it clearly different from the previous ones \
(different service, code and failure mode). Use {{timestamp}} as the timestamp.";

/// System prompt carrying the output format contract
pub const SYSTEM_PROMPT: &str = "You produce synthetic monitoring data. \
Respond with exactly one JSON object and nothing else: no prose, no Markdown. \
The object has these fields: \
\"timestamp\" (RFC 3339, UTC), \
\"code\" (short error code such as \"PAY-4021\"), \
\"category\" (one of PAYMENT, INVENTORY, AUTHENTICATION, DATABASE, NETWORK, VALIDATION, SHIPPING, INTEGRATION), \
\"location\" (source file and line), \
\"service\" (service name), \
\"correlationId\" (random UUID v4), \
\"orderId\" (random UUID v4), \
\"message\" (one sentence), \
\"stackTrace\" (a plausible multi-line stack trace).";

/// Longest raw-payload excerpt kept in errors and logs
const EXCERPT_LEN: usize = 200;

/// The backend answered with something that is not an event
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Nothing left after stripping
    #[error("invalid payload from backend: empty response")]
    Empty,

    /// Not a JSON event object
    #[error("invalid payload from backend: {reason}")]
    Malformed {
        /// Parser message
        reason: String,
        /// Start of the raw payload
        excerpt: String,
    },

    /// Identifiers parsed but are not version 4 UUIDs
    #[error("invalid payload from backend: {} must be UUID v4", .fields.join(", "))]
    InvalidIdentifier {
        /// Offending field names
        fields: Vec<&'static str>,
    },
}

/// Strip surrounding whitespace and one Markdown code fence
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (e.g. `json`) on the opening line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

fn excerpt(raw: &str) -> String {
    match raw.char_indices().nth(EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}

/// Prompt rendering and payload parsing
#[derive(Clone, Copy, Debug, Default)]
pub struct EventFactory;

impl EventFactory {
    /// Parse a raw backend payload into an event
    pub fn parse(raw: &str) -> Result<EventRecord, PayloadError> {
        let body = strip_code_fence(raw);
        if body.is_empty() {
            return Err(PayloadError::Empty);
        }

        let record: EventRecord =
            serde_json::from_str(body).map_err(|e| PayloadError::Malformed {
                reason: e.to_string(),
                excerpt: excerpt(body),
            })?;

        let fields = record.non_v4_identifiers();
        if !fields.is_empty() {
            return Err(PayloadError::InvalidIdentifier { fields });
        }

        Ok(record)
    }

    /// Render a template with a random variation number
    pub fn render_prompt<R: Rng + ?Sized>(
        template: &str,
        variation_limit: u32,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> String {
        let variation = rng.gen_range(1..=variation_limit.max(1));
        let categories = ErrorCategory::ALL
            .iter()
            .map(ErrorCategory::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        template
            .replace("{{variation}}", &variation.to_string())
            .replace("{{categories}}", &categories)
            .replace(
                "{{timestamp}}",
                &now.to_rfc3339_opts(SecondsFormat::Millis, true),
            )
    }

    /// Build the generation request for the current config
    #[must_use]
    pub fn request(config: &StreamConfig) -> GenerationRequest {
        let prompt = Self::render_prompt(
            &config.prompt_template,
            config.variation_limit,
            Utc::now(),
            &mut rand::thread_rng(),
        );
        GenerationRequest::new(prompt).with_system(SYSTEM_PROMPT)
    }
}
