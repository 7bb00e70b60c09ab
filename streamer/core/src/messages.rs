//! Stream Messages
//!
//! Everything the core pushes to subscribers. Subscribers are pure
//! renderers: they get an event, a status change, or an error, and never
//! need to ask the core anything to make sense of it.
//!
//! Wire format (JSON, tagged by `type`):
//!
//! ```json
//! {"type":"event","data":{...},"timestamp":"2024-05-01T12:00:00Z"}
//! {"type":"status","isStreaming":true,"interval":3000,"provider":{"id":"openai","kind":"openai","model":"gpt-4o-mini"}}
//! {"type":"error","message":"no provider configured"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::EventRecord;
use crate::resolver::ProviderSummary;

/// Messages from the core to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    /// A freshly generated event
    Event {
        /// The event
        data: EventRecord,
        /// When the core broadcast it
        timestamp: DateTime<Utc>,
    },

    /// Current run state
    Status {
        /// Whether the timer is running
        #[serde(rename = "isStreaming")]
        is_streaming: bool,
        /// Tick interval in milliseconds
        interval: u64,
        /// Resolved provider, if known
        provider: Option<ProviderSummary>,
    },

    /// A tick failed
    Error {
        /// Failure text
        message: String,
        /// Provider in use, if known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<ProviderSummary>,
    },
}

impl StreamMessage {
    /// Wrap an event stamped now
    #[must_use]
    pub fn event(data: EventRecord) -> Self {
        Self::Event {
            data,
            timestamp: Utc::now(),
        }
    }

    /// Build an error notification
    pub fn error(message: impl Into<String>, provider: Option<ProviderSummary>) -> Self {
        Self::Error {
            message: message.into(),
            provider,
        }
    }

    /// Wire tag of this message
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event { .. } => "event",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize for a text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Current run state as seen by subscribers and the status endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Whether the timer is running
    pub is_streaming: bool,
    /// Tick interval in milliseconds
    pub interval: u64,
    /// Resolved provider, if known
    pub provider: Option<ProviderSummary>,
}

impl StatusSnapshot {
    /// Status message carrying this snapshot
    #[must_use]
    pub fn to_message(&self) -> StreamMessage {
        StreamMessage::Status {
            is_streaming: self.is_streaming,
            interval: self.interval,
            provider: self.provider.clone(),
        }
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            is_streaming: false,
            interval: crate::config_store::DEFAULT_INTERVAL_MS,
            provider: None,
        }
    }
}
