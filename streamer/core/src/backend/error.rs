//! Backend error types

use std::time::Duration;

use thiserror::Error;

/// Errors from a generation backend call
#[derive(Debug, Error)]
pub enum BackendError {
    /// The provider throttled the request
    #[error("rate limited by provider{}", retry_hint(.retry_after))]
    RateLimited {
        /// Delay suggested by the provider, if any
        retry_after: Option<Duration>,
    },

    /// The provider rejected the credential
    #[error("authentication rejected by provider ({status}): {message}")]
    Unauthorized {
        /// HTTP status code
        status: u16,
        /// Provider error body
        message: String,
    },

    /// Any other non-success response
    #[error("provider API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Provider error body
        message: String,
    },

    /// The request never got a response
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response did not contain generated text
    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {}s", d.as_secs()))
        .unwrap_or_default()
}

impl BackendError {
    /// Check if this is a rate limit error
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if the provider rejected the credential
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Build the error for a non-success HTTP status
    #[must_use]
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            429 => Self::RateLimited { retry_after },
            401 | 403 => Self::Unauthorized { status, message },
            _ => Self::Api { status, message },
        }
    }
}
