//! Core error type
//!
//! Every caller-facing operation on the [`StreamController`] returns
//! [`StreamError`]. Tick failures use the same type internally and are turned
//! into `error` broadcasts; only the daemon maps it to HTTP status codes.
//!
//! [`StreamController`]: crate::controller::StreamController

use thiserror::Error;

use crate::backend::BackendError;
use crate::factory::PayloadError;
use crate::resolver::ResolutionError;
use crate::store::StoreError;

/// Errors surfaced by the streaming core
#[derive(Debug, Error)]
pub enum StreamError {
    /// Bad caller input; nothing was changed
    #[error("{0}")]
    Validation(String),

    /// No usable provider could be resolved
    #[error(transparent)]
    ProviderResolution(#[from] ResolutionError),

    /// The generation call failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The backend answered with something that is not an event
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Settings or purge persistence failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StreamError {
    /// Build a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this was caused by caller input
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Short label for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::ProviderResolution(_) => "provider_resolution",
            Self::Backend(_) => "backend",
            Self::Payload(_) => "payload",
            Self::Store(_) => "store",
        }
    }
}

/// Result alias for core operations
pub type StreamResult<T> = Result<T, StreamError>;
