//! Generation Backend Integration
//!
//! Access to text-generation providers through a common trait. The core only
//! needs "prompt in, raw text out"; parsing the text is the
//! [`EventFactory`](crate::factory::EventFactory)'s job.
//!
//! # Usage
//!
//! ```ignore
//! use streamer_core::backend::{GenerationBackend, GenerationRequest, HttpGenerationClient};
//!
//! let client = HttpGenerationClient::new()?;
//! let raw = client.generate(&provider, &GenerationRequest::new("...")).await?;
//! ```

mod error;
mod http;
mod traits;

pub use error::BackendError;
pub use http::{build_body, extract_text, request_url, HttpGenerationClient, DEFAULT_TIMEOUT};
pub use traits::{GenerationBackend, GenerationRequest};
