//! Generation Backend Traits
//!
//! Trait definitions for generation backends. The controller hands a
//! [`ResolvedProvider`] and a [`GenerationRequest`] to a
//! [`GenerationBackend`] and gets raw text back; which wire dialect to speak
//! is decided by the provider kind.

use async_trait::async_trait;

use super::error::BackendError;
use crate::resolver::ResolvedProvider;

/// One generation call
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    /// User prompt (rendered template)
    pub prompt: String,
    /// System prompt carrying the output format contract
    pub system: Option<String>,
    /// Sampling temperature (0.0-2.0)
    pub temperature: f32,
    /// Maximum tokens in the response (0 = provider default)
    pub max_tokens: u32,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            system: None,
            temperature: 0.9,
            max_tokens: 1024,
        }
    }
}

impl GenerationRequest {
    /// Create a request for a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Generation backend trait
///
/// Implement this to plug in another way of reaching providers (or a fake
/// one in tests).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Run one generation call and return the raw text payload
    async fn generate(
        &self,
        provider: &ResolvedProvider,
        request: &GenerationRequest,
    ) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new("Emit one event")
            .with_system("JSON only")
            .with_temperature(5.0)
            .with_max_tokens(256);

        assert_eq!(request.prompt, "Emit one event");
        assert_eq!(request.system.as_deref(), Some("JSON only"));
        assert!((request.temperature - 2.0).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 256);
    }
}
