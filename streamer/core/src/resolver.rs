//! Provider Resolution
//!
//! Picks the one backend the next generation call talks to. Resolution is an
//! ordered list of [`ResolutionStrategy`]s; the first one that returns
//! [`Resolution::Resolved`] wins:
//!
//! 1. [`ActiveSetting`]: the provider marked active in the provider settings
//! 2. [`AppConfigActive`]: the `ACTIVE_PROVIDER` app-config value
//! 3. [`EnvironmentFallback`]: OpenAI with defaults, if `OPENAI_API_KEY` is set
//!
//! The winning candidate is then finalised: missing model, endpoint and
//! credential are filled from per-kind defaults and the environment.
//!
//! [`ProviderResolver`] caches the result until [`ProviderResolver::invalidate`]
//! is called, so two resolutions without a configure in between return the
//! same provider.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config_store::{normalize_variation_limit, ConfigStore};
use crate::settings::{
    AppConfig, ProviderConfig, ProviderKind, ProviderSettings, ACTIVE_PROVIDER_KEY,
    VARIATION_LIMIT_KEY,
};
use crate::store::{SettingsStore, StoreError};

/// OpenAI chat completions endpoint
pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Anthropic messages endpoint
pub const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// Gemini model collection; the client appends `/{model}:generateContent`
pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const OLLAMA_HOST_VAR: &str = "OLLAMA_HOST";
const OLLAMA_PORT_VAR: &str = "OLLAMA_PORT";

/// Resolution failures
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// No strategy produced a candidate
    #[error("no provider configured")]
    NoProvider,

    /// The provider's kind could not be determined
    #[error("unknown provider type for '{id}'")]
    UnknownKind {
        /// Provider id
        id: String,
    },

    /// No model configured and the kind has no default
    #[error("no model configured for provider '{id}'")]
    MissingModel {
        /// Provider id
        id: String,
    },

    /// No endpoint configured and the kind has no default
    #[error("no endpoint configured for provider '{id}'")]
    MissingEndpoint {
        /// Provider id
        id: String,
    },

    /// The kind needs a credential and none was found
    #[error("provider '{id}' requires an API key (set it in the provider settings or {env_var})")]
    MissingCredential {
        /// Provider id
        id: String,
        /// Environment variable that was checked
        env_var: String,
    },

    /// Stored settings could not be read
    #[error("could not read provider settings: {0}")]
    Store(#[from] StoreError),
}

/// Concrete backend descriptor for one generation call
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    /// Provider id as stored in settings
    pub id: String,
    /// Backend family
    pub kind: ProviderKind,
    /// Model identifier
    pub model: String,
    /// Endpoint URL
    pub endpoint: String,
    /// API key, if any
    pub credential: Option<String>,
}

impl ResolvedProvider {
    /// Credential-free view for the wire
    #[must_use]
    pub fn summary(&self) -> ProviderSummary {
        ProviderSummary {
            id: self.id.clone(),
            kind: self.kind,
            model: self.model.clone(),
        }
    }
}

impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Provider as shown to subscribers and API clients
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    /// Provider id
    pub id: String,
    /// Backend family
    pub kind: ProviderKind,
    /// Model identifier
    pub model: String,
}

impl fmt::Display for ProviderSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.model)
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment values the resolver may read
///
/// Captured once so resolution stays deterministic and tests can supply
/// their own values without touching the process environment.
#[derive(Clone, Debug, Default)]
pub struct ProviderEnvironment {
    vars: HashMap<String, String>,
}

impl ProviderEnvironment {
    /// Empty environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the relevant variables from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        let names = ProviderKind::ALL
            .iter()
            .filter_map(ProviderKind::credential_env_var)
            .chain([OLLAMA_HOST_VAR, OLLAMA_PORT_VAR]);

        let vars = names
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Self { vars }
    }

    /// Add a variable
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Non-blank value of a variable
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Credential for a kind from its environment variable
    #[must_use]
    pub fn credential_for(&self, kind: ProviderKind) -> Option<&str> {
        kind.credential_env_var().and_then(|name| self.get(name))
    }

    /// Default endpoint for a kind
    #[must_use]
    pub fn default_endpoint(&self, kind: ProviderKind) -> Option<String> {
        match kind {
            ProviderKind::OpenAi => Some(OPENAI_ENDPOINT.to_string()),
            ProviderKind::Anthropic => Some(ANTHROPIC_ENDPOINT.to_string()),
            ProviderKind::Gemini => Some(GEMINI_ENDPOINT.to_string()),
            ProviderKind::Ollama => {
                let host = self.get(OLLAMA_HOST_VAR).unwrap_or("localhost");
                let port = self.get(OLLAMA_PORT_VAR).unwrap_or("11434");
                let base = if host.starts_with("http://") || host.starts_with("https://") {
                    host.trim_end_matches('/').to_string()
                } else {
                    format!("http://{host}:{port}")
                };
                Some(format!("{base}/api/generate"))
            }
            ProviderKind::OpenAiCompatible => None,
        }
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// Everything a strategy may look at
#[derive(Clone, Copy, Debug)]
pub struct ResolutionInputs<'a> {
    /// Stored provider settings
    pub settings: &'a ProviderSettings,
    /// Stored app config
    pub app_config: &'a AppConfig,
    /// Captured environment
    pub env: &'a ProviderEnvironment,
}

/// A provider picked by a strategy, before defaults are applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Provider id
    pub id: String,
    /// Stored (or synthesised) config
    pub config: ProviderConfig,
}

/// Outcome of one strategy
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The strategy picked a provider
    Resolved(Candidate),
    /// The strategy does not apply; try the next one
    NotApplicable,
}

/// One step of the resolution order
pub trait ResolutionStrategy: Send + Sync {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    /// Evaluate against the inputs
    fn evaluate(&self, inputs: &ResolutionInputs<'_>) -> Resolution;
}

fn stored_candidate(settings: &ProviderSettings, id: Option<&str>) -> Resolution {
    let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) else {
        return Resolution::NotApplicable;
    };
    match settings.providers.get(id) {
        Some(config) => Resolution::Resolved(Candidate {
            id: id.to_string(),
            config: config.clone(),
        }),
        None => Resolution::NotApplicable,
    }
}

/// Provider explicitly marked active in the provider settings
#[derive(Clone, Copy, Debug, Default)]
pub struct ActiveSetting;

impl ResolutionStrategy for ActiveSetting {
    fn name(&self) -> &'static str {
        "active_setting"
    }

    fn evaluate(&self, inputs: &ResolutionInputs<'_>) -> Resolution {
        stored_candidate(inputs.settings, inputs.settings.active_provider_id.as_deref())
    }
}

/// Provider named by the `ACTIVE_PROVIDER` app-config value
#[derive(Clone, Copy, Debug, Default)]
pub struct AppConfigActive;

impl ResolutionStrategy for AppConfigActive {
    fn name(&self) -> &'static str {
        "app_config"
    }

    fn evaluate(&self, inputs: &ResolutionInputs<'_>) -> Resolution {
        stored_candidate(
            inputs.settings,
            inputs.app_config.get(ACTIVE_PROVIDER_KEY).map(String::as_str),
        )
    }
}

/// Built-in OpenAI provider, usable when its key is in the environment
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvironmentFallback;

impl ResolutionStrategy for EnvironmentFallback {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn evaluate(&self, inputs: &ResolutionInputs<'_>) -> Resolution {
        let kind = ProviderKind::OpenAi;
        if inputs.env.credential_for(kind).is_none() {
            return Resolution::NotApplicable;
        }
        Resolution::Resolved(Candidate {
            id: kind.as_str().to_string(),
            config: ProviderConfig {
                kind: Some(kind),
                model_name: kind.default_model().map(String::from),
                endpoint_url: inputs.env.default_endpoint(kind),
                credential: None,
            },
        })
    }
}

/// The standard resolution order
#[must_use]
pub fn default_strategies() -> Vec<Box<dyn ResolutionStrategy>> {
    vec![
        Box::new(ActiveSetting),
        Box::new(AppConfigActive),
        Box::new(EnvironmentFallback),
    ]
}

/// Run the strategies in order and finalise the first candidate
pub fn resolve_with(
    strategies: &[Box<dyn ResolutionStrategy>],
    inputs: &ResolutionInputs<'_>,
) -> Result<(ResolvedProvider, &'static str), ResolutionError> {
    for strategy in strategies {
        if let Resolution::Resolved(candidate) = strategy.evaluate(inputs) {
            let resolved = finalize(candidate, inputs.env)?;
            return Ok((resolved, strategy.name()));
        }
    }
    Err(ResolutionError::NoProvider)
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Fill in kind, model, endpoint and credential for a candidate
pub fn finalize(
    candidate: Candidate,
    env: &ProviderEnvironment,
) -> Result<ResolvedProvider, ResolutionError> {
    let Candidate { id, config } = candidate;

    let kind = match config.kind {
        Some(kind) => kind,
        None => id
            .parse::<ProviderKind>()
            .map_err(|_| ResolutionError::UnknownKind { id: id.clone() })?,
    };

    let model = non_blank(config.model_name.as_ref())
        .or_else(|| kind.default_model().map(String::from))
        .ok_or_else(|| ResolutionError::MissingModel { id: id.clone() })?;

    let endpoint = non_blank(config.endpoint_url.as_ref())
        .or_else(|| env.default_endpoint(kind))
        .ok_or_else(|| ResolutionError::MissingEndpoint { id: id.clone() })?;

    let credential = non_blank(config.credential.as_ref())
        .or_else(|| env.credential_for(kind).map(String::from));

    if credential.is_none() && kind.requires_credential() {
        return Err(ResolutionError::MissingCredential {
            id,
            env_var: kind.credential_env_var().unwrap_or_default().to_string(),
        });
    }

    Ok(ResolvedProvider {
        id,
        kind,
        model,
        endpoint,
        credential,
    })
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Debug, Default)]
struct Cache {
    generation: u64,
    provider: Option<ResolvedProvider>,
}

/// Cached, store-backed provider resolution
pub struct ProviderResolver {
    settings: Arc<dyn SettingsStore>,
    env: ProviderEnvironment,
    strategies: Vec<Box<dyn ResolutionStrategy>>,
    cache: RwLock<Cache>,
}

impl ProviderResolver {
    /// Create a resolver using the standard strategy order
    pub fn new(settings: Arc<dyn SettingsStore>, env: ProviderEnvironment) -> Self {
        Self::with_strategies(settings, env, default_strategies())
    }

    /// Create a resolver with a custom strategy order
    pub fn with_strategies(
        settings: Arc<dyn SettingsStore>,
        env: ProviderEnvironment,
        strategies: Vec<Box<dyn ResolutionStrategy>>,
    ) -> Self {
        Self {
            settings,
            env,
            strategies,
            cache: RwLock::new(Cache::default()),
        }
    }

    /// Cached provider, if any
    #[must_use]
    pub fn cached(&self) -> Option<ResolvedProvider> {
        self.cache.read().provider.clone()
    }

    /// Summary of the cached provider
    #[must_use]
    pub fn summary(&self) -> Option<ProviderSummary> {
        self.cache.read().provider.as_ref().map(ResolvedProvider::summary)
    }

    /// Drop the cached provider
    ///
    /// A resolution already in flight will not repopulate the cache.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write();
        cache.generation = cache.generation.wrapping_add(1);
        cache.provider = None;
    }

    /// Resolve the provider for the next call
    ///
    /// A fresh (uncached) success records `ACTIVE_PROVIDER` in the settings
    /// store and adopts a persisted `VARIATION_LIMIT` into `config`.
    pub async fn resolve(&self, config: &ConfigStore) -> Result<ResolvedProvider, ResolutionError> {
        let generation = {
            let cache = self.cache.read();
            if let Some(provider) = &cache.provider {
                return Ok(provider.clone());
            }
            cache.generation
        };

        let settings = self.settings.provider_settings().await?;
        let app_config = self.settings.app_config().await?;

        let inputs = ResolutionInputs {
            settings: &settings,
            app_config: &app_config,
            env: &self.env,
        };
        let (provider, strategy) = resolve_with(&self.strategies, &inputs)?;

        config.set_app_config(app_config.clone());

        if app_config.get(ACTIVE_PROVIDER_KEY) != Some(&provider.id) {
            match self
                .settings
                .set_app_value(ACTIVE_PROVIDER_KEY, &provider.id)
                .await
            {
                Ok(()) => config.set_app_value(ACTIVE_PROVIDER_KEY, &provider.id),
                Err(e) => tracing::warn!(
                    provider = %provider.id,
                    error = %e,
                    "Failed to record active provider"
                ),
            }
        }

        if let Some(raw) = app_config.get(VARIATION_LIMIT_KEY) {
            config.set_variation_limit(normalize_variation_limit(raw));
        }

        {
            let mut cache = self.cache.write();
            if cache.generation == generation {
                cache.provider = Some(provider.clone());
            }
        }

        tracing::info!(
            provider = %provider.id,
            kind = %provider.kind,
            model = %provider.model,
            strategy,
            "Resolved generation provider"
        );

        Ok(provider)
    }
}
