//! Provider Settings
//!
//! Persisted configuration for generation backends plus the key/value
//! application config. These are the inputs of
//! [`ProviderResolver`](crate::resolver::ProviderResolver); the stores in
//! [`crate::store`] own their durable copies.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// App-config key recording the provider chosen by the last resolution
pub const ACTIVE_PROVIDER_KEY: &str = "ACTIVE_PROVIDER";

/// App-config key holding the persisted variation limit
pub const VARIATION_LIMIT_KEY: &str = "VARIATION_LIMIT";

/// Prefix every masked credential starts with
pub const CREDENTIAL_MASK: &str = "****";

/// Persisted key/value application config
pub type AppConfig = BTreeMap<String, String>;

/// Partial app-config update; `None` deletes the key
pub type AppConfigUpdate = BTreeMap<String, Option<String>>;

/// Generation backend families
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// OpenAI chat completions
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages API
    Anthropic,
    /// Google Gemini `generateContent`
    Gemini,
    /// Local Ollama server
    Ollama,
    /// Any server speaking the OpenAI chat completions dialect
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
}

impl ProviderKind {
    /// Every supported kind
    pub const ALL: [ProviderKind; 5] = [
        Self::OpenAi,
        Self::Anthropic,
        Self::Gemini,
        Self::Ollama,
        Self::OpenAiCompatible,
    ];

    /// Identifier used in settings and on the wire
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
            Self::OpenAiCompatible => "openai-compatible",
        }
    }

    /// Model used when the stored config names none
    #[must_use]
    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("gpt-4o-mini"),
            Self::Anthropic => Some("claude-3-5-haiku-latest"),
            Self::Gemini => Some("gemini-1.5-flash"),
            Self::Ollama => Some("llama3.2"),
            Self::OpenAiCompatible => None,
        }
    }

    /// Environment variable holding this kind's credential
    #[must_use]
    pub fn credential_env_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Ollama => None,
            Self::OpenAiCompatible => Some("OPENAI_COMPATIBLE_API_KEY"),
        }
    }

    /// Whether a call cannot be made without a credential
    #[must_use]
    pub fn requires_credential(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Anthropic | Self::Gemini)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown provider kind: {wanted}"))
    }
}

/// Stored configuration for one provider
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Backend family; when absent the provider id names it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProviderKind>,
    /// Model identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Endpoint URL
    #[serde(default, alias = "apiUrl", skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    /// API key or token
    #[serde(default, alias = "apiKey", skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl ProviderConfig {
    /// Copy with the credential replaced by a short mask
    #[must_use]
    pub fn masked(&self) -> Self {
        Self {
            credential: self.credential.as_deref().map(mask_credential),
            ..self.clone()
        }
    }

    fn merge(&mut self, update: &ProviderConfig) {
        if update.kind.is_some() {
            self.kind = update.kind;
        }
        if let Some(model) = &update.model_name {
            self.model_name = Some(model.clone());
        }
        if let Some(endpoint) = &update.endpoint_url {
            self.endpoint_url = Some(endpoint.clone());
        }
        if let Some(credential) = &update.credential {
            self.credential = Some(credential.clone());
        }
    }
}

/// All stored provider configs plus the active marker
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    /// Provider explicitly marked active, if any
    #[serde(default)]
    pub active_provider_id: Option<String>,
    /// Stored providers by id
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl ProviderSettings {
    /// Copy with every credential masked
    #[must_use]
    pub fn masked(&self) -> Self {
        Self {
            active_provider_id: self.active_provider_id.clone(),
            providers: self
                .providers
                .iter()
                .map(|(id, cfg)| (id.clone(), cfg.masked()))
                .collect(),
        }
    }

    /// Apply a partial update, returning the merged settings
    ///
    /// Fields absent from an upserted provider keep their stored value, so a
    /// client that round-trips masked settings does not clobber credentials
    /// as long as it omits the credential field.
    #[must_use]
    pub fn merged(&self, update: &ProviderSettingsUpdate) -> Self {
        let mut next = self.clone();

        for id in &update.remove {
            next.providers.remove(id);
            if next.active_provider_id.as_deref() == Some(id.as_str()) {
                next.active_provider_id = None;
            }
        }

        for (id, cfg) in &update.providers {
            next.providers.entry(id.clone()).or_default().merge(cfg);
        }

        match update.active_provider_id.as_deref().map(str::trim) {
            Some("") => next.active_provider_id = None,
            Some(id) => next.active_provider_id = Some(id.to_string()),
            None => {}
        }

        next
    }
}

/// Partial provider-settings update
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettingsUpdate {
    /// New active provider; an empty string clears the marker
    #[serde(default)]
    pub active_provider_id: Option<String>,
    /// Providers to insert or merge into
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Provider ids to delete
    #[serde(default)]
    pub remove: Vec<String>,
}

impl ProviderSettingsUpdate {
    /// Whether the update changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active_provider_id.is_none() && self.providers.is_empty() && self.remove.is_empty()
    }

    /// Drop credentials that are masks read back from a snapshot
    ///
    /// A dropped credential leaves the stored one in place.
    #[must_use]
    pub fn without_masked_credentials(mut self) -> Self {
        for cfg in self.providers.values_mut() {
            if cfg.credential.as_deref().is_some_and(is_masked_credential) {
                cfg.credential = None;
            }
        }
        self
    }
}

/// Everything a configure call asks the settings store to persist
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    /// Provider changes
    pub providers: ProviderSettingsUpdate,
    /// App-config changes
    pub app_config: AppConfigUpdate,
}

impl SettingsUpdate {
    /// Whether the update changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty() && self.app_config.is_empty()
    }
}

/// Apply an app-config update to a snapshot
#[must_use]
pub fn merge_app_config(current: &AppConfig, update: &AppConfigUpdate) -> AppConfig {
    let mut next = current.clone();
    for (key, value) in update {
        match value {
            Some(v) => {
                next.insert(key.clone(), v.clone());
            }
            None => {
                next.remove(key);
            }
        }
    }
    next
}

/// Mask a credential, keeping at most the last four characters
#[must_use]
pub fn mask_credential(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= 8 {
        return CREDENTIAL_MASK.to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{CREDENTIAL_MASK}{tail}")
}

/// Whether a credential is a mask rather than a real key
#[must_use]
pub fn is_masked_credential(credential: &str) -> bool {
    credential.starts_with(CREDENTIAL_MASK)
}
