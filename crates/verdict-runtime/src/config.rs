//! Runtime configuration.
//!
//! Loaded once from YAML and handed to constructors; nothing reads it
//! mid-invocation. Every field has a default, so an empty document is a
//! valid configuration.
//!
//! ```yaml
//! backend:
//!   kind: azure
//!   base_url: https://my-resource.openai.azure.com
//!   deployment: gpt-4o
//!   timeout: 60s
//! agent:
//!   max_iterations: 8
//! retrieval:
//!   enabled: false
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// `Duration` as a humantime string (`"4s"`, `"10m"`).
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    OpenAi,
    Azure,
    Anthropic,
    Ollama,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Azure => "azure",
            BackendKind::Anthropic => "anthropic",
            BackendKind::Ollama => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            BackendKind::OpenAi | BackendKind::Azure => "gpt-4o-mini",
            BackendKind::Anthropic => "claude-sonnet-4-5-20250514",
            BackendKind::Ollama => "llama3.1",
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Model name; defaults per backend kind.
    pub model: Option<String>,
    /// API base URL (Azure: the resource endpoint).
    pub base_url: Option<String>,
    /// Falls back to the backend's environment variable when absent.
    pub api_key: Option<String>,
    /// Azure deployment name.
    pub deployment: Option<String>,
    pub api_version: String,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            model: None,
            base_url: None,
            api_key: None,
            deployment: None,
            api_version: "2024-02-15-preview".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl BackendConfig {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.kind.default_model())
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Hard ceiling on provider calls per invocation.
    pub max_iterations: u32,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Corrective re-prompts allowed after a format failure.
    pub corrective_reprompts: u32,
    /// Offer registered tools to the backend.
    pub use_tools: bool,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            temperature: 0.1,
            max_tokens: 1500,
            corrective_reprompts: 1,
            use_tools: true,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    #[serde(with = "duration_str")]
    pub min_delay: Duration,
    #[serde(with = "duration_str")]
    pub max_delay: Duration,
    pub factor: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub enabled: bool,
    pub embedding_model: String,
    pub dimension: usize,
    /// Minimum similarity as a fraction (0.3 = 30%).
    pub min_similarity: f32,
    pub default_limit: usize,
    /// Candidates fetched per requested match, before filtering.
    pub candidate_multiplier: usize,
    pub cache_capacity: u64,
    #[serde(with = "duration_str")]
    pub cache_ttl: Duration,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            min_similarity: 0.3,
            default_limit: 3,
            candidate_multiplier: 4,
            cache_capacity: 256,
            cache_ttl: Duration::from_secs(600),
            base_url: None,
            api_key: None,
        }
    }
}

impl fmt::Debug for RetrievalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalConfig")
            .field("enabled", &self.enabled)
            .field("embedding_model", &self.embedding_model)
            .field("dimension", &self.dimension)
            .field("min_similarity", &self.min_similarity)
            .field("default_limit", &self.default_limit)
            .field("candidate_multiplier", &self.candidate_multiplier)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl", &self.cache_ttl)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub min_length: usize,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            min_length: verdict_core::guardrails::DEFAULT_MIN_LENGTH,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub backend: BackendConfig,
    pub agent: AgentConfig,
    pub retry: RetryConfig,
    pub retrieval: RetrievalConfig,
    pub guardrails: GuardrailConfig,
}

impl RuntimeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.agent.max_iterations == 0 {
            return invalid("agent.max_iterations must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return invalid("agent.temperature must be between 0.0 and 2.0");
        }
        if self.agent.max_tokens == 0 {
            return invalid("agent.max_tokens must be positive");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if self.retry.min_delay > self.retry.max_delay {
            return invalid("retry.min_delay must not exceed retry.max_delay");
        }
        if self.retry.factor < 1.0 {
            return invalid("retry.factor must be at least 1.0");
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            return invalid("retrieval.min_similarity must be between 0.0 and 1.0");
        }
        if self.retrieval.dimension == 0 {
            return invalid("retrieval.dimension must be positive");
        }
        if self.retrieval.candidate_multiplier == 0 {
            return invalid("retrieval.candidate_multiplier must be at least 1");
        }
        if self.backend.kind == BackendKind::Azure && self.backend.deployment.is_none() {
            return invalid("backend.deployment is required for azure");
        }
        for url in [&self.backend.base_url, &self.retrieval.base_url].into_iter().flatten() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "base_url must start with http:// or https://, got '{}'",
                    url
                )));
            }
        }
        Ok(())
    }
}
