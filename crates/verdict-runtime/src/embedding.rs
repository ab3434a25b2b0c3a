//! Text embedding backends.
//!
//! Embedding is a separate concern from chat completion, so it gets its own
//! trait rather than another method on [`LlmProvider`](crate::providers::LlmProvider).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::providers::http::{build_client, check_status, read_json, send_error};
use crate::providers::{ApiCredential, ProviderError};
use crate::resilience::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const EMBEDDING_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Error, Debug, Clone)]
pub enum EmbeddingError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("embedding response contained no vectors")]
    Empty,
}

/// Produces fixed-dimension vectors for text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn model(&self) -> &str;

    fn dimension(&self) -> usize;
}

/// OpenAI `/embeddings`, with the same bounded retry as completions.
pub struct OpenAiEmbedder {
    credential: ApiCredential,
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
    retry: RetryPolicy,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl OpenAiEmbedder {
    pub fn from_config(config: &RetrievalConfig, retry: RetryPolicy) -> Result<Self, ProviderError> {
        let credential = ApiCredential::resolve(
            config.api_key.as_deref(),
            EMBEDDING_API_KEY_ENV,
            "Embedding API key",
        )?;
        let timeout = Duration::from_secs(30);

        Ok(Self {
            credential,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: config.embedding_model.clone(),
            dimension: config.dimension,
            client: build_client(timeout)?,
            retry,
            timeout,
        })
    }

    fn request_body(&self, text: &str) -> EmbeddingRequest<'_> {
        EmbeddingRequest {
            model: &self.model,
            input: text.to_string(),
            // only the v3 models accept a dimensions override
            dimensions: self
                .model
                .starts_with("text-embedding-3")
                .then_some(self.dimension),
        }
    }

    async fn request(&self, text: &str) -> Result<EmbeddingResponse, ProviderError> {
        // SECURITY: only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(self.timeout)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        read_json(check_status(response).await?).await
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self.retry.run("embed", || self.request(text)).await?;
        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbeddingError::Empty)?;

        if vector.len() != self.dimension {
            return Err(EmbeddingError::Dimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        debug!(model = %self.model, dimension = vector.len(), "embedding generated");
        Ok(vector)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: &str) -> RetrievalConfig {
        RetrievalConfig {
            embedding_model: model.to_string(),
            api_key: Some("sk-embed".to_string()),
            ..RetrievalConfig::default()
        }
    }

    #[test]
    fn test_dimensions_only_for_v3_models() {
        let v3 = OpenAiEmbedder::from_config(&config("text-embedding-3-small"), RetryPolicy::none()).unwrap();
        let body = serde_json::to_value(v3.request_body("hello")).unwrap();
        assert_eq!(body["dimensions"], 1536);

        let ada = OpenAiEmbedder::from_config(&config("text-embedding-ada-002"), RetryPolicy::none()).unwrap();
        let body = serde_json::to_value(ada.request_body("hello")).unwrap();
        assert!(body.get("dimensions").is_none());
    }

    #[test]
    fn test_debug_redacts_key() {
        let embedder = OpenAiEmbedder::from_config(&config("text-embedding-3-small"), RetryPolicy::none()).unwrap();
        assert!(!format!("{:?}", embedder).contains("sk-embed"));
    }

    #[test]
    fn test_retryable_errors_pass_through() {
        let err: EmbeddingError = ProviderError::RateLimited { retry_after: None }.into();
        assert!(matches!(err, EmbeddingError::Provider(ProviderError::RateLimited { .. })));
    }
}
