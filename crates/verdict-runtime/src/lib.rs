//! # verdict-runtime
//!
//! The networked half of Verdict: text-generation backends, the bounded
//! agent loop, similar-case retrieval and the end-to-end [`Pipeline`].
//!
//! Everything deterministic (parsing, guardrails, tools, cosine math) lives
//! in `verdict-core`. This crate drives it against a backend.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use verdict_core::Mode;
//! use verdict_runtime::{AnalysisRequest, InMemoryCaseStore, Pipeline, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_yaml_file("verdict.yaml")?;
//! let store = Arc::new(InMemoryCaseStore::new());
//! let pipeline = Pipeline::from_config(&config, store.clone())?;
//!
//! let result = pipeline
//!     .process(&AnalysisRequest::new("Wire 9,800 USD to Dark Holdings LLC", Mode::Analysis))
//!     .await?;
//! println!("{} -> {:?}", result.case_id, result.judgment.score);
//! ```

use thiserror::Error;

pub mod cache;
pub mod config;
pub mod embedding;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod retrieval;
pub mod store;
pub mod testing;

pub use cache::{EmbeddingCache, EmbeddingKey};
pub use config::{
    AgentConfig, BackendConfig, BackendKind, ConfigError, GuardrailConfig, RetrievalConfig,
    RetryConfig, RuntimeConfig,
};
pub use embedding::{EmbeddingError, EmbeddingProvider, OpenAiEmbedder};
pub use orchestrator::{AgentFailure, AgentOrchestrator, AgentOutcome, AgentState, FailureKind};
pub use pipeline::{AnalysisRequest, Pipeline, PipelineResult};
pub use providers::{
    Backend, ChatMessage, LlmProvider, ProviderAdapter, ProviderError, ToolCall, ToolCompletion,
};
pub use resilience::{synthesize_fallback, RetryPolicy};
pub use retrieval::{
    CandidateStage, SimilarMatch, SimilarityQuery, SimilarityRetriever, SimilarityTrace,
};
pub use store::InMemoryCaseStore;

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Agent(#[from] AgentFailure),

    #[error(transparent)]
    Sink(#[from] verdict_core::SinkError),
}

impl RuntimeError {
    /// The finalized trace, when the agent got far enough to produce one.
    pub fn trace(&self) -> Option<&verdict_core::AnalysisTrace> {
        match self {
            RuntimeError::Agent(failure) => Some(&failure.trace),
            _ => None,
        }
    }
}
