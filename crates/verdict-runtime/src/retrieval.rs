//! Similar-case retrieval.
//!
//! A query judgment is embedded and compared against stored case vectors.
//! Candidates go through three filters in a fixed order: self exclusion,
//! minimum similarity, caller visibility. Only then is the list truncated to
//! the requested limit. A superset is fetched up front so that filtering does
//! not starve the result.
//!
//! Retrieval never fails the caller. Embedding or index errors end up in
//! [`SimilarityTrace::error`] with an empty match list, and a disabled
//! retriever answers every call with an empty list and a trace flagged
//! `enabled: false`.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use verdict_core::types::truncate_chars;
use verdict_core::{
    similarity_percent, CaseId, CaseLookup, CaseRecord, Judgment, VisibilityPredicate,
};

use crate::cache::{EmbeddingCache, EmbeddingKey};
use crate::config::{RetrievalConfig, RuntimeConfig};
use crate::embedding::{EmbeddingError, EmbeddingProvider, OpenAiEmbedder};
use crate::providers::ProviderError;
use crate::resilience::RetryPolicy;

const CASE_SUMMARY_CHARS: usize = 500;
const QUERY_SUMMARY_CHARS: usize = 200;
const QUERY_PREVIEW_CHARS: usize = 100;

/// Text embedded for a persisted case.
pub fn case_embedding_text(input: &str, judgment: &Judgment) -> String {
    let mut parts = vec![format!("Input: {}", input)];
    if let Some(score) = judgment.score {
        parts.push(format!("Score: {}", score));
    }
    if !judgment.categories.is_empty() {
        parts.push(format!("Categories: {}", judgment.categories.join(", ")));
    }
    if !judgment.reasoning.is_empty() {
        parts.push(format!(
            "Summary: {}",
            head_chars(&judgment.reasoning, CASE_SUMMARY_CHARS)
        ));
    }
    parts.join("\n").trim().to_string()
}

/// Text embedded for a similarity query.
pub fn query_text(input: &str, judgment: &Judgment) -> String {
    let mut text = input.trim().to_string();
    let summary = head_chars(&judgment.reasoning, QUERY_SUMMARY_CHARS);
    if !summary.trim().is_empty() {
        text.push_str(" - ");
        text.push_str(summary.trim());
    }
    if !judgment.categories.is_empty() {
        text.push_str(" [");
        text.push_str(&judgment.categories.join(", "));
        text.push(']');
    }
    text
}

fn head_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// What to search for.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityQuery<'a> {
    pub input_text: &'a str,
    pub judgment: &'a Judgment,
    /// Case to leave out of the results, normally the query's own record.
    pub exclude: Option<CaseId>,
}

impl<'a> SimilarityQuery<'a> {
    pub fn new(input_text: &'a str, judgment: &'a Judgment) -> Self {
        Self {
            input_text,
            judgment,
            exclude: None,
        }
    }

    pub fn excluding(mut self, id: CaseId) -> Self {
        self.exclude = Some(id);
        self
    }
}

impl<'a> From<&'a CaseRecord> for SimilarityQuery<'a> {
    fn from(record: &'a CaseRecord) -> Self {
        Self::new(&record.input_text, &record.judgment).excluding(record.id)
    }
}

/// A past case close to the query.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarMatch {
    pub case_id: CaseId,
    pub input_text: String,
    pub judgment: Judgment,
    pub distance: f32,
    /// `max(0, 1 - distance) * 100`.
    pub similarity: f32,
}

/// Where a candidate left the funnel, or `Returned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStage {
    SelfMatch,
    BelowThreshold,
    /// Vector without a record.
    Missing,
    NotVisible,
    OverLimit,
    Returned,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateDiagnostic {
    pub case_id: CaseId,
    pub distance: f32,
    pub similarity: f32,
    pub stage: CandidateStage,
}

/// Diagnostics for one `find_similar` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimilarityTrace {
    pub enabled: bool,
    pub embedding_model: Option<String>,
    pub dimension: Option<usize>,
    pub query_preview: Option<String>,
    pub requested_limit: usize,
    /// Threshold in percent.
    pub min_similarity: f32,
    pub cache_hit: bool,
    pub candidates_fetched: usize,
    pub after_self_exclusion: usize,
    pub after_threshold: usize,
    pub after_visibility: usize,
    pub returned: usize,
    pub candidates: Vec<CandidateDiagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SimilarityTrace {
    pub fn disabled() -> Self {
        Self::default()
    }
}

/// Embeds judgments and finds similar past cases.
pub struct SimilarityRetriever {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    cache: EmbeddingCache,
    config: RetrievalConfig,
}

impl std::fmt::Debug for SimilarityRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityRetriever")
            .field("enabled", &self.is_enabled())
            .field("model", &self.embedder.as_ref().map(|e| e.model().to_string()))
            .field("cache", &self.cache)
            .finish()
    }
}

impl SimilarityRetriever {
    /// Retriever over `embedder`. Still a no-op when `config.enabled` is false.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: RetrievalConfig) -> Self {
        let cache = EmbeddingCache::new(config.cache_capacity, config.cache_ttl);
        Self {
            embedder: config.enabled.then_some(embedder),
            cache,
            config,
        }
    }

    pub fn disabled() -> Self {
        Self {
            embedder: None,
            cache: EmbeddingCache::new(1, std::time::Duration::from_secs(1)),
            config: RetrievalConfig {
                enabled: false,
                ..RetrievalConfig::default()
            },
        }
    }

    /// Build the OpenAI embedder when retrieval is enabled.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ProviderError> {
        if !config.retrieval.enabled {
            info!("similarity retrieval disabled");
            return Ok(Self::disabled());
        }
        let embedder = OpenAiEmbedder::from_config(
            &config.retrieval,
            RetryPolicy::from_config(&config.retry),
        )?;
        Ok(Self::new(Arc::new(embedder), config.retrieval.clone()))
    }

    pub fn is_enabled(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Embed `text`; `None` when disabled.
    pub async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        match &self.embedder {
            Some(embedder) => embedder.embed(text).await.map(Some),
            None => Ok(None),
        }
    }

    /// Embed a case for storage; `None` when disabled.
    pub async fn embed_case(
        &self,
        input: &str,
        judgment: &Judgment,
    ) -> Result<Option<Vec<f32>>, EmbeddingError> {
        self.embed(&case_embedding_text(input, judgment)).await
    }

    /// Query embeddings go through the cache.
    async fn embed_query(
        &self,
        embedder: &dyn EmbeddingProvider,
        text: &str,
    ) -> Result<(Arc<Vec<f32>>, bool), EmbeddingError> {
        let key = EmbeddingKey::new(embedder.model(), text);
        if let Some(vector) = self.cache.get(&key).await {
            return Ok((vector, true));
        }
        let vector = Arc::new(embedder.embed(text).await?);
        self.cache.insert(key, vector.clone()).await;
        Ok((vector, false))
    }

    /// Up to `limit` visible past cases at least `min_similarity` (0..=1)
    /// similar to `query`, closest first.
    ///
    /// `None` for either uses the configured default.
    pub async fn find_similar(
        &self,
        lookup: &dyn CaseLookup,
        query: &SimilarityQuery<'_>,
        limit: Option<usize>,
        min_similarity: Option<f32>,
        visibility: &VisibilityPredicate<'_>,
    ) -> (Vec<SimilarMatch>, SimilarityTrace) {
        let Some(embedder) = self.embedder.as_deref() else {
            return (Vec::new(), SimilarityTrace::disabled());
        };

        let limit = limit.unwrap_or(self.config.default_limit);
        let threshold = min_similarity
            .unwrap_or(self.config.min_similarity)
            .clamp(0.0, 1.0)
            * 100.0;
        let text = query_text(query.input_text, query.judgment);

        let mut trace = SimilarityTrace {
            enabled: true,
            embedding_model: Some(embedder.model().to_string()),
            dimension: Some(embedder.dimension()),
            query_preview: Some(truncate_chars(&text, QUERY_PREVIEW_CHARS)),
            requested_limit: limit,
            min_similarity: threshold,
            ..SimilarityTrace::default()
        };

        if limit == 0 {
            return (Vec::new(), trace);
        }

        let vector = match self.embed_query(embedder, &text).await {
            Ok((vector, hit)) => {
                trace.cache_hit = hit;
                vector
            }
            Err(err) => {
                warn!(error = %err, "query embedding failed, returning no matches");
                trace.error = Some(err.to_string());
                return (Vec::new(), trace);
            }
        };

        let fetch = limit
            .saturating_mul(self.config.candidate_multiplier.max(1))
            .saturating_add(usize::from(query.exclude.is_some()));
        let neighbors = match lookup.nearest(&vector, fetch) {
            Ok(neighbors) => neighbors,
            Err(err) => {
                warn!(error = %err, "vector lookup failed, returning no matches");
                trace.error = Some(err.to_string());
                return (Vec::new(), trace);
            }
        };
        trace.candidates_fetched = neighbors.len();

        let mut matches = Vec::new();
        let (mut after_self, mut after_threshold, mut after_visibility) = (0, 0, 0);

        for neighbor in neighbors {
            let similarity = similarity_percent(neighbor.distance);
            let stage = if query.exclude == Some(neighbor.id) {
                CandidateStage::SelfMatch
            } else {
                after_self += 1;
                if similarity < threshold {
                    CandidateStage::BelowThreshold
                } else {
                    after_threshold += 1;
                    match lookup.get(neighbor.id) {
                        None => CandidateStage::Missing,
                        Some(record) if !visibility(&record) => CandidateStage::NotVisible,
                        Some(record) => {
                            after_visibility += 1;
                            if matches.len() < limit {
                                matches.push(SimilarMatch {
                                    case_id: record.id,
                                    input_text: record.input_text,
                                    judgment: record.judgment,
                                    distance: neighbor.distance,
                                    similarity,
                                });
                                CandidateStage::Returned
                            } else {
                                CandidateStage::OverLimit
                            }
                        }
                    }
                }
            };
            trace.candidates.push(CandidateDiagnostic {
                case_id: neighbor.id,
                distance: neighbor.distance,
                similarity,
                stage,
            });
        }

        trace.after_self_exclusion = after_self;
        trace.after_threshold = after_threshold;
        trace.after_visibility = after_visibility;
        trace.returned = matches.len();

        debug!(candidates = ?trace.candidates, "similarity candidates");
        info!(
            fetched = trace.candidates_fetched,
            after_threshold = trace.after_threshold,
            after_visibility = trace.after_visibility,
            returned = trace.returned,
            "similar cases retrieved"
        );

        (matches, trace)
    }
}
