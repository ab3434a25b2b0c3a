//! Persistence and visibility collaborators.
//!
//! The pipeline hands judgments to a [`JudgmentSink`] and reads past cases
//! through [`CaseLookup`]; who may see which record is decided by a
//! caller-supplied [`VisibilityPredicate`].

use crate::guardrails::GuardrailOutcome;
use crate::judgment::Judgment;
use crate::trace::AnalysisTrace;
use crate::types::Mode;
use crate::vector::{IndexError, Neighbor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable identifier assigned by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub u64);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("case {0} not found")]
    NotFound(CaseId),

    #[error("failed to persist case: {0}")]
    Persist(String),

    #[error("vector index rejected embedding: {0}")]
    Index(#[from] IndexError),
}

/// Everything produced by one pipeline run, ready to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSubmission {
    pub input_text: String,
    pub context: Option<String>,
    /// Owning group; visibility predicates usually key on this.
    pub group: String,
    pub mode: Mode,
    pub judgment: Judgment,
    pub trace: AnalysisTrace,
    /// Guardrail profile outcome.
    pub outcome: GuardrailOutcome,
    /// Validation profile outcome; a skip marker in chat mode.
    pub validation: GuardrailOutcome,
}

/// A persisted case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: CaseId,
    pub created_at: DateTime<Utc>,
    pub input_text: String,
    pub context: Option<String>,
    pub group: String,
    pub mode: Mode,
    pub judgment: Judgment,
    pub trace: AnalysisTrace,
    pub outcome: GuardrailOutcome,
    pub validation: GuardrailOutcome,
}

impl CaseRecord {
    pub fn from_submission(id: CaseId, submission: CaseSubmission) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            input_text: submission.input_text,
            context: submission.context,
            group: submission.group,
            mode: submission.mode,
            judgment: submission.judgment,
            trace: submission.trace,
            outcome: submission.outcome,
            validation: submission.validation,
        }
    }
}

/// Accepts a judgment plus trace and returns a stable identifier.
pub trait JudgmentSink: Send + Sync {
    fn persist(&self, submission: CaseSubmission) -> Result<CaseId, SinkError>;

    /// Attach the embedding of a persisted case.
    fn attach_embedding(&self, id: CaseId, vector: Vec<f32>) -> Result<(), SinkError>;
}

/// Read access to persisted cases and their vectors.
pub trait CaseLookup: Send + Sync {
    fn get(&self, id: CaseId) -> Option<CaseRecord>;

    /// Up to `k` stored cases closest to `query`, ascending by distance.
    fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError>;
}

/// "Can this caller see this record"; supplied by the caller's access layer.
pub type VisibilityPredicate<'a> = dyn Fn(&CaseRecord) -> bool + Send + Sync + 'a;

/// Predicate admitting every record.
pub fn visible_to_all(_: &CaseRecord) -> bool {
    true
}
