//! # verdict-core
//!
//! Deterministic building blocks of the verdict analysis pipeline.
//!
//! Nothing in this crate talks to the network:
//! - [`judgment`]: the Structured Judgment and the parser enforcing its JSON contract
//! - [`guardrails`]: ordered post-hoc checks producing an advisory outcome
//! - [`tools`]: pure tools the agent may call, plus their severity signals
//! - [`trace`]: the audit record of one invocation
//! - [`vector`]: cosine math and the vector index interface
//! - [`store`]: persistence and visibility collaborators
//!
//! ## Example
//!
//! ```rust,ignore
//! use verdict_core::{GuardrailEvaluator, Judgment, Mode};
//!
//! let judgment = Judgment::parse(raw_model_text, Mode::Analysis)?;
//! let outcome = GuardrailEvaluator::default().evaluate_judgment(&judgment);
//! println!("{} -> {}", judgment.score.unwrap_or_default(), outcome.status);
//! ```

pub mod guardrails;
pub mod judgment;
pub mod store;
pub mod tools;
pub mod trace;
pub mod types;
pub mod vector;

pub use guardrails::{GuardrailEvaluator, GuardrailOutcome, GuardrailStatus, JudgmentFields};
pub use judgment::{FormatError, Judgment};
pub use store::{
    visible_to_all, CaseId, CaseLookup, CaseRecord, CaseSubmission, JudgmentSink, SinkError,
    VisibilityPredicate,
};
pub use tools::{SeveritySignal, Tool, ToolDefinition, ToolError, ToolRegistry};
pub use trace::{
    AnalysisTrace, IterationAction, IterationRecord, ToolCallRecord, ToolStatus, TraceOutcome,
    MAX_ITERATIONS_EXCEEDED,
};
pub use types::{Mode, RiskBand, BANDING_TABLE, MANUAL_REVIEW_REQUIRED};
pub use vector::{cosine_distance, similarity_percent, FlatIndex, IndexError, Neighbor, VectorIndex};
