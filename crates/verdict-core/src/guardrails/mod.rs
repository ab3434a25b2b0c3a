//! Deterministic post-hoc safety checks.
//!
//! Checks run in a fixed order and the first failure wins. Outcomes are
//! advisory: they are recorded next to a judgment and never alter it.

mod checks;
mod evaluator;
pub mod patterns;

pub use checks::{
    check_pii_leakage, check_response_quality, check_score_consistency, check_score_range,
    PiiLeakageCheck, ResponseQualityCheck, ScoreConsistencyCheck, ScoreRangeCheck,
};
pub use evaluator::GuardrailEvaluator;

use crate::judgment::Judgment;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Score at or above which an empty factor list draws a warning.
pub const FACTORS_EXPECTED_FROM: i64 = 50;

/// Default minimum length of acceptable reasoning text.
pub const DEFAULT_MIN_LENGTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardrailStatus {
    Pass,
    FailPiiLeakage,
    FailInconsistent,
    FailInvalidLevel,
    WarnNoFactors,
    FailLowQuality,
    FailEmpty,
    FailInvalidScore,
    WarnNoCategories,
}

impl GuardrailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailStatus::Pass => "PASS",
            GuardrailStatus::FailPiiLeakage => "FAIL_PII_LEAKAGE",
            GuardrailStatus::FailInconsistent => "FAIL_INCONSISTENT",
            GuardrailStatus::FailInvalidLevel => "FAIL_INVALID_LEVEL",
            GuardrailStatus::WarnNoFactors => "WARN_NO_FACTORS",
            GuardrailStatus::FailLowQuality => "FAIL_LOW_QUALITY",
            GuardrailStatus::FailEmpty => "FAIL_EMPTY",
            GuardrailStatus::FailInvalidScore => "FAIL_INVALID_SCORE",
            GuardrailStatus::WarnNoCategories => "WARN_NO_CATEGORIES",
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, GuardrailStatus::Pass)
    }

    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            GuardrailStatus::WarnNoFactors | GuardrailStatus::WarnNoCategories
        )
    }

    pub fn is_failure(&self) -> bool {
        !self.is_pass() && !self.is_warning()
    }
}

impl fmt::Display for GuardrailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus optional human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailOutcome {
    pub status: GuardrailStatus,
    #[serde(default)]
    pub details: Option<String>,
}

impl GuardrailOutcome {
    pub fn pass() -> Self {
        Self {
            status: GuardrailStatus::Pass,
            details: None,
        }
    }

    pub fn new(status: GuardrailStatus, details: impl Into<String>) -> Self {
        Self {
            status,
            details: Some(details.into()),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status.is_pass()
    }
}

/// The judgment fields a check may look at besides the text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JudgmentFields<'a> {
    /// Wider than a judgment score so out-of-range input can be reported.
    pub score: Option<i64>,
    pub label: Option<&'a str>,
    pub factors: &'a [String],
}

impl<'a> From<&'a Judgment> for JudgmentFields<'a> {
    fn from(judgment: &'a Judgment) -> Self {
        Self {
            score: judgment.score.map(i64::from),
            label: judgment.label.as_deref(),
            factors: &judgment.categories,
        }
    }
}

/// A single ordered guardrail check.
pub trait GuardrailCheck: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, text: &str, fields: &JudgmentFields<'_>) -> GuardrailOutcome;
}
