//! Individual guardrail checks.

use super::patterns::{
    find_uncertainty, scan_sensitive, UNCERTAINTY_PATTERN, VALIDATION_UNCERTAINTY_PATTERN,
};
use super::{GuardrailCheck, GuardrailOutcome, GuardrailStatus, JudgmentFields, FACTORS_EXPECTED_FROM};
use crate::types::RiskBand;
use regex::Regex;
use tracing::warn;

/// Fail when the text contains identifier-like sensitive data.
pub fn check_pii_leakage(text: &str) -> GuardrailOutcome {
    let hits = scan_sensitive(text);
    if hits.is_empty() {
        return GuardrailOutcome::pass();
    }

    let summary = hits
        .iter()
        .map(|(name, count)| format!("{}:{}", name, count))
        .collect::<Vec<_>>()
        .join(", ");
    // names and counts only
    warn!(patterns = %summary, "sensitive patterns detected in output");
    GuardrailOutcome::new(GuardrailStatus::FailPiiLeakage, format!("Detected: {}", summary))
}

/// Check a score against its claimed label and the factor list.
///
/// With no label the band is derived from the score, so only the factor
/// warning can fire.
pub fn check_score_consistency(score: i64, label: Option<&str>, factors: &[String]) -> GuardrailOutcome {
    if let Some(label) = label {
        let Some(band) = RiskBand::parse(label) else {
            return GuardrailOutcome::new(
                GuardrailStatus::FailInvalidLevel,
                format!("Unknown risk level: {}", label),
            );
        };

        let (lo, hi) = band.range();
        if !(i64::from(lo)..=i64::from(hi)).contains(&score) {
            return GuardrailOutcome::new(
                GuardrailStatus::FailInconsistent,
                format!(
                    "Score {} doesn't match level {} (expected {}-{})",
                    score, band, lo, hi
                ),
            );
        }
    }

    if score >= FACTORS_EXPECTED_FROM && factors.is_empty() {
        return GuardrailOutcome::new(
            GuardrailStatus::WarnNoFactors,
            "High risk score but no risk factors identified",
        );
    }

    GuardrailOutcome::pass()
}

/// Fail short text or text containing an uncertainty phrase.
pub fn check_response_quality(text: &str, min_length: usize) -> GuardrailOutcome {
    quality(text, min_length, &UNCERTAINTY_PATTERN)
}

/// Validate the score range and that a high score lists categories.
pub fn check_score_range(score: i64, categories: &[String]) -> GuardrailOutcome {
    if !(0..=100).contains(&score) {
        return GuardrailOutcome::new(
            GuardrailStatus::FailInvalidScore,
            format!("Score {} is outside valid range 0-100", score),
        );
    }

    if score >= FACTORS_EXPECTED_FROM && categories.is_empty() {
        return GuardrailOutcome::new(
            GuardrailStatus::WarnNoCategories,
            "High score but no categories identified",
        );
    }

    GuardrailOutcome::pass()
}

fn quality(text: &str, min_length: usize, lexicon: &Regex) -> GuardrailOutcome {
    let length = text.trim().chars().count();
    if length < min_length {
        return GuardrailOutcome::new(
            GuardrailStatus::FailLowQuality,
            format!("Response too short: {} chars (min: {})", length, min_length),
        );
    }

    if let Some(phrase) = find_uncertainty(text, lexicon) {
        return GuardrailOutcome::new(
            GuardrailStatus::FailLowQuality,
            format!("Uncertainty detected: '{}'", phrase),
        );
    }

    GuardrailOutcome::pass()
}

pub struct PiiLeakageCheck;

impl GuardrailCheck for PiiLeakageCheck {
    fn name(&self) -> &'static str {
        "pii_leakage"
    }

    fn check(&self, text: &str, _fields: &JudgmentFields<'_>) -> GuardrailOutcome {
        check_pii_leakage(text)
    }
}

/// Skipped when there is no score (chat answers).
pub struct ScoreConsistencyCheck;

impl GuardrailCheck for ScoreConsistencyCheck {
    fn name(&self) -> &'static str {
        "score_consistency"
    }

    fn check(&self, _text: &str, fields: &JudgmentFields<'_>) -> GuardrailOutcome {
        match fields.score {
            Some(score) => check_score_consistency(score, fields.label, fields.factors),
            None => GuardrailOutcome::pass(),
        }
    }
}

pub struct ScoreRangeCheck;

impl GuardrailCheck for ScoreRangeCheck {
    fn name(&self) -> &'static str {
        "score_range"
    }

    fn check(&self, _text: &str, fields: &JudgmentFields<'_>) -> GuardrailOutcome {
        match fields.score {
            Some(score) => check_score_range(score, fields.factors),
            None => GuardrailOutcome::new(GuardrailStatus::FailInvalidScore, "Score is missing"),
        }
    }
}

pub struct ResponseQualityCheck {
    min_length: usize,
    lexicon: &'static Regex,
    reject_empty: bool,
}

impl ResponseQualityCheck {
    /// Guardrail variant: short text and the base uncertainty lexicon.
    pub fn new(min_length: usize) -> Self {
        Self {
            min_length,
            lexicon: &*UNCERTAINTY_PATTERN,
            reject_empty: false,
        }
    }

    /// Validation variant: empty text is its own failure and the lexicon
    /// also covers failure words.
    pub fn strict(min_length: usize) -> Self {
        Self {
            min_length,
            lexicon: &*VALIDATION_UNCERTAINTY_PATTERN,
            reject_empty: true,
        }
    }
}

impl GuardrailCheck for ResponseQualityCheck {
    fn name(&self) -> &'static str {
        "response_quality"
    }

    fn check(&self, text: &str, _fields: &JudgmentFields<'_>) -> GuardrailOutcome {
        if self.reject_empty && text.trim().is_empty() {
            return GuardrailOutcome::new(GuardrailStatus::FailEmpty, "Response is empty");
        }
        quality(text, self.min_length, self.lexicon)
    }
}
