//! Ordered evaluation of guardrail checks.

use super::checks::{PiiLeakageCheck, ResponseQualityCheck, ScoreConsistencyCheck, ScoreRangeCheck};
use super::{GuardrailCheck, GuardrailOutcome, GuardrailStatus, JudgmentFields, DEFAULT_MIN_LENGTH};
use crate::judgment::Judgment;
use crate::types::Mode;
use tracing::debug;

/// Runs checks in order and stops at the first outcome that is not a pass,
/// warnings included.
pub struct GuardrailEvaluator {
    checks: Vec<Box<dyn GuardrailCheck>>,
}

impl GuardrailEvaluator {
    pub fn new(checks: Vec<Box<dyn GuardrailCheck>>) -> Self {
        Self { checks }
    }

    /// Sensitive-pattern leak, then banding consistency, then quality.
    pub fn guardrails(min_length: usize) -> Self {
        Self::new(vec![
            Box::new(PiiLeakageCheck),
            Box::new(ScoreConsistencyCheck),
            Box::new(ResponseQualityCheck::new(min_length)),
        ])
    }

    /// Score range and categories, then strict quality. No PII check, no label.
    pub fn validation(min_length: usize) -> Self {
        Self::new(vec![
            Box::new(ScoreRangeCheck),
            Box::new(ResponseQualityCheck::strict(min_length)),
        ])
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn evaluate(&self, text: &str, fields: &JudgmentFields<'_>) -> GuardrailOutcome {
        for check in &self.checks {
            let outcome = check.check(text, fields);
            debug!(check = check.name(), status = %outcome.status, "guardrail check");

            if !outcome.is_pass() {
                return outcome;
            }
        }

        GuardrailOutcome::pass()
    }

    /// Evaluate a judgment's reasoning together with its fields.
    pub fn evaluate_judgment(&self, judgment: &Judgment) -> GuardrailOutcome {
        self.evaluate(&judgment.reasoning, &JudgmentFields::from(judgment))
    }

    /// Like [`evaluate`](Self::evaluate), but chat answers are not validated.
    pub fn validate(&self, text: &str, fields: &JudgmentFields<'_>, mode: Mode) -> GuardrailOutcome {
        if mode.is_chat() {
            return GuardrailOutcome::new(GuardrailStatus::Pass, "Chat mode - validation skipped");
        }
        self.evaluate(text, fields)
    }

    pub fn validate_judgment(&self, judgment: &Judgment, mode: Mode) -> GuardrailOutcome {
        self.validate(&judgment.reasoning, &JudgmentFields::from(judgment), mode)
    }
}

impl Default for GuardrailEvaluator {
    fn default() -> Self {
        Self::guardrails(DEFAULT_MIN_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLID_REASONING: &str =
        "Counterparty matches an entry on the sanctions reference list; transaction must be blocked.";

    fn judgment(score: u8, label: Option<&str>, categories: &[&str], reasoning: &str) -> Judgment {
        Judgment {
            score: Some(score),
            label: label.map(str::to_string),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            reasoning: reasoning.to_string(),
            processed_content: None,
            tools_used: None,
        }
    }

    #[test]
    fn test_consistent_judgment_passes() {
        let evaluator = GuardrailEvaluator::default();
        let j = judgment(92, Some("CRITICAL"), &["SANCTIONS_MATCH"], SOLID_REASONING);
        assert_eq!(evaluator.evaluate_judgment(&j), GuardrailOutcome::pass());
    }

    #[test]
    fn test_pii_wins_over_everything() {
        let evaluator = GuardrailEvaluator::default();
        let j = judgment(
            80,
            Some("LOW"),
            &[],
            "Send the report to analyst@bank.example so it can be reviewed quickly please.",
        );
        assert_eq!(evaluator.evaluate_judgment(&j).status, GuardrailStatus::FailPiiLeakage);
    }

    #[test]
    fn test_warning_stops_evaluation() {
        let evaluator = GuardrailEvaluator::default();
        let j = judgment(60, Some("HIGH"), &[], "short");
        assert_eq!(evaluator.evaluate_judgment(&j).status, GuardrailStatus::WarnNoFactors);

        let j = judgment(60, Some("HIGH"), &["CASH"], "short");
        assert_eq!(evaluator.evaluate_judgment(&j).status, GuardrailStatus::FailLowQuality);

        let j = judgment(60, Some("HIGH"), &[], SOLID_REASONING);
        assert_eq!(evaluator.evaluate_judgment(&j).status, GuardrailStatus::WarnNoFactors);
    }

    #[test]
    fn test_chat_answer_skips_consistency() {
        let evaluator = GuardrailEvaluator::default();
        let answer = Judgment::chat("Here is a general explanation of how wire transfers are screened.");
        assert!(evaluator.evaluate_judgment(&answer).is_pass());
    }

    #[test]
    fn test_validation_profile() {
        let evaluator = GuardrailEvaluator::validation(DEFAULT_MIN_LENGTH);
        assert_eq!(evaluator.check_names(), vec!["score_range", "response_quality"]);

        let j = judgment(70, None, &[], SOLID_REASONING);
        assert_eq!(evaluator.validate_judgment(&j, Mode::Analysis).status, GuardrailStatus::WarnNoCategories);

        let skipped = evaluator.validate_judgment(&j, Mode::Chat);
        assert!(skipped.is_pass());
        assert_eq!(skipped.details.as_deref(), Some("Chat mode - validation skipped"));
    }

    #[test]
    fn test_validate_raw_fields_skips_chat() {
        let evaluator = GuardrailEvaluator::validation(DEFAULT_MIN_LENGTH);
        let fields = JudgmentFields::default();
        // no score at all fails validation unless the mode is chat
        assert_eq!(
            evaluator.validate("short", &fields, Mode::Analysis).status,
            GuardrailStatus::FailInvalidScore
        );
        assert!(evaluator.validate("short", &fields, Mode::Chat).is_pass());
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let evaluator = GuardrailEvaluator::default();
        let j = judgment(30, Some("HIGH"), &["X"], SOLID_REASONING);
        let first = evaluator.evaluate_judgment(&j);
        let second = evaluator.evaluate_judgment(&j);
        assert_eq!(first, second);
        assert_eq!(first.status, GuardrailStatus::FailInconsistent);
    }
}
