//! Parsing generated text into a [`Judgment`].

use super::schema::validate_judgment_schema;
use crate::types::{Mode, RiskBand, MANUAL_REVIEW_REQUIRED};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Generated text that does not satisfy the judgment contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid judgment format: {reason}")]
pub struct FormatError {
    pub reason: String,
    /// The offending text, exactly as received.
    pub raw: String,
}

impl FormatError {
    fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

/// Canonical structured judgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    /// 0-100; absent in chat mode.
    pub score: Option<u8>,

    /// Label claimed by the model. Checked against the score, never trusted.
    /// `risk_level` in the raw text is read as this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub categories: Vec<String>,

    pub reasoning: String,

    #[serde(default)]
    pub processed_content: Option<String>,

    #[serde(default)]
    pub tools_used: Option<Vec<String>>,
}

impl Judgment {
    /// Parse raw generated text for the given mode.
    ///
    /// Code fences are stripped and a legacy `summary` key is renamed to
    /// `reasoning`. In chat mode score, label and categories are cleared no
    /// matter what the text claims.
    pub fn parse(raw: &str, mode: Mode) -> Result<Self, FormatError> {
        let cleaned = strip_code_fences(raw);
        let mut value: Value = serde_json::from_str(cleaned)
            .map_err(|e| FormatError::new(format!("not valid JSON: {}", e), raw))?;

        let object = value
            .as_object_mut()
            .ok_or_else(|| FormatError::new("expected a JSON object", raw))?;
        normalize(object, mode);

        validate_judgment_schema(&value).map_err(|errors| FormatError::new(errors.join("; "), raw))?;

        let judgment: Judgment = serde_json::from_value(value)
            .map_err(|e| FormatError::new(format!("unexpected shape: {}", e), raw))?;

        if mode == Mode::Analysis && judgment.score.is_none() {
            return Err(FormatError::new("analysis mode requires a numeric score", raw));
        }

        Ok(judgment)
    }

    /// Conversational answer with no score.
    pub fn chat(reasoning: impl Into<String>) -> Self {
        Self {
            score: None,
            label: None,
            categories: Vec::new(),
            reasoning: reasoning.into(),
            processed_content: None,
            tools_used: None,
        }
    }

    /// Band derived from the score.
    pub fn band(&self) -> Option<RiskBand> {
        self.score.map(RiskBand::from_score)
    }

    /// The claimed label, or the derived band when none was given.
    pub fn effective_label(&self) -> Option<String> {
        self.label
            .clone()
            .or_else(|| self.band().map(|band| band.as_str().to_string()))
    }

    pub fn requires_manual_review(&self) -> bool {
        self.categories.iter().any(|c| c == MANUAL_REVIEW_REQUIRED)
    }

    /// Canonical JSON payload.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn normalize(object: &mut Map<String, Value>, mode: Mode) {
    if !object.contains_key("reasoning") {
        if let Some(summary) = object.remove("summary") {
            object.insert("reasoning".to_string(), summary);
        }
    }

    // `label` wins when both are present
    if let Some(level) = object.remove("risk_level") {
        if !object.contains_key("label") {
            object.insert("label".to_string(), level);
        }
    }

    if mode.is_chat() {
        object.insert("score".to_string(), Value::Null);
        object.insert("categories".to_string(), Value::Array(Vec::new()));
        object.remove("label");
    }
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_plain_judgment() {
        let raw = r#"{"score": 15, "categories": [], "reasoning": "Routine payment.", "processed_content": null, "tools_used": null}"#;
        let judgment = Judgment::parse(raw, Mode::Analysis).unwrap();
        assert_eq!(judgment.score, Some(15));
        assert_eq!(judgment.band(), Some(RiskBand::Low));
        assert_eq!(judgment.effective_label().as_deref(), Some("LOW"));
    }

    #[test]
    fn test_parse_strips_fences() {
        let raw = "```json\n{\"score\": 80, \"categories\": [\"SANCTIONS_MATCH\"], \"reasoning\": \"hit\"}\n```";
        let judgment = Judgment::parse(raw, Mode::Analysis).unwrap();
        assert_eq!(judgment.score, Some(80));

        let bare = "```\n{\"score\": 1, \"reasoning\": \"x\"}\n```";
        assert!(Judgment::parse(bare, Mode::Analysis).is_ok());
    }

    #[test]
    fn test_summary_renamed_to_reasoning() {
        let raw = r#"{"score": 30, "categories": [], "summary": "legacy field"}"#;
        let judgment = Judgment::parse(raw, Mode::Analysis).unwrap();
        assert_eq!(judgment.reasoning, "legacy field");
    }

    #[test]
    fn test_reasoning_wins_over_summary() {
        let raw = r#"{"score": 30, "summary": "old", "reasoning": "new"}"#;
        let judgment = Judgment::parse(raw, Mode::Analysis).unwrap();
        assert_eq!(judgment.reasoning, "new");
    }

    #[test]
    fn test_risk_level_alias() {
        let raw = r#"{"score": 90, "risk_level": "CRITICAL", "categories": ["X"], "reasoning": "r"}"#;
        let judgment = Judgment::parse(raw, Mode::Analysis).unwrap();
        assert_eq!(judgment.label.as_deref(), Some("CRITICAL"));
    }

    #[test]
    fn test_label_and_risk_level_together() {
        let raw = r#"{"score": 90, "label": "CRITICAL", "risk_level": "HIGH", "categories": ["X"], "reasoning": "r"}"#;
        let judgment = Judgment::parse(raw, Mode::Analysis).unwrap();
        assert_eq!(judgment.label.as_deref(), Some("CRITICAL"));
        assert!(!judgment.to_json().unwrap().contains("risk_level"));
    }

    #[test]
    fn test_chat_mode_forces_empty_score() {
        let raw = r#"{"score": 99, "label": "CRITICAL", "categories": ["FRAUD"], "reasoning": "Hello there"}"#;
        let judgment = Judgment::parse(raw, Mode::Chat).unwrap();
        assert_eq!(judgment.score, None);
        assert_eq!(judgment.label, None);
        assert!(judgment.categories.is_empty());
        assert_eq!(judgment.reasoning, "Hello there");
    }

    #[test]
    fn test_chat_mode_tolerates_malformed_score() {
        let raw = r#"{"score": "very high", "reasoning": "Sure, here you go."}"#;
        assert!(Judgment::parse(raw, Mode::Chat).is_ok());
        assert!(Judgment::parse(raw, Mode::Analysis).is_err());
    }

    #[test]
    fn test_format_error_keeps_raw_text() {
        let raw = "I think this is low risk.";
        let err = Judgment::parse(raw, Mode::Analysis).unwrap_err();
        assert_eq!(err.raw, raw);
    }

    #[test]
    fn test_schema_violations_rejected() {
        assert!(Judgment::parse(r#"{"score": 150, "reasoning": "x"}"#, Mode::Analysis).is_err());
        assert!(Judgment::parse(r#"{"score": 50}"#, Mode::Analysis).is_err());
        assert!(Judgment::parse(r#"[1, 2]"#, Mode::Analysis).is_err());
    }

    #[test]
    fn test_analysis_requires_score() {
        let err = Judgment::parse(r#"{"score": null, "reasoning": "x"}"#, Mode::Analysis).unwrap_err();
        assert!(err.reason.contains("numeric score"));
    }

    #[test]
    fn test_manual_review_marker() {
        let raw = r#"{"score": 50, "categories": ["MANUAL_REVIEW_REQUIRED"], "reasoning": "x"}"#;
        assert!(Judgment::parse(raw, Mode::Analysis).unwrap().requires_manual_review());
    }

    fn arb_judgment() -> impl Strategy<Value = Judgment> {
        (
            0u8..=100,
            proptest::option::of(prop_oneof![
                Just("LOW"),
                Just("MEDIUM"),
                Just("HIGH"),
                Just("CRITICAL"),
            ]),
            proptest::collection::vec("[A-Z_]{1,12}", 0..4),
            ".{0,80}",
            proptest::option::of(".{0,40}"),
            proptest::option::of(proptest::collection::vec("[a-z_]{1,20}", 0..3)),
        )
            .prop_map(|(score, label, categories, reasoning, processed_content, tools_used)| {
                Judgment {
                    score: Some(score),
                    label: label.map(str::to_string),
                    categories,
                    reasoning,
                    processed_content,
                    tools_used,
                }
            })
    }

    proptest! {
        #[test]
        fn parse_inverts_serialize(judgment in arb_judgment()) {
            let text = judgment.to_json().unwrap();
            let parsed = Judgment::parse(&text, Mode::Analysis).unwrap();
            prop_assert_eq!(parsed, judgment);
        }

        #[test]
        fn chat_parse_always_clears_score(score in 0u8..=100, reasoning in ".{0,40}") {
            let text = serde_json::json!({
                "score": score,
                "categories": ["A", "B"],
                "reasoning": reasoning,
            })
            .to_string();
            let parsed = Judgment::parse(&text, Mode::Chat).unwrap();
            prop_assert_eq!(parsed.score, None);
            prop_assert!(parsed.categories.is_empty());
        }
    }
}
