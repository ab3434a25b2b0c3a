//! Core types shared across the pipeline.
//!
//! The banding table lives here so guardrails, fallback synthesis and any
//! caller rendering labels agree on a single mapping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Category marker attached to judgments that need a human to look at them.
pub const MANUAL_REVIEW_REQUIRED: &str = "MANUAL_REVIEW_REQUIRED";

/// Invocation mode.
///
/// `Analysis` produces a scored judgment; `Chat` produces a free-text answer
/// whose score and categories are always empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Analysis,
    Chat,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Analysis => "analysis",
            Mode::Chat => "chat",
        }
    }

    /// Mode string recorded on traces produced by the agent loop.
    pub fn agent_tag(&self) -> &'static str {
        match self {
            Mode::Analysis => "agent_analysis",
            Mode::Chat => "agent_chat",
        }
    }

    pub fn is_chat(&self) -> bool {
        matches!(self, Mode::Chat)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown mode '{0}': expected 'analysis' or 'chat'")]
pub struct ParseModeError(pub String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analysis" => Ok(Mode::Analysis),
            "chat" => Ok(Mode::Chat),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// Severity band derived from a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskBand {
    Low,
    Medium,
    High,
    Critical,
}

/// The banding table: inclusive score range per label.
pub const BANDING_TABLE: [(RiskBand, u8, u8); 4] = [
    (RiskBand::Low, 0, 25),
    (RiskBand::Medium, 26, 50),
    (RiskBand::High, 51, 75),
    (RiskBand::Critical, 76, 100),
];

impl RiskBand {
    pub const ALL: [RiskBand; 4] = [
        RiskBand::Low,
        RiskBand::Medium,
        RiskBand::High,
        RiskBand::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Low => "LOW",
            RiskBand::Medium => "MEDIUM",
            RiskBand::High => "HIGH",
            RiskBand::Critical => "CRITICAL",
        }
    }

    /// Inclusive `(min, max)` score range of this band.
    pub fn range(&self) -> (u8, u8) {
        BANDING_TABLE
            .iter()
            .find(|(band, _, _)| band == self)
            .map(|(_, lo, hi)| (*lo, *hi))
            .unwrap_or((0, 100))
    }

    pub fn contains(&self, score: u8) -> bool {
        let (lo, hi) = self.range();
        (lo..=hi).contains(&score)
    }

    /// Band for a score. Scores above 100 fall into `Critical`.
    pub fn from_score(score: u8) -> RiskBand {
        BANDING_TABLE
            .iter()
            .find(|(_, lo, hi)| (*lo..=*hi).contains(&score))
            .map(|(band, _, _)| *band)
            .unwrap_or(RiskBand::Critical)
    }

    /// Case-insensitive label lookup; `None` for labels outside the table.
    pub fn parse(label: &str) -> Option<RiskBand> {
        let label = label.trim();
        RiskBand::ALL
            .into_iter()
            .find(|band| band.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Truncate to at most `max` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mode_tags() {
        assert_eq!(Mode::Analysis.agent_tag(), "agent_analysis");
        assert_eq!(Mode::Chat.agent_tag(), "agent_chat");
        assert_eq!("CHAT".parse::<Mode>().unwrap(), Mode::Chat);
        assert!("review".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Chat).unwrap(), "\"chat\"");
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(RiskBand::from_score(0), RiskBand::Low);
        assert_eq!(RiskBand::from_score(25), RiskBand::Low);
        assert_eq!(RiskBand::from_score(26), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(50), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(51), RiskBand::High);
        assert_eq!(RiskBand::from_score(75), RiskBand::High);
        assert_eq!(RiskBand::from_score(76), RiskBand::Critical);
        assert_eq!(RiskBand::from_score(100), RiskBand::Critical);
    }

    #[test]
    fn test_band_parse_is_case_insensitive() {
        assert_eq!(RiskBand::parse(" critical "), Some(RiskBand::Critical));
        assert_eq!(RiskBand::parse("SEVERE"), None);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("ééééé", 2), "éé...");
    }

    proptest! {
        #[test]
        fn banding_is_total_and_consistent(score in 0u8..=100) {
            let band = RiskBand::from_score(score);
            prop_assert!(band.contains(score));
            let owners = RiskBand::ALL.iter().filter(|b| b.contains(score)).count();
            prop_assert_eq!(owners, 1);
        }
    }
}
