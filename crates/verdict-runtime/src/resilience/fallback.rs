//! Fallback synthesis when the agent loop does not converge.
//!
//! The judgment is built only from tool results already in the trace, so
//! it is deterministic given the same tool activity.

use verdict_core::{
    AnalysisTrace, Judgment, Mode, RiskBand, SeveritySignal, ToolRegistry, MANUAL_REVIEW_REQUIRED,
};

/// Score used when no tool produced a severity signal.
pub const FALLBACK_SCORE: u8 = 50;

pub const ANALYSIS_FALLBACK_REASONING: &str =
    "Analysis incomplete - max iterations exceeded. Manual review required.";

pub const CHAT_FALLBACK_REASONING: &str =
    "I apologize, but I couldn't complete your request. Please try again or rephrase your question.";

/// Severity signals of every successful tool call, in call order.
pub fn collect_signals(registry: &ToolRegistry, trace: &AnalysisTrace) -> Vec<SeveritySignal> {
    trace
        .tool_calls
        .iter()
        .filter(|call| call.is_success())
        .filter_map(|call| {
            call.result
                .as_ref()
                .and_then(|output| registry.severity(&call.tool, output))
        })
        .collect()
}

/// Build a usable judgment from the tool evidence gathered so far.
///
/// Analysis mode takes the maximum severity across tool outputs as the
/// score, lists the contributing factors and always carries
/// [`MANUAL_REVIEW_REQUIRED`]. Chat mode returns an apology with no score.
pub fn synthesize_fallback(registry: &ToolRegistry, trace: &AnalysisTrace, mode: Mode) -> Judgment {
    let tools_used = Some(trace.tools_used());

    if mode.is_chat() {
        return Judgment {
            tools_used,
            ..Judgment::chat(CHAT_FALLBACK_REASONING)
        };
    }

    let signals = collect_signals(registry, trace);
    let score = signals
        .iter()
        .map(|s| s.score)
        .max()
        .unwrap_or(FALLBACK_SCORE);

    let mut categories = vec![MANUAL_REVIEW_REQUIRED.to_string()];
    for signal in &signals {
        if !categories.contains(&signal.factor) {
            categories.push(signal.factor.clone());
        }
    }

    let reasoning = if signals.is_empty() {
        ANALYSIS_FALLBACK_REASONING.to_string()
    } else {
        format!(
            "{} Highest tool severity {} from: {}.",
            ANALYSIS_FALLBACK_REASONING,
            score,
            categories[1..].join(", ")
        )
    };

    Judgment {
        score: Some(score),
        label: Some(RiskBand::from_score(score).as_str().to_string()),
        categories,
        reasoning,
        processed_content: None,
        tools_used,
    }
}
