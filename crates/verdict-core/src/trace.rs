//! Audit trace of a single agent invocation.
//!
//! A trace is opened when an invocation starts, appended to once per
//! provider call, and finalized exactly once. [`AnalysisTrace::finish`]
//! consumes the open trace, so a finalized trace cannot be appended to.

use crate::types::truncate_chars;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const INPUT_ECHO_CHARS: usize = 500;
const CONTEXT_ECHO_CHARS: usize = 200;
const CONTENT_PREVIEW_CHARS: usize = 500;

/// Error tag recorded when the iteration ceiling is reached.
pub const MAX_ITERATIONS_EXCEEDED: &str = "max_iterations_exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

/// One executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: ToolStatus,
}

impl ToolCallRecord {
    pub fn success(tool: impl Into<String>, arguments: Value, result: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            result: Some(result),
            error: None,
            status: ToolStatus::Success,
        }
    }

    pub fn failure(tool: impl Into<String>, arguments: Value, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            result: None,
            error: Some(error.into()),
            status: ToolStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// What a single provider call led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationAction {
    /// Single non-tool completion (no tools registered).
    Completion,
    /// The model requested tools; they ran.
    ToolCalls,
    /// Final content parsed successfully.
    FinalAnswer,
    /// Final content failed to parse; a corrective message was sent.
    CorrectiveReprompt,
    /// Final content failed to parse again.
    FormatFailure,
    /// Empty content after tools ran; the model was asked to conclude.
    ResultNudge,
    /// Empty content with no tool ever called.
    EmptyResponse,
    /// The provider call itself failed.
    ProviderFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based.
    pub index: u32,
    pub action: IterationAction,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
}

impl IterationRecord {
    pub fn new(index: u32, action: IterationAction) -> Self {
        Self {
            index,
            action,
            tool_calls: Vec::new(),
            content_preview: None,
        }
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        if !content.is_empty() {
            self.content_preview = Some(truncate_chars(content, CONTENT_PREVIEW_CHARS));
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOutcome {
    Normal,
    Fallback,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEcho {
    pub input_text: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl UsageTotals {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTrace {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub model: String,
    pub mode: String,
    pub input: InputEcho,
    pub tool_calls: Vec<ToolCallRecord>,
    pub iterations: Vec<IterationRecord>,
    pub total_iterations: u32,
    pub outcome: Option<TraceOutcome>,
    pub error: Option<String>,
    #[serde(default)]
    pub usage: UsageTotals,
}

impl AnalysisTrace {
    /// Open a trace. Input and context are truncated for the echo.
    pub fn start(
        model: impl Into<String>,
        mode: impl Into<String>,
        input: &str,
        context: Option<&str>,
    ) -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            model: model.into(),
            mode: mode.into(),
            input: InputEcho {
                input_text: truncate_chars(input, INPUT_ECHO_CHARS),
                context: context.map(|c| truncate_chars(c, CONTEXT_ECHO_CHARS)),
            },
            tool_calls: Vec::new(),
            iterations: Vec::new(),
            total_iterations: 0,
            outcome: None,
            error: None,
            usage: UsageTotals::default(),
        }
    }

    /// Append one provider call. Its tool calls are also added to the flat list.
    pub fn record_iteration(&mut self, record: IterationRecord) {
        debug_assert!(self.outcome.is_none(), "trace already finalized");
        self.total_iterations = self.total_iterations.max(record.index);
        self.tool_calls.extend(record.tool_calls.iter().cloned());
        self.iterations.push(record);
    }

    pub fn add_usage(&mut self, prompt_tokens: u32, completion_tokens: u32) {
        self.usage.prompt_tokens += prompt_tokens;
        self.usage.completion_tokens += completion_tokens;
    }

    /// Names of every tool the model asked for, failed calls included, in
    /// first-use order, deduplicated.
    pub fn tools_used(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for call in &self.tool_calls {
            if !names.contains(&call.tool) {
                names.push(call.tool.clone());
            }
        }
        names
    }

    /// Finalize with a terminal outcome.
    pub fn finish(mut self, outcome: TraceOutcome, error: Option<String>) -> Self {
        self.completed_at = Some(Utc::now());
        self.outcome = Some(outcome);
        self.error = error;
        self
    }

    pub fn is_finalized(&self) -> bool {
        self.outcome.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_echo_truncated() {
        let input = "x".repeat(800);
        let context = "c".repeat(300);
        let trace = AnalysisTrace::start("openai/gpt-4o", "agent_analysis", &input, Some(&context));
        assert_eq!(trace.input.input_text.chars().count(), 503);
        assert_eq!(trace.input.context.as_ref().map(|c| c.chars().count()), Some(203));
    }

    #[test]
    fn test_record_iteration_counts_and_flattens() {
        let mut trace = AnalysisTrace::start("m", "agent_analysis", "in", None);
        let call = ToolCallRecord::success("calculate", json!({"expression": "1+1"}), json!({"result": 2}));
        trace.record_iteration(IterationRecord::new(1, IterationAction::ToolCalls).with_tool_calls(vec![call]));
        trace.record_iteration(IterationRecord::new(2, IterationAction::FinalAnswer).with_content("{}"));

        assert_eq!(trace.total_iterations, 2);
        assert_eq!(trace.tool_calls.len(), 1);
        assert_eq!(trace.tools_used(), vec!["calculate".to_string()]);
    }

    #[test]
    fn test_tools_used_keeps_failed_calls() {
        let mut trace = AnalysisTrace::start("m", "agent_analysis", "in", None);
        let calls = vec![
            ToolCallRecord::failure("nope", json!({}), "unknown tool"),
            ToolCallRecord::success("calculate", json!({}), json!({})),
            ToolCallRecord::success("calculate", json!({}), json!({})),
        ];
        trace.record_iteration(IterationRecord::new(1, IterationAction::ToolCalls).with_tool_calls(calls));
        assert_eq!(trace.tools_used(), vec!["nope".to_string(), "calculate".to_string()]);
    }

    #[test]
    fn test_finish_sets_outcome() {
        let trace = AnalysisTrace::start("m", "agent_chat", "in", None)
            .finish(TraceOutcome::Fallback, Some(MAX_ITERATIONS_EXCEEDED.to_string()));
        assert!(trace.is_finalized());
        assert!(trace.completed_at.is_some());

        let payload = serde_json::to_value(&trace).unwrap();
        assert_eq!(payload["error"], "max_iterations_exceeded");
        assert_eq!(payload["outcome"], "fallback");
    }

    #[test]
    fn test_tool_record_serialization_shape() {
        let ok = serde_json::to_value(ToolCallRecord::success("t", json!({"a": 1}), json!(true))).unwrap();
        assert_eq!(ok["status"], "success");
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(ToolCallRecord::failure("t", json!({}), "boom")).unwrap();
        assert_eq!(err["status"], "error");
        assert!(err.get("result").is_none());
    }
}
