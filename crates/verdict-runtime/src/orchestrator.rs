//! Agent Orchestrator: the bounded tool-calling loop.
//!
//! One invocation walks an explicit state machine:
//!
//! ```text
//! Collecting ──tool calls──▶ ExecutingTools ──▶ Collecting
//! Collecting ──content────▶ Parsing ──ok──▶ Done
//!                            Parsing ──format error (once)──▶ Collecting
//! Collecting ──empty, no tool ever called──▶ Error
//! Collecting ──iteration ceiling──▶ FallbackSynthesis ──▶ Done
//! ```
//!
//! Every provider call adds exactly one [`IterationRecord`] to the trace,
//! and the trace is returned on every exit path, errors included.

use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use verdict_core::{
    AnalysisTrace, IterationAction, IterationRecord, Judgment, Mode, ToolCallRecord,
    ToolDefinition, ToolRegistry, TraceOutcome, MAX_ITERATIONS_EXCEEDED,
};

use crate::config::{AgentConfig, RuntimeConfig};
use crate::prompts;
use crate::providers::{ChatMessage, ProviderAdapter, ProviderError, ToolCall};
use crate::resilience::synthesize_fallback;

/// States of one orchestrator invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Collecting,
    ExecutingTools,
    Parsing,
    FallbackSynthesis,
    Done,
    Error,
}

/// Why an invocation ended without a judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Backend failure after the retry policy gave up.
    Provider,
    /// The reply failed the output contract again after the corrective re-prompt.
    Format,
    /// Empty reply before any tool was ever called.
    EmptyResponse,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Provider => write!(f, "provider"),
            FailureKind::Format => write!(f, "format"),
            FailureKind::EmptyResponse => write!(f, "empty response"),
        }
    }
}

/// Fatal invocation failure. The finalized trace travels with it.
#[derive(Error, Debug)]
#[error("{kind} failure: {message}")]
pub struct AgentFailure {
    pub kind: FailureKind,
    pub message: String,
    pub trace: AnalysisTrace,
}

/// A judgment plus the finalized trace that produced it.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub judgment: Judgment,
    pub trace: AnalysisTrace,
}

impl AgentOutcome {
    /// Whether the judgment came from fallback synthesis.
    pub fn is_fallback(&self) -> bool {
        self.trace.outcome == Some(TraceOutcome::Fallback)
    }
}

/// Drives the provider and the tools to a judgment.
///
/// Holds no per-invocation state, so one orchestrator may serve many
/// concurrent invocations.
#[derive(Debug, Clone)]
pub struct AgentOrchestrator {
    adapter: ProviderAdapter,
    tools: ToolRegistry,
    config: AgentConfig,
}

/// Mutable state owned by a single invocation.
struct Invocation {
    mode: Mode,
    agentic: bool,
    messages: Vec<ChatMessage>,
    trace: AnalysisTrace,
    iteration: u32,
    corrections_left: u32,
    pending_calls: Vec<ToolCall>,
    pending_content: String,
    judgment: Option<Judgment>,
    fell_back: bool,
    failure: Option<(FailureKind, String)>,
}

impl Invocation {
    fn record(&self, action: IterationAction) -> IterationRecord {
        IterationRecord::new(self.iteration, action)
    }

    fn fail(&mut self, kind: FailureKind, message: String) -> AgentState {
        self.failure = Some((kind, message));
        AgentState::Error
    }
}

impl AgentOrchestrator {
    pub fn new(adapter: ProviderAdapter, tools: ToolRegistry, config: AgentConfig) -> Self {
        Self {
            adapter,
            tools,
            config,
        }
    }

    /// Configured backend with the built-in tools.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ProviderError> {
        Ok(Self::new(
            ProviderAdapter::from_config(config)?,
            ToolRegistry::with_defaults(),
            config.agent.clone(),
        ))
    }

    pub fn adapter(&self) -> &ProviderAdapter {
        &self.adapter
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn agentic(&self) -> bool {
        self.config.use_tools && !self.tools.is_empty()
    }

    /// Run one invocation to a judgment or a fatal failure.
    pub async fn run(
        &self,
        input: &str,
        context: Option<&str>,
        mode: Mode,
    ) -> Result<AgentOutcome, AgentFailure> {
        let agentic = self.agentic();
        let trace_mode = if agentic { mode.agent_tag() } else { mode.as_str() };
        let trace = AnalysisTrace::start(self.adapter.model_version(), trace_mode, input, context);

        let messages = vec![
            ChatMessage::system(prompts::system_prompt(mode, self.config.system_prompt.as_deref())),
            ChatMessage::user(prompts::user_message(input, context, mode, agentic)),
        ];

        let mut run = Invocation {
            mode,
            agentic,
            messages,
            trace,
            iteration: 0,
            corrections_left: self.config.corrective_reprompts,
            pending_calls: Vec::new(),
            pending_content: String::new(),
            judgment: None,
            fell_back: false,
            failure: None,
        };

        info!(mode = %mode, agentic, model = %run.trace.model, "analysis started");

        if agentic {
            self.drive(&mut run).await;
        } else {
            self.single_completion(&mut run).await;
        }

        self.finish(run)
    }

    /// No tools: one plain completion, parsed once.
    async fn single_completion(&self, run: &mut Invocation) {
        run.iteration = 1;
        let response = match self
            .adapter
            .complete(&run.messages, self.config.temperature, self.config.max_tokens)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let record = run.record(IterationAction::ProviderFailure).with_content(&e.to_string());
                run.trace.record_iteration(record);
                run.fail(FailureKind::Provider, e.to_string());
                return;
            }
        };

        run.trace
            .add_usage(response.usage.prompt_tokens, response.usage.completion_tokens);

        if response.content.trim().is_empty() {
            let record = run.record(IterationAction::EmptyResponse);
            run.trace.record_iteration(record);
            run.fail(FailureKind::EmptyResponse, "backend returned an empty response".to_string());
            return;
        }

        match Judgment::parse(&response.content, run.mode) {
            Ok(judgment) => {
                let record = run.record(IterationAction::Completion).with_content(&response.content);
                run.trace.record_iteration(record);
                run.judgment = Some(judgment);
            }
            Err(e) => {
                let record = run.record(IterationAction::FormatFailure).with_content(&response.content);
                run.trace.record_iteration(record);
                run.fail(FailureKind::Format, e.to_string());
            }
        }
    }

    /// The bounded agent loop.
    async fn drive(&self, run: &mut Invocation) {
        let definitions = self.tools.definitions();
        let mut state = AgentState::Collecting;

        loop {
            debug!(state = ?state, iteration = run.iteration, "agent step");
            state = match state {
                AgentState::Collecting => self.collect(run, &definitions).await,
                AgentState::ExecutingTools => self.execute_tools(run),
                AgentState::Parsing => self.parse(run),
                AgentState::FallbackSynthesis => {
                    warn!(
                        max_iterations = self.config.max_iterations,
                        tool_calls = run.trace.tool_calls.len(),
                        "agent loop exceeded iteration ceiling, synthesizing fallback"
                    );
                    run.judgment = Some(synthesize_fallback(&self.tools, &run.trace, run.mode));
                    run.fell_back = true;
                    AgentState::Done
                }
                AgentState::Done | AgentState::Error => return,
            };
        }
    }

    async fn collect(&self, run: &mut Invocation, definitions: &[ToolDefinition]) -> AgentState {
        if run.iteration >= self.config.max_iterations {
            return AgentState::FallbackSynthesis;
        }
        run.iteration += 1;

        let response = match self
            .adapter
            .complete_with_tools(
                &run.messages,
                definitions,
                self.config.temperature,
                self.config.max_tokens,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(iteration = run.iteration, error = %e, "provider call failed");
                let record = run.record(IterationAction::ProviderFailure).with_content(&e.to_string());
                run.trace.record_iteration(record);
                return run.fail(FailureKind::Provider, e.to_string());
            }
        };

        run.trace
            .add_usage(response.usage.prompt_tokens, response.usage.completion_tokens);

        if !response.tool_calls.is_empty() {
            run.messages.push(ChatMessage::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            run.pending_calls = response.tool_calls;
            run.pending_content = response.content;
            return AgentState::ExecutingTools;
        }

        if !response.content.trim().is_empty() {
            run.pending_content = response.content;
            return AgentState::Parsing;
        }

        if run.trace.tool_calls.is_empty() {
            let record = run.record(IterationAction::EmptyResponse);
            run.trace.record_iteration(record);
            return run.fail(
                FailureKind::EmptyResponse,
                "backend returned an empty response without calling tools".to_string(),
            );
        }

        let record = run.record(IterationAction::ResultNudge);
        run.trace.record_iteration(record);
        run.messages
            .push(ChatMessage::user(prompts::tool_result_nudge(run.mode)));
        AgentState::Collecting
    }

    /// Run the pending calls one at a time, in order.
    fn execute_tools(&self, run: &mut Invocation) -> AgentState {
        let calls = std::mem::take(&mut run.pending_calls);
        let mut records = Vec::with_capacity(calls.len());

        for call in &calls {
            let (record, content) = self.execute_call(call);
            run.messages.push(ChatMessage::tool_result(call, content));
            records.push(record);
        }

        let mut record = run.record(IterationAction::ToolCalls).with_tool_calls(records);
        if !run.pending_content.trim().is_empty() {
            record = record.with_content(&run.pending_content);
        }
        run.trace.record_iteration(record);
        AgentState::Collecting
    }

    /// Execute one call. Failures become error-shaped results, never errors.
    fn execute_call(&self, call: &ToolCall) -> (ToolCallRecord, String) {
        let arguments = if call.arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str::<Value>(&call.arguments) {
                Ok(value) => value,
                Err(e) => {
                    let error = format!("invalid JSON arguments: {}", e);
                    warn!(tool = %call.name, error = %error, "tool call rejected");
                    let payload = json!({ "error": error }).to_string();
                    let raw = Value::String(call.arguments.clone());
                    return (ToolCallRecord::failure(call.name.as_str(), raw, error), payload);
                }
            }
        };

        match self.tools.execute_value(&call.name, &arguments) {
            Ok(result) => {
                info!(tool = %call.name, "tool executed");
                let content = result.to_string();
                (ToolCallRecord::success(call.name.as_str(), arguments, result), content)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool execution failed");
                let payload = json!({ "error": e.to_string() }).to_string();
                (ToolCallRecord::failure(call.name.as_str(), arguments, e.to_string()), payload)
            }
        }
    }

    fn parse(&self, run: &mut Invocation) -> AgentState {
        let content = std::mem::take(&mut run.pending_content);

        match Judgment::parse(&content, run.mode) {
            Ok(judgment) => {
                let record = run.record(IterationAction::FinalAnswer).with_content(&content);
                run.trace.record_iteration(record);
                run.judgment = Some(judgment);
                AgentState::Done
            }
            Err(e) if run.corrections_left > 0 => {
                run.corrections_left -= 1;
                warn!(iteration = run.iteration, reason = %e.reason, "reply failed the output contract, re-prompting");
                let record = run.record(IterationAction::CorrectiveReprompt).with_content(&content);
                run.trace.record_iteration(record);
                run.messages.push(ChatMessage::assistant(content));
                run.messages.push(ChatMessage::user(prompts::CORRECTIVE_PROMPT));
                AgentState::Collecting
            }
            Err(e) => {
                let record = run.record(IterationAction::FormatFailure).with_content(&content);
                run.trace.record_iteration(record);
                run.fail(FailureKind::Format, e.to_string())
            }
        }
    }

    fn finish(&self, run: Invocation) -> Result<AgentOutcome, AgentFailure> {
        let Invocation {
            agentic,
            trace,
            judgment,
            fell_back,
            failure,
            ..
        } = run;

        if let Some((kind, message)) = failure {
            let trace = trace.finish(TraceOutcome::Error, Some(message.clone()));
            warn!(kind = %kind, iterations = trace.total_iterations, "analysis failed");
            return Err(AgentFailure {
                kind,
                message,
                trace,
            });
        }

        match judgment {
            Some(mut judgment) => {
                let trace = if fell_back {
                    trace.finish(TraceOutcome::Fallback, Some(MAX_ITERATIONS_EXCEEDED.to_string()))
                } else {
                    trace.finish(TraceOutcome::Normal, None)
                };

                // reported tool use comes from the trace, not from the model's claim
                if agentic {
                    judgment.tools_used = Some(trace.tools_used());
                }

                info!(
                    iterations = trace.total_iterations,
                    tool_calls = trace.tool_calls.len(),
                    tokens = trace.usage.total(),
                    outcome = ?trace.outcome,
                    "analysis finished"
                );
                Ok(AgentOutcome { judgment, trace })
            }
            None => {
                let message = "invocation ended without a judgment".to_string();
                let trace = trace.finish(TraceOutcome::Error, Some(message.clone()));
                Err(AgentFailure {
                    kind: FailureKind::EmptyResponse,
                    message,
                    trace,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::RetryPolicy;
    use crate::testing::ScriptedProvider;
    use std::sync::Arc;
    use crate::providers::Role;
    use verdict_core::ToolStatus;

    const ANSWER: &str = r#"{"score": 20, "label": "LOW", "categories": ["ROUTINE"], "reasoning": "Ordinary consulting payment with no adverse indicators."}"#;

    fn orchestrator(provider: Arc<ScriptedProvider>, tools: ToolRegistry) -> AgentOrchestrator {
        let adapter = ProviderAdapter::new(provider, RetryPolicy::none());
        AgentOrchestrator::new(adapter, tools, AgentConfig::default())
    }

    #[tokio::test]
    async fn test_corrective_reprompt_recovers() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::text("Sure! The risk is low."),
            ScriptedProvider::text(ANSWER),
        ]));
        let outcome = orchestrator(provider.clone(), ToolRegistry::with_defaults())
            .run("Payment for consulting", None, Mode::Analysis)
            .await
            .unwrap();

        assert_eq!(outcome.judgment.score, Some(20));
        assert_eq!(outcome.trace.total_iterations, 2);
        assert_eq!(outcome.trace.iterations[0].action, IterationAction::CorrectiveReprompt);
        assert_eq!(outcome.trace.iterations[1].action, IterationAction::FinalAnswer);

        let second = &provider.requests()[1];
        let last = second.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, prompts::CORRECTIVE_PROMPT);
    }

    #[tokio::test]
    async fn test_repeated_format_error_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::text("not json"),
            ScriptedProvider::text("still not json"),
        ]));
        let failure = orchestrator(provider, ToolRegistry::with_defaults())
            .run("x", None, Mode::Analysis)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Format);
        assert_eq!(failure.trace.outcome, Some(TraceOutcome::Error));
        assert_eq!(failure.trace.total_iterations, 2);
        assert!(failure.trace.error.is_some());
    }

    #[tokio::test]
    async fn test_empty_first_response_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text("  ")]));
        let failure = orchestrator(provider, ToolRegistry::with_defaults())
            .run("x", None, Mode::Analysis)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::EmptyResponse);
        assert_eq!(failure.trace.iterations.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_after_tools_gets_nudge() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(ScriptedProvider::tool_call("c1", "calculate", serde_json::json!({"expression": "2*3"}))),
            ScriptedProvider::text(""),
            ScriptedProvider::text(ANSWER),
        ]));
        let outcome = orchestrator(provider.clone(), ToolRegistry::with_defaults())
            .run("x", None, Mode::Analysis)
            .await
            .unwrap();

        assert_eq!(outcome.trace.total_iterations, 3);
        assert_eq!(outcome.trace.iterations[1].action, IterationAction::ResultNudge);
        assert_eq!(outcome.judgment.tools_used, Some(vec!["calculate".to_string()]));

        let third = &provider.requests()[2];
        assert_eq!(third.last().unwrap().content, prompts::tool_result_nudge(Mode::Analysis));
    }

    #[tokio::test]
    async fn test_bad_tool_calls_become_error_results() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(ScriptedProvider::raw_tool_call("c1", "calculate", "{not json")),
            Ok(ScriptedProvider::tool_call("c2", "lookup_database", serde_json::json!({"id": 7}))),
            ScriptedProvider::text(ANSWER),
        ]));
        let outcome = orchestrator(provider.clone(), ToolRegistry::with_defaults())
            .run("x", None, Mode::Analysis)
            .await
            .unwrap();

        let calls = &outcome.trace.tool_calls;
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.status == ToolStatus::Error));
        assert_eq!(calls[0].arguments, Value::String("{not json".to_string()));
        assert!(calls[1].error.as_deref().unwrap().contains("lookup_database"));
        assert_eq!(
            outcome.judgment.tools_used,
            Some(vec!["calculate".to_string(), "lookup_database".to_string()])
        );

        // the error payload went back to the model as a tool message
        let second = &provider.requests()[1];
        let tool_message = second.last().unwrap();
        assert_eq!(tool_message.role, Role::Tool);
        assert!(tool_message.content.contains("error"));
    }

    #[tokio::test]
    async fn test_no_tools_means_single_completion() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text(ANSWER)]));
        let outcome = orchestrator(provider.clone(), ToolRegistry::new())
            .run("x", Some("ctx"), Mode::Analysis)
            .await
            .unwrap();

        assert_eq!(outcome.trace.mode, "analysis");
        assert_eq!(outcome.trace.total_iterations, 1);
        assert_eq!(outcome.trace.iterations[0].action, IterationAction::Completion);
        assert!(outcome.judgment.tools_used.is_none());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_completion_format_error_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::text("nope"),
            ScriptedProvider::text(ANSWER),
        ]));
        let failure = orchestrator(provider.clone(), ToolRegistry::new())
            .run("x", None, Mode::Analysis)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Format);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_trace() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(ScriptedProvider::tool_call("c1", "check_pep_status", serde_json::json!({"person_name": "John Smith"}))),
            Err(ProviderError::AuthError),
        ]));
        let failure = orchestrator(provider, ToolRegistry::with_defaults())
            .run("x", None, Mode::Analysis)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Provider);
        assert_eq!(failure.trace.tool_calls.len(), 1);
        assert_eq!(failure.trace.iterations.last().unwrap().action, IterationAction::ProviderFailure);
        assert!(failure.trace.is_finalized());
    }

    #[tokio::test]
    async fn test_chat_mode_trace_tag_and_nulls() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text(
            r#"{"reasoning": "A PEP is a politically exposed person.", "score": 88, "categories": ["X"]}"#,
        )]));
        let outcome = orchestrator(provider, ToolRegistry::with_defaults())
            .run("What is a PEP?", None, Mode::Chat)
            .await
            .unwrap();

        assert_eq!(outcome.trace.mode, "agent_chat");
        assert_eq!(outcome.judgment.score, None);
        assert!(outcome.judgment.categories.is_empty());
    }

    #[tokio::test]
    async fn test_usage_summed() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(ScriptedProvider::tool_call("c1", "calculate", serde_json::json!({"expression": "1+1"}))),
            ScriptedProvider::text(ANSWER),
        ]));
        let outcome = orchestrator(provider, ToolRegistry::with_defaults())
            .run("x", None, Mode::Analysis)
            .await
            .unwrap();
        assert_eq!(outcome.trace.usage.total(), 30);
    }
}
