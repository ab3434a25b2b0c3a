//! Scripted stand-ins for the network collaborators.
//!
//! Used by the crate's own tests and by integration tests; no network.

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
    ToolCall, ToolCompletion,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use verdict_core::ToolDefinition;

type Step = Result<ToolCompletion, ProviderError>;

/// Provider replaying a fixed script of responses.
///
/// Once the script runs out, the `repeat` response (if any) is returned
/// forever; otherwise every further call fails with `InvalidRequest`.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    repeat: Option<ToolCompletion>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    model: String,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
            model: "scripted/test-model".to_string(),
        }
    }

    /// Always answer with `step`.
    pub fn repeating(step: ToolCompletion) -> Self {
        Self {
            repeat: Some(step),
            ..Self::new(Vec::new())
        }
    }

    /// A final text answer.
    pub fn text(content: impl Into<String>) -> Step {
        Ok(ToolCompletion {
            content: content.into(),
            tool_calls: Vec::new(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
            stop_reason: Some("stop".to_string()),
        })
    }

    /// A single tool call.
    pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCompletion {
        Self::raw_tool_call(id, name, arguments.to_string())
    }

    /// A single tool call with arguments exactly as given.
    pub fn raw_tool_call(id: &str, name: &str, arguments: impl Into<String>) -> ToolCompletion {
        ToolCompletion {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.into(),
            }],
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
            stop_reason: Some("tool_calls".to_string()),
        }
    }

    /// Number of provider calls received.
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Message lists received, one per call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }

    fn next(&self, messages: &[ChatMessage]) -> Step {
        self.requests.lock().push(messages.to_vec());
        match self.steps.lock().pop_front() {
            Some(step) => step,
            None => self
                .repeat
                .clone()
                .ok_or_else(|| ProviderError::InvalidRequest("script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.next(messages).map(|step| CompletionResponse {
            content: step.content,
            usage: step.usage,
            model: self.model.clone(),
            stop_reason: step.stop_reason,
        })
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
        _config: &CompletionConfig,
    ) -> Result<ToolCompletion, ProviderError> {
        self.next(messages)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model_version(&self) -> String {
        self.model.clone()
    }
}

/// Deterministic bag-of-letters embedder.
///
/// Texts sharing letters land close together, which is enough to exercise
/// ranking and thresholds.
pub struct LetterEmbedder {
    dimension: usize,
    calls: Mutex<usize>,
    fail: bool,
}

impl LetterEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: 26,
            calls: Mutex::new(0),
            fail: false,
        }
    }

    /// An embedder whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl Default for LetterEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        *self.calls.lock() += 1;
        if self.fail {
            return Err(EmbeddingError::Provider(ProviderError::HttpError(
                "embedding backend unreachable".to_string(),
            )));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for c in text.chars().filter(char::is_ascii_alphabetic) {
            vector[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        Ok(vector)
    }

    fn model(&self) -> &str {
        "letters"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
