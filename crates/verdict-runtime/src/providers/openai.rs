//! OpenAI chat completions, including the Azure OpenAI flavour.
//!
//! Both speak the same wire format; Azure differs in URL layout
//! (deployment + api-version), the `api-key` header and the model id it
//! reports (`azure/<deployment>`).

use super::http::{build_client, check_status, read_json, send_error};
use super::secrets::{ApiCredential, CredentialSource};
use super::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, Role,
    TokenUsage, ToolCall, ToolCompletion,
};
use crate::config::BackendConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use verdict_core::ToolDefinition;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const AZURE_OPENAI_API_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";
pub const AZURE_OPENAI_ENDPOINT_ENV: &str = "AZURE_OPENAI_ENDPOINT";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Models accepting `response_format: json_object` (exact or dated variants).
const JSON_MODE_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4-turbo",
    "gpt-4-turbo-preview",
    "gpt-3.5-turbo-1106",
    "gpt-3.5-turbo-0125",
    "gpt-4-1106-preview",
    "gpt-4-0125-preview",
];

fn supports_json_mode(model: &str) -> bool {
    JSON_MODE_MODELS
        .iter()
        .any(|m| model == *m || model.starts_with(&format!("{}-", m)))
}

#[derive(Debug, Clone)]
enum Flavor {
    OpenAi,
    Azure {
        deployment: String,
        api_version: String,
    },
}

/// OpenAI-compatible chat provider.
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
    model: String,
    flavor: Flavor,
    client: reqwest::Client,
    /// Cleared once the backend rejects `response_format`.
    json_mode: AtomicBool,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("flavor", &self.flavor)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        let credential = ApiCredential::new(api_key, CredentialSource::Programmatic, "OpenAI API key");
        Self::build(credential, DEFAULT_BASE_URL.to_string(), model.into(), Flavor::OpenAi, Duration::from_secs(60))
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, ProviderError> {
        let credential = ApiCredential::resolve(config.api_key.as_deref(), OPENAI_API_KEY_ENV, "OpenAI API key")?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::build(credential, base_url, config.model().to_string(), Flavor::OpenAi, config.timeout)
    }

    /// Azure OpenAI. The endpoint comes from `base_url` or `AZURE_OPENAI_ENDPOINT`.
    pub fn azure_from_config(config: &BackendConfig) -> Result<Self, ProviderError> {
        let credential = ApiCredential::resolve(
            config.api_key.as_deref(),
            AZURE_OPENAI_API_KEY_ENV,
            "Azure OpenAI API key",
        )?;
        let endpoint = config
            .base_url
            .clone()
            .or_else(|| std::env::var(AZURE_OPENAI_ENDPOINT_ENV).ok())
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "Azure endpoint required: set 'base_url' in config or {}",
                    AZURE_OPENAI_ENDPOINT_ENV
                ))
            })?;
        let deployment = config
            .deployment
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("Azure deployment name required".to_string()))?;

        let flavor = Flavor::Azure {
            deployment: deployment.clone(),
            api_version: config.api_version.clone(),
        };
        Self::build(credential, endpoint, deployment, flavor, config.timeout)
    }

    fn build(
        credential: ApiCredential,
        base_url: String,
        model: String,
        flavor: Flavor,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let json_mode = matches!(flavor, Flavor::Azure { .. }) || supports_json_mode(&model);
        Ok(Self {
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            flavor,
            client: build_client(timeout)?,
            json_mode: AtomicBool::new(json_mode),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        match &self.flavor {
            Flavor::OpenAi => format!("{}/chat/completions", self.base_url),
            Flavor::Azure {
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url, deployment, api_version
            ),
        }
    }

    fn request_body<'a>(
        &'a self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        config: &CompletionConfig,
        json_mode: bool,
    ) -> ChatRequest<'a> {
        let azure = matches!(self.flavor, Flavor::Azure { .. });
        ChatRequest {
            model: (!azure).then_some(self.model.as_str()),
            messages: messages.iter().map(WireMessage::from).collect(),
            temperature: config.temperature,
            max_completion_tokens: (!azure).then_some(config.max_tokens),
            max_tokens: azure.then_some(config.max_tokens),
            tools: tools.iter().map(ToolDefinition::to_function_json).collect(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
            response_format: json_mode.then(|| json!({"type": "json_object"})),
        }
    }

    async fn send(&self, body: &ChatRequest<'_>, config: &CompletionConfig) -> Result<ChatResponse, ProviderError> {
        let request = self.client.post(self.endpoint()).timeout(config.timeout).json(body);
        // SECURITY: only expose the credential here, at the point of use
        let request = match self.flavor {
            Flavor::OpenAi => request.bearer_auth(self.credential.expose()),
            Flavor::Azure { .. } => request.header("api-key", self.credential.expose()),
        };

        let response = request.send().await.map_err(|e| send_error(e, config.timeout))?;
        let response = check_status(response).await?;
        read_json(response).await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        let content = if message.role == Role::Assistant
            && !message.tool_calls.is_empty()
            && message.content.is_empty()
        {
            None
        } else {
            Some(message.content.clone())
        };

        Self {
            role: message.role.as_str(),
            content,
            tool_calls: message.tool_calls.iter().map(WireToolCall::from).collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_type(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ChatResponse {
    fn usage(&self) -> TokenUsage {
        self.usage
            .as_ref()
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default()
    }

    fn into_tool_completion(self) -> Result<ToolCompletion, ProviderError> {
        let usage = self.usage();
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;

        Ok(ToolCompletion {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
            usage,
            stop_reason: choice.finish_reason,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let json_mode = self.json_mode.load(Ordering::Relaxed);
        let body = self.request_body(messages, &[], config, json_mode);

        let response = match self.send(&body, config).await {
            Err(ProviderError::ApiError { status: 400, message })
                if json_mode && message.contains("response_format") =>
            {
                warn!(model = %self.model, "JSON mode not supported, retrying without it");
                self.json_mode.store(false, Ordering::Relaxed);
                let body = self.request_body(messages, &[], config, false);
                self.send(&body, config).await?
            }
            other => other?,
        };

        let model = response.model.clone().unwrap_or_else(|| self.model.clone());
        let completion = response.into_tool_completion()?;
        debug!(model = %model, tokens = completion.usage.total(), "completion received");

        Ok(CompletionResponse {
            content: completion.content,
            usage: completion.usage,
            model,
            stop_reason: completion.stop_reason,
        })
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        config: &CompletionConfig,
    ) -> Result<ToolCompletion, ProviderError> {
        let body = self.request_body(messages, tools, config, false);
        let completion = self.send(&body, config).await?.into_tool_completion()?;
        debug!(
            tool_calls = completion.tool_calls.len(),
            tokens = completion.usage.total(),
            "tool completion received"
        );
        Ok(completion)
    }

    fn name(&self) -> &str {
        match self.flavor {
            Flavor::OpenAi => "openai",
            Flavor::Azure { .. } => "azure",
        }
    }

    fn model_version(&self) -> String {
        format!("{}/{}", self.name(), self.model)
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }
}
