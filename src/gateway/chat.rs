use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Capability, Provider, ProviderError, ResilientInvoker};
use crate::config::ChatSettings;

pub type ChatInvoker = ResilientInvoker<ChatRequest, ChatReply>;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Provider-agnostic chat completion request.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object response.
    pub json_output: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.7,
            max_tokens: 1000,
            json_output: true,
        }
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub finish_reason: Option<String>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f64,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI-compatible chat completions endpoint (Groq by default).
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    model: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn from_settings(settings: &ChatSettings) -> Self {
        Self::new(&settings.base_url, &settings.model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Provider for ChatClient {
    type Request = ChatRequest;
    type Response = ChatReply;

    fn capability(&self) -> Capability {
        Capability::Chat
    }

    async fn send(&self, key: &str, request: &ChatRequest) -> Result<ChatReply, ProviderError> {
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
            response_format: request.json_output.then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!("Sending {} messages to {} with model {}", request.messages.len(), self.base_url, self.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transient(format!("chat request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http(status.as_u16(), error_text));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::transient(format!("failed to parse chat response: {}", e)))?;

        if let Some(usage) = &completion.usage {
            info!(
                "Token usage - Prompt: {}, Completion: {}, Total: {}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        first_reply(completion)
    }
}

/// A missing choice is a provider failure. Empty content is still a reply;
/// judging it is up to the caller.
fn first_reply(completion: CompletionResponse) -> Result<ChatReply, ProviderError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::transient("no response choices from provider"))?;

    let content = choice.message.content.unwrap_or_default();
    if content.trim().is_empty() {
        debug!("Provider returned empty content (finish reason {:?})", choice.finish_reason);
    }

    Ok(ChatReply { content, finish_reason: choice.finish_reason })
}
