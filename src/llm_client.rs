//! Chat-completion client for OpenAI and Anthropic.

use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Hosted LLM backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI chat completions.
    OpenAI,
    /// Anthropic messages API.
    Anthropic,
}

/// Connection settings for one LLM-backed agent.
#[derive(Clone, Getters)]
pub struct LlmConfig {
    provider: LlmProvider,
    #[getter(skip)]
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl LlmConfig {
    /// Creates a new LLM configuration.
    #[instrument(skip(api_key), fields(provider = ?provider, model = %model))]
    pub fn new(provider: LlmProvider, api_key: String, model: String, max_tokens: u32) -> Self {
        debug!("Creating LLM config");
        Self {
            provider,
            api_key,
            model,
            max_tokens,
        }
    }
}

/// Client for one configured model.
///
/// HTTP connections are pooled for the lifetime of the client, so one
/// instance should serve a whole match.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
    openai: OpenAIClient<OpenAIConfig>,
}

impl LlmClient {
    /// Creates a client for `config`.
    #[instrument(skip(config), fields(provider = ?config.provider(), model = %config.model()))]
    pub fn new(config: LlmConfig) -> Self {
        info!("Creating LLM client");
        let openai =
            OpenAIClient::with_config(OpenAIConfig::new().with_api_key(config.api_key.clone()));
        Self {
            config,
            http: reqwest::Client::new(),
            openai,
        }
    }

    /// Configuration this client was built from.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Generates a completion from a system prompt and one user message.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] if the request fails, the API reports an error,
    /// or the reply has no text content.
    #[instrument(skip(self, system_prompt, user_message), fields(provider = ?self.config.provider, model = %self.config.model))]
    pub async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        let content = match self.config.provider {
            LlmProvider::OpenAI => self.generate_openai(system_prompt, user_message).await?,
            LlmProvider::Anthropic => self.generate_anthropic(system_prompt, user_message).await?,
        };
        info!(content_length = content.len(), "Generated completion");
        Ok(content)
    }

    async fn generate_anthropic(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": system_prompt,
            "messages": [{ "role": "user", "content": user_message }],
        });

        debug!("Sending request to Anthropic");
        let response = self
            .http
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::new(format!("Anthropic request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::new(format!("Failed to read Anthropic response: {}", e)))?;

        if !status.is_success() {
            return Err(LlmError::new(format!("Anthropic API error {}: {}", status, text)));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::new(format!("Failed to parse Anthropic response: {}", e)))?;

        json["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::new("No text content in Anthropic response".to_string()))
    }

    async fn generate_openai(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|e| LlmError::new(format!("Failed to build system message: {}", e)))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_message)
                    .build()
                    .map_err(|e| LlmError::new(format!("Failed to build user message: {}", e)))?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(messages)
            .max_completion_tokens(self.config.max_tokens)
            .build()
            .map_err(|e| LlmError::new(format!("Failed to build request: {}", e)))?;

        debug!("Sending request to OpenAI");
        let response = self
            .openai
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::new(format!("OpenAI API error: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::new("No content in OpenAI response".to_string()))
    }
}

/// LLM client error.
#[derive(Debug, Clone, Display, Error)]
#[display("LLM error: {} at {}:{}", message, file, line)]
pub struct LlmError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl LlmError {
    /// Creates a new LLM error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        error!(error_message = %message, "LLM error created");
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
