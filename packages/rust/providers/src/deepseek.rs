//! DeepSeek backend (OpenAI-compatible chat completions).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pebbles_shared::{PebblesError, Result};

use crate::{CompletionRequest, ProviderKind, endpoint, status_error};

/// Resolved DeepSeek settings.
#[derive(Debug, Clone)]
pub struct DeepSeekSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Temperature for artifact generation.
    pub temperature: f32,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the DeepSeek chat completions API.
pub struct DeepSeekClient {
    client: Client,
    settings: DeepSeekSettings,
    rewrite_temperature: f32,
}

impl DeepSeekClient {
    pub fn new(client: Client, settings: DeepSeekSettings, rewrite_temperature: f32) -> Self {
        Self {
            client,
            settings,
            rewrite_temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn settings(&self) -> &DeepSeekSettings {
        &self.settings
    }

    pub fn rewrite_temperature(&self) -> f32 {
        self.rewrite_temperature
    }

    /// Send one chat completion and return the reply text.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(
            model = %self.settings.model,
            prompt_len = request.user.len(),
            json_mode = request.json_mode,
            "sending chat completion"
        );

        let response = self
            .client
            .post(endpoint(&self.settings.base_url, "chat/completions"))
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_error(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(status_error(ProviderKind::DeepSeek, response).await);
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| provider_error(format!("failed to parse response: {e}")))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| provider_error("empty completion"))
    }
}

fn provider_error(msg: impl Into<String>) -> PebblesError {
    PebblesError::provider(ProviderKind::DeepSeek.as_str(), msg)
}
