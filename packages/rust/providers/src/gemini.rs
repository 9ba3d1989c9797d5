//! Google Gemini backend (`generateContent` REST API).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pebbles_shared::{PebblesError, Result};

use crate::{CompletionRequest, ProviderKind, endpoint, probe, status_error};

/// API key header accepted by the Gemini REST API.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Resolved Gemini settings.
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub base_url: String,
    /// Probed in order at connect time.
    pub model_candidates: Vec<String>,
    /// Used unprobed when no candidate initializes.
    pub fallback_model: String,
    /// Temperature for artifact generation.
    pub temperature: f32,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> Result<String> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(provider_error(format!("prompt blocked: {reason}")));
        }
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(provider_error("empty completion"));
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the Gemini API, bound to one model.
pub struct GeminiClient {
    client: Client,
    settings: GeminiSettings,
    model: String,
    rewrite_temperature: f32,
}

impl GeminiClient {
    /// Pick a model by probing the configured candidates, then bind to it.
    pub async fn connect(client: Client, settings: GeminiSettings, rewrite_temperature: f32) -> Self {
        let model = {
            let (http, s) = (&client, &settings);
            probe::first_available(&settings.model_candidates, &settings.fallback_model, move |m| {
                probe_model(http, s, m)
            })
            .await
        };
        Self::with_model(client, settings, model, rewrite_temperature)
    }

    /// Bind to `model` without probing.
    pub fn with_model(
        client: Client,
        settings: GeminiSettings,
        model: String,
        rewrite_temperature: f32,
    ) -> Self {
        Self {
            client,
            settings,
            model,
            rewrite_temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn settings(&self) -> &GeminiSettings {
        &self.settings
    }

    pub fn rewrite_temperature(&self) -> f32 {
        self.rewrite_temperature
    }

    /// Send one `generateContent` call and return the reply text.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &request.user,
                }],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: &request.system,
                }],
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
                response_mime_type: request.json_mode.then_some("application/json"),
            },
        };

        debug!(
            model = %self.model,
            prompt_len = request.user.len(),
            json_mode = request.json_mode,
            "sending generateContent"
        );

        let url = endpoint(
            &self.settings.base_url,
            &format!("v1beta/models/{}:generateContent", self.model),
        );
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_error(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(status_error(ProviderKind::Gemini, response).await);
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| provider_error(format!("failed to parse response: {e}")))?;
        reply.into_text()
    }
}

/// Initialization check: the model metadata endpoint answers for this key.
async fn probe_model(client: &Client, settings: &GeminiSettings, model: String) -> Result<()> {
    let url = endpoint(&settings.base_url, &format!("v1beta/models/{model}"));
    let response = client
        .get(url)
        .header(API_KEY_HEADER, &settings.api_key)
        .send()
        .await
        .map_err(|e| provider_error(format!("probe of {model} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(status_error(ProviderKind::Gemini, response).await);
    }
    Ok(())
}

fn provider_error(msg: impl Into<String>) -> PebblesError {
    PebblesError::provider(ProviderKind::Gemini.as_str(), msg)
}
