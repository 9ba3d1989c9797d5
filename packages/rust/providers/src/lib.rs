//! Generation backends for Pebbles.
//!
//! This crate provides:
//! - [`ProviderAdapter`]: the configured backend, chosen once at start-up
//! - [`prompt`]: generation/rewrite prompt construction and [`RewriteMode`]
//! - [`probe`]: best-effort "first model that initializes" selection
//! - [`DeepSeekClient`] / [`GeminiClient`]: the two HTTP backends
//!
//! Failures are logged with the provider name and returned as-is. There is no
//! retry and no failover to the other provider.

pub mod deepseek;
pub mod gemini;
pub mod probe;
pub mod prompt;

use std::time::Duration;

use pebbles_shared::{AppConfig, Pebble, PebblesError, Result, resolve_api_key};
use reqwest::Client;
use tracing::{error, info, instrument};

pub use deepseek::{DeepSeekClient, DeepSeekSettings};
pub use gemini::{GeminiClient, GeminiSettings};
pub use prompt::RewriteMode;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("Pebbles/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// ProviderKind
// ---------------------------------------------------------------------------

/// Which generation backend is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Google Gemini (the default).
    Gemini,
    /// DeepSeek, OpenAI-compatible chat completions.
    DeepSeek,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = PebblesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "deepseek" => Ok(Self::DeepSeek),
            other => Err(PebblesError::config(format!(
                "unknown provider '{other}': expected 'gemini' or 'deepseek'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Backend-specific settings for the selected provider.
#[derive(Debug, Clone)]
pub enum BackendSettings {
    Gemini(GeminiSettings),
    DeepSeek(DeepSeekSettings),
}

/// Immutable provider configuration, resolved once at start-up.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub backend: BackendSettings,
    /// HTTP timeout for every provider call.
    pub timeout_secs: u64,
    /// Temperature for rewrite calls.
    pub rewrite_temperature: f32,
}

impl ProviderSettings {
    /// Resolve settings from the app config and the environment.
    ///
    /// Only the selected provider's API key is required.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let kind: ProviderKind = config.ai.provider_name().parse()?;
        let backend = match kind {
            ProviderKind::Gemini => BackendSettings::Gemini(GeminiSettings {
                api_key: resolve_api_key(&config.gemini.api_key_env)?,
                base_url: config.gemini.base_url.clone(),
                model_candidates: config.gemini.model_candidates.clone(),
                fallback_model: config.gemini.fallback_model.clone(),
                temperature: config.gemini.temperature,
            }),
            ProviderKind::DeepSeek => BackendSettings::DeepSeek(DeepSeekSettings {
                api_key: resolve_api_key(&config.deepseek.api_key_env)?,
                base_url: config.deepseek.base_url.clone(),
                model: config.deepseek.model.clone(),
                temperature: config.deepseek.temperature,
            }),
        };
        Ok(Self {
            backend,
            timeout_secs: config.ai.timeout_secs,
            rewrite_temperature: config.ai.rewrite_temperature,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match self.backend {
            BackendSettings::Gemini(_) => ProviderKind::Gemini,
            BackendSettings::DeepSeek(_) => ProviderKind::DeepSeek,
        }
    }
}

// ---------------------------------------------------------------------------
// Completion request
// ---------------------------------------------------------------------------

/// A single prompt sent to a backend.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    /// Ask the backend for a JSON-only reply where supported.
    pub json_mode: bool,
}

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

/// The configured generation backend.
pub enum ProviderAdapter {
    Gemini(GeminiClient),
    DeepSeek(DeepSeekClient),
}

impl ProviderAdapter {
    /// Build the adapter for the configured provider.
    ///
    /// For Gemini this probes the candidate models (see [`probe`]).
    pub async fn connect(settings: &ProviderSettings) -> Result<Self> {
        let client = build_client(settings.timeout_secs)?;
        let adapter = match &settings.backend {
            BackendSettings::Gemini(gemini) => Self::Gemini(
                GeminiClient::connect(client, gemini.clone(), settings.rewrite_temperature).await,
            ),
            BackendSettings::DeepSeek(deepseek) => Self::DeepSeek(DeepSeekClient::new(
                client,
                deepseek.clone(),
                settings.rewrite_temperature,
            )),
        };
        info!(provider = %adapter.kind(), model = adapter.model(), "provider ready");
        Ok(adapter)
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Gemini(_) => ProviderKind::Gemini,
            Self::DeepSeek(_) => ProviderKind::DeepSeek,
        }
    }

    /// The model identifier requests are sent to.
    pub fn model(&self) -> &str {
        match self {
            Self::Gemini(c) => c.model(),
            Self::DeepSeek(c) => c.model(),
        }
    }

    /// Generate raw artifact JSON text for `topic`.
    #[instrument(skip_all, fields(provider = %self.kind(), topic = %topic, context = context.len()))]
    pub async fn generate(&self, topic: &str, context: &[Pebble]) -> Result<String> {
        let request = CompletionRequest {
            system: prompt::GENERATION_SYSTEM_PROMPT.to_string(),
            user: prompt::generation_prompt(topic, context),
            temperature: self.generation_temperature(),
            json_mode: true,
        };
        self.complete(&request).await.inspect_err(|e| {
            error!(provider = %self.kind(), error = %e, "generation failed");
        })
    }

    /// Rewrite `text` in the given style. Returns plain text, trimmed.
    #[instrument(skip_all, fields(provider = %self.kind(), mode = %mode, len = text.len()))]
    pub async fn rewrite(&self, text: &str, mode: RewriteMode) -> Result<String> {
        let request = CompletionRequest {
            system: prompt::REWRITE_SYSTEM_PROMPT.to_string(),
            user: prompt::rewrite_prompt(text, mode),
            temperature: self.rewrite_temperature(),
            json_mode: false,
        };
        let rewritten = self.complete(&request).await.inspect_err(|e| {
            error!(provider = %self.kind(), error = %e, "rewrite failed");
        })?;
        Ok(rewritten.trim().to_string())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        match self {
            Self::Gemini(c) => c.complete(request).await,
            Self::DeepSeek(c) => c.complete(request).await,
        }
    }

    fn generation_temperature(&self) -> f32 {
        match self {
            Self::Gemini(c) => c.settings().temperature,
            Self::DeepSeek(c) => c.settings().temperature,
        }
    }

    fn rewrite_temperature(&self) -> f32 {
        match self {
            Self::Gemini(c) => c.rewrite_temperature(),
            Self::DeepSeek(c) => c.rewrite_temperature(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with appropriate settings.
fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PebblesError::Network(format!("failed to build HTTP client: {e}")))
}

/// Join an API root and a path without doubling slashes.
fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn a non-success response into a provider error, keeping the
/// backend's own error message when it sends one.
async fn status_error(provider: ProviderKind, response: reqwest::Response) -> PebblesError {
    #[derive(serde::Deserialize)]
    struct ErrorEnvelope {
        error: ErrorBody,
    }
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    PebblesError::provider(provider.as_str(), format!("HTTP {status}: {detail}"))
}
