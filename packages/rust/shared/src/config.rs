//! Application configuration for Pebbles.
//!
//! User config lives at `~/.pebbles/pebbles.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never written to the file; only the env var names are.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PebblesError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pebbles.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pebbles";

// ---------------------------------------------------------------------------
// Config structs (matching pebbles.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider selection and request tuning.
    #[serde(default)]
    pub ai: AiConfig,

    /// DeepSeek (OpenAI-compatible) settings.
    #[serde(default)]
    pub deepseek: DeepSeekConfig,

    /// Google Gemini settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Local database settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Sanity-check values that would otherwise only fail at request time.
    pub fn validate(&self) -> Result<()> {
        match self.ai.provider_name().as_str() {
            "gemini" | "deepseek" => {}
            other => {
                return Err(PebblesError::config(format!(
                    "unknown ai.provider '{other}': expected 'gemini' or 'deepseek'"
                )));
            }
        }
        for (section, base_url) in [
            ("deepseek", &self.deepseek.base_url),
            ("gemini", &self.gemini.base_url),
        ] {
            Url::parse(base_url).map_err(|e| {
                PebblesError::config(format!("invalid {section}.base_url '{base_url}': {e}"))
            })?;
        }
        if self.ai.timeout_secs == 0 {
            return Err(PebblesError::config("ai.timeout_secs must be greater than zero"));
        }
        Ok(())
    }
}

/// `[ai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Which backend serves every request: "gemini" (default) or "deepseek".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// HTTP timeout for provider calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sampling temperature for rewrite calls.
    #[serde(default = "default_rewrite_temperature")]
    pub rewrite_temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            timeout_secs: default_timeout_secs(),
            rewrite_temperature: default_rewrite_temperature(),
        }
    }
}

impl AiConfig {
    /// The provider name as matched everywhere: trimmed, lowercase.
    pub fn provider_name(&self) -> String {
        self.provider.trim().to_ascii_lowercase()
    }
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_rewrite_temperature() -> f32 {
    0.7
}

/// `[deepseek]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepSeekConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_deepseek_key_env")]
    pub api_key_env: String,

    /// API root; `/chat/completions` is appended.
    #[serde(default = "default_deepseek_base_url")]
    pub base_url: String,

    #[serde(default = "default_deepseek_model")]
    pub model: String,

    /// Sampling temperature for artifact generation.
    #[serde(default = "default_deepseek_temperature")]
    pub temperature: f32,
}

impl Default for DeepSeekConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_deepseek_key_env(),
            base_url: default_deepseek_base_url(),
            model: default_deepseek_model(),
            temperature: default_deepseek_temperature(),
        }
    }
}

fn default_deepseek_key_env() -> String {
    "DEEPSEEK_API_KEY".into()
}
fn default_deepseek_base_url() -> String {
    "https://api.deepseek.com".into()
}
fn default_deepseek_model() -> String {
    "deepseek-chat".into()
}
fn default_deepseek_temperature() -> f32 {
    1.3
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,

    /// API root; `/v1beta/models/...` is appended.
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Models probed in order at start-up; the first that answers wins.
    #[serde(default = "default_gemini_candidates")]
    pub model_candidates: Vec<String>,

    /// Used when every candidate fails to initialize.
    #[serde(default = "default_gemini_fallback")]
    pub fallback_model: String,

    /// Sampling temperature for artifact generation.
    #[serde(default = "default_gemini_temperature")]
    pub temperature: f32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_gemini_key_env(),
            base_url: default_gemini_base_url(),
            model_candidates: default_gemini_candidates(),
            fallback_model: default_gemini_fallback(),
            temperature: default_gemini_temperature(),
        }
    }
}

fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_gemini_candidates() -> Vec<String> {
    vec![
        "gemini-2.5-flash".into(),
        "gemini-2.0-flash".into(),
        "gemini-1.5-flash".into(),
    ]
}
fn default_gemini_fallback() -> String {
    "gemini-pro".into()
}
fn default_gemini_temperature() -> f32 {
    1.0
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path; relative paths resolve against the config dir.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "pebbles.db".into()
}

impl StorageConfig {
    /// Resolve `db_path` to an absolute location.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        let path = PathBuf::from(&self.db_path);
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(config_dir()?.join(path))
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pebbles/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| PebblesError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pebbles/pebbles.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PebblesError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PebblesError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PebblesError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PebblesError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PebblesError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read an API key from the named env var; it must be set and non-empty.
pub fn resolve_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(PebblesError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
