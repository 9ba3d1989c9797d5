//! Error types for Pebbles.
//!
//! Library crates use [`PebblesError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Pebbles operations.
#[derive(Debug, thiserror::Error)]
pub enum PebblesError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP error (client construction, connection).
    #[error("network error: {0}")]
    Network(String),

    /// A generation backend call failed (auth, rate limit, bad status, empty reply).
    #[error("{provider} provider error: {message}")]
    Provider { provider: String, message: String },

    /// Malformed upstream response: invalid JSON or a missing mandatory field.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A pebble or folder does not exist for the requesting owner.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid input from the caller (bad index, empty topic, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PebblesError>;

impl PebblesError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a provider error tagged with the provider name.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// A pebble with this id was not found.
    pub fn pebble_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "pebble",
            id: id.into(),
        }
    }

    /// A folder with this id was not found.
    pub fn folder_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "folder",
            id: id.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
