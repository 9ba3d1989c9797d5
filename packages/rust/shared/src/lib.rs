//! Shared types, error model, and configuration for Pebbles.
//!
//! This crate is the foundation depended on by all other Pebbles crates.
//! It provides:
//! - [`PebblesError`]: the unified error type
//! - Domain types ([`Pebble`], [`LevelContent`], [`MainBlock`], [`SidebarBlock`], [`Folder`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AiConfig, AppConfig, DeepSeekConfig, GeminiConfig, StorageConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{PebblesError, Result};
pub use types::{
    CognitiveLevel, Folder, FolderUpdate, IconType, LevelContent, MainBlock, MainBlockKind,
    MainBody, Pebble, PebbleContent, PebbleUpdate, SidebarBlock, SidebarKind, new_id, now_millis,
};
