//! Core domain types for Pebbles knowledge artifacts.
//!
//! Field names on the wire follow the artifact JSON format used by the
//! archive (camelCase, with the exception of `owner_id`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new opaque identifier (UUID v7, time-sortable).
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// CognitiveLevel
// ---------------------------------------------------------------------------

/// One of the two fixed renderings of a pebble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CognitiveLevel {
    /// Simple, metaphorical.
    #[serde(rename = "ELI5")]
    Eli5,
    /// Deep, technical.
    #[serde(rename = "ACADEMIC")]
    Academic,
}

impl CognitiveLevel {
    /// Both levels in display order.
    pub const ALL: [CognitiveLevel; 2] = [CognitiveLevel::Eli5, CognitiveLevel::Academic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eli5 => "ELI5",
            Self::Academic => "ACADEMIC",
        }
    }
}

impl std::fmt::Display for CognitiveLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CognitiveLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ELI5" => Ok(Self::Eli5),
            "ACADEMIC" => Ok(Self::Academic),
            other => Err(format!("unknown cognitive level '{other}': expected ELI5 or ACADEMIC")),
        }
    }
}

// ---------------------------------------------------------------------------
// Main blocks
// ---------------------------------------------------------------------------

/// Kind of a main-content block. Unknown kinds are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MainBlockKind {
    Text,
    PullQuote,
    KeyPoints,
    Other(String),
}

impl MainBlockKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::PullQuote => "pull_quote",
            Self::KeyPoints => "key_points",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for MainBlockKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "text" => Self::Text,
            "pull_quote" => Self::PullQuote,
            "key_points" => Self::KeyPoints,
            _ => Self::Other(s),
        }
    }
}

impl From<MainBlockKind> for String {
    fn from(kind: MainBlockKind) -> Self {
        match kind {
            MainBlockKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// Semantic icon shown next to a main block heading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconType {
    Definition,
    History,
    Idea,
    Controversy,
    Future,
    Analysis,
    #[default]
    Default,
}

impl IconType {
    pub const ALL: [IconType; 7] = [
        IconType::Definition,
        IconType::History,
        IconType::Idea,
        IconType::Controversy,
        IconType::Future,
        IconType::Analysis,
        IconType::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::History => "history",
            Self::Idea => "idea",
            Self::Controversy => "controversy",
            Self::Future => "future",
            Self::Analysis => "analysis",
            Self::Default => "default",
        }
    }

    /// Look up an icon by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|icon| icon.as_str() == name)
    }
}

/// Body of a main block: prose, or a list of points for `key_points`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MainBody {
    Text(String),
    Points(Vec<String>),
}

/// A primary-content element within one rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainBlock {
    #[serde(rename = "type")]
    pub kind: MainBlockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default)]
    pub icon_type: IconType,
    pub body: MainBody,
    #[serde(default)]
    pub is_user_edited: bool,
}

// ---------------------------------------------------------------------------
// Sidebar blocks
// ---------------------------------------------------------------------------

/// Kind of a sidebar block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidebarKind {
    #[default]
    Definition,
    Profile,
    Stat,
}

impl SidebarKind {
    pub const ALL: [SidebarKind; 3] = [SidebarKind::Definition, SidebarKind::Profile, SidebarKind::Stat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::Profile => "profile",
            Self::Stat => "stat",
        }
    }

    /// Look up a sidebar kind by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// A secondary decorative element (definition, profile, or stat).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarBlock {
    #[serde(rename = "type")]
    pub kind: SidebarKind,
    pub heading: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default)]
    pub is_user_edited: bool,
}

// ---------------------------------------------------------------------------
// LevelContent / PebbleContent
// ---------------------------------------------------------------------------

/// One rendering of a pebble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelContent {
    pub title: String,
    pub summary: String,
    pub emoji_collage: Vec<String>,
    pub main_content: Vec<MainBlock>,
    pub sidebar_content: Vec<SidebarBlock>,
    pub keywords: Vec<String>,
}

/// Both renderings of a pebble, keyed `ELI5` and `ACADEMIC` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PebbleContent {
    #[serde(rename = "ELI5")]
    pub eli5: LevelContent,
    #[serde(rename = "ACADEMIC")]
    pub academic: LevelContent,
}

impl PebbleContent {
    pub fn level(&self, level: CognitiveLevel) -> &LevelContent {
        match level {
            CognitiveLevel::Eli5 => &self.eli5,
            CognitiveLevel::Academic => &self.academic,
        }
    }

    pub fn level_mut(&mut self, level: CognitiveLevel) -> &mut LevelContent {
        match level {
            CognitiveLevel::Eli5 => &mut self.eli5,
            CognitiveLevel::Academic => &mut self.academic,
        }
    }
}

// ---------------------------------------------------------------------------
// Pebble
// ---------------------------------------------------------------------------

/// A generated knowledge artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pebble {
    pub id: String,
    pub topic: String,
    /// Creation time, ms since epoch.
    pub timestamp: i64,
    /// Parent folder; `None` is the archive root.
    #[serde(default)]
    pub folder_id: Option<String>,
    /// Acts as the mastery marker once the Socratic questions are answered.
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub content: PebbleContent,
    #[serde(default)]
    pub socratic_questions: Vec<String>,
    #[serde(rename = "owner_id", default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

/// Partial update for a pebble. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PebbleUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// `Some(None)` moves the pebble to the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<PebbleContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socratic_questions: Option<Vec<String>>,
}

impl PebbleUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the set fields to `pebble`. The id and owner never change.
    pub fn apply(self, pebble: &mut Pebble) {
        if let Some(topic) = self.topic {
            pebble.topic = topic;
        }
        if let Some(folder_id) = self.folder_id {
            pebble.folder_id = folder_id;
        }
        if let Some(v) = self.is_verified {
            pebble.is_verified = v;
        }
        if let Some(v) = self.is_deleted {
            pebble.is_deleted = v;
        }
        if let Some(content) = self.content {
            pebble.content = content;
        }
        if let Some(questions) = self.socratic_questions {
            pebble.socratic_questions = questions;
        }
    }
}

// ---------------------------------------------------------------------------
// Folder
// ---------------------------------------------------------------------------

/// A node in the owner's folder tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub created_at: i64,
    #[serde(rename = "owner_id", default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl Folder {
    /// A fresh folder with a new id and the current timestamp.
    pub fn new(name: impl Into<String>, parent_id: Option<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            parent_id,
            created_at: now_millis(),
            owner_id: Some(owner_id.into()),
        }
    }
}

/// Partial update for a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderUpdate {
    pub name: Option<String>,
    /// `Some(None)` moves the folder to the root.
    pub parent_id: Option<Option<String>>,
}

impl FolderUpdate {
    pub fn apply(self, folder: &mut Folder) {
        if let Some(name) = self.name {
            folder.name = name;
        }
        if let Some(parent_id) = self.parent_id {
            folder.parent_id = parent_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(title: &str) -> LevelContent {
        LevelContent {
            title: title.into(),
            summary: format!("{title} summary"),
            emoji_collage: vec!["🪨".into()],
            main_content: vec![MainBlock {
                kind: MainBlockKind::KeyPoints,
                heading: None,
                icon_type: IconType::Idea,
                body: MainBody::Points(vec!["a".into(), "b".into()]),
                is_user_edited: false,
            }],
            sidebar_content: vec![SidebarBlock {
                kind: SidebarKind::Stat,
                heading: "1990".into(),
                body: "Year discovered".into(),
                emoji: Some("📅".into()),
                is_user_edited: false,
            }],
            keywords: vec!["rock".into()],
        }
    }

    fn sample_pebble() -> Pebble {
        Pebble {
            id: new_id(),
            topic: "Erosion".into(),
            timestamp: 1_700_000_000_000,
            folder_id: None,
            is_verified: false,
            is_deleted: false,
            content: PebbleContent {
                eli5: level("Simple"),
                academic: level("Deep"),
            },
            socratic_questions: vec!["Why?".into()],
            owner_id: Some("ada".into()),
        }
    }

    #[test]
    fn pebble_uses_wire_field_names() {
        let json = serde_json::to_value(sample_pebble()).expect("serialize");
        let obj = json.as_object().expect("object");
        for key in ["id", "topic", "timestamp", "folderId", "isVerified", "isDeleted", "content", "socraticQuestions", "owner_id"] {
            assert!(obj.contains_key(key), "missing {key}");
        }

        let content = obj["content"].as_object().expect("content object");
        let mut keys: Vec<_> = content.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["ACADEMIC", "ELI5"]);

        let block = &content["ELI5"]["mainContent"][0];
        assert_eq!(block["type"], "key_points");
        assert_eq!(block["iconType"], "idea");
        assert_eq!(block["isUserEdited"], false);
    }

    #[test]
    fn unknown_main_block_kind_is_preserved() {
        let block: MainBlock =
            serde_json::from_str(r#"{"type": "timeline", "body": "1900 | 2000"}"#).expect("parse");
        assert_eq!(block.kind, MainBlockKind::Other("timeline".into()));
        assert_eq!(block.icon_type, IconType::Default);

        let back = serde_json::to_value(&block).expect("serialize");
        assert_eq!(back["type"], "timeline");
    }

    #[test]
    fn main_block_without_type_is_rejected() {
        let result: std::result::Result<MainBlock, _> = serde_json::from_str(r#"{"body": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn cognitive_level_parses_case_insensitively() {
        assert_eq!("eli5".parse::<CognitiveLevel>(), Ok(CognitiveLevel::Eli5));
        assert_eq!("Academic".parse::<CognitiveLevel>(), Ok(CognitiveLevel::Academic));
        assert!("expert".parse::<CognitiveLevel>().is_err());
    }

    #[test]
    fn pebble_update_applies_only_set_fields() {
        let mut pebble = sample_pebble();
        let original_id = pebble.id.clone();
        pebble.folder_id = Some("f1".into());

        PebbleUpdate {
            is_verified: Some(true),
            folder_id: Some(None),
            ..Default::default()
        }
        .apply(&mut pebble);

        assert!(pebble.is_verified);
        assert_eq!(pebble.folder_id, None);
        assert_eq!(pebble.topic, "Erosion");
        assert_eq!(pebble.id, original_id);
        assert!(PebbleUpdate::default().is_empty());
    }

    #[test]
    fn icon_and_sidebar_names_roundtrip() {
        for icon in IconType::ALL {
            assert_eq!(IconType::from_name(icon.as_str()), Some(icon));
        }
        assert_eq!(SidebarKind::from_name("profile"), Some(SidebarKind::Profile));
        assert_eq!(SidebarKind::from_name("quote"), None);
    }

    #[test]
    fn new_folder_has_owner_and_timestamp() {
        let folder = Folder::new("Physics", None, "ada");
        assert!(!folder.id.is_empty());
        assert!(folder.created_at > 0);
        assert_eq!(folder.owner_id.as_deref(), Some("ada"));
    }
}
