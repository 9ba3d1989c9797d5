//! Prompt construction for artifact generation and text rewrites.

use pebbles_shared::{IconType, Pebble, SidebarKind};

/// System prompt for artifact generation.
pub const GENERATION_SYSTEM_PROMPT: &str =
    "You are 'Pebbles', a Cognitive Architect. You output VALID JSON only.";

/// System prompt for rewrite calls.
pub const REWRITE_SYSTEM_PROMPT: &str =
    "You are an expert editor. You output ONLY the rewritten text. No intro, no quotes.";

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Render the `CONTEXT NODES` block, or `None` when there is no context.
pub fn context_block(context: &[Pebble]) -> Option<String> {
    if context.is_empty() {
        return None;
    }
    let lines: Vec<String> = context
        .iter()
        .map(|p| format!("- {}: {}", p.topic, p.content.eli5.summary))
        .collect();
    Some(format!("CONTEXT NODES:\n{}", lines.join("\n")))
}

/// Build the user prompt for generating a pebble on `topic`.
///
/// The prompt spells out the exact JSON field names plus the allowed sidebar
/// types and icon types; nothing on the provider side enforces the shape
/// beyond this text and the JSON response mode.
pub fn generation_prompt(topic: &str, context: &[Pebble]) -> String {
    let context = context_block(context).unwrap_or_default();
    let sidebar_types = quoted_list(SidebarKind::ALL.iter().map(|k| k.as_str()));
    let icon_types = quoted_list(IconType::ALL.iter().map(|i| i.as_str()));

    format!(
        r#"Topic: "{topic}"
{context}

Generate a high-density, magazine-style knowledge artifact.

REQUIRED JSON STRUCTURE (Strictly follow field names):
{{
  "eli5_content": {{
    "title": "...",
    "summary": "...",
    "emojiCollage": ["emoji1", "emoji2", "emoji3"],
    "mainContent": [
       {{ "type": "text", "heading": "...", "body": "...", "iconType": "idea" }},
       {{ "type": "key_points", "body": "Point 1|Point 2|Point 3" }}
    ],
    "sidebarContent": [
       {{ "type": "definition", "heading": "Term Name", "body": "Definition text...", "emoji": "📖" }},
       {{ "type": "stat", "heading": "1990", "body": "Year discovered", "emoji": "📅" }}
    ],
    "keywords": ["tag1", "tag2"]
  }},
  "academic_content": {{ ... same structure as eli5 ... }},
  "socratic_questions": ["Question 1?", "Question 2?", "Question 3?"]
}}

CONSTRAINTS:
1. SidebarBlock allowed types: {sidebar_types}.
2. MainBlock allowed iconTypes: {icon_types}.
3. Do NOT use markdown formatting.
"#
    )
}

fn quoted_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.map(|s| format!("'{s}'")).collect::<Vec<_>>().join(", ")
}

// ---------------------------------------------------------------------------
// Rewrite
// ---------------------------------------------------------------------------

/// Editing style for a rewrite call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RewriteMode {
    #[default]
    Improve,
    Shorter,
    Longer,
    Simplify,
}

impl RewriteMode {
    pub const ALL: [RewriteMode; 4] = [
        RewriteMode::Improve,
        RewriteMode::Shorter,
        RewriteMode::Longer,
        RewriteMode::Simplify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improve => "improve",
            Self::Shorter => "shorter",
            Self::Longer => "longer",
            Self::Simplify => "simplify",
        }
    }

    /// Parse a mode name; anything unrecognized means `Improve`.
    pub fn parse_lenient(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name.trim()))
            .unwrap_or_default()
    }

    /// The natural-language editing instruction for this mode.
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Improve => {
                "Rewrite this text to be more clear, professional, and engaging. Keep the same meaning."
            }
            Self::Shorter => "Summarize this text. Make it concise and punchy. Remove fluff.",
            Self::Longer => "Expand on this text. Add more detail, context, and explanation.",
            Self::Simplify => "Explain this like I'm 5 years old. Use simple words and analogies.",
        }
    }
}

impl std::fmt::Display for RewriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the user prompt for a rewrite call.
pub fn rewrite_prompt(text: &str, mode: RewriteMode) -> String {
    format!("Instruction: {}\n\nOriginal Text: {text}", mode.instruction())
}
