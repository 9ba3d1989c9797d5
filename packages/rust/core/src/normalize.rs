//! Response normalizer: loosely structured provider JSON → [`Pebble`].
//!
//! Main-content defects are hard errors for the whole response. Sidebar
//! blocks are sanitized with fallbacks, and a block that still does not fit
//! is dropped on its own.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use pebbles_shared::{
    IconType, LevelContent, MainBlock, Pebble, PebbleContent, PebblesError, Result, SidebarBlock,
    SidebarKind,
};

const ELI5_SECTION: &str = "eli5_content";
const ACADEMIC_SECTION: &str = "academic_content";

// ---------------------------------------------------------------------------
// Stamps
// ---------------------------------------------------------------------------

/// Source of the id and creation timestamp given to each new pebble.
pub trait StampSource {
    fn next_id(&self) -> String;
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// UUID v7 ids and the wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemStamps;

impl StampSource for SystemStamps {
    fn next_id(&self) -> String {
        pebbles_shared::new_id()
    }

    fn now_millis(&self) -> i64 {
        pebbles_shared::now_millis()
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Normalize raw provider text with system stamps.
pub fn normalize_response(raw: &str, topic: &str) -> Result<Pebble> {
    Normalizer::<SystemStamps>::default().normalize(raw, topic)
}

/// Turns provider output into pebbles, stamping each with `S`.
#[derive(Debug, Clone, Default)]
pub struct Normalizer<S = SystemStamps> {
    stamps: S,
}

impl<S: StampSource> Normalizer<S> {
    pub fn with_stamps(stamps: S) -> Self {
        Self { stamps }
    }

    /// Parse and coerce `raw` into a pebble on `topic`.
    ///
    /// The result has no owner and no folder, and both flags are false.
    #[instrument(skip_all, fields(topic = %topic, len = raw.len()))]
    pub fn normalize(&self, raw: &str, topic: &str) -> Result<Pebble> {
        let text = strip_code_fence(raw);
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| PebblesError::parse(format!("response is not valid JSON: {e}")))?;
        let Value::Object(mut data) = value else {
            return Err(PebblesError::parse("response is not a JSON object"));
        };

        let eli5 = process_section(&mut data, ELI5_SECTION)?;
        let academic = process_section(&mut data, ACADEMIC_SECTION)?;

        let socratic_questions = match data.remove("socratic_questions") {
            None | Some(Value::Null) => Vec::new(),
            Some(v) => serde_json::from_value(v)
                .map_err(|e| PebblesError::parse(format!("socratic_questions: {e}")))?,
        };

        let pebble = Pebble {
            id: self.stamps.next_id(),
            topic: topic.to_string(),
            timestamp: self.stamps.now_millis(),
            folder_id: None,
            is_verified: false,
            is_deleted: false,
            content: PebbleContent { eli5, academic },
            socratic_questions,
            owner_id: None,
        };
        debug!(id = %pebble.id, "response normalized");
        Ok(pebble)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Remove a leading ```` ```json ```` / ```` ``` ```` fence and a trailing
/// ```` ``` ```` fence, if present.
pub fn strip_code_fence(raw: &str) -> String {
    static OPEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\s*```(?:json|JSON)?").expect("valid regex"));
    static CLOSE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"```\s*$").expect("valid regex"));

    let opened = OPEN_RE.replace(raw, "");
    let closed = CLOSE_RE.replace(&opened, "");
    closed.trim().to_string()
}

/// Split a `key_points` body on `|`, trimming each point.
pub fn split_key_points(body: &str) -> Vec<String> {
    body.split('|').map(|s| s.trim().to_string()).collect()
}

/// Scalar and list fields of a level section, deserialized once the block
/// lists have been taken out.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LevelFields {
    title: String,
    summary: String,
    emoji_collage: Vec<String>,
    keywords: Vec<String>,
}

fn process_section(data: &mut Map<String, Value>, name: &str) -> Result<LevelContent> {
    let section = data
        .remove(name)
        .ok_or_else(|| PebblesError::parse(format!("missing section '{name}'")))?;
    let Value::Object(mut section) = section else {
        return Err(PebblesError::parse(format!("section '{name}' is not an object")));
    };

    let main_raw = take_list(&mut section, name, "mainContent")?;
    let sidebar_raw = take_list(&mut section, name, "sidebarContent")?;

    let main_content = main_raw
        .into_iter()
        .enumerate()
        .map(|(i, block)| process_main_block(block, name, i))
        .collect::<Result<Vec<_>>>()?;

    let sidebar_total = sidebar_raw.len();
    let sidebar_content: Vec<SidebarBlock> = sidebar_raw
        .into_iter()
        .enumerate()
        .filter_map(|(i, block)| sanitize_sidebar_block(block, name, i))
        .collect();
    if sidebar_content.len() < sidebar_total {
        debug!(
            section = name,
            kept = sidebar_content.len(),
            dropped = sidebar_total - sidebar_content.len(),
            "sidebar blocks dropped"
        );
    }

    let fields: LevelFields = serde_json::from_value(Value::Object(section))
        .map_err(|e| PebblesError::parse(format!("{name}: {e}")))?;

    Ok(LevelContent {
        title: fields.title,
        summary: fields.summary,
        emoji_collage: fields.emoji_collage,
        main_content,
        sidebar_content,
        keywords: fields.keywords,
    })
}

/// Remove a block list from a section. Absent or null means empty.
fn take_list(section: &mut Map<String, Value>, name: &str, key: &str) -> Result<Vec<Value>> {
    match section.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(PebblesError::parse(format!("{name}.{key} is not a list"))),
    }
}

fn process_main_block(mut block: Value, section: &str, index: usize) -> Result<MainBlock> {
    let Value::Object(map) = &mut block else {
        return Err(PebblesError::parse(format!(
            "{section}.mainContent[{index}] is not an object"
        )));
    };

    if map.get("type").and_then(Value::as_str) == Some("key_points") {
        let points = match map.get("body") {
            Some(Value::String(body)) => Some(split_key_points(body)),
            _ => None,
        };
        if let Some(points) = points {
            map.insert("body".into(), Value::from(points));
        }
    }

    let known_icon = match map.get("iconType") {
        None | Some(Value::Null) => false,
        Some(Value::String(name)) => IconType::from_name(name).is_some(),
        // Non-string icons are left for deserialization to reject.
        Some(_) => true,
    };
    if !known_icon {
        map.insert("iconType".into(), Value::from(IconType::Default.as_str()));
    }

    serde_json::from_value(block)
        .map_err(|e| PebblesError::parse(format!("{section}.mainContent[{index}]: {e}")))
}

/// Fill in sidebar fallbacks. `None` means the block is dropped.
fn sanitize_sidebar_block(block: Value, section: &str, index: usize) -> Option<SidebarBlock> {
    let Value::Object(mut map) = block else {
        warn!(section, index, "skipping sidebar block that is not an object");
        return None;
    };

    if map.get("heading").is_none_or(Value::is_null) {
        let heading = map
            .get("title")
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::from("Info"));
        map.insert("heading".into(), heading);
    }

    let valid_kind = map
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| SidebarKind::from_name(t).is_some());
    if !valid_kind {
        map.insert("type".into(), Value::from(SidebarKind::Definition.as_str()));
    }

    if map.get("body").is_none_or(Value::is_null) {
        let body = map
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .unwrap_or("No content")
            .to_string();
        map.insert("body".into(), Value::from(body));
    }

    match serde_json::from_value(Value::Object(map)) {
        Ok(block) => Some(block),
        Err(e) => {
            warn!(section, index, error = %e, "skipping invalid sidebar block");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pebbles_shared::{MainBlockKind, MainBody};
    use serde_json::json;
    use std::cell::Cell;

    fn load_fixture(name: &str) -> String {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures/json")
            .join(name);
        std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Same id and timestamp every call.
    struct FixedStamps;

    impl StampSource for FixedStamps {
        fn next_id(&self) -> String {
            "fixed-id".into()
        }
        fn now_millis(&self) -> i64 {
            1_700_000_000_000
        }
    }

    /// Fresh id and a later timestamp every call.
    #[derive(Default)]
    struct CountingStamps(Cell<i64>);

    impl StampSource for CountingStamps {
        fn next_id(&self) -> String {
            self.0.set(self.0.get() + 1);
            format!("id-{}", self.0.get())
        }
        fn now_millis(&self) -> i64 {
            self.0.get() * 1000
        }
    }

    fn level(title: &str) -> Value {
        json!({
            "title": title,
            "summary": "s",
            "emojiCollage": ["🪨"],
            "mainContent": [],
            "sidebarContent": [],
            "keywords": ["k"]
        })
    }

    fn payload_with_eli5(eli5: Value) -> String {
        json!({
            "eli5_content": eli5,
            "academic_content": level("Academic"),
            "socratic_questions": ["Why?"]
        })
        .to_string()
    }

    fn fixed() -> Normalizer<FixedStamps> {
        Normalizer::with_stamps(FixedStamps)
    }

    #[test]
    fn fixture_normalizes_with_exactly_two_levels() {
        let pebble = fixed()
            .normalize(&load_fixture("pebble_response.fixture.json"), "Old rocks")
            .expect("normalize");

        let content = serde_json::to_value(&pebble.content).unwrap();
        let mut keys: Vec<_> = content.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["ACADEMIC", "ELI5"]);

        assert_eq!(pebble.topic, "Old rocks");
        assert_eq!(pebble.id, "fixed-id");
        assert_eq!(pebble.timestamp, 1_700_000_000_000);
        assert_eq!(pebble.content.eli5.title, "Why Rocks Are Old");
        assert_eq!(pebble.content.academic.main_content.len(), 2);
        assert_eq!(pebble.socratic_questions.len(), 3);
    }

    #[test]
    fn normalized_pebble_is_unowned_and_unfiled() {
        let pebble = fixed()
            .normalize(&load_fixture("pebble_response.fixture.json"), "t")
            .unwrap();
        assert!(pebble.owner_id.is_none());
        assert!(pebble.folder_id.is_none());
        assert!(!pebble.is_verified);
        assert!(!pebble.is_deleted);
    }

    #[test]
    fn key_points_string_is_split_and_trimmed() {
        let mut eli5 = level("E");
        eli5["mainContent"] = json!([{ "type": "key_points", "body": "A | B |C" }]);
        let pebble = fixed().normalize(&payload_with_eli5(eli5), "t").unwrap();

        let block = &pebble.content.eli5.main_content[0];
        assert_eq!(block.kind, MainBlockKind::KeyPoints);
        assert_eq!(
            block.body,
            MainBody::Points(vec!["A".into(), "B".into(), "C".into()])
        );
    }

    #[test]
    fn key_points_list_body_is_kept() {
        let mut eli5 = level("E");
        eli5["mainContent"] = json!([{ "type": "key_points", "body": ["x", " y "] }]);
        let pebble = fixed().normalize(&payload_with_eli5(eli5), "t").unwrap();
        assert_eq!(
            pebble.content.eli5.main_content[0].body,
            MainBody::Points(vec!["x".into(), " y ".into()])
        );
    }

    #[test]
    fn pipes_in_text_blocks_are_not_split() {
        let mut eli5 = level("E");
        eli5["mainContent"] = json!([{ "type": "text", "body": "a|b" }]);
        let pebble = fixed().normalize(&payload_with_eli5(eli5), "t").unwrap();
        assert_eq!(
            pebble.content.eli5.main_content[0].body,
            MainBody::Text("a|b".into())
        );
    }

    #[test]
    fn missing_null_or_unknown_icon_becomes_default() {
        let mut eli5 = level("E");
        eli5["mainContent"] = json!([
            { "type": "text", "body": "a" },
            { "type": "text", "body": "b", "iconType": null },
            { "type": "text", "body": "c", "iconType": "sparkles" },
            { "type": "text", "body": "d", "iconType": "future" }
        ]);
        let pebble = fixed().normalize(&payload_with_eli5(eli5), "t").unwrap();
        let icons: Vec<_> = pebble
            .content
            .eli5
            .main_content
            .iter()
            .map(|b| b.icon_type)
            .collect();
        assert_eq!(
            icons,
            vec![IconType::Default, IconType::Default, IconType::Default, IconType::Future]
        );
    }

    #[test]
    fn sidebar_title_and_description_fill_in() {
        let mut eli5 = level("E");
        eli5["sidebarContent"] = json!([{ "title": "Atom", "description": "smallest unit" }]);
        let pebble = fixed().normalize(&payload_with_eli5(eli5), "t").unwrap();

        let block = &pebble.content.eli5.sidebar_content[0];
        assert_eq!(block.heading, "Atom");
        assert_eq!(block.kind, SidebarKind::Definition);
        assert_eq!(block.body, "smallest unit");
    }

    #[test]
    fn sidebar_fallbacks_without_any_source_fields() {
        let mut eli5 = level("E");
        eli5["sidebarContent"] = json!([
            { "type": "quote" },
            { "type": "stat", "heading": "42", "description": "" }
        ]);
        let pebble = fixed().normalize(&payload_with_eli5(eli5), "t").unwrap();

        let sidebar = &pebble.content.eli5.sidebar_content;
        assert_eq!(sidebar[0].heading, "Info");
        assert_eq!(sidebar[0].kind, SidebarKind::Definition);
        assert_eq!(sidebar[0].body, "No content");
        assert_eq!(sidebar[1].kind, SidebarKind::Stat);
        assert_eq!(sidebar[1].body, "No content");
    }

    #[test]
    fn invalid_sidebar_blocks_are_dropped_individually() {
        let mut eli5 = level("E");
        eli5["sidebarContent"] = json!([
            { "type": "definition", "heading": "Keep me", "body": "first" },
            "just a string",
            42,
            { "heading": ["not", "a", "string"], "body": "bad heading" },
            { "type": "profile", "heading": "Keep me too", "body": "last" }
        ]);
        let pebble = fixed().normalize(&payload_with_eli5(eli5), "t").unwrap();

        let headings: Vec<_> = pebble
            .content
            .eli5
            .sidebar_content
            .iter()
            .map(|b| b.heading.as_str())
            .collect();
        assert_eq!(headings, vec!["Keep me", "Keep me too"]);
    }

    #[test]
    fn fixture_drops_only_the_non_object_sidebar_entry() {
        let pebble = fixed()
            .normalize(&load_fixture("pebble_response.fixture.json"), "t")
            .unwrap();
        let sidebar = &pebble.content.eli5.sidebar_content;
        assert_eq!(sidebar.len(), 3);
        assert_eq!(sidebar[1].heading, "Atom");
        assert_eq!(sidebar[2].kind, SidebarKind::Stat);
    }

    #[test]
    fn main_block_without_type_fails_the_request() {
        let mut eli5 = level("E");
        eli5["mainContent"] = json!([
            { "type": "text", "body": "fine" },
            { "heading": "No type", "body": "oops" }
        ]);
        let err = fixed().normalize(&payload_with_eli5(eli5), "t").unwrap_err();
        assert!(matches!(err, PebblesError::Parse { .. }));
        assert!(err.to_string().contains("mainContent[1]"), "{err}");
    }

    #[test]
    fn non_object_main_block_fails_the_request() {
        let mut eli5 = level("E");
        eli5["mainContent"] = json!(["loose text"]);
        assert!(fixed().normalize(&payload_with_eli5(eli5), "t").is_err());
    }

    #[test]
    fn missing_level_field_fails_the_request() {
        for field in ["title", "summary", "emojiCollage", "keywords"] {
            let mut eli5 = level("E");
            eli5.as_object_mut().unwrap().remove(field);
            let err = fixed().normalize(&payload_with_eli5(eli5), "t").unwrap_err();
            assert!(err.to_string().contains(field), "{field}: {err}");
        }
    }

    #[test]
    fn missing_section_fails_the_request() {
        let raw = json!({ "eli5_content": level("E") }).to_string();
        let err = fixed().normalize(&raw, "t").unwrap_err();
        assert!(err.to_string().contains("academic_content"));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = fixed().normalize("{ not json", "t").unwrap_err();
        assert!(matches!(err, PebblesError::Parse { .. }));
        assert!(fixed().normalize("[1, 2]", "t").is_err());
    }

    #[test]
    fn absent_block_lists_and_questions_default_to_empty() {
        let mut eli5 = level("E");
        let map = eli5.as_object_mut().unwrap();
        map.remove("mainContent");
        map.remove("sidebarContent");
        let raw = json!({ "eli5_content": eli5, "academic_content": level("A") }).to_string();

        let pebble = fixed().normalize(&raw, "t").unwrap();
        assert!(pebble.content.eli5.main_content.is_empty());
        assert!(pebble.content.eli5.sidebar_content.is_empty());
        assert!(pebble.socratic_questions.is_empty());
    }

    #[test]
    fn fenced_and_bare_payloads_normalize_identically() {
        let bare = load_fixture("pebble_response.fixture.json");
        let fenced = format!("```json\n{bare}\n```");
        let plain_fence = format!("  ```\n{bare}```  \n");

        let expected = fixed().normalize(&bare, "t").unwrap();
        assert_eq!(fixed().normalize(&fenced, "t").unwrap(), expected);
        assert_eq!(fixed().normalize(&plain_fence, "t").unwrap(), expected);
    }

    #[test]
    fn normalizing_twice_differs_only_in_stamps() {
        let raw = load_fixture("pebble_response.fixture.json");
        let normalizer = Normalizer::with_stamps(CountingStamps::default());

        let first = normalizer.normalize(&raw, "t").unwrap();
        let mut second = normalizer.normalize(&raw, "t").unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.timestamp, second.timestamp);

        second.id = first.id.clone();
        second.timestamp = first.timestamp;
        assert_eq!(first, second);
    }

    #[test]
    fn system_stamps_produce_unique_ids() {
        let raw = load_fixture("pebble_response.fixture.json");
        let a = normalize_response(&raw, "t").unwrap();
        let b = normalize_response(&raw, "t").unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.timestamp > 0);
    }

    #[test]
    fn split_key_points_keeps_empty_segments() {
        assert_eq!(split_key_points("a||b"), vec!["a", "", "b"]);
        assert_eq!(split_key_points("single"), vec!["single"]);
    }
}
