//! The user-facing library: one owner's pebbles and folders.
//!
//! Every operation runs as the authenticated owner the [`Library`] was built
//! for. Another owner's records are indistinguishable from missing ones.

use tracing::{info, instrument};

use pebbles_providers::{ProviderAdapter, RewriteMode};
use pebbles_shared::{
    CognitiveLevel, Folder, FolderUpdate, LevelContent, MainBlockKind, MainBody, Pebble,
    PebbleUpdate, PebblesError, Result,
};
use pebbles_storage::Storage;

use crate::generate::generate_pebble;
use crate::normalize::split_key_points;

/// Which block list of a level an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSection {
    Main,
    Sidebar,
}

impl BlockSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Sidebar => "sidebar",
        }
    }
}

impl std::fmt::Display for BlockSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One level of the archive: folders and pebbles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub folders: Vec<Folder>,
    pub pebbles: Vec<Pebble>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.pebbles.is_empty()
    }
}

/// Storage scoped to one authenticated owner.
pub struct Library {
    storage: Storage,
    owner: String,
}

impl Library {
    pub fn new(storage: Storage, owner: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        if owner.trim().is_empty() {
            return Err(PebblesError::validation("owner must not be empty"));
        }
        Ok(Self { storage, owner })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    // -----------------------------------------------------------------------
    // Pebbles
    // -----------------------------------------------------------------------

    /// Stamp the owner onto a freshly generated pebble and save it.
    pub async fn store_generated(&self, mut pebble: Pebble) -> Result<Pebble> {
        pebble.owner_id = Some(self.owner.clone());
        self.storage.insert_pebble(&pebble).await?;
        info!(id = %pebble.id, owner = %self.owner, "pebble stored");
        Ok(pebble)
    }

    /// Generate a pebble with the given context pebbles, file it, and save it.
    #[instrument(skip_all, fields(owner = %self.owner, topic = %topic))]
    pub async fn generate(
        &self,
        adapter: &ProviderAdapter,
        topic: &str,
        context_ids: &[String],
        folder: Option<&str>,
    ) -> Result<Pebble> {
        if let Some(folder) = folder {
            self.folder(folder).await?;
        }
        let context = self.context_for(context_ids).await?;
        let mut pebble = generate_pebble(adapter, topic, &context).await?;
        pebble.folder_id = folder.map(str::to_string);
        self.store_generated(pebble).await
    }

    /// Live pebbles, newest first.
    pub async fn list(&self) -> Result<Vec<Pebble>> {
        self.storage.list_pebbles(&self.owner).await
    }

    /// The live pebbles and child folders directly inside `folder`
    /// (`None` is the root).
    pub async fn list_in(&self, folder: Option<&str>) -> Result<Listing> {
        if let Some(folder) = folder {
            self.folder(folder).await?;
        }
        Ok(Listing {
            folders: self.storage.list_child_folders(&self.owner, folder).await?,
            pebbles: self.storage.list_pebbles_in(&self.owner, folder).await?,
        })
    }

    /// Case-insensitive substring search over pebble topics and folder
    /// names, across every folder. Deleted pebbles are not searched.
    pub async fn search(&self, term: &str) -> Result<Listing> {
        let term = term.trim();
        if term.is_empty() {
            return Err(PebblesError::validation("search term must not be empty"));
        }
        Ok(Listing {
            folders: self.storage.search_folders(&self.owner, term).await?,
            pebbles: self.storage.search_pebbles(&self.owner, term).await?,
        })
    }

    /// Soft-deleted pebbles, newest first.
    pub async fn trash(&self) -> Result<Vec<Pebble>> {
        self.storage.list_deleted_pebbles(&self.owner).await
    }

    pub async fn get(&self, id: &str) -> Result<Pebble> {
        self.storage
            .get_pebble(&self.owner, id)
            .await?
            .ok_or_else(|| PebblesError::pebble_not_found(id))
    }

    /// Load the pebbles used as generation context, in the given order.
    pub async fn context_for(&self, ids: &[String]) -> Result<Vec<Pebble>> {
        let mut context = Vec::with_capacity(ids.len());
        for id in ids {
            context.push(self.get(id).await?);
        }
        Ok(context)
    }

    pub async fn verify(&self, id: &str) -> Result<Pebble> {
        self.update(id, PebbleUpdate {
            is_verified: Some(true),
            ..Default::default()
        })
        .await
    }

    pub async fn rename(&self, id: &str, topic: &str) -> Result<Pebble> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PebblesError::validation("topic must not be empty"));
        }
        self.update(id, PebbleUpdate {
            topic: Some(topic.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Move a pebble into `folder`, or to the root when `None`.
    pub async fn move_to(&self, id: &str, folder: Option<&str>) -> Result<Pebble> {
        if let Some(folder) = folder {
            self.folder(folder).await?;
        }
        self.update(id, PebbleUpdate {
            folder_id: Some(folder.map(str::to_string)),
            ..Default::default()
        })
        .await
    }

    /// Move several pebbles at once. Either all of them move or none do.
    #[instrument(skip_all, fields(owner = %self.owner, count = ids.len()))]
    pub async fn move_many(&self, ids: &[String], folder: Option<&str>) -> Result<Vec<Pebble>> {
        if let Some(folder) = folder {
            self.folder(folder).await?;
        }
        self.storage.move_pebbles(&self.owner, ids, folder).await?;
        info!(folder = folder.unwrap_or("root"), "pebbles moved");
        self.context_for(ids).await
    }

    /// Soft delete.
    pub async fn delete(&self, id: &str) -> Result<Pebble> {
        self.update(id, PebbleUpdate {
            is_deleted: Some(true),
            ..Default::default()
        })
        .await
    }

    pub async fn restore(&self, id: &str) -> Result<Pebble> {
        self.update(id, PebbleUpdate {
            is_deleted: Some(false),
            ..Default::default()
        })
        .await
    }

    async fn update(&self, id: &str, update: PebbleUpdate) -> Result<Pebble> {
        self.storage.update_pebble(&self.owner, id, update).await
    }

    // -----------------------------------------------------------------------
    // Block edits
    // -----------------------------------------------------------------------

    /// Replace the heading and/or body of a main block.
    ///
    /// A new body for a `key_points` block is split on `|`.
    pub async fn edit_main_block(
        &self,
        id: &str,
        level: CognitiveLevel,
        index: usize,
        heading: Option<String>,
        body: Option<String>,
    ) -> Result<Pebble> {
        if heading.is_none() && body.is_none() {
            return Err(PebblesError::validation("nothing to edit"));
        }
        self.edit_level(id, level, |content| {
            let block = main_block_mut(content, level, index)?;
            if let Some(heading) = heading {
                block.heading = Some(heading);
            }
            if let Some(body) = body {
                block.body = match block.kind {
                    MainBlockKind::KeyPoints => MainBody::Points(split_key_points(&body)),
                    _ => MainBody::Text(body),
                };
            }
            block.is_user_edited = true;
            Ok(())
        })
        .await
    }

    /// Replace the heading and/or body of a sidebar block.
    pub async fn edit_sidebar_block(
        &self,
        id: &str,
        level: CognitiveLevel,
        index: usize,
        heading: Option<String>,
        body: Option<String>,
    ) -> Result<Pebble> {
        if heading.is_none() && body.is_none() {
            return Err(PebblesError::validation("nothing to edit"));
        }
        self.edit_level(id, level, |content| {
            let block = sidebar_block_mut(content, level, index)?;
            if let Some(heading) = heading {
                block.heading = heading;
            }
            if let Some(body) = body {
                block.body = body;
            }
            block.is_user_edited = true;
            Ok(())
        })
        .await
    }

    pub async fn set_emoji_collage(
        &self,
        id: &str,
        level: CognitiveLevel,
        emojis: Vec<String>,
    ) -> Result<Pebble> {
        self.edit_level(id, level, |content| {
            content.emoji_collage = emojis;
            Ok(())
        })
        .await
    }

    /// Rewrite one block's body with the provider and keep it as a user edit.
    ///
    /// Key points are rewritten one at a time so the list shape survives.
    #[instrument(skip_all, fields(owner = %self.owner, id = %id, level = %level, section = %section, index = index))]
    pub async fn rewrite_block(
        &self,
        adapter: &ProviderAdapter,
        id: &str,
        level: CognitiveLevel,
        section: BlockSection,
        index: usize,
        mode: RewriteMode,
    ) -> Result<Pebble> {
        let mut pebble = self.get(id).await?;
        let content = pebble.content.level_mut(level);

        match section {
            BlockSection::Main => {
                let block = main_block_mut(content, level, index)?;
                block.body = match &block.body {
                    MainBody::Text(text) => MainBody::Text(adapter.rewrite(text, mode).await?),
                    MainBody::Points(points) => {
                        let mut rewritten = Vec::with_capacity(points.len());
                        for point in points {
                            rewritten.push(adapter.rewrite(point, mode).await?);
                        }
                        MainBody::Points(rewritten)
                    }
                };
                block.is_user_edited = true;
            }
            BlockSection::Sidebar => {
                let block = sidebar_block_mut(content, level, index)?;
                block.body = adapter.rewrite(&block.body, mode).await?;
                block.is_user_edited = true;
            }
        }

        info!(mode = %mode, "block rewritten");
        self.update(id, PebbleUpdate {
            content: Some(pebble.content),
            ..Default::default()
        })
        .await
    }

    /// Load, modify one level in place, and save the pebble's content.
    async fn edit_level<F>(&self, id: &str, level: CognitiveLevel, edit: F) -> Result<Pebble>
    where
        F: FnOnce(&mut LevelContent) -> Result<()>,
    {
        let mut pebble = self.get(id).await?;
        edit(pebble.content.level_mut(level))?;
        self.update(id, PebbleUpdate {
            content: Some(pebble.content),
            ..Default::default()
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Folders
    // -----------------------------------------------------------------------

    /// Create a folder and move `initial_pebbles` into it.
    pub async fn create_folder(
        &self,
        name: &str,
        parent: Option<&str>,
        initial_pebbles: &[String],
    ) -> Result<Folder> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PebblesError::validation("folder name must not be empty"));
        }
        if let Some(parent) = parent {
            self.folder(parent).await?;
        }

        let folder = Folder::new(name, parent.map(str::to_string), self.owner.as_str());
        self.storage
            .insert_folder_with_pebbles(&folder, initial_pebbles)
            .await?;
        info!(id = %folder.id, name, pebbles = initial_pebbles.len(), "folder created");
        Ok(folder)
    }

    pub async fn list_folders(&self) -> Result<Vec<Folder>> {
        self.storage.list_folders(&self.owner).await
    }

    pub async fn rename_folder(&self, id: &str, name: &str) -> Result<Folder> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PebblesError::validation("folder name must not be empty"));
        }
        self.storage
            .update_folder(&self.owner, id, FolderUpdate {
                name: Some(name.to_string()),
                ..Default::default()
            })
            .await
    }

    /// Re-parent a folder. Cycles are not detected.
    pub async fn move_folder(&self, id: &str, parent: Option<&str>) -> Result<Folder> {
        if let Some(parent) = parent {
            self.folder(parent).await?;
        }
        self.storage
            .update_folder(&self.owner, id, FolderUpdate {
                parent_id: Some(parent.map(str::to_string)),
                ..Default::default()
            })
            .await
    }

    /// Dissolve a folder: its pebbles and child folders move to its parent,
    /// then the folder is deleted.
    #[instrument(skip_all, fields(owner = %self.owner, id = %id))]
    pub async fn ungroup_folder(&self, id: &str) -> Result<Folder> {
        let folder = self.folder(id).await?;
        let parent = folder.parent_id.as_deref();

        let (pebbles, children) = self.storage.ungroup_folder(&self.owner, id, parent).await?;

        info!(pebbles, children, "folder ungrouped");
        Ok(folder)
    }

    async fn folder(&self, id: &str) -> Result<Folder> {
        self.storage
            .get_folder(&self.owner, id)
            .await?
            .ok_or_else(|| PebblesError::folder_not_found(id))
    }
}

fn main_block_mut(
    content: &mut LevelContent,
    level: CognitiveLevel,
    index: usize,
) -> Result<&mut pebbles_shared::MainBlock> {
    let len = content.main_content.len();
    content
        .main_content
        .get_mut(index)
        .ok_or_else(|| out_of_range(level, BlockSection::Main, index, len))
}

fn sidebar_block_mut(
    content: &mut LevelContent,
    level: CognitiveLevel,
    index: usize,
) -> Result<&mut pebbles_shared::SidebarBlock> {
    let len = content.sidebar_content.len();
    content
        .sidebar_content
        .get_mut(index)
        .ok_or_else(|| out_of_range(level, BlockSection::Sidebar, index, len))
}

fn out_of_range(level: CognitiveLevel, section: BlockSection, index: usize, len: usize) -> PebblesError {
    PebblesError::validation(format!(
        "{level} {section} block {index} is out of range ({len} blocks)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pebbles_providers::{DeepSeekClient, DeepSeekSettings};
    use pebbles_shared::{IconType, MainBlock, PebbleContent, SidebarBlock, SidebarKind, new_id};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_library(owner: &str) -> Library {
        let tmp = std::env::temp_dir().join(format!("pebbles_lib_test_{}.db", new_id()));
        let storage = Storage::open(&tmp).await.expect("open test db");
        Library::new(storage, owner).expect("library")
    }

    fn level(title: &str) -> LevelContent {
        LevelContent {
            title: title.into(),
            summary: format!("{title} summary"),
            emoji_collage: vec!["🪨".into()],
            main_content: vec![
                MainBlock {
                    kind: MainBlockKind::Text,
                    heading: Some("Intro".into()),
                    icon_type: IconType::Idea,
                    body: MainBody::Text("Rocks are old.".into()),
                    is_user_edited: false,
                },
                MainBlock {
                    kind: MainBlockKind::KeyPoints,
                    heading: None,
                    icon_type: IconType::Default,
                    body: MainBody::Points(vec!["one".into(), "two".into()]),
                    is_user_edited: false,
                },
            ],
            sidebar_content: vec![SidebarBlock {
                kind: SidebarKind::Stat,
                heading: "4.5bn".into(),
                body: "Age of Earth".into(),
                emoji: None,
                is_user_edited: false,
            }],
            keywords: vec![],
        }
    }

    fn generated(topic: &str) -> Pebble {
        Pebble {
            id: new_id(),
            topic: topic.into(),
            timestamp: pebbles_shared::now_millis(),
            folder_id: None,
            is_verified: false,
            is_deleted: false,
            content: PebbleContent {
                eli5: level("Simple"),
                academic: level("Formal"),
            },
            socratic_questions: vec![],
            owner_id: None,
        }
    }

    fn rewriting_adapter(server: &MockServer) -> ProviderAdapter {
        ProviderAdapter::DeepSeek(DeepSeekClient::new(
            reqwest::Client::new(),
            DeepSeekSettings {
                api_key: "k".into(),
                base_url: server.uri(),
                model: "deepseek-chat".into(),
                temperature: 1.3,
            },
            0.7,
        ))
    }

    async fn mount_rewrite_reply(server: &MockServer, reply: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": format!("  {reply}\n") } }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn empty_owner_is_rejected() {
        let tmp = std::env::temp_dir().join(format!("pebbles_lib_test_{}.db", new_id()));
        let storage = Storage::open(&tmp).await.unwrap();
        assert!(Library::new(storage, "  ").is_err());
    }

    #[tokio::test]
    async fn store_generated_stamps_owner() {
        let lib = test_library("alice").await;
        let stored = lib.store_generated(generated("Granite")).await.unwrap();
        assert_eq!(stored.owner_id.as_deref(), Some("alice"));
        assert_eq!(lib.get(&stored.id).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn other_owners_cannot_see_or_touch() {
        let tmp = std::env::temp_dir().join(format!("pebbles_lib_test_{}.db", new_id()));
        let alice = Library::new(Storage::open(&tmp).await.unwrap(), "alice").unwrap();
        let stored = alice.store_generated(generated("Granite")).await.unwrap();
        drop(alice);

        let bob = Library::new(Storage::open(&tmp).await.unwrap(), "bob").unwrap();
        assert!(bob.list().await.unwrap().is_empty());
        assert!(matches!(
            bob.verify(&stored.id).await,
            Err(PebblesError::NotFound { kind: "pebble", .. })
        ));
    }

    #[tokio::test]
    async fn delete_and_restore_move_between_list_and_trash() {
        let lib = test_library("alice").await;
        let p = lib.store_generated(generated("Basalt")).await.unwrap();

        lib.delete(&p.id).await.unwrap();
        assert!(lib.list().await.unwrap().is_empty());
        assert_eq!(lib.trash().await.unwrap().len(), 1);

        let restored = lib.restore(&p.id).await.unwrap();
        assert!(!restored.is_deleted);
        assert_eq!(lib.list().await.unwrap().len(), 1);
        assert!(lib.trash().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn verify_rename_and_move() {
        let lib = test_library("alice").await;
        let p = lib.store_generated(generated("Basalt")).await.unwrap();
        let folder = lib.create_folder("Igneous", None, &[]).await.unwrap();

        assert!(lib.verify(&p.id).await.unwrap().is_verified);
        assert_eq!(lib.rename(&p.id, " Flood basalt ").await.unwrap().topic, "Flood basalt");
        assert!(lib.rename(&p.id, "  ").await.is_err());

        let moved = lib.move_to(&p.id, Some(&folder.id)).await.unwrap();
        assert_eq!(moved.folder_id.as_deref(), Some(folder.id.as_str()));
        assert!(lib.move_to(&p.id, None).await.unwrap().folder_id.is_none());
        assert!(matches!(
            lib.move_to(&p.id, Some("missing")).await,
            Err(PebblesError::NotFound { kind: "folder", .. })
        ));
    }

    #[tokio::test]
    async fn context_for_preserves_order_and_rejects_unknown() {
        let lib = test_library("alice").await;
        let a = lib.store_generated(generated("A")).await.unwrap();
        let b = lib.store_generated(generated("B")).await.unwrap();

        let context = lib.context_for(&[b.id.clone(), a.id.clone()]).await.unwrap();
        let topics: Vec<_> = context.iter().map(|p| p.topic.as_str()).collect();
        assert_eq!(topics, vec!["B", "A"]);

        assert!(lib.context_for(&["nope".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn editing_key_points_splits_and_marks_edited() {
        let lib = test_library("alice").await;
        let p = lib.store_generated(generated("Quartz")).await.unwrap();

        let edited = lib
            .edit_main_block(&p.id, CognitiveLevel::Eli5, 1, None, Some("x | y|z".into()))
            .await
            .unwrap();
        let block = &edited.content.eli5.main_content[1];
        assert_eq!(block.body, MainBody::Points(vec!["x".into(), "y".into(), "z".into()]));
        assert!(block.is_user_edited);
        // The other level is untouched.
        assert!(!edited.content.academic.main_content[1].is_user_edited);

        let stored = lib.get(&p.id).await.unwrap();
        assert_eq!(stored, edited);
    }

    #[tokio::test]
    async fn editing_text_block_keeps_pipes() {
        let lib = test_library("alice").await;
        let p = lib.store_generated(generated("Quartz")).await.unwrap();

        let edited = lib
            .edit_main_block(
                &p.id,
                CognitiveLevel::Academic,
                0,
                Some("Overview".into()),
                Some("a|b".into()),
            )
            .await
            .unwrap();
        let block = &edited.content.academic.main_content[0];
        assert_eq!(block.heading.as_deref(), Some("Overview"));
        assert_eq!(block.body, MainBody::Text("a|b".into()));
        assert!(block.is_user_edited);
    }

    #[tokio::test]
    async fn editing_sidebar_block_and_bad_index() {
        let lib = test_library("alice").await;
        let p = lib.store_generated(generated("Quartz")).await.unwrap();

        let edited = lib
            .edit_sidebar_block(&p.id, CognitiveLevel::Eli5, 0, None, Some("Very old".into()))
            .await
            .unwrap();
        let block = &edited.content.eli5.sidebar_content[0];
        assert_eq!(block.heading, "4.5bn");
        assert_eq!(block.body, "Very old");
        assert!(block.is_user_edited);

        let err = lib
            .edit_sidebar_block(&p.id, CognitiveLevel::Eli5, 5, Some("h".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PebblesError::Validation { .. }));
        assert!(
            lib.edit_main_block(&p.id, CognitiveLevel::Eli5, 0, None, None)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn emoji_collage_is_replaced_per_level() {
        let lib = test_library("alice").await;
        let p = lib.store_generated(generated("Quartz")).await.unwrap();

        let edited = lib
            .set_emoji_collage(&p.id, CognitiveLevel::Academic, vec!["💎".into(), "🔬".into()])
            .await
            .unwrap();
        assert_eq!(edited.content.academic.emoji_collage, vec!["💎", "🔬"]);
        assert_eq!(edited.content.eli5.emoji_collage, vec!["🪨"]);
    }

    #[tokio::test]
    async fn rewrite_block_stores_trimmed_reply_as_user_edit() {
        let server = MockServer::start().await;
        mount_rewrite_reply(&server, "Rocks are ancient.").await;
        let adapter = rewriting_adapter(&server);

        let lib = test_library("alice").await;
        let p = lib.store_generated(generated("Quartz")).await.unwrap();

        let rewritten = lib
            .rewrite_block(&adapter, &p.id, CognitiveLevel::Eli5, BlockSection::Main, 0, RewriteMode::Improve)
            .await
            .unwrap();
        let block = &rewritten.content.eli5.main_content[0];
        assert_eq!(block.body, MainBody::Text("Rocks are ancient.".into()));
        assert!(block.is_user_edited);
        assert_eq!(lib.get(&p.id).await.unwrap(), rewritten);
    }

    #[tokio::test]
    async fn rewrite_key_points_rewrites_each_point() {
        let server = MockServer::start().await;
        mount_rewrite_reply(&server, "better").await;
        let adapter = rewriting_adapter(&server);

        let lib = test_library("alice").await;
        let p = lib.store_generated(generated("Quartz")).await.unwrap();

        let rewritten = lib
            .rewrite_block(&adapter, &p.id, CognitiveLevel::Eli5, BlockSection::Main, 1, RewriteMode::Shorter)
            .await
            .unwrap();
        assert_eq!(
            rewritten.content.eli5.main_content[1].body,
            MainBody::Points(vec!["better".into(), "better".into()])
        );
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_rewrite_leaves_pebble_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let adapter = rewriting_adapter(&server);

        let lib = test_library("alice").await;
        let p = lib.store_generated(generated("Quartz")).await.unwrap();

        assert!(
            lib.rewrite_block(&adapter, &p.id, CognitiveLevel::Eli5, BlockSection::Sidebar, 0, RewriteMode::Longer)
                .await
                .is_err()
        );
        assert_eq!(lib.get(&p.id).await.unwrap(), p);
    }

    #[tokio::test]
    async fn create_folder_moves_initial_pebbles() {
        let lib = test_library("alice").await;
        let a = lib.store_generated(generated("A")).await.unwrap();
        let b = lib.store_generated(generated("B")).await.unwrap();

        let folder = lib
            .create_folder("Minerals", None, &[a.id.clone(), b.id.clone()])
            .await
            .unwrap();
        for id in [&a.id, &b.id] {
            assert_eq!(lib.get(id).await.unwrap().folder_id.as_deref(), Some(folder.id.as_str()));
        }
        assert_eq!(lib.list_folders().await.unwrap(), vec![folder]);

        // Unknown pebble: nothing is created.
        assert!(lib.create_folder("Empty", None, &["nope".into()]).await.is_err());
        assert_eq!(lib.list_folders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rename_and_move_folder() {
        let lib = test_library("alice").await;
        let outer = lib.create_folder("Outer", None, &[]).await.unwrap();
        let inner = lib.create_folder("Inner", None, &[]).await.unwrap();

        assert_eq!(lib.rename_folder(&inner.id, "Nested").await.unwrap().name, "Nested");
        let moved = lib.move_folder(&inner.id, Some(&outer.id)).await.unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some(outer.id.as_str()));
        assert!(lib.move_folder(&inner.id, None).await.unwrap().parent_id.is_none());
        assert!(lib.rename_folder("missing", "x").await.is_err());
    }

    #[tokio::test]
    async fn ungroup_moves_contents_to_parent() {
        let lib = test_library("alice").await;
        let parent = lib.create_folder("Parent", None, &[]).await.unwrap();
        let doomed = lib.create_folder("Doomed", Some(&parent.id), &[]).await.unwrap();
        let child = lib.create_folder("Child", Some(&doomed.id), &[]).await.unwrap();
        let p = lib.store_generated(generated("Inside")).await.unwrap();
        lib.move_to(&p.id, Some(&doomed.id)).await.unwrap();

        lib.ungroup_folder(&doomed.id).await.unwrap();

        assert_eq!(lib.get(&p.id).await.unwrap().folder_id.as_deref(), Some(parent.id.as_str()));
        let folders = lib.list_folders().await.unwrap();
        assert_eq!(folders.len(), 2);
        let child = folders.iter().find(|f| f.id == child.id).unwrap();
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
    }

    #[tokio::test]
    async fn ungroup_root_folder_moves_contents_to_root() {
        let lib = test_library("alice").await;
        let top = lib.create_folder("Top", None, &[]).await.unwrap();
        let p = lib.store_generated(generated("Inside")).await.unwrap();
        lib.move_to(&p.id, Some(&top.id)).await.unwrap();

        lib.ungroup_folder(&top.id).await.unwrap();
        assert!(lib.get(&p.id).await.unwrap().folder_id.is_none());
        assert!(lib.list_folders().await.unwrap().is_empty());
        assert!(lib.ungroup_folder(&top.id).await.is_err());
    }

    #[tokio::test]
    async fn list_in_shows_one_level_without_deleted() {
        let lib = test_library("alice").await;
        let top = lib.create_folder("Top", None, &[]).await.unwrap();
        let nested = lib.create_folder("Nested", Some(&top.id), &[]).await.unwrap();
        let filed = lib.store_generated(generated("Filed")).await.unwrap();
        let binned = lib.store_generated(generated("Binned")).await.unwrap();
        let loose = lib.store_generated(generated("Loose")).await.unwrap();
        lib.move_many(&[filed.id.clone(), binned.id.clone()], Some(&top.id))
            .await
            .unwrap();
        lib.delete(&binned.id).await.unwrap();

        let inside = lib.list_in(Some(&top.id)).await.unwrap();
        assert_eq!(inside.folders, vec![nested]);
        assert_eq!(inside.pebbles.len(), 1);
        assert_eq!(inside.pebbles[0].id, filed.id);

        let root = lib.list_in(None).await.unwrap();
        assert_eq!(root.folders, vec![top]);
        assert_eq!(root.pebbles.len(), 1);
        assert_eq!(root.pebbles[0].id, loose.id);

        assert!(lib.list_in(Some("missing")).await.is_err());
    }

    #[tokio::test]
    async fn search_matches_topics_and_folder_names_ignoring_case() {
        let lib = test_library("alice").await;
        let basalt = lib.store_generated(generated("Basalt Columns")).await.unwrap();
        let gone = lib.store_generated(generated("basalt sand")).await.unwrap();
        lib.delete(&gone.id).await.unwrap();
        lib.store_generated(generated("Chalk")).await.unwrap();
        let volcanic = lib.create_folder("Volcanic BASALTS", None, &[]).await.unwrap();
        lib.create_folder("Sediments", None, &[]).await.unwrap();

        let hits = lib.search("  bAsAlT ").await.unwrap();
        assert_eq!(hits.pebbles.len(), 1);
        assert_eq!(hits.pebbles[0].id, basalt.id);
        assert_eq!(hits.folders, vec![volcanic]);

        assert!(lib.search("granite").await.unwrap().is_empty());
        assert!(matches!(lib.search("  ").await, Err(PebblesError::Validation { .. })));
    }

    #[tokio::test]
    async fn move_many_moves_all_or_none() {
        let lib = test_library("alice").await;
        let folder = lib.create_folder("Box", None, &[]).await.unwrap();
        let a = lib.store_generated(generated("A")).await.unwrap();
        let b = lib.store_generated(generated("B")).await.unwrap();

        assert!(
            lib.move_many(&[a.id.clone(), "nope".into()], Some(&folder.id))
                .await
                .is_err()
        );
        assert!(lib.get(&a.id).await.unwrap().folder_id.is_none());

        let moved = lib
            .move_many(&[a.id.clone(), b.id.clone()], Some(&folder.id))
            .await
            .unwrap();
        assert!(moved.iter().all(|p| p.folder_id.as_deref() == Some(folder.id.as_str())));

        let back = lib.move_many(&[b.id.clone()], None).await.unwrap();
        assert!(back[0].folder_id.is_none());
    }
}
