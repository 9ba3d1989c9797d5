//! libSQL storage for pebbles and folders (local file).
//!
//! The [`Storage`] struct wraps a libSQL database. Every query is scoped by
//! owner; a pebble or folder that belongs to someone else is reported exactly
//! like one that does not exist.
//!
//! Level content and Socratic questions are stored as JSON columns and
//! round-trip through the shared serde types.

mod migrations;

use std::path::Path;

use libsql::{Connection, Database, Transaction, params};
use pebbles_shared::{Folder, FolderUpdate, Pebble, PebbleContent, PebbleUpdate, PebblesError, Result};
use tracing::{debug, warn};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

const PEBBLE_COLUMNS: &str =
    "id, owner_id, topic, timestamp, folder_id, is_verified, is_deleted, content_json, socratic_json";

const FOLDER_COLUMNS: &str = "id, owner_id, name, parent_id, created_at";

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PebblesError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    PebblesError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PebblesError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pebble operations
    // -----------------------------------------------------------------------

    /// Insert a new pebble. The pebble must carry an owner.
    pub async fn insert_pebble(&self, pebble: &Pebble) -> Result<()> {
        self.check_writable()?;
        let owner = pebble
            .owner_id
            .as_deref()
            .ok_or_else(|| PebblesError::validation("pebble has no owner"))?;
        let content_json = to_json(&pebble.content)?;
        let socratic_json = to_json(&pebble.socratic_questions)?;

        self.conn
            .execute(
                "INSERT INTO pebbles (id, owner_id, topic, timestamp, folder_id, is_verified, is_deleted, content_json, socratic_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    pebble.id.as_str(),
                    owner,
                    pebble.topic.as_str(),
                    pebble.timestamp,
                    pebble.folder_id.as_deref(),
                    i64::from(pebble.is_verified),
                    i64::from(pebble.is_deleted),
                    content_json,
                    socratic_json,
                ],
            )
            .await
            .map_err(db_err)?;
        debug!(id = %pebble.id, owner, "pebble inserted");
        Ok(())
    }

    /// Get one of `owner`'s pebbles by id, deleted or not.
    pub async fn get_pebble(&self, owner: &str, id: &str) -> Result<Option<Pebble>> {
        let sql = format!("SELECT {PEBBLE_COLUMNS} FROM pebbles WHERE id = ?1 AND owner_id = ?2");
        let mut rows = self
            .conn
            .query(&sql, params![id, owner])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_pebble(&row)?)),
            None => Ok(None),
        }
    }

    /// `owner`'s live pebbles, newest first.
    pub async fn list_pebbles(&self, owner: &str) -> Result<Vec<Pebble>> {
        self.query_pebbles(owner, false).await
    }

    /// `owner`'s soft-deleted pebbles, newest first.
    pub async fn list_deleted_pebbles(&self, owner: &str) -> Result<Vec<Pebble>> {
        self.query_pebbles(owner, true).await
    }

    /// `owner`'s live pebbles filed directly in `folder` (`None` is the
    /// root), newest first.
    pub async fn list_pebbles_in(&self, owner: &str, folder: Option<&str>) -> Result<Vec<Pebble>> {
        let sql = format!(
            "SELECT {PEBBLE_COLUMNS} FROM pebbles
             WHERE owner_id = ?1 AND is_deleted = 0 AND folder_id IS ?2
             ORDER BY timestamp DESC, id DESC"
        );
        let mut rows = self
            .conn
            .query(&sql, params![owner, folder])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_pebble(&row)?);
        }
        Ok(results)
    }

    /// `owner`'s live pebbles whose topic contains `term`, ignoring case,
    /// newest first. Folder placement is ignored.
    pub async fn search_pebbles(&self, owner: &str, term: &str) -> Result<Vec<Pebble>> {
        let needle = term.to_lowercase();
        let mut pebbles = self.query_pebbles(owner, false).await?;
        pebbles.retain(|p| p.topic.to_lowercase().contains(&needle));
        Ok(pebbles)
    }

    async fn query_pebbles(&self, owner: &str, deleted: bool) -> Result<Vec<Pebble>> {
        let sql = format!(
            "SELECT {PEBBLE_COLUMNS} FROM pebbles
             WHERE owner_id = ?1 AND is_deleted = ?2
             ORDER BY timestamp DESC, id DESC"
        );
        let mut rows = self
            .conn
            .query(&sql, params![owner, i64::from(deleted)])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_pebble(&row)?);
        }
        Ok(results)
    }

    /// Apply a partial update to one of `owner`'s pebbles and return the result.
    pub async fn update_pebble(&self, owner: &str, id: &str, update: PebbleUpdate) -> Result<Pebble> {
        self.check_writable()?;
        let mut pebble = self
            .get_pebble(owner, id)
            .await?
            .ok_or_else(|| PebblesError::pebble_not_found(id))?;
        if update.is_empty() {
            return Ok(pebble);
        }
        update.apply(&mut pebble);

        let content_json = to_json(&pebble.content)?;
        let socratic_json = to_json(&pebble.socratic_questions)?;
        self.conn
            .execute(
                "UPDATE pebbles SET topic = ?1, folder_id = ?2, is_verified = ?3, is_deleted = ?4,
                     content_json = ?5, socratic_json = ?6
                 WHERE id = ?7 AND owner_id = ?8",
                params![
                    pebble.topic.as_str(),
                    pebble.folder_id.as_deref(),
                    i64::from(pebble.is_verified),
                    i64::from(pebble.is_deleted),
                    content_json,
                    socratic_json,
                    id,
                    owner,
                ],
            )
            .await
            .map_err(db_err)?;
        debug!(id, owner, "pebble updated");
        Ok(pebble)
    }

    /// Move each of `ids` into `folder` (`None` is the root), all or nothing.
    /// An id `owner` does not have aborts the whole move.
    pub async fn move_pebbles(&self, owner: &str, ids: &[String], folder: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;
        let result = move_pebbles_in(&tx, owner, ids, folder).await;
        finish(tx, result).await?;
        debug!(owner, count = ids.len(), ?folder, "pebbles moved");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Folder operations
    // -----------------------------------------------------------------------

    /// Insert a new folder. The folder must carry an owner.
    pub async fn insert_folder(&self, folder: &Folder) -> Result<()> {
        self.check_writable()?;
        let owner = folder
            .owner_id
            .as_deref()
            .ok_or_else(|| PebblesError::validation("folder has no owner"))?;
        self.conn
            .execute(
                "INSERT INTO folders (id, owner_id, name, parent_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    folder.id.as_str(),
                    owner,
                    folder.name.as_str(),
                    folder.parent_id.as_deref(),
                    folder.created_at,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Insert a new folder and move `pebble_ids` into it in one transaction.
    /// A missing pebble leaves neither the folder nor any move behind.
    pub async fn insert_folder_with_pebbles(&self, folder: &Folder, pebble_ids: &[String]) -> Result<()> {
        self.check_writable()?;
        let owner = folder
            .owner_id
            .as_deref()
            .ok_or_else(|| PebblesError::validation("folder has no owner"))?;

        let tx = self.conn.transaction().await.map_err(db_err)?;
        let result = async {
            tx.execute(
                "INSERT INTO folders (id, owner_id, name, parent_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    folder.id.as_str(),
                    owner,
                    folder.name.as_str(),
                    folder.parent_id.as_deref(),
                    folder.created_at,
                ],
            )
            .await
            .map_err(db_err)?;
            move_pebbles_in(&tx, owner, pebble_ids, Some(folder.id.as_str())).await
        }
        .await;
        finish(tx, result).await
    }

    /// Get one of `owner`'s folders by id.
    pub async fn get_folder(&self, owner: &str, id: &str) -> Result<Option<Folder>> {
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1 AND owner_id = ?2");
        let mut rows = self
            .conn
            .query(&sql, params![id, owner])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_folder(&row)?)),
            None => Ok(None),
        }
    }

    /// All of `owner`'s folders, oldest first.
    pub async fn list_folders(&self, owner: &str) -> Result<Vec<Folder>> {
        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE owner_id = ?1 ORDER BY created_at, id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![owner])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_folder(&row)?);
        }
        Ok(results)
    }

    /// `owner`'s folders whose parent is `parent` (`None` is the root), oldest first.
    pub async fn list_child_folders(&self, owner: &str, parent: Option<&str>) -> Result<Vec<Folder>> {
        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders
             WHERE owner_id = ?1 AND parent_id IS ?2
             ORDER BY created_at, id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![owner, parent])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_folder(&row)?);
        }
        Ok(results)
    }

    /// `owner`'s folders whose name contains `term`, ignoring case.
    pub async fn search_folders(&self, owner: &str, term: &str) -> Result<Vec<Folder>> {
        let needle = term.to_lowercase();
        let mut folders = self.list_folders(owner).await?;
        folders.retain(|f| f.name.to_lowercase().contains(&needle));
        Ok(folders)
    }

    /// Apply a partial update to one of `owner`'s folders and return the result.
    pub async fn update_folder(&self, owner: &str, id: &str, update: FolderUpdate) -> Result<Folder> {
        self.check_writable()?;
        let mut folder = self
            .get_folder(owner, id)
            .await?
            .ok_or_else(|| PebblesError::folder_not_found(id))?;
        update.apply(&mut folder);

        self.conn
            .execute(
                "UPDATE folders SET name = ?1, parent_id = ?2 WHERE id = ?3 AND owner_id = ?4",
                params![folder.name.as_str(), folder.parent_id.as_deref(), id, owner],
            )
            .await
            .map_err(db_err)?;
        Ok(folder)
    }

    /// Delete one of `owner`'s folders. Its contents are not touched.
    pub async fn delete_folder(&self, owner: &str, id: &str) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute(
                "DELETE FROM folders WHERE id = ?1 AND owner_id = ?2",
                params![id, owner],
            )
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(PebblesError::folder_not_found(id));
        }
        Ok(())
    }

    /// Delete folder `id`, moving its pebbles and child folders under `to`
    /// (`None` is the root). Returns how many pebbles and folders moved.
    ///
    /// Runs in one transaction: if the folder is gone, nothing moves.
    pub async fn ungroup_folder(&self, owner: &str, id: &str, to: Option<&str>) -> Result<(u64, u64)> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;
        let result = async {
            let pebbles = tx
                .execute(
                    "UPDATE pebbles SET folder_id = ?1 WHERE owner_id = ?2 AND folder_id = ?3",
                    params![to, owner, id],
                )
                .await
                .map_err(db_err)?;
            let folders = tx
                .execute(
                    "UPDATE folders SET parent_id = ?1 WHERE owner_id = ?2 AND parent_id = ?3",
                    params![to, owner, id],
                )
                .await
                .map_err(db_err)?;
            let deleted = tx
                .execute(
                    "DELETE FROM folders WHERE id = ?1 AND owner_id = ?2",
                    params![id, owner],
                )
                .await
                .map_err(db_err)?;
            if deleted == 0 {
                return Err(PebblesError::folder_not_found(id));
            }
            Ok::<_, PebblesError>((pebbles, folders))
        }
        .await;
        finish(tx, result).await
    }
}

/// Set `folder_id` on each of `owner`'s pebbles in `ids`.
async fn move_pebbles_in(conn: &Connection, owner: &str, ids: &[String], folder: Option<&str>) -> Result<()> {
    for id in ids {
        let affected = conn
            .execute(
                "UPDATE pebbles SET folder_id = ?1 WHERE id = ?2 AND owner_id = ?3",
                params![folder, id.as_str(), owner],
            )
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(PebblesError::pebble_not_found(id));
        }
    }
    Ok(())
}

/// Commit on success, roll back on failure.
async fn finish<T>(tx: Transaction, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(db_err)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

fn db_err(e: libsql::Error) -> PebblesError {
    PebblesError::Storage(e.to_string())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| PebblesError::Storage(format!("encode failed: {e}")))
}

/// Convert a database row (in `PEBBLE_COLUMNS` order) to a [`Pebble`].
fn row_to_pebble(row: &libsql::Row) -> Result<Pebble> {
    let id: String = row.get(0).map_err(db_err)?;
    let content_json: String = row.get(7).map_err(db_err)?;
    let socratic_json: String = row.get(8).map_err(db_err)?;

    let content: PebbleContent = serde_json::from_str(&content_json)
        .map_err(|e| PebblesError::Storage(format!("corrupt content for pebble {id}: {e}")))?;
    let socratic_questions: Vec<String> = serde_json::from_str(&socratic_json)
        .map_err(|e| PebblesError::Storage(format!("corrupt questions for pebble {id}: {e}")))?;

    Ok(Pebble {
        owner_id: Some(row.get::<String>(1).map_err(db_err)?),
        topic: row.get::<String>(2).map_err(db_err)?,
        timestamp: row.get::<i64>(3).map_err(db_err)?,
        folder_id: row.get::<String>(4).ok(),
        is_verified: row.get::<i64>(5).map_err(db_err)? != 0,
        is_deleted: row.get::<i64>(6).map_err(db_err)? != 0,
        content,
        socratic_questions,
        id,
    })
}

/// Convert a database row (in `FOLDER_COLUMNS` order) to a [`Folder`].
fn row_to_folder(row: &libsql::Row) -> Result<Folder> {
    Ok(Folder {
        id: row.get::<String>(0).map_err(db_err)?,
        owner_id: Some(row.get::<String>(1).map_err(db_err)?),
        name: row.get::<String>(2).map_err(db_err)?,
        parent_id: row.get::<String>(3).ok(),
        created_at: row.get::<i64>(4).map_err(db_err)?,
    })
}
