//! SQL migration definitions for the Pebbles database.
//!
//! Migrations are applied in order on database open. Each one records its
//! version in `schema_migrations` as its last statement.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: pebbles, folders",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Generated artifacts. Level content and questions are stored as JSON.
CREATE TABLE IF NOT EXISTS pebbles (
    id            TEXT PRIMARY KEY,
    owner_id      TEXT NOT NULL,
    topic         TEXT NOT NULL,
    timestamp     INTEGER NOT NULL,
    folder_id     TEXT,
    is_verified   INTEGER NOT NULL DEFAULT 0,
    is_deleted    INTEGER NOT NULL DEFAULT 0,
    content_json  TEXT NOT NULL,
    socratic_json TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_pebbles_owner ON pebbles(owner_id, is_deleted);

-- Folder tree. parent_id is not a foreign key; cycles are not checked.
CREATE TABLE IF NOT EXISTS folders (
    id         TEXT PRIMARY KEY,
    owner_id   TEXT NOT NULL,
    name       TEXT NOT NULL,
    parent_id  TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_folders_owner ON folders(owner_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Folder lookup index for pebbles",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_pebbles_folder ON pebbles(owner_id, folder_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
