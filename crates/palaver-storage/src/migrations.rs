//! Database schema migrations.
//!
//! Applies the initial schema: the contents table plus the migrations
//! tracking table.

use rusqlite::Connection;
use tracing::info;

use palaver_core::error::PalaverError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental
/// changes.
pub fn run_migrations(conn: &Connection) -> Result<(), PalaverError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| PalaverError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| PalaverError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), PalaverError> {
    conn.execute_batch(
        "
        -- Room content items. The enrichment pipeline only ever touches
        -- enriched_text and enrichment; everything else is written once.
        CREATE TABLE IF NOT EXISTS contents (
            id              TEXT PRIMARY KEY NOT NULL,
            room_id         TEXT NOT NULL,
            author_id       TEXT NOT NULL,
            content_type    TEXT NOT NULL
                            CHECK (content_type IN ('text', 'voice', 'image', 'video', 'document')),
            body            TEXT,
            file_ref        TEXT,
            enriched_text   TEXT,
            enrichment      TEXT NOT NULL DEFAULT 'not_applicable'
                            CHECK (enrichment IN ('not_applicable', 'pending', 'indexed', 'failed')),
            created_at      INTEGER NOT NULL,
            deleted         INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_contents_room_created
            ON contents (room_id, created_at DESC);

        CREATE INDEX IF NOT EXISTS idx_contents_created
            ON contents (created_at DESC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| PalaverError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
