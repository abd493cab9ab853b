//! Content item persistence.
//!
//! `ContentStore` is the minimal record-store contract the pipeline relies
//! on; `SqliteContentStore` implements it with raw SQL on the shared
//! Database connection.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use palaver_core::error::PalaverError;
use palaver_core::types::{ContentItem, ContentType, EnrichmentStatus};

use crate::db::Database;

/// Minimal record-store contract used by the ingestion pipeline and the
/// hybrid query engine.
pub trait ContentStore: Send + Sync {
    /// Persist a new content item.
    fn insert(&self, item: &ContentItem) -> Result<(), PalaverError>;

    /// Fetch a single item by id, deleted or not.
    fn get(&self, id: Uuid) -> Result<Option<ContentItem>, PalaverError>;

    /// Record enrichment output and the new lifecycle status. Passing
    /// `None` for `text` leaves any previous enrichment text untouched.
    fn update_enrichment(
        &self,
        id: Uuid,
        text: Option<&str>,
        status: EnrichmentStatus,
    ) -> Result<(), PalaverError>;

    /// Soft-delete an item. Index entries referencing it are filtered at
    /// query time, never removed.
    fn mark_deleted(&self, id: Uuid) -> Result<(), PalaverError>;

    /// Case-insensitive substring search over body and enriched text of
    /// non-deleted items within the visibility scope (and optional single
    /// room), newest first, capped at `limit`.
    fn search_text(
        &self,
        scope: &[Uuid],
        room: Option<Uuid>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ContentItem>, PalaverError>;

    /// Fetch the subset of `ids` that is visible: inside the scope, matching
    /// the optional room filter, and not soft-deleted.
    fn fetch_visible(
        &self,
        ids: &[Uuid],
        scope: &[Uuid],
        room: Option<Uuid>,
    ) -> Result<Vec<ContentItem>, PalaverError>;
}

/// SQLite-backed implementation of [`ContentStore`].
pub struct SqliteContentStore {
    db: Arc<Database>,
}

impl SqliteContentStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

const ITEM_COLUMNS: &str =
    "id, room_id, author_id, content_type, body, file_ref, enriched_text, enrichment, created_at, deleted";

fn placeholders(n: usize) -> String {
    let mut s = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            s.push(',');
        }
        s.push('?');
    }
    s
}

impl ContentStore for SqliteContentStore {
    fn insert(&self, item: &ContentItem) -> Result<(), PalaverError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO contents (id, room_id, author_id, content_type, body, file_ref,
                                       enriched_text, enrichment, created_at, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    item.id.to_string(),
                    item.room_id.to_string(),
                    item.author_id.to_string(),
                    item.content_type.as_str(),
                    item.body,
                    item.file_ref,
                    item.enriched_text,
                    item.enrichment.as_str(),
                    item.created_at.timestamp_millis(),
                    item.deleted as i32,
                ],
            )
            .map_err(|e| PalaverError::Storage(format!("Failed to insert content: {}", e)))?;
            Ok(())
        })
    }

    fn get(&self, id: Uuid) -> Result<Option<ContentItem>, PalaverError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {} FROM contents WHERE id = ?1", ITEM_COLUMNS);
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| PalaverError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| Ok(row_to_item(row)))
                .optional()
                .map_err(|e| PalaverError::Storage(e.to_string()))?;

            match result {
                Some(item) => Ok(Some(item?)),
                None => Ok(None),
            }
        })
    }

    fn update_enrichment(
        &self,
        id: Uuid,
        text: Option<&str>,
        status: EnrichmentStatus,
    ) -> Result<(), PalaverError> {
        self.db.with_conn(|conn| {
            let changed = match text {
                Some(text) => conn
                    .execute(
                        "UPDATE contents SET enriched_text = ?1, enrichment = ?2 WHERE id = ?3",
                        rusqlite::params![text, status.as_str(), id.to_string()],
                    )
                    .map_err(|e| {
                        PalaverError::Storage(format!("Failed to update enrichment: {}", e))
                    })?,
                None => conn
                    .execute(
                        "UPDATE contents SET enrichment = ?1 WHERE id = ?2",
                        rusqlite::params![status.as_str(), id.to_string()],
                    )
                    .map_err(|e| {
                        PalaverError::Storage(format!("Failed to update enrichment: {}", e))
                    })?,
            };

            if changed == 0 {
                return Err(PalaverError::Storage(format!(
                    "Content {} not found for enrichment update",
                    id
                )));
            }
            Ok(())
        })
    }

    fn mark_deleted(&self, id: Uuid) -> Result<(), PalaverError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE contents SET deleted = 1 WHERE id = ?1",
                rusqlite::params![id.to_string()],
            )
            .map_err(|e| PalaverError::Storage(format!("Failed to mark deleted: {}", e)))?;
            Ok(())
        })
    }

    fn search_text(
        &self,
        scope: &[Uuid],
        room: Option<Uuid>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ContentItem>, PalaverError> {
        if scope.is_empty() || query.is_empty() {
            return Ok(Vec::new());
        }

        let needle = query.to_lowercase();
        let mut sql = format!(
            "SELECT {} FROM contents
             WHERE deleted = 0
               AND room_id IN ({})",
            ITEM_COLUMNS,
            placeholders(scope.len())
        );
        let mut params: Vec<String> = scope.iter().map(|r| r.to_string()).collect();

        if let Some(room) = room {
            sql.push_str(" AND room_id = ?");
            params.push(room.to_string());
        }

        sql.push_str(
            " AND (instr(lower(coalesce(body, '')), ?) > 0
                OR instr(lower(coalesce(enriched_text, '')), ?) > 0)",
        );
        params.push(needle.clone());
        params.push(needle);

        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT {}", limit));

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| PalaverError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    Ok(row_to_item(row))
                })
                .map_err(|e| PalaverError::Storage(e.to_string()))?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row.map_err(|e| PalaverError::Storage(e.to_string()))??);
            }
            Ok(items)
        })
    }

    fn fetch_visible(
        &self,
        ids: &[Uuid],
        scope: &[Uuid],
        room: Option<Uuid>,
    ) -> Result<Vec<ContentItem>, PalaverError> {
        if ids.is_empty() || scope.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {} FROM contents
             WHERE deleted = 0
               AND id IN ({})
               AND room_id IN ({})",
            ITEM_COLUMNS,
            placeholders(ids.len()),
            placeholders(scope.len())
        );
        let mut params: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        params.extend(scope.iter().map(|r| r.to_string()));

        if let Some(room) = room {
            sql.push_str(" AND room_id = ?");
            params.push(room.to_string());
        }

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| PalaverError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    Ok(row_to_item(row))
                })
                .map_err(|e| PalaverError::Storage(e.to_string()))?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row.map_err(|e| PalaverError::Storage(e.to_string()))??);
            }
            Ok(items)
        })
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_item(row: &rusqlite::Row<'_>) -> Result<ContentItem, PalaverError> {
    let id_str: String = row.get(0).map_err(|e| PalaverError::Storage(e.to_string()))?;
    let room_str: String = row.get(1).map_err(|e| PalaverError::Storage(e.to_string()))?;
    let author_str: String = row.get(2).map_err(|e| PalaverError::Storage(e.to_string()))?;
    let type_str: String = row.get(3).map_err(|e| PalaverError::Storage(e.to_string()))?;
    let body: Option<String> = row.get(4).map_err(|e| PalaverError::Storage(e.to_string()))?;
    let file_ref: Option<String> = row.get(5).map_err(|e| PalaverError::Storage(e.to_string()))?;
    let enriched_text: Option<String> =
        row.get(6).map_err(|e| PalaverError::Storage(e.to_string()))?;
    let enrichment_str: String = row.get(7).map_err(|e| PalaverError::Storage(e.to_string()))?;
    let created_millis: i64 = row.get(8).map_err(|e| PalaverError::Storage(e.to_string()))?;
    let deleted: i32 = row.get(9).map_err(|e| PalaverError::Storage(e.to_string()))?;

    let content_type: ContentType = type_str
        .parse()
        .map_err(|e: String| PalaverError::Storage(e))?;
    let enrichment: EnrichmentStatus = enrichment_str
        .parse()
        .map_err(|e: String| PalaverError::Storage(e))?;

    Ok(ContentItem {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| PalaverError::Storage(format!("Invalid UUID: {}", e)))?,
        room_id: Uuid::parse_str(&room_str)
            .map_err(|e| PalaverError::Storage(format!("Invalid UUID: {}", e)))?,
        author_id: Uuid::parse_str(&author_str)
            .map_err(|e| PalaverError::Storage(format!("Invalid UUID: {}", e)))?,
        content_type,
        body,
        file_ref,
        enriched_text,
        enrichment,
        created_at: Utc
            .timestamp_millis_opt(created_millis)
            .single()
            .unwrap_or_default(),
        deleted: deleted != 0,
    })
}

/// Extension trait for rusqlite to support optional query results.
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
