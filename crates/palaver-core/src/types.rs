use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// The kind of content contributed to a room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Plain text typed by the author.
    Text,
    /// Recorded voice clip, transcribed asynchronously.
    Voice,
    /// Image attachment. Never enriched.
    Image,
    /// Video attachment. Never enriched.
    Video,
    /// Document attachment, text-extracted asynchronously.
    Document,
}

impl ContentType {
    /// Whether items of this type go through an enrichment worker.
    pub fn needs_enrichment(&self) -> bool {
        matches!(self, ContentType::Voice | ContentType::Document)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Voice => "voice",
            ContentType::Image => "image",
            ContentType::Video => "video",
            ContentType::Document => "document",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "voice" => Ok(ContentType::Voice),
            "image" => Ok(ContentType::Image),
            "video" => Ok(ContentType::Video),
            "document" => Ok(ContentType::Document),
            other => Err(format!("Unknown content type: {}", other)),
        }
    }
}

/// Enrichment lifecycle state of a content item.
///
/// Items that never need enrichment (text, image, video) are terminal at
/// `NotApplicable` from creation. Voice and document items start `Pending`
/// and transition exactly once to `Indexed` or `Failed`; a document whose
/// extraction yields no text drops back to `NotApplicable`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// No enrichment required or nothing to enrich. Terminal.
    #[default]
    NotApplicable,
    /// An enrichment worker has been scheduled but has not finished.
    Pending,
    /// Enrichment output recorded and indexed. Terminal.
    Indexed,
    /// The worker could not record its outcome. Terminal, never retried.
    Failed,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::NotApplicable => "not_applicable",
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Indexed => "indexed",
            EnrichmentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EnrichmentStatus::Pending)
    }
}

impl std::str::FromStr for EnrichmentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "not_applicable" => Ok(EnrichmentStatus::NotApplicable),
            "pending" => Ok(EnrichmentStatus::Pending),
            "indexed" => Ok(EnrichmentStatus::Indexed),
            "failed" => Ok(EnrichmentStatus::Failed),
            other => Err(format!("Unknown enrichment status: {}", other)),
        }
    }
}

/// Declared format of a document attachment.
///
/// Unknown formats are treated as plain text on a best-effort basis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Word,
    SlideDeck,
    PlainText,
    #[default]
    Unknown,
}

impl DocumentKind {
    /// Infer the document kind from a file name's extension.
    pub fn from_file_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => DocumentKind::Pdf,
            "doc" | "docx" => DocumentKind::Word,
            "ppt" | "pptx" => DocumentKind::SlideDeck,
            "txt" | "md" => DocumentKind::PlainText,
            _ => DocumentKind::Unknown,
        }
    }
}

// =============================================================================
// Entity structs
// =============================================================================

/// One unit of room content.
///
/// Owned by the record store; the enrichment pipeline only reads items and
/// updates the `enriched_text` / `enrichment` pair. `file_ref` is an opaque
/// payload reference resolved by the file-persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub content_type: ContentType,
    /// Text body, or the original file name for attachments.
    pub body: Option<String>,
    /// Opaque reference to the raw payload (e.g. a stored file path).
    pub file_ref: Option<String>,
    /// Transcription or extraction output, filled in by enrichment.
    pub enriched_text: Option<String>,
    pub enrichment: EnrichmentStatus,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
}

impl ContentItem {
    /// Build a new text item, terminal at `NotApplicable`.
    pub fn new_text(room_id: Uuid, author_id: Uuid, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            author_id,
            content_type: ContentType::Text,
            body: Some(body),
            file_ref: None,
            enriched_text: None,
            enrichment: EnrichmentStatus::NotApplicable,
            created_at: Utc::now(),
            deleted: false,
        }
    }

    /// Build a new attachment item. Voice and document items start `Pending`.
    pub fn new_attachment(
        room_id: Uuid,
        author_id: Uuid,
        content_type: ContentType,
        file_name: Option<String>,
        file_ref: String,
    ) -> Self {
        let enrichment = if content_type.needs_enrichment() {
            EnrichmentStatus::Pending
        } else {
            EnrichmentStatus::NotApplicable
        };
        Self {
            id: Uuid::new_v4(),
            room_id,
            author_id,
            content_type,
            body: file_name,
            file_ref: Some(file_ref),
            enriched_text: None,
            enrichment,
            created_at: Utc::now(),
            deleted: false,
        }
    }

    /// The text a search should read for this item: enrichment output when
    /// present, otherwise the body.
    pub fn searchable_text(&self) -> &str {
        self.enriched_text
            .as_deref()
            .or(self.body.as_deref())
            .unwrap_or("")
    }
}

// =============================================================================
// Tests
// =============================================================================
