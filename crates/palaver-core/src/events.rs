use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ContentItem;

/// Envelope delivered to room subscribers over the realtime channel.
///
/// Serializes as a JSON object with a `type` discriminator, e.g.
/// `{"type": "new_content", "content": {...}}`. Events are emitted by the
/// ingestion coordinator and the enrichment workers and fanned out by the
/// room hub; delivery is best-effort with no replay.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum RoomEvent {
    /// A content item was created. Broadcast before any enrichment runs.
    NewContent { content: ContentItem },

    /// Enrichment finished for an item; `content` carries the filled-in
    /// transcription/extraction fields.
    TranscriptionUpdate { content: ContentItem },

    /// An item was soft-deleted.
    ContentDeleted { content_id: Uuid },

    /// A user's online flag changed.
    PresenceChanged { user_id: Uuid, online: bool },
}

impl RoomEvent {
    /// Stable event name matching the wire `type` discriminator.
    pub fn event_name(&self) -> &'static str {
        match self {
            RoomEvent::NewContent { .. } => "new_content",
            RoomEvent::TranscriptionUpdate { .. } => "transcription_update",
            RoomEvent::ContentDeleted { .. } => "content_deleted",
            RoomEvent::PresenceChanged { .. } => "presence_changed",
        }
    }

    /// The room this event belongs to, when it carries one.
    pub fn room_id(&self) -> Option<Uuid> {
        match self {
            RoomEvent::NewContent { content } | RoomEvent::TranscriptionUpdate { content } => {
                Some(content.room_id)
            }
            RoomEvent::ContentDeleted { .. } | RoomEvent::PresenceChanged { .. } => None,
        }
    }
}
