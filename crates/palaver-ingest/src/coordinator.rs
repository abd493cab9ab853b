//! The ingestion coordinator.
//!
//! Receives content-created requests, persists through the record store,
//! broadcasts the new item immediately, and schedules enrichment work that
//! runs independently of the creating request. Enrichment never escalates an
//! error back to the creator: transcription failures become sentinel text,
//! extraction failures leave the item un-enriched, and embedding failures
//! skip the index update.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use palaver_core::config::ExtractionConfig;
use palaver_core::error::PalaverError;
use palaver_core::events::RoomEvent;
use palaver_core::types::{ContentItem, ContentType, DocumentKind, EnrichmentStatus};
use palaver_extract::{split_sentences, TextExtractor};
use palaver_realtime::RoomHub;
use palaver_storage::ContentStore;
use palaver_vector::SearchIndex;
use palaver_whisper::DynSpeechToText;

/// Transcript recorded when recognition produced no speech.
pub const NO_SPEECH_SENTINEL: &str = "[No speech detected]";

/// Transcript recorded when the speech engine failed.
pub const TRANSCRIPTION_FAILED_SENTINEL: &str = "[Transcription failed]";

/// Coordinates content creation, immediate broadcast, and background
/// enrichment.
#[derive(Clone)]
pub struct IngestCoordinator {
    store: Arc<dyn ContentStore>,
    index: Arc<SearchIndex>,
    hub: Arc<RoomHub>,
    speech: Arc<dyn DynSpeechToText>,
    extractor: Arc<dyn TextExtractor>,
    extraction: ExtractionConfig,
}

impl IngestCoordinator {
    pub fn new(
        store: Arc<dyn ContentStore>,
        index: Arc<SearchIndex>,
        hub: Arc<RoomHub>,
        speech: Arc<dyn DynSpeechToText>,
        extractor: Arc<dyn TextExtractor>,
        extraction: ExtractionConfig,
    ) -> Self {
        Self {
            store,
            index,
            hub,
            speech,
            extractor,
            extraction,
        }
    }

    /// Create a plain text item.
    ///
    /// The item is persisted, broadcast, and indexed at message granularity
    /// before this returns; an embedding failure is logged and the creation
    /// still succeeds.
    pub async fn create_text(
        &self,
        room_id: Uuid,
        author_id: Uuid,
        body: String,
    ) -> Result<ContentItem, PalaverError> {
        let item = ContentItem::new_text(room_id, author_id, body);
        self.store.insert(&item)?;
        self.broadcast(room_id, RoomEvent::NewContent {
            content: item.clone(),
        });

        if let Err(e) = self
            .index
            .index_message(item.id, item.body.as_deref().unwrap_or(""))
            .await
        {
            warn!(content_id = %item.id, error = %e, "Skipping message index for new text");
        }

        debug!(content_id = %item.id, room = %room_id, "Text content created");
        Ok(item)
    }

    /// Create a voice item and schedule its transcription worker.
    ///
    /// Returns as soon as the item is persisted and broadcast; the
    /// transcription runs on its own task and reports completion via the
    /// fanout.
    pub async fn create_voice(
        &self,
        room_id: Uuid,
        author_id: Uuid,
        file_ref: String,
    ) -> Result<ContentItem, PalaverError> {
        self.create_attachment(room_id, author_id, ContentType::Voice, None, file_ref)
            .await
    }

    /// Create an attachment item (voice, image, video, or document).
    ///
    /// Voice and document items get an enrichment worker; image and video
    /// items are terminal at creation.
    pub async fn create_attachment(
        &self,
        room_id: Uuid,
        author_id: Uuid,
        content_type: ContentType,
        file_name: Option<String>,
        file_ref: String,
    ) -> Result<ContentItem, PalaverError> {
        let item =
            ContentItem::new_attachment(room_id, author_id, content_type, file_name, file_ref);
        self.store.insert(&item)?;
        self.broadcast(room_id, RoomEvent::NewContent {
            content: item.clone(),
        });

        match content_type {
            ContentType::Voice => {
                let worker = self.clone();
                let id = item.id;
                let file_ref = item.file_ref.clone().unwrap_or_default();
                tokio::spawn(async move {
                    worker.run_transcription(id, room_id, file_ref).await;
                });
            }
            ContentType::Document => {
                let kind = item
                    .body
                    .as_deref()
                    .map(DocumentKind::from_file_name)
                    .unwrap_or_default();
                let worker = self.clone();
                let id = item.id;
                let file_ref = item.file_ref.clone().unwrap_or_default();
                tokio::spawn(async move {
                    worker.run_document(id, room_id, file_ref, kind).await;
                });
            }
            _ => {}
        }

        debug!(
            content_id = %item.id,
            content_type = content_type.as_str(),
            room = %room_id,
            "Attachment content created"
        );
        Ok(item)
    }

    /// Soft-delete an item and broadcast the deletion.
    ///
    /// Index entries referencing the item stay in place; query-time
    /// filtering hides them.
    pub async fn delete_content(&self, content_id: Uuid) -> Result<(), PalaverError> {
        let item = self
            .store
            .get(content_id)?
            .ok_or_else(|| PalaverError::Storage(format!("Content {} not found", content_id)))?;

        self.store.mark_deleted(content_id)?;
        self.broadcast(item.room_id, RoomEvent::ContentDeleted { content_id });
        info!(content_id = %content_id, room = %item.room_id, "Content soft-deleted");
        Ok(())
    }

    fn broadcast(&self, room_id: Uuid, event: RoomEvent) {
        if let Err(e) = self.hub.publish(room_id, &event) {
            warn!(room = %room_id, error = %e, "Broadcast failed");
        }
    }

    // =========================================================================
    // Enrichment workers
    // =========================================================================

    /// Transcription worker: one attempt, no retry.
    ///
    /// Engine failure and empty recognition become sentinel transcripts, so
    /// the item always ends `Indexed` unless its outcome cannot be recorded.
    async fn run_transcription(self, content_id: Uuid, room_id: Uuid, file_ref: String) {
        let text = match self.speech.transcribe_boxed(Path::new(&file_ref)).await {
            Ok(text) if text.trim().is_empty() => {
                info!(content_id = %content_id, "No speech detected in recording");
                NO_SPEECH_SENTINEL.to_string()
            }
            Ok(text) => text,
            Err(e) => {
                warn!(content_id = %content_id, error = %e, "Transcription failed");
                TRANSCRIPTION_FAILED_SENTINEL.to_string()
            }
        };

        if let Err(e) =
            self.store
                .update_enrichment(content_id, Some(&text), EnrichmentStatus::Indexed)
        {
            error!(content_id = %content_id, error = %e, "Could not record transcription");
            let _ = self
                .store
                .update_enrichment(content_id, None, EnrichmentStatus::Failed);
            return;
        }

        if let Err(e) = self.index.index_message(content_id, &text).await {
            warn!(content_id = %content_id, error = %e, "Skipping message index for transcription");
        }

        self.broadcast_enriched(content_id, room_id);
        info!(content_id = %content_id, chars = text.len(), "Transcription recorded");
    }

    /// Document worker: extract, split, index, store a capped copy.
    ///
    /// Empty extraction output leaves the item `NotApplicable`; an
    /// extraction error does the same. Only a record-store failure marks the
    /// item `Failed`.
    async fn run_document(
        self,
        content_id: Uuid,
        room_id: Uuid,
        file_ref: String,
        kind: DocumentKind,
    ) {
        let extractor = Arc::clone(&self.extractor);
        let path = PathBuf::from(&file_ref);
        let extracted =
            tokio::task::spawn_blocking(move || extractor.extract(&path, kind)).await;

        let text = match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(content_id = %content_id, error = %e, "Document extraction failed");
                let _ = self
                    .store
                    .update_enrichment(content_id, None, EnrichmentStatus::NotApplicable);
                return;
            }
            Err(e) => {
                error!(content_id = %content_id, error = %e, "Extraction task panicked");
                let _ = self
                    .store
                    .update_enrichment(content_id, None, EnrichmentStatus::NotApplicable);
                return;
            }
        };

        if text.trim().is_empty() {
            info!(content_id = %content_id, "No text extracted from document");
            let _ = self
                .store
                .update_enrichment(content_id, None, EnrichmentStatus::NotApplicable);
            return;
        }

        let sentences = split_sentences(&text, self.extraction.min_sentence_len);
        if let Err(e) = self.index.index_sentences(content_id, &sentences).await {
            warn!(content_id = %content_id, error = %e, "Skipping sentence index for document");
        }

        let stored = truncate_at_boundary(&text, self.extraction.stored_text_cap);
        if let Err(e) = self.index.index_message(content_id, stored).await {
            warn!(content_id = %content_id, error = %e, "Skipping message index for document");
        }

        if let Err(e) =
            self.store
                .update_enrichment(content_id, Some(stored), EnrichmentStatus::Indexed)
        {
            error!(content_id = %content_id, error = %e, "Could not record extracted text");
            let _ = self
                .store
                .update_enrichment(content_id, None, EnrichmentStatus::Failed);
            return;
        }

        self.broadcast_enriched(content_id, room_id);
        info!(
            content_id = %content_id,
            sentences = sentences.len(),
            chars = stored.len(),
            "Document indexed"
        );
    }

    /// Fetch the freshly updated item and broadcast the enrichment event.
    fn broadcast_enriched(&self, content_id: Uuid, room_id: Uuid) {
        match self.store.get(content_id) {
            Ok(Some(item)) => {
                self.broadcast(room_id, RoomEvent::TranscriptionUpdate { content: item });
            }
            Ok(None) => {
                warn!(content_id = %content_id, "Enriched item vanished before broadcast");
            }
            Err(e) => {
                warn!(content_id = %content_id, error = %e, "Could not load item for broadcast");
            }
        }
    }
}

/// Truncate to at most `cap` bytes without splitting a UTF-8 character.
fn truncate_at_boundary(text: &str, cap: usize) -> &str {
    if text.len() <= cap {
        return text;
    }
    let mut end = cap;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use palaver_extract::MockExtractor;
    use palaver_realtime::Subscriber;
    use palaver_storage::{Database, SqliteContentStore};
    use palaver_vector::MockEmbedder;
    use palaver_whisper::MockSpeech;

    struct Fixture {
        coordinator: IngestCoordinator,
        store: Arc<dyn ContentStore>,
        index: Arc<SearchIndex>,
        hub: Arc<RoomHub>,
        _dir: tempfile::TempDir,
    }

    fn make_fixture(speech: MockSpeech, extractor: MockExtractor) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ContentStore> = Arc::new(SqliteContentStore::new(Arc::new(
            Database::in_memory().unwrap(),
        )));
        let index = Arc::new(
            SearchIndex::open(
                MockEmbedder::new(),
                384,
                (dir.path().join("m.vec"), dir.path().join("m.map.json")),
                (dir.path().join("s.vec"), dir.path().join("s.map.json")),
            )
            .unwrap(),
        );
        let hub = Arc::new(RoomHub::new());

        let coordinator = IngestCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&index),
            Arc::clone(&hub),
            Arc::new(speech),
            Arc::new(extractor),
            ExtractionConfig::default(),
        );

        Fixture {
            coordinator,
            store,
            index,
            hub,
            _dir: dir,
        }
    }

    async fn wait_until_terminal(store: &Arc<dyn ContentStore>, id: Uuid) -> ContentItem {
        for _ in 0..200 {
            if let Some(item) = store.get(id).unwrap() {
                if item.enrichment.is_terminal() {
                    return item;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Timed out waiting for enrichment to finish");
    }

    #[tokio::test]
    async fn test_create_text_persists_broadcasts_and_indexes() {
        let fx = make_fixture(MockSpeech::new(), MockExtractor::new());
        let room = Uuid::new_v4();

        let (sub, mut rx) = Subscriber::new(None);
        fx.hub.subscribe(room, sub);

        let item = fx
            .coordinator
            .create_text(room, Uuid::new_v4(), "hello world".to_string())
            .await
            .unwrap();

        assert_eq!(item.enrichment, EnrichmentStatus::NotApplicable);
        assert!(fx.store.get(item.id).unwrap().is_some());
        assert_eq!(fx.index.message_count(), 1);

        let payload = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "new_content");
        assert_eq!(value["content"]["body"], "hello world");
    }

    #[tokio::test]
    async fn test_voice_transcription_flow() {
        let fx = make_fixture(
            MockSpeech::with_text("meeting notes spoken aloud"),
            MockExtractor::new(),
        );
        let room = Uuid::new_v4();

        let (sub, mut rx) = Subscriber::new(None);
        fx.hub.subscribe(room, sub);

        let item = fx
            .coordinator
            .create_voice(room, Uuid::new_v4(), "/uploads/voice/a.wav".to_string())
            .await
            .unwrap();

        // The creating call returns with enrichment still pending.
        assert_eq!(item.enrichment, EnrichmentStatus::Pending);

        let enriched = wait_until_terminal(&fx.store, item.id).await;
        assert_eq!(enriched.enrichment, EnrichmentStatus::Indexed);
        assert_eq!(
            enriched.enriched_text.as_deref(),
            Some("meeting notes spoken aloud")
        );
        assert_eq!(fx.index.message_count(), 1);

        // Creation event first, then the enrichment completion.
        let first: serde_json::Value =
            serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "new_content");
        let second: serde_json::Value =
            serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["type"], "transcription_update");
        assert_eq!(second["content"]["enriched_text"], "meeting notes spoken aloud");
    }

    #[tokio::test]
    async fn test_voice_no_speech_sentinel() {
        let fx = make_fixture(MockSpeech::empty(), MockExtractor::new());
        let room = Uuid::new_v4();

        let item = fx
            .coordinator
            .create_voice(room, Uuid::new_v4(), "/uploads/voice/silent.wav".to_string())
            .await
            .unwrap();

        let enriched = wait_until_terminal(&fx.store, item.id).await;
        assert_eq!(enriched.enrichment, EnrichmentStatus::Indexed);
        assert_eq!(enriched.enriched_text.as_deref(), Some(NO_SPEECH_SENTINEL));
    }

    #[tokio::test]
    async fn test_voice_engine_failure_sentinel() {
        let fx = make_fixture(MockSpeech::failing(), MockExtractor::new());
        let room = Uuid::new_v4();

        let item = fx
            .coordinator
            .create_voice(room, Uuid::new_v4(), "/uploads/voice/bad.wav".to_string())
            .await
            .unwrap();

        // The failure is user-visible as the sentinel, not as an error state.
        let enriched = wait_until_terminal(&fx.store, item.id).await;
        assert_eq!(enriched.enrichment, EnrichmentStatus::Indexed);
        assert_eq!(
            enriched.enriched_text.as_deref(),
            Some(TRANSCRIPTION_FAILED_SENTINEL)
        );
    }

    #[tokio::test]
    async fn test_document_extraction_flow() {
        let text = "The quarterly revenue grew significantly in Q3. \
                    Operating costs stayed flat across the period. \
                    Margins improved by two full points.";
        let fx = make_fixture(MockSpeech::new(), MockExtractor::with_text(text));
        let room = Uuid::new_v4();

        let item = fx
            .coordinator
            .create_attachment(
                room,
                Uuid::new_v4(),
                ContentType::Document,
                Some("q3-report.pdf".to_string()),
                "/uploads/docs/q3-report.pdf".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(item.enrichment, EnrichmentStatus::Pending);

        let enriched = wait_until_terminal(&fx.store, item.id).await;
        assert_eq!(enriched.enrichment, EnrichmentStatus::Indexed);
        assert_eq!(enriched.enriched_text.as_deref(), Some(text));
        // Three sentences plus the message-level entry.
        assert_eq!(fx.index.sentence_count(), 3);
        assert_eq!(fx.index.message_count(), 1);
    }

    #[tokio::test]
    async fn test_document_empty_extraction_left_not_applicable() {
        let fx = make_fixture(MockSpeech::new(), MockExtractor::empty());
        let room = Uuid::new_v4();

        let item = fx
            .coordinator
            .create_attachment(
                room,
                Uuid::new_v4(),
                ContentType::Document,
                Some("blank.pdf".to_string()),
                "/uploads/docs/blank.pdf".to_string(),
            )
            .await
            .unwrap();

        let done = wait_until_terminal(&fx.store, item.id).await;
        assert_eq!(done.enrichment, EnrichmentStatus::NotApplicable);
        assert!(done.enriched_text.is_none());
        assert_eq!(fx.index.sentence_count(), 0);
        assert_eq!(fx.index.message_count(), 0);
    }

    #[tokio::test]
    async fn test_document_extraction_error_left_not_applicable() {
        let fx = make_fixture(MockSpeech::new(), MockExtractor::failing());
        let room = Uuid::new_v4();

        let item = fx
            .coordinator
            .create_attachment(
                room,
                Uuid::new_v4(),
                ContentType::Document,
                Some("corrupt.docx".to_string()),
                "/uploads/docs/corrupt.docx".to_string(),
            )
            .await
            .unwrap();

        let done = wait_until_terminal(&fx.store, item.id).await;
        assert_eq!(done.enrichment, EnrichmentStatus::NotApplicable);
        assert_eq!(fx.index.sentence_count(), 0);
    }

    #[tokio::test]
    async fn test_image_attachment_never_enriched() {
        let fx = make_fixture(MockSpeech::new(), MockExtractor::new());
        let room = Uuid::new_v4();

        let item = fx
            .coordinator
            .create_attachment(
                room,
                Uuid::new_v4(),
                ContentType::Image,
                Some("cat.png".to_string()),
                "/uploads/images/cat.png".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(item.enrichment, EnrichmentStatus::NotApplicable);
        // Give any wrongly spawned worker a chance to run.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after = fx.store.get(item.id).unwrap().unwrap();
        assert_eq!(after.enrichment, EnrichmentStatus::NotApplicable);
        assert!(after.enriched_text.is_none());
        assert_eq!(fx.index.message_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_content_broadcasts() {
        let fx = make_fixture(MockSpeech::new(), MockExtractor::new());
        let room = Uuid::new_v4();

        let item = fx
            .coordinator
            .create_text(room, Uuid::new_v4(), "doomed".to_string())
            .await
            .unwrap();

        let (sub, mut rx) = Subscriber::new(None);
        fx.hub.subscribe(room, sub);

        fx.coordinator.delete_content(item.id).await.unwrap();

        assert!(fx.store.get(item.id).unwrap().unwrap().deleted);
        let value: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(value["type"], "content_deleted");
        assert_eq!(value["content_id"], item.id.to_string());
    }

    #[tokio::test]
    async fn test_delete_missing_content_errors() {
        let fx = make_fixture(MockSpeech::new(), MockExtractor::new());
        assert!(fx.coordinator.delete_content(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_stored_text_is_capped() {
        let long_text = "A sentence that is long enough to index. ".repeat(200);
        let fx = make_fixture(MockSpeech::new(), MockExtractor::with_text(&long_text));
        let room = Uuid::new_v4();

        let item = fx
            .coordinator
            .create_attachment(
                room,
                Uuid::new_v4(),
                ContentType::Document,
                Some("long.txt".to_string()),
                "/uploads/docs/long.txt".to_string(),
            )
            .await
            .unwrap();

        let enriched = wait_until_terminal(&fx.store, item.id).await;
        assert_eq!(enriched.enrichment, EnrichmentStatus::Indexed);
        assert!(enriched.enriched_text.unwrap().len() <= 4000);
    }

    #[test]
    fn test_truncate_at_boundary_multibyte() {
        let text = "héllo wörld";
        let truncated = truncate_at_boundary(text, 2);
        // Never splits inside the two-byte 'é'.
        assert_eq!(truncated, "h");
        assert_eq!(truncate_at_boundary(text, 100), text);
    }
}
