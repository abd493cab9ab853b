//! The vector index store service.
//!
//! `SearchIndex` owns both granularity indices (message and sentence), each
//! behind its own mutex, plus the embedding service. One lock per granularity
//! serializes `add` against `search`: mutations and reads never interleave,
//! and two adds never interleave. Embedding happens before the lock is taken;
//! the append-and-persist and the scan are the critical sections.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use palaver_core::config::PalaverConfig;
use palaver_core::error::PalaverError;

use crate::embedding::{DynEmbedder, Embedder};
use crate::index::FlatIndex;

/// A sentence-granularity index entry: which content item the sentence came
/// from, and the sentence itself (kept for snippet display).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceRecord {
    pub content_id: Uuid,
    pub sentence: String,
}

/// A deduplicated sentence-search hit: the nearest sentence for one item.
#[derive(Debug, Clone)]
pub struct SentenceHit {
    pub content_id: Uuid,
    pub sentence: String,
    pub distance: f32,
}

/// Over-fetch multiplier for sentence search, to tolerate several indexed
/// sentences of the same document landing among the nearest neighbors.
const SENTENCE_OVERFETCH: usize = 3;

/// Dual-granularity vector index store.
///
/// Constructed once at startup (load-or-create) and shared by handle;
/// `persist` flushes both granularities and is called again at shutdown.
pub struct SearchIndex {
    embedder: Box<dyn DynEmbedder>,
    messages: Mutex<FlatIndex<Uuid>>,
    sentences: Mutex<FlatIndex<SentenceRecord>>,
}

impl SearchIndex {
    /// Open both indices at the given paths, loading existing files when
    /// present.
    pub fn open(
        embedder: impl Embedder + 'static,
        dimensions: usize,
        message_paths: (PathBuf, PathBuf),
        sentence_paths: (PathBuf, PathBuf),
    ) -> Result<Self, PalaverError> {
        let messages = FlatIndex::open(dimensions, message_paths.0, message_paths.1)?;
        let sentences = FlatIndex::open(dimensions, sentence_paths.0, sentence_paths.1)?;

        info!(
            messages = messages.len(),
            sentences = sentences.len(),
            "Vector index store ready"
        );

        Ok(Self {
            embedder: Box::new(embedder),
            messages: Mutex::new(messages),
            sentences: Mutex::new(sentences),
        })
    }

    /// Open using the paths and dimensionality from the application config.
    pub fn from_config(
        config: &PalaverConfig,
        embedder: impl Embedder + 'static,
    ) -> Result<Self, PalaverError> {
        Self::open(
            embedder,
            config.embedding.dimensions,
            (config.message_index_path(), config.message_map_path()),
            (config.sentence_index_path(), config.sentence_map_path()),
        )
    }

    /// Embed `text` and append it to the message-granularity index.
    ///
    /// Blank text is skipped silently; the index is persisted before this
    /// returns. Calling this twice for the same id appends twice.
    pub async fn index_message(&self, id: Uuid, text: &str) -> Result<(), PalaverError> {
        if text.trim().is_empty() {
            debug!(content_id = %id, "Skipping message index for blank text");
            return Ok(());
        }

        let vector = self.embedder.embed_boxed(text).await?;

        let mut index = self
            .messages
            .lock()
            .map_err(|e| PalaverError::Index(format!("Message index lock poisoned: {}", e)))?;
        index.add(&[vector], vec![id])?;
        debug!(content_id = %id, total = index.len(), "Indexed message text");
        Ok(())
    }

    /// Embed each sentence (one batch call) and append them all to the
    /// sentence-granularity index under the same content id.
    pub async fn index_sentences(
        &self,
        id: Uuid,
        sentences: &[String],
    ) -> Result<(), PalaverError> {
        if sentences.is_empty() {
            return Ok(());
        }

        let vectors = self.embedder.embed_batch_boxed(sentences).await?;
        let records: Vec<SentenceRecord> = sentences
            .iter()
            .map(|s| SentenceRecord {
                content_id: id,
                sentence: s.clone(),
            })
            .collect();

        let mut index = self
            .sentences
            .lock()
            .map_err(|e| PalaverError::Index(format!("Sentence index lock poisoned: {}", e)))?;
        index.add(&vectors, records)?;
        info!(content_id = %id, sentences = sentences.len(), "Indexed document sentences");
        Ok(())
    }

    /// Embed a query string once, for use across both granularities.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, PalaverError> {
        self.embedder.embed_boxed(query).await
    }

    /// Nearest content ids at message granularity, ascending distance.
    pub fn search_messages(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(Uuid, f32)>, PalaverError> {
        let index = self
            .messages
            .lock()
            .map_err(|e| PalaverError::Index(format!("Message index lock poisoned: {}", e)))?;
        index.search(query, k)
    }

    /// Nearest sentences, deduplicated to the best sentence per content item.
    ///
    /// Over-fetches 3x the requested count before deduplicating, so that a
    /// document with several matching sentences still leaves room for other
    /// items in the result.
    pub fn search_sentences(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SentenceHit>, PalaverError> {
        let index = self
            .sentences
            .lock()
            .map_err(|e| PalaverError::Index(format!("Sentence index lock poisoned: {}", e)))?;

        let raw = index.search(query, k.saturating_mul(SENTENCE_OVERFETCH))?;

        let mut seen = std::collections::HashSet::new();
        let mut hits = Vec::new();
        for (record, distance) in raw {
            if seen.insert(record.content_id) {
                hits.push(SentenceHit {
                    content_id: record.content_id,
                    sentence: record.sentence,
                    distance,
                });
                if hits.len() >= k {
                    break;
                }
            }
        }
        Ok(hits)
    }

    /// Flush both granularities to disk. Called at shutdown; every add has
    /// already persisted, so this is a final safety write.
    pub fn persist(&self) -> Result<(), PalaverError> {
        self.messages
            .lock()
            .map_err(|e| PalaverError::Index(format!("Message index lock poisoned: {}", e)))?
            .persist()?;
        self.sentences
            .lock()
            .map_err(|e| PalaverError::Index(format!("Sentence index lock poisoned: {}", e)))?
            .persist()?;
        Ok(())
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().map(|i| i.len()).unwrap_or(0)
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences.lock().map(|i| i.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("messages", &self.message_count())
            .field("sentences", &self.sentence_count())
            .finish()
    }
}
