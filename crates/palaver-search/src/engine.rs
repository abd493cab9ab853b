//! The hybrid query engine.
//!
//! Four stages over one query: keyword substring lookup against the record
//! store, semantic search at message granularity, semantic search at
//! sentence granularity, then fixed-priority fusion. A content id emitted by
//! an earlier stage is skipped by later ones; nothing is re-ranked.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use palaver_core::config::SearchConfig;
use palaver_core::error::PalaverError;
use palaver_core::types::{ContentItem, ContentType};
use palaver_storage::ContentStore;
use palaver_vector::SearchIndex;

use crate::snippet::{extract_snippet, SNIPPET_WINDOW};

/// How a result matched the query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Keyword match in the text body.
    Text,
    /// Keyword match in a voice item's transcription.
    Transcription,
    /// Keyword match in a document's extracted text, or a sentence-level
    /// semantic hit.
    Document,
    /// Message-level semantic hit.
    Semantic,
}

/// Fixed per-stage confidence scores, used only for client display.
const KEYWORD_SCORE: f64 = 1.0;
const SEMANTIC_SCORE: f64 = 0.8;
const SENTENCE_SCORE: f64 = 0.75;

/// One fused search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: ContentItem,
    pub snippet: String,
    pub match_type: MatchType,
    pub score: f64,
}

/// The complete response for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total: usize,
}

impl SearchResponse {
    fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            results: Vec::new(),
            total: 0,
        }
    }
}

/// Hybrid keyword + semantic query engine.
///
/// Read-only with respect to the pipeline: consults the record store and
/// both vector indices at query time and never mutates either.
pub struct QueryEngine {
    store: Arc<dyn ContentStore>,
    index: Arc<SearchIndex>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn ContentStore>, index: Arc<SearchIndex>) -> Self {
        Self { store, index }
    }

    /// Run the full hybrid search.
    ///
    /// `scope` is the set of rooms the requester may see, supplied by the
    /// external authorization layer. A blank query or empty scope
    /// short-circuits to an empty response without touching the index.
    pub async fn search(
        &self,
        query: &str,
        scope: &[Uuid],
        room: Option<Uuid>,
        limits: &SearchConfig,
    ) -> Result<SearchResponse, PalaverError> {
        if query.trim().is_empty() || scope.is_empty() {
            return Ok(SearchResponse::empty(query));
        }

        let query_lower = query.to_lowercase();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut results: Vec<SearchHit> = Vec::new();

        // -- 1. Keyword stage -------------------------------------------------
        let keyword_items = self
            .store
            .search_text(scope, room, query, limits.keyword_limit)?;

        for item in keyword_items {
            if !seen.insert(item.id) {
                continue;
            }

            let mut match_type = MatchType::Text;
            let mut searchable = item.body.clone().unwrap_or_default();
            if let Some(enriched) = &item.enriched_text {
                if enriched.to_lowercase().contains(&query_lower) {
                    searchable = enriched.clone();
                    match_type = if item.content_type == ContentType::Document {
                        MatchType::Document
                    } else {
                        MatchType::Transcription
                    };
                }
            }

            let snippet = extract_snippet(&searchable, query, SNIPPET_WINDOW);
            results.push(SearchHit {
                content: item,
                snippet,
                match_type,
                score: KEYWORD_SCORE,
            });
        }

        // The query is embedded once and shared by both semantic stages. An
        // embedding failure degrades to keyword-only results.
        let query_vector = match self.index.embed_query(query).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "Query embedding failed; returning keyword results only");
                None
            }
        };

        if let Some(query_vector) = query_vector {
            // -- 2. Semantic message stage ------------------------------------
            let semantic_ids = match self
                .index
                .search_messages(&query_vector, limits.semantic_limit)
            {
                Ok(hits) => hits.into_iter().map(|(id, _)| id).collect::<Vec<_>>(),
                Err(e) => {
                    warn!(error = %e, "Message-level semantic search failed");
                    Vec::new()
                }
            };

            if !semantic_ids.is_empty() {
                let visible = self.fetch_map(&semantic_ids, scope, room)?;
                for id in &semantic_ids {
                    let Some(item) = visible.get(id) else { continue };
                    if !seen.insert(item.id) {
                        continue;
                    }
                    let snippet =
                        extract_snippet(item.searchable_text(), query, SNIPPET_WINDOW);
                    results.push(SearchHit {
                        content: item.clone(),
                        snippet,
                        match_type: MatchType::Semantic,
                        score: SEMANTIC_SCORE,
                    });
                }
            }

            // -- 3. Semantic sentence stage -----------------------------------
            let sentence_hits = match self
                .index
                .search_sentences(&query_vector, limits.sentence_limit)
            {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, "Sentence-level semantic search failed");
                    Vec::new()
                }
            };

            if !sentence_hits.is_empty() {
                let ids: Vec<Uuid> = sentence_hits.iter().map(|h| h.content_id).collect();
                let visible = self.fetch_map(&ids, scope, room)?;
                for hit in &sentence_hits {
                    let Some(item) = visible.get(&hit.content_id) else {
                        continue;
                    };
                    if !seen.insert(item.id) {
                        continue;
                    }
                    let snippet = if hit.sentence.is_empty() {
                        String::new()
                    } else {
                        extract_snippet(&hit.sentence, query, SNIPPET_WINDOW)
                    };
                    results.push(SearchHit {
                        content: item.clone(),
                        snippet,
                        match_type: MatchType::Document,
                        score: SENTENCE_SCORE,
                    });
                }
            }
        }

        debug!(
            query,
            results = results.len(),
            scope_rooms = scope.len(),
            "Hybrid search complete"
        );

        Ok(SearchResponse {
            query: query.to_string(),
            total: results.len(),
            results,
        })
    }

    fn fetch_map(
        &self,
        ids: &[Uuid],
        scope: &[Uuid],
        room: Option<Uuid>,
    ) -> Result<HashMap<Uuid, ContentItem>, PalaverError> {
        let items = self.store.fetch_visible(ids, scope, room)?;
        Ok(items.into_iter().map(|item| (item.id, item)).collect())
    }
}
