//! Application state shared across all route handlers.
//!
//! AppState holds handles to every service the handlers touch. All fields
//! are `Arc`s so the state clones cheaply into each handler task.

use std::sync::Arc;
use std::time::Instant;

use palaver_core::config::PalaverConfig;
use palaver_ingest::IngestCoordinator;
use palaver_realtime::RoomHub;
use palaver_search::QueryEngine;
use palaver_storage::ContentStore;
use palaver_vector::SearchIndex;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (read-only after startup).
    pub config: Arc<PalaverConfig>,
    /// The record-store collaborator.
    pub store: Arc<dyn ContentStore>,
    /// Dual-granularity vector index store.
    pub index: Arc<SearchIndex>,
    /// Content creation and enrichment scheduling.
    pub coordinator: Arc<IngestCoordinator>,
    /// Hybrid query engine.
    pub engine: Arc<QueryEngine>,
    /// Realtime fanout registry.
    pub hub: Arc<RoomHub>,
    /// Server start time for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: PalaverConfig,
        store: Arc<dyn ContentStore>,
        index: Arc<SearchIndex>,
        coordinator: IngestCoordinator,
        engine: QueryEngine,
        hub: Arc<RoomHub>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            index,
            coordinator: Arc::new(coordinator),
            engine: Arc::new(engine),
            hub,
            start_time: Instant::now(),
        }
    }
}
