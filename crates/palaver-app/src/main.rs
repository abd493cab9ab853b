//! Palaver server binary - composition root.
//!
//! Ties the workspace crates together into one executable:
//! 1. Load configuration from TOML (CLI args > env vars > file > defaults)
//! 2. Open storage (SQLite record store + the two vector index files)
//! 3. Construct the embedding, speech, and extraction engines
//! 4. Wire the ingestion coordinator, query engine, and room hub
//! 5. Serve the axum API until Ctrl-C, then flush the indices to disk

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use palaver_api::{routes, AppState};
use palaver_core::config::PalaverConfig;
use palaver_extract::FileExtractor;
use palaver_ingest::IngestCoordinator;
use palaver_realtime::RoomHub;
use palaver_search::QueryEngine;
use palaver_storage::{ContentStore, Database, SqliteContentStore};
use palaver_vector::{MockEmbedder, OnnxEmbedder, SearchIndex};
use palaver_whisper::{DynSpeechToText, SpeechConfig, WhisperSpeech};

use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_path = args.resolve_config_path();
    let mut config = PalaverConfig::load_or_default(&config_path);

    // CLI overrides.
    config.server.port = args.resolve_port(config.server.port);
    if let Some(ref dir) = args.data_dir {
        config.general.data_dir = dir.display().to_string();
    }
    config.general.log_level = args.resolve_log_level(&config.general.log_level);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    info!(config = %config_path.display(), "Palaver starting");

    std::fs::create_dir_all(&config.general.data_dir)?;

    // === Storage ===

    let database = Arc::new(Database::new(&config.database_path())?);
    let store: Arc<dyn ContentStore> = Arc::new(SqliteContentStore::new(database));

    // === Vector index + embedding ===

    let index = if config.embedding.model_dir.is_empty() {
        warn!("No embedding model configured; using deterministic mock vectors");
        Arc::new(SearchIndex::from_config(&config, MockEmbedder::new())?)
    } else {
        let embedder = OnnxEmbedder::from_directory(
            Path::new(&config.embedding.model_dir),
            config.embedding.dimensions,
        );
        Arc::new(SearchIndex::from_config(&config, embedder)?)
    };

    // === Enrichment engines ===

    let speech: Arc<dyn DynSpeechToText> = Arc::new(WhisperSpeech::new(SpeechConfig {
        model_path: config.speech.model_path.clone(),
        language: config.speech.language.clone(),
    })?);
    let extractor = Arc::new(FileExtractor::new());

    // === Pipeline wiring ===

    let hub = Arc::new(RoomHub::new());
    let coordinator = IngestCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&index),
        Arc::clone(&hub),
        speech,
        extractor,
        config.extraction.clone(),
    );
    let engine = QueryEngine::new(Arc::clone(&store), Arc::clone(&index));

    let state = AppState::new(
        config.clone(),
        store,
        Arc::clone(&index),
        coordinator,
        engine,
        hub,
    );

    // === Serve until shutdown ===

    tokio::select! {
        result = routes::start_server(&config, state) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    index.persist()?;
    info!("Index flushed; goodbye");

    Ok(())
}
