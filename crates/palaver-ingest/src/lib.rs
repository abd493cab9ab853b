//! Palaver ingest crate - the ingestion coordinator and enrichment workers.
//!
//! Content creation is synchronous and short: persist the item, broadcast it
//! to the room, and (for plain text) index it at message granularity. Voice
//! and document items get a spawned enrichment worker that outlives the
//! creating request, runs at most once, and reports completion through the
//! realtime fanout.

pub mod coordinator;

pub use coordinator::{IngestCoordinator, NO_SPEECH_SENTINEL, TRANSCRIPTION_FAILED_SENTINEL};
