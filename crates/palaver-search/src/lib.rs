//! Palaver search crate - the hybrid query engine.
//!
//! Fuses a keyword stage (record-store substring lookup) with two semantic
//! stages (message- and sentence-granularity vector search) in fixed
//! priority order, deduplicating by content id with first-stage-wins
//! semantics. Scores are fixed per stage and exist for client display only.

pub mod engine;
pub mod snippet;

pub use engine::{MatchType, QueryEngine, SearchHit, SearchResponse};
pub use snippet::extract_snippet;
