//! Palaver core crate - shared domain types, events, errors, and configuration.
//!
//! Every other crate in the workspace depends on this one. It defines the
//! `ContentItem` model and its enrichment lifecycle, the realtime `RoomEvent`
//! envelope, the `PalaverError` taxonomy, and the TOML-backed configuration.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::PalaverConfig;
pub use error::{PalaverError, Result};
pub use events::RoomEvent;
pub use types::{ContentItem, ContentType, DocumentKind, EnrichmentStatus};
