//! Palaver API crate - the HTTP and WebSocket surface.
//!
//! Exposes content creation, deletion, hybrid search, and the per-room
//! realtime subscription endpoint. Authentication and membership are
//! external collaborators: handlers take the author id and the visibility
//! scope as explicit inputs supplied by the gateway in front of this
//! service.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod ws;

pub use routes::{create_router, start_server};
pub use state::AppState;
