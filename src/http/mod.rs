//! HTTP API server
//!
//! - POST /register-token - Register a device as listener or broadcaster for a venue
//! - GET /live?venueId=.. - WebSocket for a broadcaster's raw PCM audio
//! - GET /hls/:venue_id/stream.m3u8 - Live playlist (and its segments)
//! - GET /broadcasts - Live sessions
//! - GET /broadcasts/:venue_id - One live session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
