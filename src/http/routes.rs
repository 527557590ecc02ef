use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let hls_root = state.manager.store().root().to_path_buf();
    let hls_mount = state.manager.hls().mount.clone();

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Device registration
        .route("/register-token", post(handlers::register_token))
        // Broadcaster ingestion socket
        .route("/live", get(handlers::live_socket))
        // Live session queries
        .route("/broadcasts", get(handlers::list_broadcasts))
        .route("/broadcasts/:venue_id", get(handlers::get_broadcast))
        // HLS playback, straight from the segment store
        .nest_service(&hls_mount, ServeDir::new(hls_root))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
