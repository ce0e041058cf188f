use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Call control
        .route("/calls", post(handlers::start_call))
        .route("/calls/:call_id/stop", post(handlers::stop_call))
        .route("/calls/:call_id/mute", put(handlers::set_mute))
        // Call queries
        .route("/calls/:call_id", get(handlers::get_call_status))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // Local web clients call this API from another origin
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
