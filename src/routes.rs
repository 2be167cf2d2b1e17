use crate::{
    handlers, // Import handlers module
    AppState, // Use the AppState defined in main.rs
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/captions/generate", post(handlers::generate_captions))
        .route("/api/captions/{id}/votes", post(handlers::cast_vote))
        .route("/api/captions/{id}/votes/me", get(handlers::get_my_vote))
        .route("/api/feed", get(handlers::rating_feed))
        .route("/auth/callback", get(handlers::auth_callback))
        .route("/auth/sign-out", post(handlers::sign_out))
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        // Data-URI bodies are ~4/3 the image size; leave generous headroom.
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(state) // Pass the application state
}
