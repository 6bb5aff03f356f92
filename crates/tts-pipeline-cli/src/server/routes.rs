use crate::server::handlers;
use crate::server::state::ServerContext;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted `/infer` upload
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

pub fn create_router(ctx: ServerContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/tts", get(handlers::tts))
        .route(
            "/infer",
            post(handlers::infer).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
