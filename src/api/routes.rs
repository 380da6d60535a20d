use axum::{
    extract::DefaultBodyLimit,
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::{MAX_UPLOAD_SIZE, MULTIPART_OVERHEAD};
use crate::AppState;

/// Routing table for one server instance.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", any(handlers::serve_form))
        .route("/favicon.ico", get(handlers::serve_icon))
        .route(
            "/upload",
            post(handlers::upload_image)
                .fallback(handlers::upload_method_not_allowed)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE + MULTIPART_OVERHEAD)),
        )
        .route("/images/*path", get(handlers::serve_image))
        .fallback(handlers::redirect_to_root)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
