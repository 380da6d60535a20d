use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use tracing::debug;

use crate::AppState;

/// Route: GET /
pub async fn serve_form(State(state): State<Arc<AppState>>) -> Html<bytes::Bytes> {
    Html(state.pages.form.clone())
}

/// Route: GET /favicon.ico
pub async fn serve_icon(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::CONTENT_TYPE, state.pages.icon_type.clone())],
        state.pages.icon.clone(),
    )
        .into_response()
}

/// Anything without a route of its own goes back to the upload form.
pub async fn redirect_to_root(uri: Uri) -> Response {
    debug!(from = %uri, "Redirecting to /");
    (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
}
