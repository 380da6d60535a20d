use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use super::pages::error_page;

// ============================================================================
// Unified error type for handlers
// ============================================================================

/// A handler error, rendered as the HTML error page.
///
/// `Fail` covers client errors (4xx), `Error` covers server-side failures (5xx).
#[derive(Debug)]
pub enum ApiError {
    Fail(StatusCode, String),
    Error(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            ApiError::Fail(code, msg) | ApiError::Error(code, msg) => (code, msg),
        };
        (code, Html(error_page(code, &message))).into_response()
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::NOT_FOUND, message.into())
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::METHOD_NOT_ALLOWED, message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::SERVICE_UNAVAILABLE, message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Fail(code, _) | ApiError::Error(code, _) => *code,
        }
    }
}
