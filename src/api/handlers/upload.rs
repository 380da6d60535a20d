use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, Method};
use axum::response::Html;
use bytes::{Bytes, BytesMut};
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use crate::api::pages::link_page;
use crate::api::response::ApiError;
use crate::config::MAX_UPLOAD_SIZE;
use crate::image_store::StoreError;
use crate::keys::allocate_key;
use crate::AppState;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// Path prefix under which stored images are served.
pub const IMAGES_PATH: &str = "/images";

// ============================================================================
// Handlers
// ============================================================================

/// Route: POST /upload
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Html<String>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!(error = %e, "Rejected upload without a multipart body");
        ApiError::bad_request(format!("cannot parse form: {e}"))
    })?;

    let (filename, content) = read_image(&mut multipart).await?;
    info!(filename = %filename, bytes = content.len(), "Received image upload");

    let deadline = Instant::now() + state.config.server.request_timeout;
    let key = loop {
        let key = match timeout_at(deadline, allocate_key(state.store.as_ref())).await {
            Ok(Ok(key)) => key,
            Ok(Err(e)) => {
                error!(filename = %filename, error = %e, "Key allocation failed");
                return Err(ApiError::bad_request(format!(
                    "cannot get a key to write to the database: {e}"
                )));
            }
            Err(_) => {
                error!(filename = %filename, "Key allocation timed out");
                return Err(ApiError::unavailable("timed out allocating an image key"));
            }
        };

        match timeout_at(deadline, state.store.put(&filename, &key, content.clone())).await {
            Ok(Ok(())) => break key,
            Ok(Err(StoreError::DuplicateKey(_))) => {
                warn!(key = %key, "Key was taken by a concurrent upload, allocating another");
            }
            Ok(Err(e)) => {
                error!(key = %key, filename = %filename, error = %e, "Failed to store image");
                return Err(ApiError::internal(format!(
                    "the image has not been added to the database: {e}"
                )));
            }
            Err(_) => {
                error!(key = %key, filename = %filename, "Storing image timed out");
                return Err(ApiError::unavailable("timed out storing the image"));
            }
        }
    };

    let link = image_link(&headers, &key);
    info!(key = %key, filename = %filename, link = %link, "Stored image");

    Ok(Html(link_page(&link)))
}

/// Fallback for /upload with any method other than POST.
pub async fn upload_method_not_allowed(method: Method) -> ApiError {
    warn!(method = %method, "Method not allowed on /upload");
    ApiError::method_not_allowed(format!("Method {method} not allowed"))
}

// ============================================================================
// Helpers
// ============================================================================

/// Pull the single image field out of the form, reading it chunk by chunk so
/// an oversized file is rejected before it is fully buffered.
async fn read_image(multipart: &mut Multipart) -> Result<(String, Bytes), ApiError> {
    let mut image: Option<(String, Bytes)> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        warn!(error = %e, "Malformed multipart body");
        ApiError::bad_request(format!("cannot parse form: {e}"))
    })? {
        if field.name() != Some(IMAGE_FIELD) {
            while field
                .chunk()
                .await
                .map_err(|e| ApiError::bad_request(format!("cannot parse form: {e}")))?
                .is_some()
            {}
            continue;
        }

        if image.is_some() {
            return Err(ApiError::bad_request(format!(
                "only one \"{IMAGE_FIELD}\" field is allowed"
            )));
        }

        // Browsers send an empty filename when no file was chosen
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                warn!("Upload has an image field without a file");
                ApiError::bad_request(format!(
                    "cannot get file from form: the \"{IMAGE_FIELD}\" field holds no file"
                ))
            })?;

        let mut buf = BytesMut::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::bad_request(format!("cannot read file from form: {e}")))?
        {
            if buf.len() + chunk.len() > MAX_UPLOAD_SIZE {
                warn!(filename = %filename, "Upload exceeds size limit");
                return Err(ApiError::bad_request(format!(
                    "file exceeds maximum upload size of {MAX_UPLOAD_SIZE} bytes"
                )));
            }
            buf.extend_from_slice(&chunk);
        }

        image = Some((filename, buf.freeze()));
    }

    image.ok_or_else(|| {
        warn!("Upload has no image field");
        ApiError::bad_request(format!(
            "cannot get file from form: no \"{IMAGE_FIELD}\" field"
        ))
    })
}

/// Build `<scheme>://<host>/images/<key>` from the proxy's forwarded headers.
fn image_link(headers: &HeaderMap, key: &str) -> String {
    let forwarded = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    };

    let scheme = forwarded("x-forwarded-proto").unwrap_or("http");
    let host = forwarded("x-forwarded-host").unwrap_or("");
    format!("{scheme}://{host}{IMAGES_PATH}/{key}")
}
