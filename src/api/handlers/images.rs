use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue};
use axum::response::Response;
use axum::BoxError;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::api::response::ApiError;
use crate::image_store::{StoreError, StoredImage};
use crate::AppState;

/// Size of the chunks a payload is handed to the transport in.
const SEND_CHUNK: usize = 64 * 1024;

/// Serve a stored image by key.
/// Route: GET /images/*path (the key is the last path segment)
pub async fn serve_image(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let key = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if key.is_empty() {
        return Err(ApiError::not_found("no image key in path"));
    }
    debug!(key = %key, "Looking up image");

    let image = match timeout(state.config.server.request_timeout, state.store.get(key)).await {
        Ok(Ok(image)) => image,
        Ok(Err(StoreError::NotFound(_))) => {
            info!(key = %key, "Image not found");
            return Err(ApiError::not_found(format!("no image with key {key}")));
        }
        Ok(Err(e)) => {
            error!(key = %key, error = %e, "Failed to fetch image");
            return Err(ApiError::internal(format!("cannot get file: {e}")));
        }
        Err(_) => {
            error!(key = %key, "Fetching image timed out");
            return Err(ApiError::unavailable("timed out fetching the image"));
        }
    };

    info!(key = %key, bytes = image.content.len(), "Sending image");
    Ok(payload_response(key, image))
}

/// Build the image response. The body counts what it hands to the transport
/// and the declared `Content-Length` makes hyper fail the connection if the
/// body ends early, so a client never sees a short image as complete.
fn payload_response(key: &str, image: StoredImage) -> Response {
    let expected = image.content.len() as u64;
    let content_type = mime_guess::from_path(&image.filename).first_or_octet_stream();
    let disposition = inline_disposition(&image.filename);

    let body = CountedBody::new(key, expected, payload_chunks(image.content));
    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type.as_ref())
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(expected));
    if let Some(value) = disposition {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    // Stored images never change once written
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

fn payload_chunks(
    mut content: Bytes,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + Unpin {
    let mut chunks = Vec::with_capacity(content.len().div_ceil(SEND_CHUNK));
    while !content.is_empty() {
        let n = content.len().min(SEND_CHUNK);
        chunks.push(Ok(content.split_to(n)));
    }
    stream::iter(chunks)
}

fn inline_disposition(filename: &str) -> Option<HeaderValue> {
    let name: String = filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    if name.is_empty() {
        return Some(HeaderValue::from_static("inline"));
    }
    format!("inline; filename=\"{name}\"").parse().ok()
}

#[derive(Debug, Error)]
#[error("partial write of image {key}: {written} of {expected} bytes")]
struct PartialWrite {
    key: String,
    expected: u64,
    written: u64,
}

/// Response body that tracks how many payload bytes went out.
///
/// A payload that ends short of (or runs past) `expected` yields an error so
/// the transport aborts the response. A body dropped before it finished,
/// usually because the client went away, is logged.
struct CountedBody<S> {
    key: String,
    inner: S,
    expected: u64,
    written: u64,
    finished: bool,
}

impl<S> CountedBody<S> {
    fn new(key: &str, expected: u64, inner: S) -> Self {
        Self {
            key: key.to_string(),
            inner,
            expected,
            written: 0,
            finished: false,
        }
    }

    fn partial_write(&mut self) -> BoxError {
        self.finished = true;
        error!(
            key = %self.key,
            expected = self.expected,
            written = self.written,
            "Image body does not match the stored size"
        );
        Box::new(PartialWrite {
            key: self.key.clone(),
            expected: self.expected,
            written: self.written,
        })
    }
}

impl<S, E> Stream for CountedBody<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<BoxError>,
{
    type Item = Result<Bytes, BoxError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.written += chunk.len() as u64;
                if this.written > this.expected {
                    return Poll::Ready(Some(Err(this.partial_write())));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                let e: BoxError = e.into();
                error!(key = %this.key, error = %e, "Image body failed");
                Poll::Ready(Some(Err(this.partial_write())))
            }
            Poll::Ready(None) if this.written < this.expected => {
                Poll::Ready(Some(Err(this.partial_write())))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for CountedBody<S> {
    fn drop(&mut self) {
        if !self.finished && self.written < self.expected {
            error!(
                key = %self.key,
                expected = self.expected,
                written = self.written,
                "Image response dropped before the payload was sent"
            );
        }
    }
}
