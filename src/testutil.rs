//! Shared test helpers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use bytes::Bytes;

use crate::api::pages::Pages;
use crate::config::{Config, PagesConfig, ServerConfig, StorageBackend, StorageConfig};
use crate::image_store::{EmbeddedStore, ImageStore, StoreError, StoredImage};
use crate::storage::Database;
use crate::AppState;

const BOUNDARY: &str = "share-images-test-boundary";

pub fn test_config(data_dir: &str) -> Config {
    Config {
        pages: PagesConfig::default(),
        server: ServerConfig::default(),
        storage: StorageConfig {
            backend: StorageBackend::Embedded,
            data_dir: data_dir.to_string(),
            ..Default::default()
        },
    }
}

/// Create a test AppState over a temporary redb store. The database handle
/// is returned as well so tests can inspect what was written.
pub fn test_state(temp_dir: &tempfile::TempDir) -> (Arc<AppState>, Database) {
    let data_dir = temp_dir.path().join("data");
    let db = Database::open(&data_dir).expect("Failed to open test database");

    let state = Arc::new(AppState {
        config: test_config(&data_dir.to_string_lossy()),
        pages: Pages::default(),
        store: Arc::new(EmbeddedStore::new(db.clone())),
    });
    (state, db)
}

/// Create a test AppState over an arbitrary store.
pub fn state_with_store(store: Arc<dyn ImageStore>) -> Arc<AppState> {
    Arc::new(AppState {
        config: test_config("./unused"),
        pages: Pages::default(),
        store,
    })
}

/// `POST /upload` request builder carrying the multipart content type.
pub fn upload_request() -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
}

/// Multipart body holding one file part.
pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Body {
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

/// Multipart body holding one plain text field.
pub fn multipart_text_body(field: &str, value: &str) -> Body {
    Body::from(format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n--{BOUNDARY}--\r\n"
    ))
}

/// In-memory store that counts existence checks and can simulate write
/// failures or writers racing for the same key.
#[derive(Default)]
pub struct MemoryStore {
    images: Mutex<HashMap<String, StoredImage>>,
    exists_calls: AtomicUsize,
    put_calls: AtomicUsize,
    lost_races: AtomicUsize,
    fail_writes: bool,
}

impl MemoryStore {
    /// Every `put` fails with a backend error.
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    /// The next `n` puts report a duplicate key, as if another writer got there first.
    pub fn losing_races(n: usize) -> Self {
        Self {
            lost_races: AtomicUsize::new(n),
            ..Default::default()
        }
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn image_count(&self) -> usize {
        self.images.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn put(&self, filename: &str, key: &str, content: Bytes) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(StoreError::Backend("write rejected".to_string()));
        }
        let lost = self
            .lost_races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if lost.is_ok() {
            return Err(StoreError::DuplicateKey(key.to_string()));
        }

        let mut images = self.images.lock().unwrap();
        if images.contains_key(key) {
            return Err(StoreError::DuplicateKey(key.to_string()));
        }
        images.insert(
            key.to_string(),
            StoredImage {
                filename: filename.to_string(),
                content,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredImage, StoreError> {
        self.images
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.images.lock().unwrap().contains_key(key))
    }
}

/// Store whose every operation fails as if the backend were unreachable.
#[derive(Default)]
pub struct FailingStore {
    exists_calls: AtomicUsize,
}

impl FailingStore {
    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageStore for FailingStore {
    async fn put(&self, _filename: &str, _key: &str, _content: Bytes) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<StoredImage, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("connection refused".to_string()))
    }
}
