//! Storage gateway: the contract handlers use to persist and fetch images.
//!
//! Backends enforce key uniqueness themselves, so a `put` racing another
//! writer for the same key fails with [`StoreError::DuplicateKey`] instead of
//! overwriting.

mod embedded;
mod mongo;

pub use embedded::EmbeddedStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::storage::DatabaseError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Malformed image document: {0}")]
    Malformed(String),
    #[error("Image not found: {0}")]
    NotFound(String),
}

/// An image as handed back by [`ImageStore::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub filename: String,
    pub content: Bytes,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist a new image under `key`.
    async fn put(&self, filename: &str, key: &str, content: Bytes) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<StoredImage, StoreError>;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// Reject payloads whose length disagrees with the size recorded at write time.
fn check_size(key: &str, content: &[u8], byte_size: u64) -> Result<(), StoreError> {
    if content.len() as u64 != byte_size {
        return Err(StoreError::Malformed(format!(
            "{key}: payload is {} bytes, record says {byte_size}",
            content.len()
        )));
    }
    Ok(())
}
