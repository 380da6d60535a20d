use async_trait::async_trait;
use bytes::Bytes;

use super::{check_size, ImageStore, StoreError, StoredImage};
use crate::storage::models::ImageRecord;
use crate::storage::{Database, DatabaseError};

/// Image store backed by the local redb database.
#[derive(Clone)]
pub struct EmbeddedStore {
    db: Database,
}

impl EmbeddedStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Run a blocking redb call off the async executor.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db))
            .await
            .map_err(|e| StoreError::Backend(format!("storage task failed: {e}")))?
    }
}

#[async_trait]
impl ImageStore for EmbeddedStore {
    async fn put(&self, filename: &str, key: &str, content: Bytes) -> Result<(), StoreError> {
        let record = ImageRecord::new(key, filename, content.len() as u64);
        self.blocking(move |db| match db.insert_image(&record, &content) {
            Ok(()) => Ok(()),
            Err(DatabaseError::KeyExists(key)) => Err(StoreError::DuplicateKey(key)),
            Err(e) => Err(e.into()),
        })
        .await?;

        tracing::debug!(key = %key, filename = %filename, "Inserted image into redb");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredImage, StoreError> {
        let key = key.to_string();
        self.blocking(move |db| {
            let (record, content) = db
                .get_image(&key)?
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;
            let content = content
                .ok_or_else(|| StoreError::Malformed(format!("{key}: payload is missing")))?;
            check_size(&key, &content, record.byte_size)?;

            Ok(StoredImage {
                filename: record.filename,
                content: Bytes::from(content),
            })
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        self.blocking(move |db| Ok(db.image_exists(&key)?)).await
    }
}
