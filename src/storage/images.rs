use redb::{ReadableTable, ReadableTableMetadata};

use super::db::{Database, DatabaseError};
use super::models::ImageRecord;
use super::tables::*;

impl Database {
    // ========================================================================
    // Image operations
    // ========================================================================

    /// Store a new image under `record.key`. Fails with `KeyExists` if the key
    /// is taken; the check and the insert share one write transaction.
    pub fn insert_image(&self, record: &ImageRecord, content: &[u8]) -> Result<(), DatabaseError> {
        debug_assert!(!record.key.is_empty(), "image key must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(IMAGES)?;
            if table.get(record.key.as_str())?.is_some() {
                return Err(DatabaseError::KeyExists(record.key.clone()));
            }

            let data = rmp_serde::to_vec_named(record)?;
            table.insert(record.key.as_str(), data.as_slice())?;

            let mut content_table = write_txn.open_table(IMAGE_CONTENT)?;
            content_table.insert(record.key.as_str(), content)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get an image record and its payload by key.
    ///
    /// The payload is `None` when the record exists but its content row is
    /// missing, which callers should treat as corruption rather than absence.
    pub fn get_image(
        &self,
        key: &str,
    ) -> Result<Option<(ImageRecord, Option<Vec<u8>>)>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(IMAGES)?;

        let record: ImageRecord = match table.get(key)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(None),
        };

        let content_table = read_txn.open_table(IMAGE_CONTENT)?;
        let content = content_table.get(key)?.map(|data| data.value().to_vec());

        Ok(Some((record, content)))
    }

    /// Check if a key is already in use
    pub fn image_exists(&self, key: &str) -> Result<bool, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(IMAGES)?;
        Ok(table.get(key)?.is_some())
    }

    /// Number of stored images
    pub fn count_images(&self) -> Result<u64, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(IMAGES)?;
        Ok(table.len()?)
    }
}
