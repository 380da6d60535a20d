//! MongoDB image store.
//!
//! Documents keep the field layout of existing deployments (`filename`,
//! `key`, `file`), so collections written by older writers stay readable.

use async_trait::async_trait;
use bson::{doc, spec::BinarySubtype, Binary, DateTime};
use bytes::Bytes;
use mongodb::{
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, Credential as MongoCredential, IndexOptions},
    Client, Collection, IndexModel,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_size, ImageStore, StoreError, StoredImage};
use crate::config::Credential;

/// Server error code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Serialize, Deserialize)]
struct ImageDoc {
    filename: String,
    key: String,
    #[serde(default)]
    file: Option<Binary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    byte_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime>,
}

impl ImageDoc {
    fn new(filename: &str, key: &str, content: &[u8]) -> Self {
        Self {
            filename: filename.to_string(),
            key: key.to_string(),
            file: Some(Binary {
                subtype: BinarySubtype::Generic,
                bytes: content.to_vec(),
            }),
            byte_size: Some(content.len() as i64),
            created_at: Some(DateTime::now()),
        }
    }

    fn into_stored(self) -> Result<StoredImage, StoreError> {
        let file = self
            .file
            .ok_or_else(|| StoreError::Malformed(format!("{}: no binary payload", self.key)))?;

        if let Some(byte_size) = self.byte_size {
            let byte_size = u64::try_from(byte_size).map_err(|_| {
                StoreError::Malformed(format!("{}: negative byte_size {byte_size}", self.key))
            })?;
            check_size(&self.key, &file.bytes, byte_size)?;
        }

        Ok(StoredImage {
            filename: self.filename,
            content: Bytes::from(file.bytes),
        })
    }
}

/// Image store backed by a MongoDB collection with a unique index on `key`.
pub struct MongoStore {
    collection: Collection<ImageDoc>,
}

impl MongoStore {
    /// Connect, verify the server answers, and make sure the unique index exists.
    pub async fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        credential: Option<&Credential>,
    ) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri).await.map_err(backend_error)?;
        if let Some(credential) = credential {
            let mut mongo_credential = MongoCredential::builder()
                .username(credential.username.clone())
                .password(credential.password.clone())
                .build();
            if !credential.auth_source.is_empty() {
                mongo_credential.source = Some(credential.auth_source.clone());
            }
            options.credential = Some(mongo_credential);
        }

        let client = Client::with_options(options).map_err(backend_error)?;
        client
            .database(database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Backend(format!("MongoDB ping failed: {e}")))?;

        let collection = client
            .database(database)
            .collection::<ImageDoc>(collection);

        let index = IndexModel::builder()
            .keys(doc! { "key": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        collection
            .create_index(index)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to create key index: {e}")))?;

        info!(
            database = %database,
            collection = %collection.name(),
            "Connected to MongoDB"
        );

        Ok(Self { collection })
    }
}

#[async_trait]
impl ImageStore for MongoStore {
    async fn put(&self, filename: &str, key: &str, content: Bytes) -> Result<(), StoreError> {
        let result = self
            .collection
            .insert_one(ImageDoc::new(filename, key, &content))
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    StoreError::DuplicateKey(key.to_string())
                } else {
                    backend_error(e)
                }
            })?;

        tracing::debug!(key = %key, id = %result.inserted_id, "Inserted image document");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredImage, StoreError> {
        self.collection
            .find_one(doc! { "key": key })
            .await
            .map_err(backend_error)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?
            .into_stored()
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let count = self
            .collection
            .count_documents(doc! { "key": key })
            .limit(1)
            .await
            .map_err(backend_error)?;
        Ok(count > 0)
    }
}

fn is_duplicate_key(e: &MongoError) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn backend_error(e: MongoError) -> StoreError {
    match e.kind.as_ref() {
        ErrorKind::BsonDeserialization(inner) => StoreError::Malformed(inner.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_layout() {
        let doc = bson::to_document(&ImageDoc::new("hello.png", "aB3xY9", b"\xDE\xAD")).unwrap();

        assert_eq!(doc.get_str("filename").unwrap(), "hello.png");
        assert_eq!(doc.get_str("key").unwrap(), "aB3xY9");
        assert_eq!(doc.get_binary_generic("file").unwrap(), &vec![0xDE, 0xAD]);
        assert_eq!(doc.get_i64("byte_size").unwrap(), 2);
    }

    #[test]
    fn test_legacy_document_without_size() {
        let raw = doc! {
            "filename": "old.jpg",
            "key": "Legacy",
            "file": Binary { subtype: BinarySubtype::Generic, bytes: vec![1, 2, 3] },
        };
        let image: ImageDoc = bson::from_document(raw).unwrap();

        let stored = image.into_stored().unwrap();
        assert_eq!(stored.filename, "old.jpg");
        assert_eq!(stored.content, Bytes::from_static(&[1, 2, 3]));
    }

    #[test]
    fn test_missing_payload_is_malformed() {
        let raw = doc! { "filename": "x.png", "key": "NoFile" };
        let image: ImageDoc = bson::from_document(raw).unwrap();

        assert!(matches!(
            image.into_stored(),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn test_size_mismatch_is_malformed() {
        let mut image = ImageDoc::new("x.png", "Short1", b"abcdef");
        image.byte_size = Some(10);

        assert!(matches!(
            image.into_stored(),
            Err(StoreError::Malformed(_))
        ));
    }
}
