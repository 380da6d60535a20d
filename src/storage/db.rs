use redb::{Database as RedbDatabase, ReadTransaction, WriteTransaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

/// File name of the image database inside the data directory.
const DB_FILE: &str = "share-images.redb";

/// Errors from the embedded image database. redb errors are boxed to keep
/// the enum small.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Cannot create data directory {path:?}: {source}")]
    DataDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot open image database: {0}")]
    Open(Box<redb::DatabaseError>),
    #[error("Image transaction failed: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("Image table unavailable: {0}")]
    Table(Box<redb::TableError>),
    #[error("Image storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Image write not committed: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Cannot encode image record: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("Cannot decode image record: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Key already in use: {0}")]
    KeyExists(String),
}

macro_rules! boxed_redb_error {
    ($($source:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<redb::$source> for DatabaseError {
                fn from(e: redb::$source) -> Self {
                    DatabaseError::$variant(Box::new(e))
                }
            }
        )*
    };
}

boxed_redb_error! {
    DatabaseError => Open,
    TransactionError => Transaction,
    TableError => Table,
    StorageError => Storage,
    CommitError => Commit,
}

/// Handle to the image database. Clones share one redb instance.
#[derive(Clone)]
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Database {
    /// Open the image database under `data_dir`, creating the directory,
    /// the file and both image tables on first use.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).map_err(|source| DatabaseError::DataDir {
            path: data_dir.to_path_buf(),
            source,
        })?;
        let db = Arc::new(RedbDatabase::create(data_dir.join(DB_FILE))?);

        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(IMAGES)?;
            write_txn.open_table(IMAGE_CONTENT)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub(super) fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    pub(super) fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }
}
