use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptive half of an image stored in redb. The payload lives in a
/// separate table under the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub key: String,
    pub filename: String,
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn new(key: impl Into<String>, filename: impl Into<String>, byte_size: u64) -> Self {
        Self {
            key: key.into(),
            filename: filename.into(),
            byte_size,
            created_at: Utc::now(),
        }
    }
}
