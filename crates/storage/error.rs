use relayer_tinypack::TinypackError;
use thiserror::Error;

use crate::context::Interruption;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Codec error: {0}")]
    Codec(#[from] TinypackError),
    #[error("Schema mismatch: expected {expected} at key 0x{key}")]
    SchemaMismatch { expected: &'static str, key: String },
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    #[error("Value {value} does not fit the key width of {field}")]
    KeyOutOfRange { field: &'static str, value: u64 },
    #[cfg(feature = "rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDB(#[from] rocksdb::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Query interrupted before the record was complete: {0:?}")]
    Interrupted(Interruption),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to lock storage")]
    LockError,
    #[error("{0}")]
    Custom(String),
}

impl StoreError {
    pub(crate) fn schema_mismatch(expected: &'static str, key: &[u8]) -> Self {
        StoreError::SchemaMismatch {
            expected,
            key: hex::encode(key),
        }
    }
}
