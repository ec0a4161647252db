use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("serialization failed")]
    SerializationFailed,
    #[error("deserialization failed")]
    DeserializationFailed,
    #[error("database error: {0}")]
    DatabaseError(String),
}

/// Generic key/value and set store backing the cache.
///
/// Keys and members are plain strings; callers are expected to normalize
/// addresses before building them.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Returns `true` if the member was not already present.
    fn set_add(&self, key: &str, member: &str) -> Result<bool, StorageError>;
    /// Returns `true` if the member was present.
    fn set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError>;
    fn set_members(&self, key: &str) -> Result<BTreeSet<String>, StorageError>;
    fn set_contains(&self, key: &str, member: &str) -> Result<bool, StorageError>;

    fn flush(&self) -> Result<(), StorageError>;
}
