mod cache_store;
mod in_memory;
pub mod keys;
mod registry;
mod storage_trait;

#[cfg(feature = "rocksdb")]
mod rocksdb_impl;

#[cfg(test)]
mod tests;

pub use cache_store::{CacheStore, MembershipSides};
pub use in_memory::InMemoryStorage;
pub use registry::ContractRegistry;
pub use storage_trait::{Storage, StorageError};

#[cfg(feature = "rocksdb")]
pub use rocksdb_impl::RocksDBStorage;
