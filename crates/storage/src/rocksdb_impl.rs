use crate::storage_trait::{Storage, StorageError};
use rocksdb_rs::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

const CF_VALUES: &str = "values";
const CF_SETS: &str = "sets";

/// Separates a set key from its member inside the `sets` column family.
const MEMBER_SEPARATOR: u8 = 0;

pub struct RocksDBStorage {
    db: Arc<DB>,
}

impl RocksDBStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_VALUES, Options::default()),
            ColumnFamilyDescriptor::new(CF_SETS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn set_prefix(key: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(key.len() + 1);
        prefix.extend_from_slice(key.as_bytes());
        prefix.push(MEMBER_SEPARATOR);
        prefix
    }

    fn member_key(key: &str, member: &str) -> Vec<u8> {
        let mut composite = Self::set_prefix(key);
        composite.extend_from_slice(member.as_bytes());
        composite
    }

    fn cf(&self, name: &str) -> Result<&rocksdb_rs::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::DatabaseError(format!("{} column family not found", name)))
    }
}

impl Storage for RocksDBStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_VALUES)?;
        self.db
            .get_cf(cf, key.as_bytes())
            .map_err(|e| StorageError::DatabaseError(e.to_string()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(CF_VALUES)?;
        self.db
            .put_cf(cf, key.as_bytes(), value)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))
    }

    fn set_add(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        if self.set_contains(key, member)? {
            return Ok(false);
        }
        let cf = self.cf(CF_SETS)?;
        self.db
            .put_cf(cf, Self::member_key(key, member), b"")
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;
        Ok(true)
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        if !self.set_contains(key, member)? {
            return Ok(false);
        }
        let cf = self.cf(CF_SETS)?;
        self.db
            .delete_cf(cf, Self::member_key(key, member))
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;
        Ok(true)
    }

    fn set_members(&self, key: &str) -> Result<BTreeSet<String>, StorageError> {
        let cf = self.cf(CF_SETS)?;
        let prefix = Self::set_prefix(key);
        let mut members = BTreeSet::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (composite, _) = item.map_err(|e| StorageError::DatabaseError(e.to_string()))?;
            if !composite.starts_with(&prefix) {
                break;
            }
            let member = std::str::from_utf8(&composite[prefix.len()..])
                .map_err(|_| StorageError::DeserializationFailed)?;
            members.insert(member.to_string());
        }

        Ok(members)
    }

    fn set_contains(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let cf = self.cf(CF_SETS)?;
        let found = self
            .db
            .get_cf(cf, Self::member_key(key, member))
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;
        Ok(found.is_some())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}
