use crate::storage_trait::{Storage, StorageError};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

pub struct InMemoryStorage {
    values: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    sets: Arc<RwLock<HashMap<String, BTreeSet<String>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            values: Arc::new(RwLock::new(HashMap::new())),
            sets: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Storage for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let values = self.values.read().unwrap();
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut values = self.values.write().unwrap();
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn set_add(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let mut sets = self.sets.write().unwrap();
        Ok(sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let mut sets = self.sets.write().unwrap();
        let Some(set) = sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            sets.remove(key);
        }
        Ok(removed)
    }

    fn set_members(&self, key: &str) -> Result<BTreeSet<String>, StorageError> {
        let sets = self.sets.read().unwrap();
        Ok(sets.get(key).cloned().unwrap_or_default())
    }

    fn set_contains(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let sets = self.sets.read().unwrap();
        Ok(sets.get(key).map_or(false, |s| s.contains(member)))
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}
