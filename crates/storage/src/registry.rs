use crate::keys;
use crate::storage_trait::{Storage, StorageError};
use betcache_types::{Address, ContractKind};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Append-only set of contract addresses discovered from factory events.
#[derive(Clone)]
pub struct ContractRegistry {
    storage: Arc<dyn Storage>,
}

impl ContractRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Returns `true` if the address was newly discovered.
    pub fn register(&self, kind: ContractKind, address: &Address) -> Result<bool, StorageError> {
        self.storage
            .set_add(keys::discovery_set(kind), &address.to_string())
    }

    pub fn contains(&self, kind: ContractKind, address: &Address) -> Result<bool, StorageError> {
        self.storage
            .set_contains(keys::discovery_set(kind), &address.to_string())
    }

    pub fn contracts(&self, kind: ContractKind) -> Result<BTreeSet<Address>, StorageError> {
        parse_addresses(self.storage.set_members(keys::discovery_set(kind))?)
    }

    pub fn tournaments(&self) -> Result<BTreeSet<Address>, StorageError> {
        self.contracts(ContractKind::Tournament)
    }

    pub fn groups(&self) -> Result<BTreeSet<Address>, StorageError> {
        self.contracts(ContractKind::BettingGroup)
    }
}

pub(crate) fn parse_addresses(
    members: BTreeSet<String>,
) -> Result<BTreeSet<Address>, StorageError> {
    members
        .iter()
        .map(|m| m.parse().map_err(|_| StorageError::DeserializationFailed))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStorage;

    #[test]
    fn test_register_is_idempotent_and_kind_scoped() {
        let registry = ContractRegistry::new(Arc::new(InMemoryStorage::new()));
        let addr = Address::new([0xA; 20]);

        assert!(registry.register(ContractKind::Tournament, &addr).unwrap());
        assert!(!registry.register(ContractKind::Tournament, &addr).unwrap());
        assert!(registry.contains(ContractKind::Tournament, &addr).unwrap());
        assert!(!registry.contains(ContractKind::BettingGroup, &addr).unwrap());
        assert_eq!(registry.tournaments().unwrap().len(), 1);
        assert!(registry.groups().unwrap().is_empty());
    }
}
