//! Read-optimised mirror of on-chain state.
//!
//! Holds the checkpoint, contract records, the description word index and the
//! user/group membership relation. Membership is kept as two mirrored set
//! families (`user:{u}:groups` and `group:{g}:users`); every mutation here
//! writes both sides.

use crate::keys;
use crate::registry::{parse_addresses, ContractRegistry};
use crate::storage_trait::{Storage, StorageError};
use betcache_types::{
    description_tokens, Address, BettingGroupRecord, BlockNumber, ContractKind, ContractRecord,
    TournamentRecord,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Which of the two membership indexes hold a `(user, group)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MembershipSides {
    /// `user:{u}:groups` contains the group.
    pub forward: bool,
    /// `group:{g}:users` contains the user.
    pub reverse: bool,
}

impl MembershipSides {
    pub fn both(&self) -> bool {
        self.forward && self.reverse
    }

    /// Both sides say `member`.
    pub fn agrees_with(&self, member: bool) -> bool {
        self.forward == member && self.reverse == member
    }
}

#[derive(Clone)]
pub struct CacheStore {
    storage: Arc<dyn Storage>,
    registry: ContractRegistry,
}

impl CacheStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let registry = ContractRegistry::new(storage.clone());
        Self { storage, registry }
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn checkpoint(&self) -> Result<Option<BlockNumber>, StorageError> {
        match self.storage.get(keys::LAST_PROCESSED_BLOCK)? {
            Some(bytes) => Ok(Some(decode_block_number(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Moves the checkpoint forward to `height`. Returns `false` without
    /// writing if that would move it backwards.
    pub fn advance_checkpoint(&self, height: BlockNumber) -> Result<bool, StorageError> {
        if let Some(current) = self.checkpoint()? {
            if height < current {
                return Ok(false);
            }
        }
        self.storage
            .put(keys::LAST_PROCESSED_BLOCK, &height.to_le_bytes())?;
        Ok(true)
    }

    pub fn save_tournament(&self, record: &TournamentRecord) -> Result<(), StorageError> {
        self.put_record(&keys::record(ContractKind::Tournament, &record.address), record)?;
        self.index_description(ContractKind::Tournament, &record.address, &record.description)
    }

    pub fn save_group(&self, record: &BettingGroupRecord) -> Result<(), StorageError> {
        self.put_record(&keys::record(ContractKind::BettingGroup, &record.address), record)?;
        self.storage.set_add(
            &keys::tournament_groups(&record.tournament_address),
            &record.address.to_string(),
        )?;
        self.index_description(ContractKind::BettingGroup, &record.address, &record.description)
    }

    pub fn get_tournament(
        &self,
        address: &Address,
    ) -> Result<Option<TournamentRecord>, StorageError> {
        self.get_record(&keys::record(ContractKind::Tournament, address))
    }

    pub fn get_group(&self, address: &Address) -> Result<Option<BettingGroupRecord>, StorageError> {
        self.get_record(&keys::record(ContractKind::BettingGroup, address))
    }

    pub fn get_contract(&self, address: &Address) -> Result<Option<ContractRecord>, StorageError> {
        if let Some(t) = self.get_tournament(address)? {
            return Ok(Some(ContractRecord::Tournament(t)));
        }
        Ok(self.get_group(address)?.map(ContractRecord::BettingGroup))
    }

    pub fn all_tournaments(&self) -> Result<Vec<TournamentRecord>, StorageError> {
        self.tournaments_for(self.registry.tournaments()?)
    }

    pub fn all_groups(&self) -> Result<Vec<BettingGroupRecord>, StorageError> {
        self.groups_for(self.registry.groups()?)
    }

    /// Tournaments whose description contains any of the query's words.
    pub fn search_tournaments(&self, query: &str) -> Result<Vec<TournamentRecord>, StorageError> {
        let matches = self.search_words(ContractKind::Tournament, query)?;
        self.tournaments_for(matches)
    }

    /// Groups whose description contains any of the query's words.
    pub fn search_groups(&self, query: &str) -> Result<Vec<BettingGroupRecord>, StorageError> {
        let matches = self.search_words(ContractKind::BettingGroup, query)?;
        self.groups_for(matches)
    }

    pub fn groups_for_tournament(
        &self,
        tournament: &Address,
    ) -> Result<Vec<BettingGroupRecord>, StorageError> {
        let addresses =
            parse_addresses(self.storage.set_members(&keys::tournament_groups(tournament))?)?;
        self.groups_for(addresses)
    }

    pub fn groups_for_user(&self, user: &Address) -> Result<Vec<BettingGroupRecord>, StorageError> {
        self.groups_for(self.group_addresses_for_user(user)?)
    }

    pub fn group_addresses_for_user(
        &self,
        user: &Address,
    ) -> Result<BTreeSet<Address>, StorageError> {
        parse_addresses(self.storage.set_members(&keys::user_groups(user))?)
    }

    /// Cache truth for a group: the reverse membership index.
    pub fn users_for_group(&self, group: &Address) -> Result<BTreeSet<Address>, StorageError> {
        parse_addresses(self.storage.set_members(&keys::group_users(group))?)
    }

    /// Adds `user <-> group` to both indexes. Returns `true` if either side changed.
    ///
    /// The reverse side is written first and removed last, so an interrupted
    /// write leaves a reverse-only entry, which reconciliation can see.
    pub fn add_membership(&self, user: &Address, group: &Address) -> Result<bool, StorageError> {
        let reverse = self
            .storage
            .set_add(&keys::group_users(group), &user.to_string())?;
        let forward = self
            .storage
            .set_add(&keys::user_groups(user), &group.to_string())?;
        Ok(forward || reverse)
    }

    /// Removes `user <-> group` from both indexes. Returns `true` if either side changed.
    pub fn remove_membership(&self, user: &Address, group: &Address) -> Result<bool, StorageError> {
        let forward = self
            .storage
            .set_remove(&keys::user_groups(user), &group.to_string())?;
        let reverse = self
            .storage
            .set_remove(&keys::group_users(group), &user.to_string())?;
        Ok(forward || reverse)
    }

    /// Presence of the pair in each index, read independently.
    pub fn membership_sides(
        &self,
        user: &Address,
        group: &Address,
    ) -> Result<MembershipSides, StorageError> {
        Ok(MembershipSides {
            forward: self
                .storage
                .set_contains(&keys::user_groups(user), &group.to_string())?,
            reverse: self
                .storage
                .set_contains(&keys::group_users(group), &user.to_string())?,
        })
    }

    /// `true` only when both the forward and reverse entries exist.
    pub fn is_member(&self, user: &Address, group: &Address) -> Result<bool, StorageError> {
        Ok(self.membership_sides(user, group)?.both())
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.storage.flush()
    }

    fn index_description(
        &self,
        kind: ContractKind,
        address: &Address,
        description: &str,
    ) -> Result<(), StorageError> {
        let member = address.to_string();
        for word in description_tokens(description) {
            self.storage
                .set_add(&keys::description_word(kind, &word), &member)?;
        }
        Ok(())
    }

    fn search_words(
        &self,
        kind: ContractKind,
        query: &str,
    ) -> Result<BTreeSet<Address>, StorageError> {
        let mut matches = BTreeSet::new();
        for word in description_tokens(query) {
            matches.extend(parse_addresses(
                self.storage.set_members(&keys::description_word(kind, &word))?,
            )?);
        }
        Ok(matches)
    }

    fn tournaments_for(
        &self,
        addresses: BTreeSet<Address>,
    ) -> Result<Vec<TournamentRecord>, StorageError> {
        let mut records = Vec::with_capacity(addresses.len());
        for address in addresses {
            if let Some(record) = self.get_tournament(&address)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn groups_for(
        &self,
        addresses: BTreeSet<Address>,
    ) -> Result<Vec<BettingGroupRecord>, StorageError> {
        let mut records = Vec::with_capacity(addresses.len());
        for address in addresses {
            if let Some(record) = self.get_group(&address)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn put_record<T: Serialize>(&self, key: &str, record: &T) -> Result<(), StorageError> {
        let bytes = bincode::serialize(record).map_err(|_| StorageError::SerializationFailed)?;
        self.storage.put(key, &bytes)
    }

    fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.storage.get(key)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|_| StorageError::DeserializationFailed),
            None => Ok(None),
        }
    }
}

fn decode_block_number(bytes: &[u8]) -> Result<BlockNumber, StorageError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::DeserializationFailed)?;
    Ok(u64::from_le_bytes(arr))
}
