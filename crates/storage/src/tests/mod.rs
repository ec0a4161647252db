
use crate::{CacheStore, InMemoryStorage};
use betcache_types::{Address, BettingGroupRecord, Provenance, TournamentRecord};
use std::sync::Arc;

pub(crate) fn new_cache() -> CacheStore {
    CacheStore::new(Arc::new(InMemoryStorage::new()))
}

pub(crate) fn addr(byte: u8) -> Address {
    Address::new([byte; 20])
}

pub(crate) fn tournament(address: Address, description: &str) -> TournamentRecord {
    TournamentRecord {
        address,
        description: description.to_string(),
        start_time: 1000,
        end_time: 2000,
        betting_opportunities_count: 2,
        provenance: Provenance {
            event_block: 50,
            event_tx: "0x01".to_string(),
        },
    }
}

pub(crate) fn group(
    address: Address,
    tournament: Address,
    description: &str,
) -> BettingGroupRecord {
    BettingGroupRecord {
        address,
        tournament_address: tournament,
        description: description.to_string(),
        registration_end_time: 1500,
        prize_distribution: vec![60, 30, 10],
        general_closing_window: 3600,
        provenance: Provenance {
            event_block: 51,
            event_tx: "0x02".to_string(),
        },
    }
}
