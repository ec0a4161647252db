//! Logical key layout. Every address is rendered through `Address`'s
//! lowercase `Display`, so keys never depend on the caller's casing.

use betcache_types::{Address, ContractKind};

pub const LAST_PROCESSED_BLOCK: &str = "blockchain:last_processed_block";
pub const TOURNAMENT_INDEX: &str = "tournament_index";
pub const GROUP_INDEX: &str = "group_index";

pub fn discovery_set(kind: ContractKind) -> &'static str {
    match kind {
        ContractKind::Tournament => TOURNAMENT_INDEX,
        ContractKind::BettingGroup => GROUP_INDEX,
    }
}

pub fn record(kind: ContractKind, address: &Address) -> String {
    format!("{}:{}", kind.as_str(), address)
}

pub fn description_word(kind: ContractKind, word: &str) -> String {
    format!("{}:word:{}", kind.as_str(), word)
}

pub fn tournament_groups(tournament: &Address) -> String {
    format!("tournament:{}:groups", tournament)
}

pub fn user_groups(user: &Address) -> String {
    format!("user:{}:groups", user)
}

pub fn group_users(group: &Address) -> String {
    format!("group:{}:users", group)
}
