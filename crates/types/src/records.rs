use crate::Address;
use serde::{Deserialize, Serialize};

/// Where a record was first observed on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub event_block: u64,
    pub event_tx: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    Tournament,
    BettingGroup,
}

impl ContractKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKind::Tournament => "tournament",
            ContractKind::BettingGroup => "group",
        }
    }
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentRecord {
    pub address: Address,
    pub description: String,
    pub start_time: u64,
    pub end_time: u64,
    pub betting_opportunities_count: u64,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BettingGroupRecord {
    pub address: Address,
    pub tournament_address: Address,
    pub description: String,
    pub registration_end_time: u64,
    pub prize_distribution: Vec<u64>,
    pub general_closing_window: u64,
    pub provenance: Provenance,
}

/// A contract record of either kind. Records are written once, on the
/// corresponding creation event, and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractRecord {
    Tournament(TournamentRecord),
    BettingGroup(BettingGroupRecord),
}

impl ContractRecord {
    pub fn address(&self) -> Address {
        match self {
            ContractRecord::Tournament(t) => t.address,
            ContractRecord::BettingGroup(g) => g.address,
        }
    }

    pub fn kind(&self) -> ContractKind {
        match self {
            ContractRecord::Tournament(_) => ContractKind::Tournament,
            ContractRecord::BettingGroup(_) => ContractKind::BettingGroup,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            ContractRecord::Tournament(t) => &t.description,
            ContractRecord::BettingGroup(g) => &g.description,
        }
    }
}

/// Splits a description into lowercase search tokens.
pub fn description_tokens(description: &str) -> Vec<String> {
    description
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_tokens() {
        assert_eq!(
            description_tokens("World  Cup\tFinal"),
            vec!["world", "cup", "final"]
        );
        assert!(description_tokens("   ").is_empty());
    }
}
