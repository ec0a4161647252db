//! Typed chain events. Raw logs are decoded into one of these variants at the
//! chain reader boundary; handlers never see untyped log arguments.

use crate::constants::signatures;
use crate::{Address, ContractKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TournamentCreated,
    BettingGroupCreated,
    BettingOpportunityStartTimeUpdated,
    ParticipantRegistered,
    ParticipantWithdrawn,
    ResultsProcessed,
    BettingGroupFinalized,
    BettingGroupCancelled,
}

impl EventKind {
    /// Events emitted by the factory, in the order they are queried.
    pub const FACTORY: [EventKind; 2] =
        [EventKind::TournamentCreated, EventKind::BettingGroupCreated];

    pub const TOURNAMENT: [EventKind; 1] = [EventKind::BettingOpportunityStartTimeUpdated];

    pub const BETTING_GROUP: [EventKind; 5] = [
        EventKind::ParticipantRegistered,
        EventKind::ParticipantWithdrawn,
        EventKind::ResultsProcessed,
        EventKind::BettingGroupFinalized,
        EventKind::BettingGroupCancelled,
    ];

    pub fn for_contract(kind: ContractKind) -> &'static [EventKind] {
        match kind {
            ContractKind::Tournament => &Self::TOURNAMENT,
            ContractKind::BettingGroup => &Self::BETTING_GROUP,
        }
    }

    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::TournamentCreated => signatures::TOURNAMENT_CREATED,
            EventKind::BettingGroupCreated => signatures::BETTING_GROUP_CREATED,
            EventKind::BettingOpportunityStartTimeUpdated => {
                signatures::BETTING_OPPORTUNITY_START_TIME_UPDATED
            }
            EventKind::ParticipantRegistered => signatures::PARTICIPANT_REGISTERED,
            EventKind::ParticipantWithdrawn => signatures::PARTICIPANT_WITHDRAWN,
            EventKind::ResultsProcessed => signatures::RESULTS_PROCESSED,
            EventKind::BettingGroupFinalized => signatures::BETTING_GROUP_FINALIZED,
            EventKind::BettingGroupCancelled => signatures::BETTING_GROUP_CANCELLED,
        }
    }

    pub fn name(&self) -> &'static str {
        let sig = self.signature();
        sig.split('(').next().unwrap_or(sig)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TournamentCreated {
    pub tournament: Address,
    pub description: String,
    pub start_time: u64,
    pub end_time: u64,
    pub betting_opportunities_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BettingGroupCreated {
    pub group: Address,
    pub tournament: Address,
    pub description: String,
    pub registration_end_time: u64,
    pub prize_distribution: Vec<u64>,
    pub general_closing_window: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    TournamentCreated(TournamentCreated),
    BettingGroupCreated(BettingGroupCreated),
    BettingOpportunityStartTimeUpdated {
        tournament: Address,
        opportunity_id: u64,
        new_start_time: u64,
    },
    ParticipantRegistered {
        group: Address,
        participant: Address,
    },
    ParticipantWithdrawn {
        group: Address,
        participant: Address,
    },
    ResultsProcessed {
        group: Address,
    },
    BettingGroupFinalized {
        group: Address,
    },
    BettingGroupCancelled {
        group: Address,
    },
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChainEvent::TournamentCreated(_) => EventKind::TournamentCreated,
            ChainEvent::BettingGroupCreated(_) => EventKind::BettingGroupCreated,
            ChainEvent::BettingOpportunityStartTimeUpdated { .. } => {
                EventKind::BettingOpportunityStartTimeUpdated
            }
            ChainEvent::ParticipantRegistered { .. } => EventKind::ParticipantRegistered,
            ChainEvent::ParticipantWithdrawn { .. } => EventKind::ParticipantWithdrawn,
            ChainEvent::ResultsProcessed { .. } => EventKind::ResultsProcessed,
            ChainEvent::BettingGroupFinalized { .. } => EventKind::BettingGroupFinalized,
            ChainEvent::BettingGroupCancelled { .. } => EventKind::BettingGroupCancelled,
        }
    }
}

/// A decoded event together with the log position it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub event: ChainEvent,
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(EventKind::TournamentCreated.name(), "TournamentCreated");
        assert_eq!(EventKind::ResultsProcessed.name(), "ResultsProcessed");
    }

    #[test]
    fn test_events_per_contract_kind() {
        assert!(EventKind::for_contract(ContractKind::BettingGroup)
            .contains(&EventKind::ParticipantWithdrawn));
        assert!(!EventKind::for_contract(ContractKind::Tournament)
            .contains(&EventKind::ParticipantRegistered));
    }
}
