use betcache_types::{Address, BettingGroupRecord, TournamentRecord};
use betcache_watcher::{FanoutStats, VerifyOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TournamentResponse {
    pub address: Address,
    pub description: String,
    pub start_time: u64,
    pub end_time: u64,
    pub betting_opportunities_count: u64,
    pub event_block: u64,
    pub event_tx: String,
}

impl From<TournamentRecord> for TournamentResponse {
    fn from(record: TournamentRecord) -> Self {
        Self {
            address: record.address,
            description: record.description,
            start_time: record.start_time,
            end_time: record.end_time,
            betting_opportunities_count: record.betting_opportunities_count,
            event_block: record.provenance.event_block,
            event_tx: record.provenance.event_tx,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupResponse {
    pub address: Address,
    pub description: String,
    pub tournament_address: Address,
    pub registration_end_time: u64,
    pub prize_distribution: Vec<u64>,
    pub general_closing_window: u64,
    pub event_block: u64,
    pub event_tx: String,
}

impl From<BettingGroupRecord> for GroupResponse {
    fn from(record: BettingGroupRecord) -> Self {
        Self {
            address: record.address,
            description: record.description,
            tournament_address: record.tournament_address,
            registration_end_time: record.registration_end_time,
            prize_distribution: record.prize_distribution,
            general_closing_window: record.general_closing_window,
            event_block: record.provenance.event_block,
            event_tx: record.provenance.event_tx,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserGroupsResponse {
    pub user: Address,
    pub groups: Vec<GroupResponse>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub user: Address,
    pub group: Address,
    #[serde(flatten)]
    pub outcome: VerifyOutcome,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: u64,
    pub last_processed_block: Option<u64>,
    pub tournaments: usize,
    pub groups: usize,
    pub websocket: FanoutStats,
}
