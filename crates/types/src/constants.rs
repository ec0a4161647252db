/// Canonical Solidity signatures. `topic0` of a log is the keccak256 of these.
pub mod signatures {
    pub const TOURNAMENT_CREATED: &str =
        "TournamentCreated(address,string,uint256,uint256,(string,uint256,uint256)[])";
    pub const BETTING_GROUP_CREATED: &str =
        "BettingGroupCreated(address,address,string,uint256,uint256[],uint256)";
    pub const BETTING_OPPORTUNITY_START_TIME_UPDATED: &str =
        "BettingOpportunityStartTimeUpdated(uint256,uint256)";
    pub const PARTICIPANT_REGISTERED: &str = "ParticipantRegistered(address)";
    pub const PARTICIPANT_WITHDRAWN: &str = "ParticipantWithdrawn(address)";
    pub const RESULTS_PROCESSED: &str = "ResultsProcessed()";
    pub const BETTING_GROUP_FINALIZED: &str = "BettingGroupFinalized()";
    pub const BETTING_GROUP_CANCELLED: &str = "BettingGroupCancelled()";
}

/// View functions called on deployed contracts.
pub mod views {
    pub const DESCRIPTION: &str = "description()";
    pub const PARTICIPANT_COUNT: &str = "getParticipantCount()";
    pub const PARTICIPANT_AT: &str = "participants(uint256)";
    pub const IS_REGISTERED: &str = "isRegistered(address)";
}

pub mod defaults {
    pub const POLL_INTERVAL_SECONDS: u64 = 10;
    pub const PRICE_TTL_SECONDS: u64 = 600;
    pub const PRICE_MAX_ATTEMPTS: u32 = 3;
    pub const PRICE_BACKOFF_MS: u64 = 1_000;
    pub const MAX_SUBSCRIBERS: usize = 100;
    pub const HOUSEKEEPING_INTERVAL_SECONDS: u64 = 120;
    pub const SUBSCRIBER_BUFFER: usize = 256;
}

pub mod ws {
    /// "Try again later" close code sent when the subscriber cap is reached.
    pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;
    pub const CLOSE_REASON_FULL: &str = "Maximum connections reached";
}

pub const WEI_PER_ETH: f64 = 1e18;
