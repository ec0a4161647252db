mod address;
mod constants;
mod envelope;
mod events;
mod records;

pub use address::{Address, AddressError, ADDRESS_SIZE};
pub use constants::*;
pub use envelope::{EventEnvelope, EventType};
pub use events::{BettingGroupCreated, ChainEvent, EventKind, LoggedEvent, TournamentCreated};
pub use records::{
    description_tokens, BettingGroupRecord, ContractKind, ContractRecord, Provenance,
    TournamentRecord,
};

pub type BlockNumber = u64;
