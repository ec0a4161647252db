// In-memory chain and price feed doubles shared by the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use betcache_storage::{InMemoryStorage, Storage, StorageError};
use betcache_types::{Address, ChainEvent, EventKind, LoggedEvent};
use betcache_watcher::{
    ChainReader, FanoutConfig, GasInfo, Indexer, PriceConfig, PriceFeed, PriceFetchError,
    WatcherConfig,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn addr(byte: u8) -> Address {
    Address::new([byte; 20])
}

pub const FACTORY: u8 = 0xfa;

#[derive(Default)]
struct ChainState {
    height: u64,
    fail_height: bool,
    /// (emitter, kind) -> events
    logs: HashMap<(Address, EventKind), Vec<LoggedEvent>>,
    failing_queries: HashSet<(Address, EventKind)>,
    /// group -> [(participant, registered)]
    participants: HashMap<Address, Vec<(Address, bool)>>,
    failing_counts: HashSet<Address>,
    failing_indices: HashSet<(Address, u64)>,
    failing_is_registered: bool,
    descriptions: HashMap<Address, String>,
    receipts: HashMap<String, GasInfo>,
}

#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
    pub log_queries: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
    }

    pub fn fail_height(&self, fail: bool) {
        self.state.lock().unwrap().fail_height = fail;
    }

    pub fn emit(&self, emitter: Address, event: ChainEvent, block_number: u64, tx_hash: &str) {
        let kind = event.kind();
        let mut state = self.state.lock().unwrap();
        let log_index = state.logs.values().map(Vec::len).sum::<usize>() as u64;
        state
            .logs
            .entry((emitter, kind))
            .or_default()
            .push(LoggedEvent {
                event,
                block_number,
                tx_hash: tx_hash.to_string(),
                log_index,
            });
    }

    pub fn fail_query(&self, emitter: Address, kind: EventKind) {
        self.state
            .lock()
            .unwrap()
            .failing_queries
            .insert((emitter, kind));
    }

    pub fn set_participants(&self, group: Address, participants: &[(Address, bool)]) {
        self.state
            .lock()
            .unwrap()
            .participants
            .insert(group, participants.to_vec());
    }

    pub fn fail_participant_count(&self, group: Address) {
        self.state.lock().unwrap().failing_counts.insert(group);
    }

    pub fn fail_participant_index(&self, group: Address, index: u64) {
        self.state
            .lock()
            .unwrap()
            .failing_indices
            .insert((group, index));
    }

    pub fn fail_is_registered(&self, fail: bool) {
        self.state.lock().unwrap().failing_is_registered = fail;
    }

    pub fn set_description(&self, contract: Address, description: &str) {
        self.state
            .lock()
            .unwrap()
            .descriptions
            .insert(contract, description.to_string());
    }

    pub fn set_receipt(&self, tx_hash: &str, gas: GasInfo) {
        self.state
            .lock()
            .unwrap()
            .receipts
            .insert(tx_hash.to_string(), gas);
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn current_height(&self) -> Result<u64> {
        let state = self.state.lock().unwrap();
        if state.fail_height {
            return Err(anyhow!("rpc unavailable"));
        }
        Ok(state.height)
    }

    async fn get_logs(
        &self,
        contract: &Address,
        event: EventKind,
        from: u64,
        to: u64,
    ) -> Result<Vec<LoggedEvent>> {
        self.log_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.failing_queries.contains(&(*contract, event)) {
            return Err(anyhow!("eth_getLogs failed for {} {}", contract, event));
        }
        Ok(state
            .logs
            .get(&(*contract, event))
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.block_number >= from && e.block_number <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn participant_count(&self, group: &Address) -> Result<u64> {
        let state = self.state.lock().unwrap();
        if state.failing_counts.contains(group) {
            return Err(anyhow!("getParticipantCount reverted"));
        }
        Ok(state.participants.get(group).map_or(0, |p| p.len() as u64))
    }

    async fn participant_at(&self, group: &Address, index: u64) -> Result<Address> {
        let state = self.state.lock().unwrap();
        if state.failing_indices.contains(&(*group, index)) {
            return Err(anyhow!("participants({}) timed out", index));
        }
        state
            .participants
            .get(group)
            .and_then(|p| p.get(index as usize))
            .map(|(user, _)| *user)
            .ok_or_else(|| anyhow!("index out of range"))
    }

    async fn is_registered(&self, group: &Address, user: &Address) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if state.failing_is_registered {
            return Err(anyhow!("isRegistered unavailable"));
        }
        Ok(state
            .participants
            .get(group)
            .map_or(false, |p| p.iter().any(|(u, registered)| u == user && *registered)))
    }

    async fn description(&self, contract: &Address) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .descriptions
            .get(contract)
            .cloned()
            .ok_or_else(|| anyhow!("description() reverted"))
    }

    async fn transaction_cost(&self, tx_hash: &str) -> Result<Option<GasInfo>> {
        Ok(self.state.lock().unwrap().receipts.get(tx_hash).copied())
    }
}

/// Always answers with the same price.
pub struct FixedFeed(pub f64);

#[async_trait]
impl PriceFeed for FixedFeed {
    async fn fetch(&self) -> Result<f64, PriceFetchError> {
        Ok(self.0)
    }
}

/// Storage that acknowledges the first `drop_adds` set insertions on the
/// given key without writing them.
pub struct LossyStorage {
    inner: InMemoryStorage,
    key: String,
    drop_adds: AtomicUsize,
}

impl LossyStorage {
    pub fn new(key: String, drop_adds: usize) -> Self {
        Self {
            inner: InMemoryStorage::new(),
            key,
            drop_adds: AtomicUsize::new(drop_adds),
        }
    }
}

impl Storage for LossyStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.inner.put(key, value)
    }

    fn set_add(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        if key == self.key
            && self
                .drop_adds
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Ok(true);
        }
        self.inner.set_add(key, member)
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        self.inner.set_remove(key, member)
    }

    fn set_members(&self, key: &str) -> Result<BTreeSet<String>, StorageError> {
        self.inner.set_members(key)
    }

    fn set_contains(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        self.inner.set_contains(key, member)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.inner.flush()
    }
}

pub fn test_config(starting_block: i64) -> WatcherConfig {
    WatcherConfig {
        rpc_url: "http://127.0.0.1:8545".to_string(),
        factory_address: addr(FACTORY),
        starting_block,
        poll_interval_seconds: 10,
        rpc_timeout_seconds: 5,
        max_retries: 0,
        retry_delay_seconds: 1,
        price: PriceConfig {
            api_url: "http://127.0.0.1:9/price".to_string(),
            price_pointer: "/ethereum/usd".to_string(),
            ttl_seconds: 600,
            max_attempts: 3,
            backoff_ms: 10,
            timeout_seconds: 1,
        },
        fanout: FanoutConfig {
            max_subscribers: 100,
            housekeeping_interval_seconds: 120,
            subscriber_buffer: 64,
        },
    }
}

pub fn indexer_with(
    chain: Arc<MockChain>,
    storage: Arc<dyn Storage>,
    starting_block: i64,
) -> Indexer {
    Indexer::new(
        test_config(starting_block),
        chain,
        storage,
        Arc::new(FixedFeed(2000.0)),
    )
}

pub fn indexer(chain: Arc<MockChain>) -> Indexer {
    indexer_with(chain, Arc::new(InMemoryStorage::new()), 0)
}
