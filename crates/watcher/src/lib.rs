mod abi;
mod broadcast;
mod chain_reader;
mod config;
mod dispatcher;
mod poller;
mod price_cache;
mod reconciler;
mod rpc_client;

pub use abi::{encode_call, event_topic, keccak256, selector, uint_word, AbiDecoder, Word};
pub use broadcast::{
    BroadcastFanout, FanoutStats, Payload, PublishReport, Rejection, SubscriberId, Subscription,
};
pub use chain_reader::{decode_log, ChainReader, GasInfo, RawLog, RpcChainReader};
pub use config::{FanoutConfig, PriceConfig, WatcherConfig};
pub use dispatcher::{DispatchReport, EventDispatcher, WriteCheck};
pub use poller::{resolve_start_height, Poller, PollerState, TickOutcome};
pub use price_cache::{extract_price, HttpPriceFeed, PriceCache, PriceFeed, PriceFetchError};
pub use reconciler::{MembershipReconciler, ReconcileReport, SweepReport, VerifyOutcome};
pub use rpc_client::RpcClient;

use betcache_storage::{CacheStore, Storage};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The ingestion engine with all of its parts wired together.
///
/// Handles to the shared parts are exposed so a query surface can
/// read the cache, subscribe to the fanout, and trigger reconciliation.
pub struct Indexer {
    config: WatcherConfig,
    chain: Arc<dyn ChainReader>,
    cache: CacheStore,
    fanout: Arc<BroadcastFanout>,
    prices: Arc<PriceCache>,
    reconciler: Arc<MembershipReconciler>,
    dispatcher: Arc<EventDispatcher>,
}

impl Indexer {
    pub fn new(
        config: WatcherConfig,
        chain: Arc<dyn ChainReader>,
        storage: Arc<dyn Storage>,
        feed: Arc<dyn PriceFeed>,
    ) -> Self {
        let cache = CacheStore::new(storage);
        let fanout = Arc::new(BroadcastFanout::new(&config.fanout));
        let prices = Arc::new(PriceCache::new(feed, &config.price));
        let reconciler = Arc::new(MembershipReconciler::new(chain.clone(), cache.clone()));
        let dispatcher = Arc::new(EventDispatcher::new(
            chain.clone(),
            cache.clone(),
            fanout.clone(),
            prices.clone(),
            reconciler.clone(),
            config.factory_address,
        ));

        Self {
            config,
            chain,
            cache,
            fanout,
            prices,
            reconciler,
            dispatcher,
        }
    }

    /// Builds the JSON-RPC chain reader and HTTP price feed from `config`.
    pub fn from_config(config: WatcherConfig, storage: Arc<dyn Storage>) -> anyhow::Result<Self> {
        let chain: Arc<dyn ChainReader> = Arc::new(RpcChainReader::new(&config)?);
        let feed: Arc<dyn PriceFeed> = Arc::new(HttpPriceFeed::new(&config.price)?);
        Ok(Self::new(config, chain, storage, feed))
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<dyn ChainReader> {
        &self.chain
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn fanout(&self) -> &Arc<BroadcastFanout> {
        &self.fanout
    }

    pub fn prices(&self) -> &Arc<PriceCache> {
        &self.prices
    }

    pub fn reconciler(&self) -> &Arc<MembershipReconciler> {
        &self.reconciler
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn poller(&self) -> Poller {
        Poller::new(
            self.chain.clone(),
            self.cache.clone(),
            self.dispatcher.clone(),
            self.reconciler.clone(),
            self.fanout.clone(),
            self.config.starting_block,
            self.config.poll_interval(),
        )
    }

    /// Spawns the polling loop and subscriber housekeeping. Neither task
    /// returns under normal operation.
    pub fn start(&self) -> (JoinHandle<()>, JoinHandle<()>) {
        let poller = tokio::spawn(self.poller().run());
        let housekeeping = tokio::spawn(
            self.fanout
                .clone()
                .run_housekeeping(self.config.fanout.housekeeping_interval()),
        );
        (poller, housekeeping)
    }
}
