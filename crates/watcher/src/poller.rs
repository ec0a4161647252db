//! Checkpointed polling loop.
//!
//! The poller moves through `Bootstrapping -> CatchingUp -> Live`. A failure
//! in any phase leaves the state where it was and is retried on the next
//! tick, so the checkpoint only ever moves past a range that dispatched
//! cleanly.

use crate::broadcast::BroadcastFanout;
use crate::chain_reader::ChainReader;
use crate::dispatcher::{DispatchReport, EventDispatcher};
use crate::reconciler::{MembershipReconciler, SweepReport};
use anyhow::{Context, Result};
use betcache_storage::CacheStore;
use betcache_types::{BlockNumber, EventEnvelope, EventType};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Bootstrapping,
    /// Backlog `[from, to]` to process before going live. Empty when `from > to`.
    CatchingUp { from: BlockNumber, to: BlockNumber },
    Live { last_processed: BlockNumber },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Chain height has not moved past the last processed block.
    Idle { height: BlockNumber },
    Processed(DispatchReport),
    /// Nothing was committed; the same range is attempted next tick.
    Failed { reason: String },
}

/// Start height used when no checkpoint exists.
///
/// Negative values mean "the last N blocks", zero means genesis, and a
/// positive value is taken literally.
pub fn resolve_start_height(starting_block: i64, current_height: BlockNumber) -> BlockNumber {
    if starting_block < 0 {
        current_height.saturating_sub(starting_block.unsigned_abs())
    } else {
        starting_block as BlockNumber
    }
}

pub struct Poller {
    chain: Arc<dyn ChainReader>,
    cache: CacheStore,
    dispatcher: Arc<EventDispatcher>,
    reconciler: Arc<MembershipReconciler>,
    fanout: Arc<BroadcastFanout>,
    starting_block: i64,
    poll_interval: Duration,
    state: PollerState,
}

impl Poller {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        cache: CacheStore,
        dispatcher: Arc<EventDispatcher>,
        reconciler: Arc<MembershipReconciler>,
        fanout: Arc<BroadcastFanout>,
        starting_block: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            chain,
            cache,
            dispatcher,
            reconciler,
            fanout,
            starting_block,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            state: PollerState::Bootstrapping,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Reads the checkpoint and the chain height and decides the backlog.
    pub async fn bootstrap(&mut self) -> Result<PollerState> {
        let height = self
            .chain
            .current_height()
            .await
            .context("reading chain height at bootstrap")?;

        let from = match self.cache.checkpoint()? {
            Some(checkpoint) => {
                info!(checkpoint, height, "resuming from checkpoint");
                checkpoint + 1
            }
            None => {
                let start = resolve_start_height(self.starting_block, height);
                info!(
                    starting_block = self.starting_block,
                    start,
                    height,
                    "no checkpoint, starting fresh"
                );
                start
            }
        };

        self.state = PollerState::CatchingUp { from, to: height };
        Ok(self.state)
    }

    /// Dispatches the backlog in one call, stores the checkpoint, then sweeps
    /// every known group once.
    pub async fn catch_up(&mut self) -> Result<SweepReport> {
        let (from, to) = match self.state {
            PollerState::CatchingUp { from, to } => (from, to),
            other => anyhow::bail!("catch_up called in state {:?}", other),
        };

        let last_processed = if from <= to {
            info!(from_block = from, to_block = to, "catching up");
            self.dispatcher.dispatch_range(from, to).await?;
            self.cache.advance_checkpoint(to)?;
            to
        } else {
            info!(from_block = from, height = to, "nothing to catch up");
            from.saturating_sub(1).max(self.cache.checkpoint()?.unwrap_or(0))
        };

        let sweep = self.reconciler.reconcile_all().await?;
        info!(
            groups = sweep.total,
            succeeded = sweep.succeeded,
            failed = sweep.failed.len(),
            "startup reconciliation sweep done"
        );

        self.state = PollerState::Live { last_processed };
        Ok(sweep)
    }

    /// One live iteration: dispatch whatever arrived since the last
    /// processed block. Errors are reported in the outcome, never raised.
    pub async fn tick(&mut self) -> TickOutcome {
        let last_processed = match self.state {
            PollerState::Live { last_processed } => last_processed,
            other => {
                return TickOutcome::Failed {
                    reason: format!("tick called in state {:?}", other),
                }
            }
        };

        match self.process_new_blocks(last_processed).await {
            Ok(outcome) => {
                if let TickOutcome::Processed(report) = &outcome {
                    self.state = PollerState::Live {
                        last_processed: report.to_block,
                    };
                }
                outcome
            }
            Err(e) => {
                warn!(last_processed, error = %e, "poll tick failed, range will be retried");
                TickOutcome::Failed {
                    reason: format!("{:#}", e),
                }
            }
        }
    }

    async fn process_new_blocks(&self, last_processed: BlockNumber) -> Result<TickOutcome> {
        let height = self.chain.current_height().await?;
        if height <= last_processed {
            return Ok(TickOutcome::Idle { height });
        }

        let from = last_processed + 1;
        let report = self.dispatcher.dispatch_range(from, height).await?;
        self.cache.advance_checkpoint(height)?;

        self.fanout.publish(
            &EventEnvelope::new(
                EventType::Block,
                format!("Processed blocks {} to {}", from, height),
            )
            .with_data(json!({
                "from_block": from,
                "to_block": height,
                "events": report.events_handled,
            })),
        );
        Ok(TickOutcome::Processed(report))
    }

    /// Runs forever. Bootstrap and catch-up are retried on the poll interval
    /// until they succeed.
    pub async fn run(mut self) {
        let mut timer = interval(self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;

            match self.state {
                PollerState::Bootstrapping => {
                    if let Err(e) = self.bootstrap().await {
                        error!(error = %e, "bootstrap failed");
                        continue;
                    }
                    if let Err(e) = self.catch_up().await {
                        error!(error = %e, "catch-up failed");
                    }
                }
                PollerState::CatchingUp { .. } => {
                    if let Err(e) = self.catch_up().await {
                        error!(error = %e, "catch-up failed");
                    }
                }
                PollerState::Live { .. } => {
                    self.tick().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_start_height() {
        assert_eq!(resolve_start_height(0, 500), 0);
        assert_eq!(resolve_start_height(120, 500), 120);
        assert_eq!(resolve_start_height(-100, 500), 400);
        assert_eq!(resolve_start_height(-1000, 500), 0);
        // A literal height ahead of the chain is kept as is.
        assert_eq!(resolve_start_height(900, 500), 900);
    }
}
