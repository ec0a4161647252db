//! Converges cached membership to on-chain membership.
//!
//! Ground truth for a group is every participant the contract still reports
//! as registered. One pass adds the missing ones and removes the rest, so after
//! it the reverse index for the group equals ground truth, and a second pass
//! with no chain change in between does nothing.

use crate::chain_reader::ChainReader;
use anyhow::{Context, Result};
use betcache_storage::{CacheStore, MembershipSides};
use betcache_types::Address;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub group: Address,
    pub cached_before: usize,
    pub ground_truth: usize,
    pub added: Vec<Address>,
    pub removed: Vec<Address>,
    /// Participant indices whose chain read failed and were left out.
    pub skipped_indices: Vec<u64>,
    pub cached_after: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<Address>,
    pub added: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyOutcome {
    Matches {
        registered: bool,
    },
    MismatchCorrected {
        registered_on_chain: bool,
        cached_before: MembershipSides,
        cached_after: MembershipSides,
    },
}

pub struct MembershipReconciler {
    chain: Arc<dyn ChainReader>,
    cache: CacheStore,
}

impl MembershipReconciler {
    pub fn new(chain: Arc<dyn ChainReader>, cache: CacheStore) -> Self {
        Self { chain, cache }
    }

    /// Registered participants per the contract, plus indices that could not be read.
    pub async fn ground_truth(&self, group: &Address) -> Result<(BTreeSet<Address>, Vec<u64>)> {
        let count = self
            .chain
            .participant_count(group)
            .await
            .with_context(|| format!("participant count for {}", group))?;

        let mut registered = BTreeSet::new();
        let mut skipped = Vec::new();

        for index in 0..count {
            let participant = match self.chain.participant_at(group, index).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(
                        group = %group,
                        index,
                        error = %e,
                        "failed to read participant, skipping"
                    );
                    skipped.push(index);
                    continue;
                }
            };
            match self.chain.is_registered(group, &participant).await {
                Ok(true) => {
                    registered.insert(participant);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        group = %group,
                        index,
                        participant = %participant,
                        error = %e,
                        "failed to read registration flag, skipping"
                    );
                    skipped.push(index);
                }
            }
        }

        Ok((registered, skipped))
    }

    pub async fn reconcile_group(&self, group: &Address) -> Result<ReconcileReport> {
        let (truth, skipped_indices) = self.ground_truth(group).await?;
        let cached = self.cache.users_for_group(group)?;

        let mut added = Vec::new();
        for user in &truth {
            if self.cache.add_membership(user, group)? {
                added.push(*user);
            }
        }

        let mut removed = Vec::new();
        for user in cached.difference(&truth) {
            if self.cache.remove_membership(user, group)? {
                removed.push(*user);
            }
        }

        let report = ReconcileReport {
            group: *group,
            cached_before: cached.len(),
            ground_truth: truth.len(),
            added,
            removed,
            skipped_indices,
            cached_after: self.cache.users_for_group(group)?.len(),
        };

        if report.is_noop() {
            debug!(group = %group, members = report.ground_truth, "membership already consistent");
        } else {
            info!(
                group = %group,
                added = report.added.len(),
                removed = report.removed.len(),
                "membership reconciled"
            );
        }
        Ok(report)
    }

    /// Reconciles every known group. A failing group is logged and counted,
    /// never aborts the sweep.
    pub async fn reconcile_all(&self) -> Result<SweepReport> {
        let groups = self.cache.registry().groups()?;
        let mut sweep = SweepReport {
            total: groups.len(),
            ..Default::default()
        };

        for group in &groups {
            match self.reconcile_group(group).await {
                Ok(report) => {
                    sweep.succeeded += 1;
                    sweep.added += report.added.len();
                    sweep.removed += report.removed.len();
                }
                Err(e) => {
                    error!(group = %group, error = %e, "group reconciliation failed");
                    sweep.failed.push(*group);
                }
            }
        }

        info!(
            total = sweep.total,
            succeeded = sweep.succeeded,
            failed = sweep.failed.len(),
            "membership sweep complete"
        );
        Ok(sweep)
    }

    /// Checks one `(user, group)` pair against the chain and repairs the cache
    /// if it disagrees.
    pub async fn verify_membership(
        &self,
        user: &Address,
        group: &Address,
    ) -> Result<VerifyOutcome> {
        let on_chain = self
            .chain
            .is_registered(group, user)
            .await
            .with_context(|| format!("isRegistered({}) on {}", user, group))?;
        let cached_before = self.cache.membership_sides(user, group)?;

        if cached_before.agrees_with(on_chain) {
            return Ok(VerifyOutcome::Matches {
                registered: on_chain,
            });
        }

        // Either side may be the stale one; both writes are idempotent.
        if on_chain {
            self.cache.add_membership(user, group)?;
        } else {
            self.cache.remove_membership(user, group)?;
        }
        let cached_after = self.cache.membership_sides(user, group)?;
        info!(
            user = %user,
            group = %group,
            registered = on_chain,
            forward_before = cached_before.forward,
            reverse_before = cached_before.reverse,
            fixed = cached_after.agrees_with(on_chain),
            "membership mismatch corrected"
        );

        Ok(VerifyOutcome::MismatchCorrected {
            registered_on_chain: on_chain,
            cached_before,
            cached_after,
        })
    }
}
