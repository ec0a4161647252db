use crate::broadcast::BroadcastFanout;
use crate::chain_reader::ChainReader;
use crate::price_cache::PriceCache;
use crate::reconciler::MembershipReconciler;
use anyhow::{Context, Result};
use betcache_storage::CacheStore;
use betcache_types::{
    Address, BettingGroupCreated, BettingGroupRecord, ChainEvent, ContractKind, EventEnvelope,
    EventKind, EventType, LoggedEvent, Provenance, TournamentCreated, TournamentRecord,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened while processing one block range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub from_block: u64,
    pub to_block: u64,
    pub events_handled: usize,
    pub failed_queries: usize,
    pub failed_handlers: usize,
    pub groups_reconciled: usize,
    pub failed_reconciliations: usize,
}

/// Result of re-reading chain state after a membership write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteCheck {
    /// Cache agrees with the chain.
    Consistent,
    /// Cache missed the write; it was applied once more.
    Retried { fixed: bool },
    /// The chain no longer reflects this event; left to reconciliation.
    ChainDisagrees,
    /// The chain could not be queried.
    Unverified,
}

pub struct EventDispatcher {
    chain: Arc<dyn ChainReader>,
    cache: CacheStore,
    fanout: Arc<BroadcastFanout>,
    prices: Arc<PriceCache>,
    reconciler: Arc<MembershipReconciler>,
    factory: Address,
}

impl EventDispatcher {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        cache: CacheStore,
        fanout: Arc<BroadcastFanout>,
        prices: Arc<PriceCache>,
        reconciler: Arc<MembershipReconciler>,
        factory: Address,
    ) -> Self {
        Self {
            chain,
            cache,
            fanout,
            prices,
            reconciler,
            factory,
        }
    }

    /// Processes `[from, to]`: factory events first (they can grow the
    /// registry), then each known contract's own events, then a membership
    /// reconciliation per group.
    ///
    /// Fails only when factory events could not be fetched or stored, since a
    /// lost creation event is never recovered. Everything below the factory
    /// is isolated per event kind and per contract.
    pub async fn dispatch_range(&self, from: u64, to: u64) -> Result<DispatchReport> {
        let mut report = DispatchReport {
            from_block: from,
            to_block: to,
            ..Default::default()
        };

        for kind in EventKind::FACTORY {
            let events = self
                .chain
                .get_logs(&self.factory, kind, from, to)
                .await
                .with_context(|| format!("fetching {} events {}..{}", kind, from, to))?;
            for logged in events {
                self.handle(logged)
                    .await
                    .with_context(|| format!("handling {} event", kind))?;
                report.events_handled += 1;
            }
        }

        let registry = self.cache.registry();
        for tournament in registry.tournaments()? {
            self.process_contract(ContractKind::Tournament, &tournament, &mut report)
                .await;
        }
        for group in registry.groups()? {
            self.process_contract(ContractKind::BettingGroup, &group, &mut report)
                .await;
            match self.reconciler.reconcile_group(&group).await {
                Ok(_) => report.groups_reconciled += 1,
                Err(e) => {
                    error!(group = %group, error = %e, "post-batch reconciliation failed");
                    report.failed_reconciliations += 1;
                }
            }
        }

        info!(
            from_block = from,
            to_block = to,
            events = report.events_handled,
            failed_queries = report.failed_queries,
            failed_handlers = report.failed_handlers,
            "block range dispatched"
        );
        Ok(report)
    }

    async fn process_contract(
        &self,
        kind: ContractKind,
        contract: &Address,
        report: &mut DispatchReport,
    ) {
        for event_kind in EventKind::for_contract(kind) {
            let events = match self
                .chain
                .get_logs(contract, *event_kind, report.from_block, report.to_block)
                .await
            {
                Ok(events) => events,
                Err(e) => {
                    warn!(
                        contract = %contract,
                        event = %event_kind,
                        error = %e,
                        "event query failed, skipping"
                    );
                    report.failed_queries += 1;
                    continue;
                }
            };

            for logged in events {
                match self.handle(logged).await {
                    Ok(()) => report.events_handled += 1,
                    Err(e) => {
                        error!(
                            contract = %contract,
                            event = %event_kind,
                            error = %e,
                            "event handler failed"
                        );
                        report.failed_handlers += 1;
                    }
                }
            }
        }
    }

    pub async fn handle(&self, logged: LoggedEvent) -> Result<()> {
        debug!(
            event = %logged.event.kind(),
            block = logged.block_number,
            tx = %logged.tx_hash,
            "handling event"
        );
        let provenance = Provenance {
            event_block: logged.block_number,
            event_tx: logged.tx_hash.clone(),
        };

        match logged.event {
            ChainEvent::TournamentCreated(ev) => self.on_tournament_created(ev, provenance).await,
            ChainEvent::BettingGroupCreated(ev) => self.on_group_created(ev, provenance).await,
            ChainEvent::BettingOpportunityStartTimeUpdated {
                tournament,
                opportunity_id,
                new_start_time,
            } => {
                self.on_start_time_updated(tournament, opportunity_id, new_start_time, &provenance)
                    .await;
                Ok(())
            }
            ChainEvent::ParticipantRegistered { group, participant } => {
                self.cache.add_membership(&participant, &group)?;
                let check = self.verify_write(&group, &participant, true).await?;
                self.publish(
                    EventType::ParticipantRegistered,
                    format!("Participant {} registered in group {}", participant, group),
                    membership_payload(&group, &participant, &provenance, check),
                );
                Ok(())
            }
            ChainEvent::ParticipantWithdrawn { group, participant } => {
                self.cache.remove_membership(&participant, &group)?;
                let check = self.verify_write(&group, &participant, false).await?;
                self.publish(
                    EventType::ParticipantWithdrawn,
                    format!("Participant {} withdrew from group {}", participant, group),
                    membership_payload(&group, &participant, &provenance, check),
                );
                Ok(())
            }
            ChainEvent::ResultsProcessed { group } => {
                self.publish_status(
                    EventType::ResultsProcessed,
                    "Results processed",
                    &group,
                    &provenance,
                );
                Ok(())
            }
            ChainEvent::BettingGroupFinalized { group } => {
                self.publish_status(
                    EventType::BettingGroupFinalized,
                    "Betting group finalized",
                    &group,
                    &provenance,
                );
                Ok(())
            }
            ChainEvent::BettingGroupCancelled { group } => {
                self.publish_status(
                    EventType::BettingGroupCancelled,
                    "Betting group cancelled",
                    &group,
                    &provenance,
                );
                Ok(())
            }
        }
    }

    async fn on_tournament_created(
        &self,
        ev: TournamentCreated,
        provenance: Provenance,
    ) -> Result<()> {
        self.cache
            .registry()
            .register(ContractKind::Tournament, &ev.tournament)?;

        let record = TournamentRecord {
            address: ev.tournament,
            description: ev.description,
            start_time: ev.start_time,
            end_time: ev.end_time,
            betting_opportunities_count: ev.betting_opportunities_count,
            provenance,
        };
        self.cache.save_tournament(&record)?;
        info!(tournament = %record.address, description = %record.description, "saved tournament");

        let mut data = serde_json::to_value(&record)?;
        self.attach_gas_info(&mut data, &record.provenance.event_tx).await;
        self.publish(
            EventType::Tournament,
            format!("New tournament created: {}", record.description),
            data,
        );
        Ok(())
    }

    async fn on_group_created(
        &self,
        ev: BettingGroupCreated,
        provenance: Provenance,
    ) -> Result<()> {
        self.cache
            .registry()
            .register(ContractKind::BettingGroup, &ev.group)?;

        let record = BettingGroupRecord {
            address: ev.group,
            tournament_address: ev.tournament,
            description: ev.description,
            registration_end_time: ev.registration_end_time,
            prize_distribution: ev.prize_distribution,
            general_closing_window: ev.general_closing_window,
            provenance,
        };
        self.cache.save_group(&record)?;
        info!(
            group = %record.address,
            tournament = %record.tournament_address,
            description = %record.description,
            "saved betting group"
        );

        let mut data = serde_json::to_value(&record)?;
        self.attach_gas_info(&mut data, &record.provenance.event_tx).await;
        self.publish(
            EventType::Group,
            format!("New betting group created: {}", record.description),
            data,
        );
        Ok(())
    }

    /// Broadcast only: the stored tournament record is not updated.
    async fn on_start_time_updated(
        &self,
        tournament: Address,
        opportunity_id: u64,
        new_start_time: u64,
        provenance: &Provenance,
    ) {
        let mut data = json!({
            "tournament_address": tournament,
            "opportunity_id": opportunity_id,
            "new_start_time": new_start_time,
            "event_block": provenance.event_block,
            "event_tx": provenance.event_tx,
        });

        let message = match self.chain.description(&tournament).await {
            Ok(description) => {
                data["tournament_description"] = Value::String(description.clone());
                format!(
                    "Betting opportunity {} start time updated in {}",
                    opportunity_id,
                    description
                )
            }
            Err(e) => {
                warn!(
                    tournament = %tournament,
                    error = %e,
                    "could not fetch tournament description"
                );
                format!(
                    "Betting opportunity {} start time updated in {}",
                    opportunity_id,
                    tournament
                )
            }
        };

        self.publish(EventType::BettingOpportunityUpdated, message, data);
    }

    /// Re-reads `isRegistered` after a membership write and repeats the write
    /// once if the cache does not reflect it.
    async fn verify_write(
        &self,
        group: &Address,
        user: &Address,
        expect_member: bool,
    ) -> Result<WriteCheck> {
        let on_chain = match self.chain.is_registered(group, user).await {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    group = %group,
                    user = %user,
                    error = %e,
                    "membership verification unavailable"
                );
                return Ok(WriteCheck::Unverified);
            }
        };
        if on_chain != expect_member {
            debug!(group = %group, user = %user, "chain state moved past this event");
            return Ok(WriteCheck::ChainDisagrees);
        }
        if self.cache.membership_sides(user, group)?.agrees_with(expect_member) {
            return Ok(WriteCheck::Consistent);
        }

        warn!(
            group = %group,
            user = %user,
            expect_member,
            "membership write not reflected, retrying"
        );
        if expect_member {
            self.cache.add_membership(user, group)?;
        } else {
            self.cache.remove_membership(user, group)?;
        }
        let fixed = self
            .cache
            .membership_sides(user, group)?
            .agrees_with(expect_member);
        if !fixed {
            error!(
                group = %group,
                user = %user,
                "membership write still not reflected after retry"
            );
        }
        Ok(WriteCheck::Retried { fixed })
    }

    async fn attach_gas_info(&self, data: &mut Value, tx_hash: &str) {
        let gas = match self.chain.transaction_cost(tx_hash).await {
            Ok(Some(gas)) => gas,
            Ok(None) => return,
            Err(e) => {
                debug!(tx = %tx_hash, error = %e, "gas info unavailable");
                return;
            }
        };

        let cost_eth = gas.cost_eth();
        let mut info = json!({
            "gas_used": gas.gas_used,
            "gas_price_gwei": gas.effective_gas_price_wei as f64 / 1e9,
            "gas_cost_eth": cost_eth,
        });
        if let Some(price) = self.prices.get().await {
            info["eth_price_usd"] = json!(price);
            info["gas_cost_usd"] = json!(cost_eth * price);
        }
        data["gas_info"] = info;
    }

    fn publish_status(
        &self,
        event_type: EventType,
        label: &str,
        group: &Address,
        provenance: &Provenance,
    ) {
        self.publish(
            event_type,
            format!("{}: {}", label, group),
            json!({
                "group_address": group,
                "event_block": provenance.event_block,
                "event_tx": provenance.event_tx,
            }),
        );
    }

    fn publish(&self, event_type: EventType, message: String, data: Value) {
        self.fanout
            .publish(&EventEnvelope::new(event_type, message).with_data(data));
    }
}

fn membership_payload(
    group: &Address,
    participant: &Address,
    provenance: &Provenance,
    check: WriteCheck,
) -> Value {
    json!({
        "group_address": group,
        "participant": participant,
        "event_block": provenance.event_block,
        "event_tx": provenance.event_tx,
        "verification": check,
    })
}
