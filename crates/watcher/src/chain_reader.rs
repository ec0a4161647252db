use crate::abi::{self, AbiDecoder, Word};
use crate::config::WatcherConfig;
use crate::rpc_client::RpcClient;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use betcache_types::{
    views, Address, BettingGroupCreated, ChainEvent, EventKind, LoggedEvent, TournamentCreated,
    WEI_PER_ETH,
};
use serde::Serialize;
use serde_json::Value;

/// Gas spent by a transaction, from its receipt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GasInfo {
    pub gas_used: u64,
    pub effective_gas_price_wei: u128,
}

impl GasInfo {
    pub fn cost_wei(&self) -> u128 {
        self.gas_used as u128 * self.effective_gas_price_wei
    }

    pub fn cost_eth(&self) -> f64 {
        self.cost_wei() as f64 / WEI_PER_ETH
    }
}

/// Read-only view of the chain. Never submits transactions.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn current_height(&self) -> Result<u64>;

    /// Logs of one event kind emitted by `contract` in `[from, to]`, decoded.
    async fn get_logs(
        &self,
        contract: &Address,
        event: EventKind,
        from: u64,
        to: u64,
    ) -> Result<Vec<LoggedEvent>>;

    async fn participant_count(&self, group: &Address) -> Result<u64>;
    async fn participant_at(&self, group: &Address, index: u64) -> Result<Address>;
    async fn is_registered(&self, group: &Address, user: &Address) -> Result<bool>;
    async fn description(&self, contract: &Address) -> Result<String>;

    /// `None` when the node has no receipt for the transaction.
    async fn transaction_cost(&self, tx_hash: &str) -> Result<Option<GasInfo>>;
}

pub struct RpcChainReader {
    rpc: RpcClient,
}

impl RpcChainReader {
    pub fn new(config: &WatcherConfig) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::new(config)?,
        })
    }

    async fn view(&self, contract: &Address, signature: &str, args: &[Word]) -> Result<Vec<u8>> {
        let data = abi::encode_call(signature, args);
        self.rpc
            .eth_call(&contract.to_string(), &data)
            .await
            .with_context(|| format!("eth_call {} on {}", signature, contract))
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn current_height(&self) -> Result<u64> {
        self.rpc.get_block_number().await
    }

    async fn get_logs(
        &self,
        contract: &Address,
        event: EventKind,
        from: u64,
        to: u64,
    ) -> Result<Vec<LoggedEvent>> {
        let topic0 = format!("0x{}", hex::encode(abi::event_topic(event.signature())));
        let logs = self
            .rpc
            .get_logs(&contract.to_string(), &topic0, from, to)
            .await
            .with_context(|| format!("eth_getLogs {} for {}", event, contract))?;

        logs.iter()
            .map(|log| decode_log(event, contract, &RawLog::from_json(log)?))
            .collect()
    }

    async fn participant_count(&self, group: &Address) -> Result<u64> {
        let out = self.view(group, views::PARTICIPANT_COUNT, &[]).await?;
        AbiDecoder::new(&out).uint(0)
    }

    async fn participant_at(&self, group: &Address, index: u64) -> Result<Address> {
        let out = self
            .view(group, views::PARTICIPANT_AT, &[abi::uint_word(index)])
            .await?;
        AbiDecoder::new(&out).address(0)
    }

    async fn is_registered(&self, group: &Address, user: &Address) -> Result<bool> {
        let out = self
            .view(group, views::IS_REGISTERED, &[user.to_word()])
            .await?;
        AbiDecoder::new(&out).boolean(0)
    }

    async fn description(&self, contract: &Address) -> Result<String> {
        let out = self.view(contract, views::DESCRIPTION, &[]).await?;
        AbiDecoder::new(&out).string(0)
    }

    async fn transaction_cost(&self, tx_hash: &str) -> Result<Option<GasInfo>> {
        let Some(receipt) = self.rpc.get_transaction_receipt(tx_hash).await? else {
            return Ok(None);
        };
        Ok(Some(GasInfo {
            gas_used: abi::parse_quantity(str_field(&receipt, "gasUsed")?)?,
            effective_gas_price_wei: abi::parse_quantity_u128(str_field(
                &receipt,
                "effectiveGasPrice",
            )?)?,
        }))
    }
}

/// An undecoded log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLog {
    pub topics: Vec<Word>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
}

impl RawLog {
    pub fn from_json(log: &Value) -> Result<Self> {
        let topics = log
            .get("topics")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("Missing topics in log"))?
            .iter()
            .map(|t| {
                t.as_str()
                    .ok_or_else(|| anyhow!("topic is not a string"))
                    .and_then(abi::parse_word)
            })
            .collect::<Result<Vec<_>>>()?;

        let tx_hash = str_field(log, "transactionHash")?.to_lowercase();
        abi::parse_word(&tx_hash).context("invalid transactionHash")?;

        Ok(Self {
            topics,
            data: abi::parse_hex_bytes(str_field(log, "data")?)?,
            block_number: abi::parse_quantity(str_field(log, "blockNumber")?)?,
            tx_hash,
            log_index: log
                .get("logIndex")
                .and_then(|v| v.as_str())
                .map(abi::parse_quantity)
                .transpose()?
                .unwrap_or(0),
        })
    }

    fn topic(&self, index: usize) -> Result<&Word> {
        self.topics
            .get(index)
            .ok_or_else(|| anyhow!("Invalid topics length, expected at least {}", index + 1))
    }
}

fn str_field<'a>(value: &'a Value, name: &str) -> Result<&'a str> {
    value
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Missing {} in response", name))
}

/// Decodes a raw log of a known kind emitted by `contract` into its typed event.
pub fn decode_log(kind: EventKind, contract: &Address, log: &RawLog) -> Result<LoggedEvent> {
    if log.topic(0)? != &abi::event_topic(kind.signature()) {
        bail!("log topic does not match {}", kind);
    }
    let data = AbiDecoder::new(&log.data);

    let event = match kind {
        EventKind::TournamentCreated => ChainEvent::TournamentCreated(TournamentCreated {
            tournament: Address::from_word(log.topic(1)?),
            description: data.string(0)?,
            start_time: data.uint(1)?,
            end_time: data.uint(2)?,
            betting_opportunities_count: data.array_len(3)?,
        }),
        EventKind::BettingGroupCreated => ChainEvent::BettingGroupCreated(BettingGroupCreated {
            group: Address::from_word(log.topic(1)?),
            tournament: Address::from_word(log.topic(2)?),
            description: data.string(0)?,
            registration_end_time: data.uint(1)?,
            prize_distribution: data.uint_array(2)?,
            general_closing_window: data.uint(3)?,
        }),
        EventKind::BettingOpportunityStartTimeUpdated => {
            ChainEvent::BettingOpportunityStartTimeUpdated {
                tournament: *contract,
                opportunity_id: abi::word_to_u64(log.topic(1)?)?,
                new_start_time: data.uint(0)?,
            }
        }
        EventKind::ParticipantRegistered => ChainEvent::ParticipantRegistered {
            group: *contract,
            participant: Address::from_word(log.topic(1)?),
        },
        EventKind::ParticipantWithdrawn => ChainEvent::ParticipantWithdrawn {
            group: *contract,
            participant: Address::from_word(log.topic(1)?),
        },
        EventKind::ResultsProcessed => ChainEvent::ResultsProcessed { group: *contract },
        EventKind::BettingGroupFinalized => ChainEvent::BettingGroupFinalized { group: *contract },
        EventKind::BettingGroupCancelled => ChainEvent::BettingGroupCancelled { group: *contract },
    };

    Ok(LoggedEvent {
        event,
        block_number: log.block_number,
        tx_hash: log.tx_hash.clone(),
        log_index: log.log_index,
    })
}
