use std::{future::Future, marker::PhantomData, sync::Arc, time::Duration};

use alloy::{
    network::Ethereum,
    primitives::{Address, TxHash, B256},
    providers::Provider,
    rpc::types::Filter,
    sol,
    sol_types::SolEvent,
    transports::Transport,
};
use reqwest::{Client, Method};
use serde::Deserialize;

use crate::error::InputError;

sol! {
    #[derive(Debug)]
    event Swap(
        address indexed sender,
        uint256 amount0In,
        uint256 amount1In,
        uint256 amount0Out,
        uint256 amount1Out,
        address indexed to
    );
}

/// Topic 0 of the swap event the airdrop is claimed for.
pub const SWAP_EVENT_SCHEMA: B256 = Swap::SIGNATURE_HASH;

/// Swap event as reported by a locator. Fields are optional because
/// locators report whatever their source had.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawSwapEvent {
    pub tx_hash: Option<TxHash>,
    pub block_height: Option<u64>,
    pub log_idx: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapEvent {
    pub tx_hash: TxHash,
    pub block_height: u64,
    /// Index of the log within its transaction receipt.
    pub log_idx: u32,
}

impl TryFrom<RawSwapEvent> for SwapEvent {
    type Error = InputError;

    fn try_from(raw: RawSwapEvent) -> Result<Self, Self::Error> {
        Ok(Self {
            tx_hash: raw.tx_hash.ok_or(InputError::MissingEventField("tx_hash"))?,
            block_height: raw.block_height.ok_or(InputError::MissingEventField("block_height"))?,
            log_idx: raw.log_idx.ok_or(InputError::MissingEventField("log_idx"))?,
        })
    }
}

pub trait EventLocator {
    /// Most recent swap that paid out to `recipient`, if any.
    fn find_latest_swap(
        &self,
        recipient: Address,
    ) -> impl Future<Output = eyre::Result<Option<RawSwapEvent>>>;
}

/// Scans recent blocks with `eth_getLogs`.
pub struct LogScanLocator<P, T> {
    provider: Arc<P>,
    lookback_blocks: u64,
    _transport: PhantomData<T>,
}

impl<P, T> LogScanLocator<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    pub fn new(provider: Arc<P>, lookback_blocks: u64) -> Self {
        Self { provider, lookback_blocks, _transport: PhantomData }
    }
}

impl<P, T> EventLocator for LogScanLocator<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    async fn find_latest_swap(&self, recipient: Address) -> eyre::Result<Option<RawSwapEvent>> {
        let latest = self.provider.get_block_number().await?;
        let from_block = latest.saturating_sub(self.lookback_blocks);
        tracing::info!("Scanning blocks {from_block}..={latest} for swaps to {recipient}");

        let filter = Filter::new()
            .event_signature(SWAP_EVENT_SCHEMA)
            .topic2(recipient.into_word())
            .from_block(from_block)
            .to_block(latest);
        let logs = self.provider.get_logs(&filter).await?;

        let Some(log) = logs.last() else {
            return Ok(None);
        };
        let Some(tx_hash) = log.transaction_hash else {
            return Ok(Some(RawSwapEvent { block_height: log.block_number, ..Default::default() }));
        };

        // eth_getLogs reports block-wide log indices
        let log_idx = match self.provider.get_transaction_receipt(tx_hash).await? {
            Some(receipt) => receipt
                .inner
                .logs()
                .iter()
                .position(|receipt_log| receipt_log.log_index == log.log_index)
                .and_then(|idx| u32::try_from(idx).ok()),
            None => None,
        };

        Ok(Some(RawSwapEvent { tx_hash: Some(tx_hash), block_height: log.block_number, log_idx }))
    }
}

#[derive(Deserialize, Debug)]
struct IndexerResponse {
    data: Option<IndexerData>,
}

#[derive(Deserialize, Debug)]
struct IndexerData {
    #[serde(default)]
    items: Vec<IndexerTransaction>,
}

#[derive(Deserialize, Debug)]
struct IndexerTransaction {
    tx_hash: Option<TxHash>,
    block_height: Option<u64>,
    #[serde(default)]
    log_events: Vec<IndexerLogEvent>,
}

#[derive(Deserialize, Debug)]
struct IndexerLogEvent {
    #[serde(default)]
    raw_log_topics: Vec<B256>,
}

/// Reads a transaction history API that lists each transaction's decoded logs.
pub struct IndexerLocator {
    client: Client,
    base_url: String,
    chain_name: String,
    api_key: String,
    max_retries: usize,
    retry_delay: Duration,
}

impl IndexerLocator {
    pub fn new(base_url: String, chain_name: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            chain_name,
            api_key,
            max_retries: 5,
            retry_delay: Duration::from_secs(3),
        }
    }

    async fn send_request(&self, url: &str) -> eyre::Result<String> {
        let response = self
            .client
            .request(Method::GET, url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .inspect_err(|e| tracing::error!("Request failed: {}", e))?
            .error_for_status()
            .inspect_err(|e| tracing::error!("Non-successful status code: {}", e))?;

        let text = response
            .text()
            .await
            .inspect_err(|e| tracing::error!("Failed to retrieve response text: {}", e))?;

        Ok(text)
    }

    async fn send_request_with_retries(&self, url: &str) -> eyre::Result<String> {
        let mut attempt = 1;
        loop {
            match self.send_request(url).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt >= self.max_retries => {
                    return Err(e.wrap_err(format!("Indexer request failed after {attempt} tries")))
                }
                Err(_) => {
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}

impl EventLocator for IndexerLocator {
    async fn find_latest_swap(&self, recipient: Address) -> eyre::Result<Option<RawSwapEvent>> {
        let url = format!(
            "{}/{}/address/{recipient}/transactions_v3/",
            self.base_url.trim_end_matches('/'),
            self.chain_name
        );
        tracing::info!("Looking up swaps to {recipient} on {}", self.chain_name);

        let body = self.send_request_with_retries(&url).await?;
        parse_indexer_response(&body, recipient)
    }
}

/// Transactions come newest first; the first matching log wins.
fn parse_indexer_response(body: &str, recipient: Address) -> eyre::Result<Option<RawSwapEvent>> {
    let response: IndexerResponse = serde_json::from_str(body)?;
    let transactions = response.data.map(|data| data.items).unwrap_or_default();
    let recipient_topic = recipient.into_word();

    for transaction in transactions {
        let position = transaction.log_events.iter().position(|event| {
            event.raw_log_topics.first() == Some(&SWAP_EVENT_SCHEMA)
                && event.raw_log_topics.get(2) == Some(&recipient_topic)
        });

        if let Some(log_idx) = position {
            return Ok(Some(RawSwapEvent {
                tx_hash: transaction.tx_hash,
                block_height: transaction.block_height,
                log_idx: u32::try_from(log_idx).ok(),
            }));
        }
    }

    Ok(None)
}
