//! In-memory doubles for the chain, the event locator and the submitter.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use alloy::primitives::{address, b256, Address, Bytes, TxHash};

use crate::{
    chain::{ChainReader, TxLocation},
    error::SubmissionError,
    locator::{EventLocator, RawSwapEvent},
    submit::{ClaimSubmission, ClaimSubmitter},
};

pub const AIRDROP: Address = address!("00000000000000000000000000000000000A1D0F");
pub const CLAIMER: Address = address!("00000000000000000000000000000000000000aa");
pub const SWAP_TX: TxHash =
    b256!("abc0000000000000000000000000000000000000000000000000000000000001");

#[derive(Default)]
pub struct MockChain {
    pub chain_id: u64,
    pub latest: u64,
    pub code: HashMap<Address, Bytes>,
    pub transactions: HashMap<TxHash, TxLocation>,
    calls: AtomicUsize,
}

impl MockChain {
    /// Goerli-like chain with the airdrop deployed and one mined EIP-1559 swap.
    pub fn with_swap() -> Self {
        let mut chain = Self { chain_id: 5, latest: 200, ..Default::default() };
        chain.code.insert(AIRDROP, Bytes::from_static(&[0x60, 0x80]));
        chain.transactions.insert(
            SWAP_TX,
            TxLocation { block_number: Some(100), tx_index: Some(7), tx_type: 2, log_count: 5 },
        );
        chain
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl ChainReader for MockChain {
    async fn chain_id(&self) -> eyre::Result<u64> {
        self.record();
        Ok(self.chain_id)
    }

    async fn latest_block_number(&self) -> eyre::Result<u64> {
        self.record();
        Ok(self.latest)
    }

    async fn code_at(&self, address: Address) -> eyre::Result<Bytes> {
        self.record();
        Ok(self.code.get(&address).cloned().unwrap_or_default())
    }

    async fn locate_transaction(&self, tx_hash: TxHash) -> eyre::Result<Option<TxLocation>> {
        self.record();
        Ok(self.transactions.get(&tx_hash).copied())
    }
}

pub struct MockLocator {
    pub event: Option<RawSwapEvent>,
}

impl MockLocator {
    pub fn swap(log_idx: u32) -> Self {
        Self {
            event: Some(RawSwapEvent {
                tx_hash: Some(SWAP_TX),
                block_height: Some(100),
                log_idx: Some(log_idx),
            }),
        }
    }
}

impl EventLocator for MockLocator {
    async fn find_latest_swap(&self, _recipient: Address) -> eyre::Result<Option<RawSwapEvent>> {
        Ok(self.event.clone())
    }
}

#[derive(Default)]
pub struct MockSubmitter {
    pub sent: Mutex<Vec<ClaimSubmission>>,
}

impl ClaimSubmitter for MockSubmitter {
    async fn submit(&self, submission: &ClaimSubmission) -> Result<TxHash, SubmissionError> {
        self.sent.lock().unwrap().push(submission.clone());
        Ok(TxHash::repeat_byte(0xee))
    }
}
