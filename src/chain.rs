use std::{future::Future, marker::PhantomData, sync::Arc};

use alloy::{
    network::Ethereum,
    primitives::{Address, Bytes, TxHash},
    providers::Provider,
    transports::Transport,
};

/// Where a transaction landed, and what its receipt holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxLocation {
    pub block_number: Option<u64>,
    pub tx_index: Option<u64>,
    pub tx_type: u8,
    pub log_count: usize,
}

/// Read-only chain access needed to validate and build a query.
pub trait ChainReader {
    fn chain_id(&self) -> impl Future<Output = eyre::Result<u64>>;

    fn latest_block_number(&self) -> impl Future<Output = eyre::Result<u64>>;

    fn code_at(&self, address: Address) -> impl Future<Output = eyre::Result<Bytes>>;

    fn locate_transaction(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = eyre::Result<Option<TxLocation>>>;
}

pub struct RpcChain<P, T> {
    provider: Arc<P>,
    _transport: PhantomData<T>,
}

impl<P, T> RpcChain<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider, _transport: PhantomData }
    }
}

impl<P, T> ChainReader for RpcChain<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    async fn chain_id(&self) -> eyre::Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn latest_block_number(&self) -> eyre::Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn code_at(&self, address: Address) -> eyre::Result<Bytes> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn locate_transaction(&self, tx_hash: TxHash) -> eyre::Result<Option<TxLocation>> {
        let Some(transaction) = self.provider.get_transaction_by_hash(tx_hash).await? else {
            return Ok(None);
        };

        let log_count = match self.provider.get_transaction_receipt(tx_hash).await? {
            Some(receipt) => receipt.inner.logs().len(),
            None => 0,
        };

        Ok(Some(TxLocation {
            block_number: transaction.block_number,
            tx_index: transaction.transaction_index,
            tx_type: transaction.transaction_type.unwrap_or_default(),
            log_count,
        }))
    }
}
