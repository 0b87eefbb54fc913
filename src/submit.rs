use std::{future::Future, marker::PhantomData, sync::Arc};

use alloy::{
    network::{Ethereum, EthereumWallet, NetworkWallet, TransactionBuilder},
    primitives::{Address, Bytes, FixedBytes, TxHash, U256},
    providers::Provider,
    rpc::types::TransactionRequest,
    sol,
    sol_types::SolCall,
    transports::Transport,
};
use alloy_chains::Chain;

use crate::{
    codec::ComputeQuery,
    error::SubmissionError,
    query::{CompiledQuery, ProtocolVersion},
};

sol! {
    function axiomV2Callback(
        uint64 sourceChainId,
        address caller,
        bytes32 querySchema,
        bytes32 queryId,
        bytes32[] axiomResults,
        bytes extraData
    ) external;
}

/// Claim entry point of the beta query contract.
pub mod v2_beta {
    alloy::sol! {
        #[derive(Debug, PartialEq, Eq)]
        struct AxiomV2ComputeQuery {
            uint8 k;
            uint16 resultLen;
            bytes32[] vkey;
            bytes computeProof;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct AxiomV2Callback {
            address callbackAddr;
            bytes4 callbackFunctionSelector;
            uint8 resultLen;
            bytes callbackExtraData;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct AxiomV2QueryData {
            uint64 sourceChainId;
            bytes32 dataQueryHash;
            AxiomV2ComputeQuery computeQuery;
            AxiomV2Callback callback;
            uint64 maxFeePerGas;
            uint32 callbackGasLimit;
            bytes dataQuery;
        }

        function claimAirdrop(AxiomV2QueryData calldata axiomData) external payable;
    }
}

/// Claim entry point of the released query contract.
pub mod v2 {
    alloy::sol! {
        #[derive(Debug, PartialEq, Eq)]
        struct AxiomV2ComputeQuery {
            uint8 k;
            uint16 resultLen;
            bytes32[] vkey;
            bytes computeProof;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct AxiomV2Callback {
            address target;
            bytes32 extraData;
        }

        #[derive(Debug, PartialEq, Eq)]
        struct AxiomV2QueryData {
            uint64 sourceChainId;
            bytes32 dataQueryHash;
            AxiomV2ComputeQuery computeQuery;
            AxiomV2Callback callback;
            bytes32 userSalt;
            uint64 maxFeePerGas;
            uint32 callbackGasLimit;
            address refundee;
            bytes dataQuery;
        }

        function claimAirdrop(AxiomV2QueryData calldata axiomData) external payable;
    }
}

/// Selector the beta contract calls back into once the proof lands.
pub fn callback_selector() -> FixedBytes<4> {
    FixedBytes(axiomV2CallbackCall::SELECTOR)
}

/// `claimAirdrop` argument, shaped for one protocol revision.
#[derive(Debug, PartialEq, Eq)]
pub enum ClaimPayload {
    V2Beta(v2_beta::AxiomV2QueryData),
    V2(v2::AxiomV2QueryData),
}

impl ClaimPayload {
    pub fn from_compiled(compiled: &CompiledQuery) -> Result<Self, SubmissionError> {
        let version = compiled.version;
        let missing = |field| SubmissionError::MissingField { version, field };
        let unencodable = |field| SubmissionError::Unencodable { version, field };
        let ComputeQuery { k, result_len, vkey, compute_proof } = compiled.compute_query.clone();

        let payload = match version {
            ProtocolVersion::V2Beta => {
                let selector = compiled
                    .callback
                    .function_selector
                    .ok_or_else(|| missing("callbackFunctionSelector"))?;
                let callback_result_len =
                    u8::try_from(result_len).map_err(|_| unencodable("resultLen"))?;

                ClaimPayload::V2Beta(v2_beta::AxiomV2QueryData {
                    sourceChainId: compiled.source_chain_id,
                    dataQueryHash: compiled.data_query_hash,
                    computeQuery: v2_beta::AxiomV2ComputeQuery {
                        k,
                        resultLen: result_len,
                        vkey,
                        computeProof: compute_proof,
                    },
                    callback: v2_beta::AxiomV2Callback {
                        callbackAddr: compiled.callback.target,
                        callbackFunctionSelector: selector,
                        resultLen: callback_result_len,
                        callbackExtraData: Bytes::copy_from_slice(
                            compiled.callback.extra_data.as_slice(),
                        ),
                    },
                    maxFeePerGas: compiled.fees.max_fee_per_gas,
                    callbackGasLimit: compiled.fees.callback_gas_limit,
                    dataQuery: compiled.data_query.clone(),
                })
            }
            ProtocolVersion::V2 => ClaimPayload::V2(v2::AxiomV2QueryData {
                sourceChainId: compiled.source_chain_id,
                dataQueryHash: compiled.data_query_hash,
                computeQuery: v2::AxiomV2ComputeQuery {
                    k,
                    resultLen: result_len,
                    vkey,
                    computeProof: compute_proof,
                },
                callback: v2::AxiomV2Callback {
                    target: compiled.callback.target,
                    extraData: compiled.callback.extra_data,
                },
                userSalt: compiled.user_salt.ok_or_else(|| missing("userSalt"))?,
                maxFeePerGas: compiled.fees.max_fee_per_gas,
                callbackGasLimit: compiled.fees.callback_gas_limit,
                refundee: compiled.refundee.ok_or_else(|| missing("refundee"))?,
                dataQuery: compiled.data_query.clone(),
            }),
        };

        Ok(payload)
    }

    pub fn calldata(&self) -> Bytes {
        match self {
            ClaimPayload::V2Beta(data) => {
                v2_beta::claimAirdropCall { axiomData: data.clone() }.abi_encode().into()
            }
            ClaimPayload::V2(data) => {
                v2::claimAirdropCall { axiomData: data.clone() }.abi_encode().into()
            }
        }
    }
}

/// A single `claimAirdrop` transaction, with the query fee as value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimSubmission {
    pub to: Address,
    pub input: Bytes,
    pub value: U256,
}

impl ClaimSubmission {
    pub fn new(airdrop: Address, compiled: &CompiledQuery) -> Result<Self, SubmissionError> {
        let payload = ClaimPayload::from_compiled(compiled)?;
        let value = compiled.calculate_fee().map_err(|_| SubmissionError::Unencodable {
            version: compiled.version,
            field: "value",
        })?;
        Ok(Self { to: airdrop, input: payload.calldata(), value })
    }
}

pub trait ClaimSubmitter {
    /// Sends the claim and waits for it to be mined. Returns the hash of a
    /// successful transaction.
    fn submit(
        &self,
        submission: &ClaimSubmission,
    ) -> impl Future<Output = Result<TxHash, SubmissionError>>;
}

pub struct RpcSubmitter<P, T> {
    provider: Arc<P>,
    wallet: Arc<EthereumWallet>,
    chain_id: u64,
    _transport: PhantomData<T>,
}

impl<P, T> RpcSubmitter<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    pub fn new(provider: Arc<P>, wallet: Arc<EthereumWallet>, chain_id: u64) -> Self {
        Self { provider, wallet, chain_id, _transport: PhantomData }
    }

    async fn send_transaction(
        &self,
        submission: &ClaimSubmission,
    ) -> eyre::Result<(TxHash, bool)> {
        let eip1559_fees = self.provider.estimate_eip1559_fees(None).await?;
        let from = NetworkWallet::<Ethereum>::default_signer_address(self.wallet.as_ref());

        let nonce = self.provider.get_transaction_count(from).await?;

        let mut tx_request = TransactionRequest::default()
            .with_max_fee_per_gas(eip1559_fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(eip1559_fees.max_priority_fee_per_gas)
            .with_to(submission.to)
            .with_value(submission.value)
            .with_nonce(nonce)
            .with_chain_id(self.chain_id)
            .with_from(from)
            .with_input(submission.input.clone());

        let gas_limit = self.provider.estimate_gas(&tx_request).await?;
        tx_request.set_gas_limit(gas_limit);

        let signed_transaction = tx_request.build(self.wallet.as_ref()).await?;
        let pending_tx = self.provider.send_tx_envelope(signed_transaction).await?;
        tracing::info!("Claim sent: {}, waiting for confirmation", pending_tx.tx_hash());
        let receipt = pending_tx.get_receipt().await?;

        Ok((receipt.transaction_hash, receipt.status()))
    }
}

impl<P, T> ClaimSubmitter for RpcSubmitter<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    async fn submit(&self, submission: &ClaimSubmission) -> Result<TxHash, SubmissionError> {
        tracing::info!("Submitting claim to {} with {} wei", submission.to, submission.value);

        let (tx_hash, status) =
            self.send_transaction(submission).await.map_err(SubmissionError::Provider)?;
        let url = explorer_tx_url(self.chain_id, tx_hash);

        if status {
            tracing::info!("Transaction successful: {}", url);
            Ok(tx_hash)
        } else {
            tracing::error!("Transaction failed: {}", url);
            Err(SubmissionError::Reverted { tx_hash, url })
        }
    }
}

pub fn explorer_tx_url(chain_id: u64, tx_hash: TxHash) -> String {
    match Chain::from_id(chain_id).etherscan_urls() {
        Some((_, explorer)) => format!("{}/tx/{tx_hash}", explorer.trim_end_matches('/')),
        None => tx_hash.to_string(),
    }
}
