use std::{collections::HashMap, fmt};

use alloy::primitives::{keccak256, Address, Bytes, FixedBytes, TxHash, B256, U256};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    chain::{ChainReader, TxLocation},
    codec::{
        encode_data_query, get_data_query_hash, get_query_hash, AccountSubquery, ComputeQuery,
        HeaderSubquery, ReceiptSubquery, Subquery, TxSubquery,
    },
    constants::{
        DEFAULT_CALLBACK_GAS_LIMIT, DEFAULT_MAX_FEE_PER_GAS, DEFAULT_PROOF_VERIFICATION_GAS,
        DEFAULT_QUERY_FEE,
    },
    error::{BuildError, InputError, ValidationError},
    subquery::Declaration,
    validator,
};

/// Revision of the query contract the claim is submitted against. The
/// revisions differ in the callback shape and in which payload fields exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolVersion {
    /// Callback carries a function selector; no salt or refundee.
    V2Beta,
    #[default]
    V2,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V2Beta => f.write_str("v2-beta"),
            ProtocolVersion::V2 => f.write_str("v2"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Callback {
    pub target: Address,
    pub extra_data: B256,
    pub function_selector: Option<FixedBytes<4>>,
}

impl Callback {
    pub fn new(target: Address, extra_data: B256) -> Self {
        Self { target, extra_data, function_selector: None }
    }

    pub fn with_function_selector(mut self, selector: FixedBytes<4>) -> Self {
        self.function_selector = Some(selector);
        self
    }

    /// Hash of `target ‖ extraData`. The beta function selector is carried
    /// in the payload only and is not part of the hash.
    pub fn keccak(&self) -> B256 {
        keccak256([self.target.as_slice(), self.extra_data.as_slice()].concat())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSchedule {
    pub max_fee_per_gas: u64,
    pub callback_gas_limit: u32,
    pub proof_verification_gas: u64,
    pub query_fee: U256,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            max_fee_per_gas: DEFAULT_MAX_FEE_PER_GAS,
            callback_gas_limit: DEFAULT_CALLBACK_GAS_LIMIT,
            proof_verification_gas: DEFAULT_PROOF_VERIFICATION_GAS,
            query_fee: DEFAULT_QUERY_FEE,
        }
    }
}

impl FeeSchedule {
    /// `query_fee + max_fee_per_gas * (proof_verification_gas + callback_gas_limit)`,
    /// or `None` when it does not fit a `uint256`.
    pub fn fee(&self) -> Option<U256> {
        let gas = U256::from(self.proof_verification_gas)
            .checked_add(U256::from(self.callback_gas_limit))?;
        U256::from(self.max_fee_per_gas).checked_mul(gas)?.checked_add(self.query_fee)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryOptions {
    pub version: ProtocolVersion,
    pub source_chain_id: u64,
    pub fees: FeeSchedule,
    pub refundee: Option<Address>,
    pub user_salt: Option<B256>,
}

impl QueryOptions {
    pub fn new(version: ProtocolVersion, source_chain_id: u64) -> Self {
        Self {
            version,
            source_chain_id,
            fees: FeeSchedule::default(),
            refundee: None,
            user_salt: None,
        }
    }
}

/// Collects declarations in order, plus a callback, into a [`QueryRequest`].
#[derive(Debug)]
pub struct QueryAssembler {
    options: QueryOptions,
    declarations: Vec<Declaration>,
    callback: Option<Callback>,
}

impl QueryAssembler {
    pub fn new(options: QueryOptions) -> Self {
        Self { options, declarations: vec![], callback: None }
    }

    /// Declarations are laid out for the callback in append order.
    pub fn append(&mut self, declaration: impl Into<Declaration>) {
        self.declarations.push(declaration.into());
    }

    /// Replaces any callback set before; the last one wins.
    pub fn set_callback(&mut self, callback: Callback) {
        self.callback = Some(callback);
    }

    pub fn finalize(self) -> Result<QueryRequest, InputError> {
        let callback = self.callback.ok_or(InputError::MissingCallback)?;
        Ok(QueryRequest { options: self.options, declarations: self.declarations, callback })
    }
}

/// Frozen query: no further declarations or callback changes.
#[derive(Clone, Debug)]
pub struct QueryRequest {
    options: QueryOptions,
    declarations: Vec<Declaration>,
    callback: Callback,
}

impl QueryRequest {
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Checks the request against the structural rules and the chain. The
    /// caller decides whether a failure stops the flow.
    pub async fn validate(&self, chain: &impl ChainReader) -> Result<(), ValidationError> {
        validator::validate(self, chain).await
    }

    pub async fn build(&self, chain: &impl ChainReader) -> Result<CompiledQuery, BuildError> {
        let subqueries = self.resolve(chain).await?;
        let source_chain_id = self.options.source_chain_id;

        let result_len = u16::try_from(subqueries.len()).map_err(|_| BuildError::OutOfRange {
            field: "resultLen",
            value: subqueries.len() as u64,
        })?;
        let compute_query = ComputeQuery::passthrough(result_len);
        let data_query = encode_data_query(source_chain_id, &subqueries)?;
        let data_query_hash = get_data_query_hash(source_chain_id, &subqueries)?;
        let query_hash = get_query_hash(source_chain_id, data_query_hash, &compute_query)?;

        let user_salt = match self.options.version {
            ProtocolVersion::V2Beta => None,
            ProtocolVersion::V2 => Some(self.options.user_salt.unwrap_or_else(random_salt)),
        };

        tracing::info!("Built query {query_hash} with {} subqueries", subqueries.len());

        let compiled = CompiledQuery {
            version: self.options.version,
            source_chain_id,
            data_query_hash,
            data_query,
            compute_query,
            query_hash,
            callback_hash: self.callback.keccak(),
            callback: self.callback.clone(),
            user_salt,
            refundee: self.options.refundee,
            fees: self.options.fees,
        };
        compiled.calculate_fee()?;

        Ok(compiled)
    }

    async fn resolve(&self, chain: &impl ChainReader) -> Result<Vec<Subquery>, BuildError> {
        let mut located: HashMap<TxHash, (u32, u16)> = HashMap::new();
        let mut subqueries = Vec::with_capacity(self.declarations.len());

        for declaration in &self.declarations {
            let subquery = match declaration {
                Declaration::Receipt(decl) => {
                    let topic_or_data_or_address_idx = decl
                        .topic_or_data_or_address_idx()
                        .ok_or(BuildError::InvalidLogSelector(decl.tx_hash))?;
                    let (block_number, tx_idx) =
                        position_of(chain, &mut located, decl.tx_hash).await?;
                    Subquery::Receipt(ReceiptSubquery {
                        block_number,
                        tx_idx,
                        field_or_log_idx: decl.field_or_log_idx,
                        topic_or_data_or_address_idx,
                        event_schema: decl.event_schema,
                    })
                }
                Declaration::Transaction(decl) => {
                    let (block_number, tx_idx) =
                        position_of(chain, &mut located, decl.tx_hash).await?;
                    Subquery::Transaction(TxSubquery {
                        block_number,
                        tx_idx,
                        field_or_calldata_idx: decl.field_or_calldata_idx,
                    })
                }
                Declaration::Header(decl) => Subquery::Header(HeaderSubquery {
                    block_number: narrow("blockNumber", decl.block_number)?,
                    field_idx: decl.field_idx,
                }),
                Declaration::Account(decl) => Subquery::Account(AccountSubquery {
                    block_number: narrow("blockNumber", decl.block_number)?,
                    addr: decl.address,
                    field_idx: decl.field as u32,
                }),
            };
            subqueries.push(subquery);
        }

        Ok(subqueries)
    }
}

async fn position_of(
    chain: &impl ChainReader,
    located: &mut HashMap<TxHash, (u32, u16)>,
    tx_hash: TxHash,
) -> Result<(u32, u16), BuildError> {
    if let Some(position) = located.get(&tx_hash) {
        return Ok(*position);
    }

    let TxLocation { block_number, tx_index, .. } = chain
        .locate_transaction(tx_hash)
        .await
        .map_err(BuildError::Chain)?
        .ok_or(BuildError::UnknownTransaction(tx_hash))?;
    let (Some(block_number), Some(tx_index)) = (block_number, tx_index) else {
        return Err(BuildError::PendingTransaction(tx_hash));
    };

    let position = (narrow("blockNumber", block_number)?, narrow("txIdx", tx_index)?);
    located.insert(tx_hash, position);
    Ok(position)
}

fn narrow<N: TryFrom<u64>>(field: &'static str, value: u64) -> Result<N, BuildError> {
    N::try_from(value).map_err(|_| BuildError::OutOfRange { field, value })
}

fn random_salt() -> B256 {
    let mut salt = [0u8; 32];
    thread_rng().fill(&mut salt);
    B256::from(salt)
}

/// Wire-ready projection of a built [`QueryRequest`].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    pub version: ProtocolVersion,
    pub source_chain_id: u64,
    pub data_query_hash: B256,
    pub data_query: Bytes,
    pub compute_query: ComputeQuery,
    pub query_hash: B256,
    pub callback: Callback,
    pub callback_hash: B256,
    pub user_salt: Option<B256>,
    pub refundee: Option<Address>,
    pub fees: FeeSchedule,
}

impl CompiledQuery {
    pub fn calculate_fee(&self) -> Result<U256, BuildError> {
        self.fees.fee().ok_or(BuildError::FeeOverflow)
    }
}
