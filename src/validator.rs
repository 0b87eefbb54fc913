use std::collections::HashMap;

use alloy::primitives::{Address, TxHash};

use crate::{
    chain::{ChainReader, TxLocation},
    constants::{
        HEADER_EXTRA_DATA_LEN_FIELD_IDX, HEADER_HASH_FIELD_IDX, HEADER_LOGS_BLOOM_FIELD_IDX_OFFSET,
        LOGS_BLOOM_CHUNKS, MAX_SUBQUERIES, RECEIPT_LOGS_BLOOM_IDX_OFFSET, RECEIPT_MAX_TOPICS,
        TX_CALLDATA_IDX_OFFSET, TX_DATA_LENGTH_FIELD_IDX, TX_INDEX_FIELD_IDX, TX_TYPE_FIELD_IDX,
    },
    error::ValidationError,
    query::QueryRequest,
    subquery::{
        Declaration, HeaderField, LogSelector, ReceiptDeclaration, ReceiptField, TxDeclaration,
        TxField,
    },
};

/// Indices from a logs bloom offset up to here address bloom chunks.
const LOGS_BLOOM_IDX_END: u32 = 100;

/// Runs the rules in order and reports the first one broken. Structural rules
/// come first so a malformed request never reaches the chain.
pub async fn validate(
    request: &QueryRequest,
    chain: &impl ChainReader,
) -> Result<(), ValidationError> {
    check_structure(request)?;
    check_onchain(request, chain).await
}

pub fn check_structure(request: &QueryRequest) -> Result<(), ValidationError> {
    let declarations = request.declarations();
    if declarations.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    if declarations.len() > MAX_SUBQUERIES {
        return Err(ValidationError::TooManySubqueries(declarations.len()));
    }

    for (position, declaration) in declarations.iter().enumerate() {
        match declaration {
            Declaration::Receipt(decl) => check_receipt(position, decl)?,
            Declaration::Transaction(decl) => check_tx(position, decl)?,
            Declaration::Header(decl) => check_header_field(position, decl.field_idx)?,
            Declaration::Account(_) => {}
        }
    }

    if request.callback().target == Address::ZERO {
        return Err(ValidationError::ZeroCallbackTarget);
    }

    Ok(())
}

fn check_receipt(position: usize, decl: &ReceiptDeclaration) -> Result<(), ValidationError> {
    if decl.log_idx().is_none() {
        if decl.selector.is_some() {
            return Err(ValidationError::SelectorWithoutLog { position });
        }
        if !decl.event_schema.is_zero() {
            return Err(ValidationError::EventSchemaWithoutLog { position });
        }
        return match decl.field_or_log_idx {
            index if index <= ReceiptField::Logs as u32 => Ok(()),
            TX_TYPE_FIELD_IDX..=TX_INDEX_FIELD_IDX => Ok(()),
            index => check_logs_bloom(position, index, RECEIPT_LOGS_BLOOM_IDX_OFFSET),
        };
    }

    match decl.selector {
        Some(LogSelector::Topic(index)) if index >= RECEIPT_MAX_TOPICS => {
            Err(ValidationError::InvalidTopicIndex { position, index })
        }
        Some(LogSelector::Data(index)) if decl.topic_or_data_or_address_idx().is_none() => {
            Err(ValidationError::InvalidFieldIndex { position, index })
        }
        Some(_) => Ok(()),
        None => Err(ValidationError::LogWithoutSelector { position }),
    }
}

fn check_tx(position: usize, decl: &TxDeclaration) -> Result<(), ValidationError> {
    match decl.field_or_calldata_idx {
        index if index <= TxField::S as u32 => Ok(()),
        TX_TYPE_FIELD_IDX..=TX_DATA_LENGTH_FIELD_IDX => Ok(()),
        index if index >= TX_CALLDATA_IDX_OFFSET => Ok(()),
        index => Err(ValidationError::InvalidFieldIndex { position, index }),
    }
}

fn check_header_field(position: usize, field_idx: u32) -> Result<(), ValidationError> {
    match field_idx {
        index if index <= HeaderField::WithdrawalsRoot as u32 => Ok(()),
        HEADER_HASH_FIELD_IDX..=HEADER_EXTRA_DATA_LEN_FIELD_IDX => Ok(()),
        index => check_logs_bloom(position, index, HEADER_LOGS_BLOOM_FIELD_IDX_OFFSET),
    }
}

/// Accepts `index` only as a logs bloom chunk past `offset`.
fn check_logs_bloom(position: usize, index: u32, offset: u32) -> Result<(), ValidationError> {
    match index.checked_sub(offset) {
        Some(chunk) if chunk < LOGS_BLOOM_CHUNKS => Ok(()),
        Some(chunk) if index < LOGS_BLOOM_IDX_END => {
            Err(ValidationError::InvalidLogsBloomIndex { position, index: chunk })
        }
        _ => Err(ValidationError::InvalidFieldIndex { position, index }),
    }
}

async fn check_onchain(
    request: &QueryRequest,
    chain: &impl ChainReader,
) -> Result<(), ValidationError> {
    let expected = request.options().source_chain_id;
    let actual = chain.chain_id().await.map_err(ValidationError::Chain)?;
    if expected != actual {
        return Err(ValidationError::ChainMismatch { expected, actual });
    }

    let target = request.callback().target;
    let code = chain.code_at(target).await.map_err(ValidationError::Chain)?;
    if code.is_empty() {
        return Err(ValidationError::CallbackNotContract(target));
    }

    let latest = chain.latest_block_number().await.map_err(ValidationError::Chain)?;
    let mut located: HashMap<TxHash, Option<TxLocation>> = HashMap::new();

    for (position, declaration) in request.declarations().iter().enumerate() {
        match declaration {
            Declaration::Receipt(decl) => {
                let location = lookup(chain, &mut located, position, decl.tx_hash).await?;
                if let Some(log_idx) = decl.log_idx() {
                    if log_idx as usize >= location.log_count {
                        return Err(ValidationError::LogOutOfRange {
                            position,
                            log_idx,
                            log_count: location.log_count,
                        });
                    }
                }
            }
            Declaration::Transaction(decl) => {
                let location = lookup(chain, &mut located, position, decl.tx_hash).await?;
                if let Some(expected) = decl.expected_type {
                    let expected = expected as u8;
                    if expected != location.tx_type {
                        return Err(ValidationError::TxTypeMismatch {
                            position,
                            expected,
                            actual: location.tx_type,
                        });
                    }
                }
            }
            Declaration::Header(decl) => check_block(position, decl.block_number, latest)?,
            Declaration::Account(decl) => check_block(position, decl.block_number, latest)?,
        }
    }

    Ok(())
}

async fn lookup(
    chain: &impl ChainReader,
    located: &mut HashMap<TxHash, Option<TxLocation>>,
    position: usize,
    tx_hash: TxHash,
) -> Result<TxLocation, ValidationError> {
    let location = match located.get(&tx_hash) {
        Some(location) => *location,
        None => {
            let location =
                chain.locate_transaction(tx_hash).await.map_err(ValidationError::Chain)?;
            located.insert(tx_hash, location);
            location
        }
    };
    location.ok_or(ValidationError::UnknownTransaction { position, tx_hash })
}

fn check_block(position: usize, block_number: u64, latest: u64) -> Result<(), ValidationError> {
    if block_number > latest {
        return Err(ValidationError::BlockInFuture { position, block_number, latest });
    }
    Ok(())
}
