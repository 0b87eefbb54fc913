use std::{fmt, time::Duration};

use alloy::primitives::{Address, TxHash};
use thiserror::Error;

/// Problems with the coordinates handed to the flow. Nothing remote has been
/// contacted when one of these is returned.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("No matching swap event found for {0}")]
    NoMatchingEvent(Address),
    #[error("Swap event is missing `{0}`")]
    MissingEventField(&'static str),
    #[error("Query has no callback")]
    MissingCallback,
}

/// First rule a query request violates.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Query has no subqueries")]
    EmptyQuery,
    #[error("Query has {0} subqueries, the limit is {max}", max = crate::constants::MAX_SUBQUERIES)]
    TooManySubqueries(usize),
    #[error("Subquery {position}: topic index {index} is out of range")]
    InvalidTopicIndex { position: usize, index: u32 },
    #[error("Subquery {position}: topic, address and data selectors need a log index")]
    SelectorWithoutLog { position: usize },
    #[error("Subquery {position}: log declaration has no topic, address or data selector")]
    LogWithoutSelector { position: usize },
    #[error("Subquery {position}: event schema can only be checked against a log")]
    EventSchemaWithoutLog { position: usize },
    #[error("Subquery {position}: field index {index} is not valid for its kind")]
    InvalidFieldIndex { position: usize, index: u32 },
    #[error("Subquery {position}: logs bloom chunk {index} is out of range")]
    InvalidLogsBloomIndex { position: usize, index: u32 },
    #[error("Callback target is the zero address")]
    ZeroCallbackTarget,
    #[error("Query targets chain {expected} but the provider is on chain {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
    #[error("Callback target {0} is not a contract")]
    CallbackNotContract(Address),
    #[error("Subquery {position}: transaction {tx_hash} not found")]
    UnknownTransaction { position: usize, tx_hash: TxHash },
    #[error("Subquery {position}: expected transaction type {expected}, found {actual}")]
    TxTypeMismatch { position: usize, expected: u8, actual: u8 },
    #[error("Subquery {position}: log {log_idx} is out of range, receipt has {log_count} logs")]
    LogOutOfRange { position: usize, log_idx: u32, log_count: usize },
    #[error("Subquery {position}: block {block_number} is after the latest block {latest}")]
    BlockInFuture { position: usize, block_number: u64, latest: u64 },
    #[error("Chain request failed during validation: {0}")]
    Chain(eyre::Report),
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Transaction {0} not found")]
    UnknownTransaction(TxHash),
    #[error("Transaction {0} is still pending")]
    PendingTransaction(TxHash),
    #[error("`{field}` value {value} does not fit the wire format")]
    OutOfRange { field: &'static str, value: u64 },
    #[error("Log selector on transaction {0} is out of range")]
    InvalidLogSelector(TxHash),
    #[error("Query fee does not fit a uint256")]
    FeeOverflow,
    #[error("Failed to encode query: {0}")]
    Encoding(#[from] std::io::Error),
    #[error("Chain request failed during build: {0}")]
    Chain(eyre::Report),
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Protocol {version} requires `{field}`")]
    MissingField { version: crate::query::ProtocolVersion, field: &'static str },
    #[error("Protocol {version} cannot encode `{field}`")]
    Unencodable { version: crate::query::ProtocolVersion, field: &'static str },
    #[error("Claim transaction reverted: {url}")]
    Reverted { tx_hash: TxHash, url: String },
    #[error("Provider error: {0}")]
    Provider(eyre::Report),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Lookup,
    Validation,
    Build,
    Submission,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Lookup => "event lookup",
            Step::Validation => "validation",
            Step::Build => "build",
            Step::Submission => "submission",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),
    #[error("Event lookup failed: {0}")]
    Lookup(eyre::Report),
    #[error("Query validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Query build failed: {0}")]
    Build(#[from] BuildError),
    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),
    #[error("{step} timed out after {timeout:?}")]
    Timeout { step: Step, timeout: Duration },
    #[error("Cancelled")]
    Cancelled,
}
