//! Declarations of the on-chain facts a query asks to have proven.
//!
//! Each declaration names its target the way a caller knows it (a transaction
//! hash, a block number, an address). Hashes are resolved to block positions
//! only when the query is built.

use alloy::primitives::{Address, TxHash, B256};
use serde::Serialize;

use crate::constants::{
    BLOCK_NUMBER_FIELD_IDX, HEADER_EXTRA_DATA_LEN_FIELD_IDX, HEADER_HASH_FIELD_IDX,
    HEADER_HEADER_SIZE_FIELD_IDX, HEADER_LOGS_BLOOM_FIELD_IDX_OFFSET, RECEIPT_ADDRESS_IDX,
    RECEIPT_DATA_IDX_OFFSET, RECEIPT_LOGS_BLOOM_IDX_OFFSET, RECEIPT_LOG_IDX_OFFSET,
    TX_CALLDATA_HASH_FIELD_IDX, TX_CALLDATA_IDX_OFFSET, TX_CONTRACT_DATA_IDX_OFFSET,
    TX_DATA_LENGTH_FIELD_IDX, TX_FUNCTION_SELECTOR_FIELD_IDX, TX_INDEX_FIELD_IDX,
    TX_TYPE_FIELD_IDX,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum HeaderField {
    ParentHash = 0,
    Sha3Uncles = 1,
    Miner = 2,
    StateRoot = 3,
    TransactionsRoot = 4,
    ReceiptsRoot = 5,
    LogsBloom = 6,
    Difficulty = 7,
    Number = 8,
    GasLimit = 9,
    GasUsed = 10,
    Timestamp = 11,
    ExtraData = 12,
    MixHash = 13,
    Nonce = 14,
    BaseFeePerGas = 15,
    WithdrawalsRoot = 16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum AccountField {
    Nonce = 0,
    Balance = 1,
    StorageRoot = 2,
    CodeHash = 3,
}

/// Transaction fields, numbered the same for every transaction type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum TxField {
    ChainId = 0,
    Nonce = 1,
    MaxPriorityFeePerGas = 2,
    MaxFeePerGas = 3,
    GasLimit = 4,
    To = 5,
    Value = 6,
    Data = 7,
    GasPrice = 8,
    V = 9,
    R = 10,
    S = 11,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum ReceiptField {
    Status = 0,
    PostState = 1,
    CumulativeGas = 2,
    LogsBloom = 3,
    Logs = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum TxType {
    Legacy = 0,
    Eip2930 = 1,
    Eip1559 = 2,
}

/// What a receipt declaration reads from its log, if it reads a log at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LogSelector {
    Topic(u32),
    Address,
    Data(u32),
}

impl LogSelector {
    /// `None` when a data word index is past the end of the index space.
    pub fn index(&self) -> Option<u32> {
        match self {
            LogSelector::Topic(idx) => Some(*idx),
            LogSelector::Address => Some(RECEIPT_ADDRESS_IDX),
            LogSelector::Data(idx) => RECEIPT_DATA_IDX_OFFSET.checked_add(*idx),
        }
    }
}

/// `offset + idx` for builder arguments. Overflow is a caller bug.
fn offset_idx(offset: u32, idx: u32, what: &str) -> u32 {
    offset.checked_add(idx).unwrap_or_else(|| panic!("{what} index {idx} is out of range"))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptDeclaration {
    pub tx_hash: TxHash,
    pub field_or_log_idx: u32,
    pub selector: Option<LogSelector>,
    pub event_schema: B256,
}

impl ReceiptDeclaration {
    /// Constrain topic 0 of the selected log to `schema`.
    pub fn event_schema(mut self, schema: B256) -> Self {
        self.event_schema = schema;
        self
    }

    /// Receipt-relative log index, when the declaration reads a log.
    pub fn log_idx(&self) -> Option<u32> {
        self.field_or_log_idx.checked_sub(RECEIPT_LOG_IDX_OFFSET)
    }

    pub fn topic_or_data_or_address_idx(&self) -> Option<u32> {
        match self.selector {
            Some(selector) => selector.index(),
            None => Some(0),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxDeclaration {
    pub tx_hash: TxHash,
    pub field_or_calldata_idx: u32,
    /// Expected transaction type, checked during validation only.
    pub expected_type: Option<TxType>,
}

impl TxDeclaration {
    pub fn tx_type(mut self, tx_type: TxType) -> Self {
        self.expected_type = Some(tx_type);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderDeclaration {
    pub block_number: u64,
    pub field_idx: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDeclaration {
    pub block_number: u64,
    pub address: Address,
    pub field: AccountField,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Declaration {
    Receipt(ReceiptDeclaration),
    Transaction(TxDeclaration),
    Header(HeaderDeclaration),
    Account(AccountDeclaration),
}

impl From<ReceiptDeclaration> for Declaration {
    fn from(value: ReceiptDeclaration) -> Self {
        Declaration::Receipt(value)
    }
}

impl From<TxDeclaration> for Declaration {
    fn from(value: TxDeclaration) -> Self {
        Declaration::Transaction(value)
    }
}

impl From<HeaderDeclaration> for Declaration {
    fn from(value: HeaderDeclaration) -> Self {
        Declaration::Header(value)
    }
}

impl From<AccountDeclaration> for Declaration {
    fn from(value: AccountDeclaration) -> Self {
        Declaration::Account(value)
    }
}

pub fn receipt(tx_hash: TxHash) -> ReceiptBuilder {
    ReceiptBuilder { tx_hash }
}

pub fn tx(tx_hash: TxHash) -> TxBuilder {
    TxBuilder { tx_hash }
}

pub fn header(block_number: u64) -> HeaderBuilder {
    HeaderBuilder { block_number }
}

pub fn account(block_number: u64, address: Address) -> AccountBuilder {
    AccountBuilder { block_number, address }
}

pub struct ReceiptBuilder {
    tx_hash: TxHash,
}

impl ReceiptBuilder {
    fn with_field_idx(self, field_or_log_idx: u32) -> ReceiptDeclaration {
        ReceiptDeclaration {
            tx_hash: self.tx_hash,
            field_or_log_idx,
            selector: None,
            event_schema: B256::ZERO,
        }
    }

    pub fn field(self, field: ReceiptField) -> ReceiptDeclaration {
        self.with_field_idx(field as u32)
    }

    pub fn tx_type(self) -> ReceiptDeclaration {
        self.with_field_idx(TX_TYPE_FIELD_IDX)
    }

    pub fn block_number(self) -> ReceiptDeclaration {
        self.with_field_idx(BLOCK_NUMBER_FIELD_IDX)
    }

    pub fn tx_index(self) -> ReceiptDeclaration {
        self.with_field_idx(TX_INDEX_FIELD_IDX)
    }

    pub fn logs_bloom(self, chunk: u32) -> ReceiptDeclaration {
        self.with_field_idx(offset_idx(RECEIPT_LOGS_BLOOM_IDX_OFFSET, chunk, "logs bloom"))
    }

    pub fn log(self, log_idx: u32) -> LogBuilder {
        let field_or_log_idx = offset_idx(RECEIPT_LOG_IDX_OFFSET, log_idx, "log");
        LogBuilder { tx_hash: self.tx_hash, field_or_log_idx }
    }
}

pub struct LogBuilder {
    tx_hash: TxHash,
    field_or_log_idx: u32,
}

impl LogBuilder {
    fn select(self, selector: LogSelector) -> ReceiptDeclaration {
        ReceiptDeclaration {
            tx_hash: self.tx_hash,
            field_or_log_idx: self.field_or_log_idx,
            selector: Some(selector),
            event_schema: B256::ZERO,
        }
    }

    pub fn topic(self, topic_idx: u32) -> ReceiptDeclaration {
        self.select(LogSelector::Topic(topic_idx))
    }

    pub fn address(self) -> ReceiptDeclaration {
        self.select(LogSelector::Address)
    }

    pub fn data(self, data_idx: u32) -> ReceiptDeclaration {
        offset_idx(RECEIPT_DATA_IDX_OFFSET, data_idx, "log data");
        self.select(LogSelector::Data(data_idx))
    }
}

pub struct TxBuilder {
    tx_hash: TxHash,
}

impl TxBuilder {
    fn with_field_idx(self, field_or_calldata_idx: u32) -> TxDeclaration {
        TxDeclaration { tx_hash: self.tx_hash, field_or_calldata_idx, expected_type: None }
    }

    pub fn field(self, field: TxField) -> TxDeclaration {
        self.with_field_idx(field as u32)
    }

    pub fn tx_type_field(self) -> TxDeclaration {
        self.with_field_idx(TX_TYPE_FIELD_IDX)
    }

    pub fn block_number(self) -> TxDeclaration {
        self.with_field_idx(BLOCK_NUMBER_FIELD_IDX)
    }

    pub fn tx_index(self) -> TxDeclaration {
        self.with_field_idx(TX_INDEX_FIELD_IDX)
    }

    pub fn function_selector(self) -> TxDeclaration {
        self.with_field_idx(TX_FUNCTION_SELECTOR_FIELD_IDX)
    }

    pub fn calldata_hash(self) -> TxDeclaration {
        self.with_field_idx(TX_CALLDATA_HASH_FIELD_IDX)
    }

    pub fn data_length(self) -> TxDeclaration {
        self.with_field_idx(TX_DATA_LENGTH_FIELD_IDX)
    }

    /// 32 byte ABI word `idx` of the calldata, after the selector.
    pub fn calldata(self, idx: u32) -> TxDeclaration {
        let field_or_calldata_idx = offset_idx(TX_CALLDATA_IDX_OFFSET, idx, "calldata");
        assert!(
            field_or_calldata_idx < TX_CONTRACT_DATA_IDX_OFFSET,
            "calldata index {idx} overlaps contract data"
        );
        self.with_field_idx(field_or_calldata_idx)
    }

    /// 32 byte word `idx` of contract creation data.
    pub fn contract_data(self, idx: u32) -> TxDeclaration {
        self.with_field_idx(offset_idx(TX_CONTRACT_DATA_IDX_OFFSET, idx, "contract data"))
    }
}

pub struct HeaderBuilder {
    block_number: u64,
}

impl HeaderBuilder {
    fn with_field_idx(self, field_idx: u32) -> HeaderDeclaration {
        HeaderDeclaration { block_number: self.block_number, field_idx }
    }

    pub fn field(self, field: HeaderField) -> HeaderDeclaration {
        self.with_field_idx(field as u32)
    }

    pub fn hash(self) -> HeaderDeclaration {
        self.with_field_idx(HEADER_HASH_FIELD_IDX)
    }

    pub fn header_size(self) -> HeaderDeclaration {
        self.with_field_idx(HEADER_HEADER_SIZE_FIELD_IDX)
    }

    pub fn extra_data_len(self) -> HeaderDeclaration {
        self.with_field_idx(HEADER_EXTRA_DATA_LEN_FIELD_IDX)
    }

    pub fn logs_bloom(self, chunk: u32) -> HeaderDeclaration {
        self.with_field_idx(offset_idx(HEADER_LOGS_BLOOM_FIELD_IDX_OFFSET, chunk, "logs bloom"))
    }
}

pub struct AccountBuilder {
    block_number: u64,
    address: Address,
}

impl AccountBuilder {
    pub fn field(self, field: AccountField) -> AccountDeclaration {
        AccountDeclaration { block_number: self.block_number, address: self.address, field }
    }
}
