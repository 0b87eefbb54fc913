use alloy::primitives::U256;

// FILES
pub const CONFIG_FILE_PATH: &str = "data/config.toml";
pub const LOG_DIR: &str = "logs";
pub const LOG_FILE_NAME: &str = "airdrop.log";

// ENV
pub const PRIVATE_KEY_VAR: &str = "PRIVATE_KEY";
pub const PROVIDER_URI_VAR: &str = "PROVIDER_URI";
pub const CHAIN_ID_VAR: &str = "CHAIN_ID";
pub const INDEXER_API_KEY_VAR: &str = "INDEXER_API_KEY";

/// Version byte prefixed to every query hash preimage.
pub const QUERY_VERSION: u8 = 0x02;
pub const MAX_SUBQUERIES: usize = 128;

// Special field indices shared by receipt and transaction subqueries
pub const TX_TYPE_FIELD_IDX: u32 = 51;
pub const BLOCK_NUMBER_FIELD_IDX: u32 = 52;
pub const TX_INDEX_FIELD_IDX: u32 = 53;

pub const TX_FUNCTION_SELECTOR_FIELD_IDX: u32 = 54;
pub const TX_CALLDATA_HASH_FIELD_IDX: u32 = 55;
pub const TX_DATA_LENGTH_FIELD_IDX: u32 = 56;
pub const TX_CALLDATA_IDX_OFFSET: u32 = 100;
pub const TX_CONTRACT_DATA_IDX_OFFSET: u32 = 100_000;

pub const RECEIPT_ADDRESS_IDX: u32 = 50;
pub const RECEIPT_LOGS_BLOOM_IDX_OFFSET: u32 = 70;
pub const RECEIPT_LOG_IDX_OFFSET: u32 = 100;
pub const RECEIPT_DATA_IDX_OFFSET: u32 = 100;
pub const RECEIPT_MAX_TOPICS: u32 = 4;

pub const HEADER_HASH_FIELD_IDX: u32 = 50;
pub const HEADER_HEADER_SIZE_FIELD_IDX: u32 = 51;
pub const HEADER_EXTRA_DATA_LEN_FIELD_IDX: u32 = 52;
pub const HEADER_LOGS_BLOOM_FIELD_IDX_OFFSET: u32 = 70;
/// The 256 byte logs bloom is served in 32 byte chunks.
pub const LOGS_BLOOM_CHUNKS: u32 = 8;

// FEES
pub const DEFAULT_MAX_FEE_PER_GAS: u64 = 25_000_000_000;
pub const DEFAULT_CALLBACK_GAS_LIMIT: u32 = 100_000;
pub const DEFAULT_PROOF_VERIFICATION_GAS: u64 = 420_000;
pub const DEFAULT_QUERY_FEE: U256 = U256::from_limbs([3_000_000_000_000_000, 0, 0, 0]);

// FLOW
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 10_000;
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_INDEXER_URL: &str = "https://api.covalenthq.com/v1";
