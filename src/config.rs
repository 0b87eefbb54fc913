use std::{path::Path, str::FromStr, time::Duration};

use alloy::{
    primitives::{Address, U256},
    signers::local::PrivateKeySigner,
};
use reqwest::Url;
use serde::Deserialize;

use crate::{
    constants::{
        CHAIN_ID_VAR, DEFAULT_CALLBACK_GAS_LIMIT, DEFAULT_CONFIRMATION_TIMEOUT_SECS,
        DEFAULT_INDEXER_URL, DEFAULT_LOOKBACK_BLOCKS, DEFAULT_MAX_FEE_PER_GAS,
        DEFAULT_PROOF_VERIFICATION_GAS, DEFAULT_QUERY_FEE, DEFAULT_STEP_TIMEOUT_SECS,
        INDEXER_API_KEY_VAR, PRIVATE_KEY_VAR, PROVIDER_URI_VAR,
    },
    query::{FeeSchedule, ProtocolVersion},
};

/// Secrets and endpoints taken from the process environment (or `.env`).
pub struct Environment {
    pub signer: PrivateKeySigner,
    pub provider_uri: Url,
    pub chain_id: u64,
    pub indexer_api_key: Option<String>,
}

impl Environment {
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| eyre::eyre!("`{name}` must be set"))
        };

        let signer = PrivateKeySigner::from_str(required(PRIVATE_KEY_VAR)?.trim())
            .map_err(|e| eyre::eyre!("`{PRIVATE_KEY_VAR}` is not a valid private key: {e}"))?;
        let provider_uri = required(PROVIDER_URI_VAR)?
            .trim()
            .parse::<Url>()
            .map_err(|e| eyre::eyre!("`{PROVIDER_URI_VAR}` is not a valid URL: {e}"))?;
        let chain_id = required(CHAIN_ID_VAR)?
            .trim()
            .parse::<u64>()
            .map_err(|e| eyre::eyre!("`{CHAIN_ID_VAR}` is not a valid chain id: {e}"))?;

        Ok(Self { signer, provider_uri, chain_id, indexer_api_key: lookup(INDEXER_API_KEY_VAR) })
    }
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    #[default]
    Rpc,
    Indexer,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    pub airdrop_contract: Address,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub locator: LocatorKind,
    #[serde(default = "default_lookback_blocks")]
    pub lookback_blocks: u64,
    #[serde(default = "default_indexer_url")]
    pub indexer_url: String,
    #[serde(default)]
    pub indexer_chain_name: Option<String>,
    #[serde(default = "default_true")]
    pub inject_random_header: bool,
    #[serde(default)]
    pub strict_validation: bool,
    #[serde(default = "default_max_fee_per_gas")]
    pub max_fee_per_gas: u64,
    #[serde(default = "default_callback_gas_limit")]
    pub callback_gas_limit: u32,
    #[serde(default = "default_proof_verification_gas")]
    pub proof_verification_gas: u64,
    #[serde(default = "default_query_fee")]
    pub query_fee: U256,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
}

fn default_lookback_blocks() -> u64 {
    DEFAULT_LOOKBACK_BLOCKS
}

fn default_indexer_url() -> String {
    DEFAULT_INDEXER_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_fee_per_gas() -> u64 {
    DEFAULT_MAX_FEE_PER_GAS
}

fn default_callback_gas_limit() -> u32 {
    DEFAULT_CALLBACK_GAS_LIMIT
}

fn default_proof_verification_gas() -> u64 {
    DEFAULT_PROOF_VERIFICATION_GAS
}

fn default_query_fee() -> U256 {
    DEFAULT_QUERY_FEE
}

fn default_step_timeout_secs() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}

fn default_confirmation_timeout_secs() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_SECS
}

impl Config {
    pub async fn read_from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let cfg_str = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre::eyre!("Failed to read config {}: {e}", path.display()))?;
        Ok(toml::from_str(&cfg_str)?)
    }

    pub fn fees(&self) -> FeeSchedule {
        FeeSchedule {
            max_fee_per_gas: self.max_fee_per_gas,
            callback_gas_limit: self.callback_gas_limit,
            proof_verification_gas: self.proof_verification_gas,
            query_fee: self.query_fee,
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use alloy::primitives::address;

    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config =
            toml::from_str(r#"AIRDROP_CONTRACT = "0x00000000000000000000000000000000DeaDBeef""#)
                .unwrap();

        assert_eq!(config.airdrop_contract, address!("00000000000000000000000000000000DeaDBeef"));
        assert_eq!(config.protocol_version, ProtocolVersion::V2);
        assert_eq!(config.locator, LocatorKind::Rpc);
        assert!(config.inject_random_header);
        assert!(!config.strict_validation);
        assert_eq!(config.fees(), FeeSchedule::default());
        assert_eq!(config.step_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn full_config() {
        let config: Config = toml::from_str(
            r#"
            AIRDROP_CONTRACT = "0x00000000000000000000000000000000DeaDBeef"
            PROTOCOL_VERSION = "v2-beta"
            LOCATOR = "indexer"
            INDEXER_CHAIN_NAME = "eth-goerli"
            INJECT_RANDOM_HEADER = false
            STRICT_VALIDATION = true
            MAX_FEE_PER_GAS = 1000
            QUERY_FEE = "0x10"
            "#,
        )
        .unwrap();

        assert_eq!(config.protocol_version, ProtocolVersion::V2Beta);
        assert_eq!(config.locator, LocatorKind::Indexer);
        assert_eq!(config.indexer_chain_name.as_deref(), Some("eth-goerli"));
        assert!(!config.inject_random_header);
        assert!(config.strict_validation);
        assert_eq!(config.fees().max_fee_per_gas, 1000);
        assert_eq!(config.query_fee, U256::from(16));
    }

    #[test]
    fn missing_airdrop_contract_is_rejected() {
        assert!(toml::from_str::<Config>("LOOKBACK_BLOCKS = 5").is_err());
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn environment_requires_every_variable() {
        let vars = env(&[
            (PRIVATE_KEY_VAR, "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"),
            (PROVIDER_URI_VAR, "http://localhost:8545"),
            (CHAIN_ID_VAR, "5"),
        ]);
        let environment = Environment::from_lookup(|name| vars.get(name).cloned()).unwrap();
        assert_eq!(environment.chain_id, 5);
        assert_eq!(environment.indexer_api_key, None);

        let mut partial = vars.clone();
        partial.remove(CHAIN_ID_VAR);
        let err = Environment::from_lookup(|name| partial.get(name).cloned()).err().unwrap();
        assert!(err.to_string().contains(CHAIN_ID_VAR));

        let mut bad_key = vars;
        bad_key.insert(PRIVATE_KEY_VAR.to_string(), "not a key".to_string());
        assert!(Environment::from_lookup(|name| bad_key.get(name).cloned()).is_err());
    }
}
