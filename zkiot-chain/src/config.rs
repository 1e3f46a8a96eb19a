//! Chain configuration
//!
//! Named EVM networks with per-network RPC endpoints. RPC URLs and the
//! signing key come from the environment: `<NAME>_RPC_URL` (name uppercased),
//! `<NAME>_ANCHOR_CONTRACT`, `SIGNING_KEY`, plus the shared `RPC_TIMEOUT`
//! and `CONFIRM_TIMEOUT` deadlines in seconds.

use serde::{Deserialize, Serialize};
use std::env;
use zkiot_core::constants::{
    CONFIRM_TIMEOUT_SECS, MAX_RPC_ATTEMPTS, MAX_RPC_BACKOFF_SECS, RPC_TIMEOUT_SECS,
};

/// Well-known Hardhat account #0 key, for local development only
const DEV_SIGNING_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// One configured network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Registry name, e.g. `sepolia`
    pub name: String,
    pub display_name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub native_symbol: String,
    pub native_decimals: u8,
    pub explorer_base: String,
    /// Address of the deployed anchor contract, if any
    pub anchor_contract: Option<String>,
    pub testnet: bool,
}

impl NetworkConfig {
    /// Explorer link for a transaction hash
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_base, tx_hash)
    }
}

/// The full chain-side configuration
#[derive(Debug, Clone)]
pub struct ChainSetConfig {
    pub networks: Vec<NetworkConfig>,
    /// Default network for single-chain anchoring
    pub active: String,
    /// Hex-encoded secp256k1 signing key; process-scoped, never logged
    pub signing_key: String,
    pub rpc_timeout_secs: u64,
    pub confirm_timeout_secs: u64,
    pub max_rpc_attempts: u32,
    pub max_rpc_backoff_secs: u64,
}

fn default_networks() -> Vec<NetworkConfig> {
    vec![
        NetworkConfig {
            name: "sepolia".to_string(),
            display_name: "Ethereum Sepolia".to_string(),
            chain_id: 11_155_111,
            rpc_url: "https://rpc.sepolia.org".to_string(),
            native_symbol: "ETH".to_string(),
            native_decimals: 18,
            explorer_base: "https://sepolia.etherscan.io".to_string(),
            anchor_contract: None,
            testnet: true,
        },
        NetworkConfig {
            name: "polygonMumbai".to_string(),
            display_name: "Polygon Mumbai".to_string(),
            chain_id: 80_001,
            rpc_url: "https://rpc-mumbai.maticvigil.com".to_string(),
            native_symbol: "MATIC".to_string(),
            native_decimals: 18,
            explorer_base: "https://mumbai.polygonscan.com".to_string(),
            anchor_contract: None,
            testnet: true,
        },
        NetworkConfig {
            name: "bscTestnet".to_string(),
            display_name: "BNB Smart Chain Testnet".to_string(),
            chain_id: 97,
            rpc_url: "https://data-seed-prebsc-1-s1.binance.org:8545".to_string(),
            native_symbol: "tBNB".to_string(),
            native_decimals: 18,
            explorer_base: "https://testnet.bscscan.com".to_string(),
            anchor_contract: None,
            testnet: true,
        },
    ]
}

impl Default for ChainSetConfig {
    fn default() -> Self {
        Self {
            networks: default_networks(),
            active: "sepolia".to_string(),
            signing_key: DEV_SIGNING_KEY.to_string(),
            rpc_timeout_secs: RPC_TIMEOUT_SECS,
            confirm_timeout_secs: CONFIRM_TIMEOUT_SECS,
            max_rpc_attempts: MAX_RPC_ATTEMPTS,
            max_rpc_backoff_secs: MAX_RPC_BACKOFF_SECS,
        }
    }
}

impl ChainSetConfig {
    /// Load configuration from environment variables
    ///
    /// - `SIGNING_KEY`: hex secp256k1 key
    /// - `ZKIOT_ACTIVE_NETWORK`: default network name
    /// - `<NAME>_RPC_URL` / `<NAME>_ANCHOR_CONTRACT` per network
    /// - `RPC_TIMEOUT`, `CONFIRM_TIMEOUT` in seconds
    pub fn from_env() -> Self {
        let mut config = Self::default();

        for network in &mut config.networks {
            let prefix = network.name.to_uppercase();
            if let Ok(url) = env::var(format!("{}_RPC_URL", prefix)) {
                network.rpc_url = url;
            }
            if let Ok(addr) = env::var(format!("{}_ANCHOR_CONTRACT", prefix)) {
                network.anchor_contract = Some(addr);
            }
        }

        if let Ok(active) = env::var("ZKIOT_ACTIVE_NETWORK") {
            config.active = active;
        }
        if let Ok(key) = env::var("SIGNING_KEY") {
            config.signing_key = key;
        }
        if let Some(secs) = read_secs("RPC_TIMEOUT") {
            config.rpc_timeout_secs = secs;
        }
        if let Some(secs) = read_secs("CONFIRM_TIMEOUT") {
            config.confirm_timeout_secs = secs;
        }

        config
    }

    /// Single local dev-node network (anvil/hardhat on 127.0.0.1)
    pub fn development() -> Self {
        Self {
            networks: vec![NetworkConfig {
                name: "localhost".to_string(),
                display_name: "Local Devnet".to_string(),
                chain_id: 31_337,
                rpc_url: "http://127.0.0.1:8545".to_string(),
                native_symbol: "ETH".to_string(),
                native_decimals: 18,
                explorer_base: String::new(),
                anchor_contract: None,
                testnet: true,
            }],
            active: "localhost".to_string(),
            signing_key: DEV_SIGNING_KEY.to_string(),
            rpc_timeout_secs: 5,
            confirm_timeout_secs: 30,
            max_rpc_attempts: 1,
            max_rpc_backoff_secs: 1,
        }
    }

    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.name == name)
    }
}

fn read_secs(var: &str) -> Option<u64> {
    env::var(var).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_networks_present() {
        let config = ChainSetConfig::default();
        assert_eq!(config.active, "sepolia");
        assert!(config.network("sepolia").is_some());
        assert!(config.network("polygonMumbai").is_some());
        assert!(config.network("bscTestnet").is_some());
        assert!(config.network("mainnet").is_none());
        assert_eq!(config.network("bscTestnet").unwrap().chain_id, 97);
    }

    #[test]
    fn test_development_preset() {
        let config = ChainSetConfig::development();
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.network("localhost").unwrap().chain_id, 31_337);
        assert_eq!(config.max_rpc_attempts, 1);
    }

    #[test]
    fn test_explorer_url() {
        let config = ChainSetConfig::default();
        let url = config.network("sepolia").unwrap().explorer_tx_url("0xabc");
        assert_eq!(url, "https://sepolia.etherscan.io/tx/0xabc");
    }
}
