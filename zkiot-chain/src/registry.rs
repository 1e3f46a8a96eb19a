//! Chain registry
//!
//! Named networks, the active selection and per-network deployment records.
//! Config updates are single-writer; readers take a consistent snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::{ChainSetConfig, NetworkConfig};
use crate::error::{ChainError, ChainResult};

/// Record of an anchor-contract deployment on one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub contract_address: String,
    pub deployer: String,
    pub deployed_at: u64,
    pub tx_hash: Option<String>,
}

#[derive(Debug)]
struct RegistryInner {
    networks: HashMap<String, NetworkConfig>,
    active: String,
    deployments: HashMap<String, DeploymentRecord>,
}

/// Registry of configured networks
#[derive(Debug)]
pub struct ChainRegistry {
    inner: RwLock<RegistryInner>,
}

impl ChainRegistry {
    pub fn new(config: &ChainSetConfig) -> Self {
        let networks = config
            .networks
            .iter()
            .map(|n| (n.name.clone(), n.clone()))
            .collect();
        Self {
            inner: RwLock::new(RegistryInner {
                networks,
                active: config.active.clone(),
                deployments: HashMap::new(),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<NetworkConfig> {
        self.inner.read().expect("registry poisoned").networks.get(name).cloned()
    }

    pub fn list(&self) -> Vec<NetworkConfig> {
        let inner = self.inner.read().expect("registry poisoned");
        let mut networks: Vec<NetworkConfig> = inner.networks.values().cloned().collect();
        networks.sort_by(|a, b| a.name.cmp(&b.name));
        networks
    }

    pub fn active(&self) -> String {
        self.inner.read().expect("registry poisoned").active.clone()
    }

    /// Switch the active network in one atomic write
    pub fn set_active(&self, name: &str) -> ChainResult<NetworkConfig> {
        let mut inner = self.inner.write().expect("registry poisoned");
        let network = inner
            .networks
            .get(name)
            .cloned()
            .ok_or_else(|| ChainError::UnknownNetwork(name.to_string()))?;
        inner.active = name.to_string();
        Ok(network)
    }

    /// Contract address to anchor against on a network: the deployment
    /// record wins over the static configuration
    pub fn anchor_contract(&self, name: &str) -> Option<String> {
        let inner = self.inner.read().expect("registry poisoned");
        inner
            .deployments
            .get(name)
            .map(|d| d.contract_address.clone())
            .or_else(|| inner.networks.get(name).and_then(|n| n.anchor_contract.clone()))
    }

    pub fn record_deployment(&self, name: &str, record: DeploymentRecord) -> ChainResult<()> {
        let mut inner = self.inner.write().expect("registry poisoned");
        if !inner.networks.contains_key(name) {
            return Err(ChainError::UnknownNetwork(name.to_string()));
        }
        inner.deployments.insert(name.to_string(), record);
        Ok(())
    }

    pub fn deployment(&self, name: &str) -> Option<DeploymentRecord> {
        self.inner
            .read()
            .expect("registry poisoned")
            .deployments
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ChainRegistry {
        ChainRegistry::new(&ChainSetConfig::default())
    }

    #[test]
    fn test_active_switch() {
        let registry = registry();
        assert_eq!(registry.active(), "sepolia");
        registry.set_active("bscTestnet").unwrap();
        assert_eq!(registry.active(), "bscTestnet");
        assert!(matches!(
            registry.set_active("nope"),
            Err(ChainError::UnknownNetwork(_))
        ));
        // A failed switch leaves the selection untouched.
        assert_eq!(registry.active(), "bscTestnet");
    }

    #[test]
    fn test_deployment_record_overrides_config() {
        let registry = registry();
        assert_eq!(registry.anchor_contract("sepolia"), None);

        registry
            .record_deployment(
                "sepolia",
                DeploymentRecord {
                    contract_address: "0x00000000000000000000000000000000000000aa".to_string(),
                    deployer: "0xf39f".to_string(),
                    deployed_at: 1_700_000_000,
                    tx_hash: None,
                },
            )
            .unwrap();

        assert_eq!(
            registry.anchor_contract("sepolia").as_deref(),
            Some("0x00000000000000000000000000000000000000aa")
        );
        assert!(registry.deployment("bscTestnet").is_none());
    }

    #[test]
    fn test_list_is_sorted() {
        let names: Vec<String> = registry().list().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["bscTestnet", "polygonMumbai", "sepolia"]);
    }
}
