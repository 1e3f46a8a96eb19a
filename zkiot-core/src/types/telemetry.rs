//! Telemetry and batch types

use crate::crypto::Digest32;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A telemetry submission waiting to be anchored
///
/// `batch_id` transitions exactly once from `None` to a batch; the record is
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDatum {
    pub datum_id: String,
    pub device_id: String,
    pub payload: serde_json::Value,
    /// Unix seconds
    pub submitted_at: u64,
    /// Write-time sequence breaking `submitted_at` ties
    pub insertion_seq: u64,
    /// `H("LEAF" ‖ canonical(payload))`, derived at submission
    pub leaf_hash: Digest32,
    pub batch_id: Option<u64>,
}

/// Per-chain anchor outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Anchor record for one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainAnchor {
    pub status: AnchorStatus,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub error: Option<String>,
}

impl ChainAnchor {
    pub fn pending(tx_hash: String) -> Self {
        Self {
            status: AnchorStatus::Pending,
            tx_hash: Some(tx_hash),
            block_number: None,
            gas_used: None,
            error: None,
        }
    }

    pub fn confirmed(tx_hash: String, block_number: u64, gas_used: u64) -> Self {
        Self {
            status: AnchorStatus::Confirmed,
            tx_hash: Some(tx_hash),
            block_number: Some(block_number),
            gas_used: Some(gas_used),
            error: None,
        }
    }

    pub fn failed(tx_hash: Option<String>, error: String) -> Self {
        Self {
            status: AnchorStatus::Failed,
            tx_hash,
            block_number: None,
            gas_used: None,
            error: Some(error),
        }
    }
}

/// An anchored batch of telemetry leaves
///
/// `batch_id` is dense and monotonic; `root`, `leaf_count` and the leaf set
/// are immutable once created. Only `anchors` accrues updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleBatch {
    pub batch_id: u64,
    pub leaf_count: u64,
    pub root: Digest32,
    /// Leaves in their recorded order, kept for the inclusion-proof service
    pub leaves: Vec<Digest32>,
    pub created_at: u64,
    pub metadata: String,
    /// chain name → anchor outcome
    pub anchors: HashMap<String, ChainAnchor>,
}

impl MerkleBatch {
    /// Chains where this batch's anchor is confirmed
    pub fn confirmed_chains(&self) -> Vec<String> {
        let mut chains: Vec<String> = self
            .anchors
            .iter()
            .filter(|(_, a)| a.status == AnchorStatus::Confirmed)
            .map(|(name, _)| name.clone())
            .collect();
        chains.sort();
        chains
    }

    /// A batch is available once at least one chain has confirmed it
    pub fn is_available(&self) -> bool {
        !self.confirmed_chains().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_with(anchors: HashMap<String, ChainAnchor>) -> MerkleBatch {
        MerkleBatch {
            batch_id: 1,
            leaf_count: 1,
            root: Digest32::zero(),
            leaves: vec![Digest32::zero()],
            created_at: 0,
            metadata: String::new(),
            anchors,
        }
    }

    #[test]
    fn test_availability_requires_one_confirmation() {
        let mut anchors = HashMap::new();
        anchors.insert(
            "sepolia".to_string(),
            ChainAnchor::failed(None, "boom".to_string()),
        );
        let batch = batch_with(anchors.clone());
        assert!(!batch.is_available());

        anchors.insert(
            "bscTestnet".to_string(),
            ChainAnchor::confirmed("0xabc".to_string(), 10, 21_000),
        );
        let batch = batch_with(anchors);
        assert!(batch.is_available());
        assert_eq!(batch.confirmed_chains(), vec!["bscTestnet".to_string()]);
    }

    #[test]
    fn test_anchor_status_wire_format() {
        let json = serde_json::to_string(&AnchorStatus::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
    }
}
