//! Wire DTOs
//!
//! Request and response shapes for the HTTP surface. Hashes and addresses
//! are lowercase `0x` hex throughout; timestamps are unix seconds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use zkiot_core::crypto::{Digest32, ProofStep};
use zkiot_core::types::telemetry::ChainAnchor;
use zkiot_core::types::{Device, MerkleBatch, ProposalKind, ProposalState};
use zkiot_service::DispatchEntry;

// ============ Devices ============

#[derive(Debug, Serialize)]
pub struct RegisterDeviceResponse {
    pub device_id: String,
    pub public_commitment: Digest32,
}

#[derive(Debug, Serialize)]
pub struct AuthenticateResponse {
    pub ok: bool,
    pub at: u64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitDataRequest {
    pub device_id: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SubmitDataResponse {
    pub accepted: bool,
    pub datum_id: String,
    pub leaf_hash: Digest32,
    pub pending_count: u64,
}

#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    pub public_commitment: Digest32,
    pub registered_at: u64,
    pub last_authenticated_at: Option<u64>,
    pub is_active: bool,
    pub total_data_submitted: u64,
}

impl From<Device> for DeviceResponse {
    fn from(device: Device) -> Self {
        Self {
            device_id: device.device_id,
            device_name: device.device_name,
            device_type: device.device_type,
            public_commitment: device.public_commitment,
            registered_at: device.registered_at,
            last_authenticated_at: device.last_authenticated_at,
            is_active: device.is_active,
            total_data_submitted: device.total_data_submitted,
        }
    }
}

// ============ Anchoring ============

#[derive(Debug, Default, Deserialize)]
pub struct AnchorRequest {
    #[serde(default)]
    pub metadata: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CrossChainAnchorRequest {
    #[serde(default)]
    pub metadata: Option<String>,
    /// Explicit target set; must not be empty
    pub targets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DispatchedTx {
    pub chain: String,
    pub tx_hash: String,
}

#[derive(Debug, Serialize)]
pub struct FailedDispatch {
    pub chain: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct AnchorResponse {
    pub batch_id: u64,
    pub leaf_count: u64,
    pub root: Digest32,
    pub dispatched: Vec<DispatchedTx>,
    pub failed: Vec<FailedDispatch>,
}

impl AnchorResponse {
    pub fn new(batch: &MerkleBatch, entries: Vec<DispatchEntry>) -> Self {
        let mut dispatched = Vec::new();
        let mut failed = Vec::new();
        for entry in entries {
            match entry.tx_hash {
                Some(tx_hash) => dispatched.push(DispatchedTx {
                    chain: entry.chain,
                    tx_hash,
                }),
                None => failed.push(FailedDispatch {
                    chain: entry.chain,
                    error: entry.error.unwrap_or_default(),
                }),
            }
        }
        Self {
            batch_id: batch.batch_id,
            leaf_count: batch.leaf_count,
            root: batch.root,
            dispatched,
            failed,
        }
    }
}

/// Batch view without the raw leaf list
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub batch_id: u64,
    pub leaf_count: u64,
    pub root: Digest32,
    pub created_at: u64,
    pub metadata: String,
    pub anchors: HashMap<String, ChainAnchor>,
    pub available: bool,
}

impl From<MerkleBatch> for BatchResponse {
    fn from(batch: MerkleBatch) -> Self {
        let available = batch.is_available();
        Self {
            batch_id: batch.batch_id,
            leaf_count: batch.leaf_count,
            root: batch.root,
            created_at: batch.created_at,
            metadata: batch.metadata,
            anchors: batch.anchors,
            available,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub batch_id: u64,
    pub leaf_hash: Digest32,
    pub proof: Vec<ProofStep>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub confirmed_chains: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProofResponse {
    pub batch_id: u64,
    pub leaf_hash: Digest32,
    pub root: Digest32,
    pub proof: Vec<ProofStep>,
}

// ============ Chains ============

#[derive(Debug, Serialize)]
pub struct NetworkResponse {
    pub name: String,
    pub display_name: String,
    pub chain_id: u64,
    pub native_symbol: String,
    pub explorer_base: String,
    pub is_testnet: bool,
    pub is_active: bool,
    pub has_contract: bool,
}

#[derive(Debug, Deserialize)]
pub struct SwitchNetworkRequest {
    pub network: String,
}

#[derive(Debug, Deserialize)]
pub struct GasEstimateRequest {
    #[serde(default)]
    pub network: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GasEstimateResponse {
    pub network: String,
    pub gas_units: u64,
    pub gas_price_wei: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub network: String,
    pub address: String,
    pub balance_wei: String,
}

// ============ Realtime ============

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

// ============ Multi-sig ============

#[derive(Debug, Deserialize)]
pub struct ProposeRequest {
    pub kind: ProposalKind,
    pub payload: serde_json::Value,
    pub required_approvals: u32,
    pub proposer: String,
}

#[derive(Debug, Serialize)]
pub struct ProposeResponse {
    pub proposal_id: String,
    pub expires_at: u64,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub proposal_id: String,
    pub signer_id: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub proposal_id: String,
    pub state: ProposalState,
    pub approvals: usize,
    pub rejections: usize,
    pub required_approvals: u32,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub executed: bool,
    pub artifact: String,
}

#[derive(Debug, Deserialize)]
pub struct ProposalFilter {
    #[serde(default)]
    pub state: Option<ProposalState>,
}

#[derive(Debug, Deserialize)]
pub struct AddSignerRequest {
    pub signer_id: String,
    pub public_key: String,
}
