//! Persistence adapter contract
//!
//! The store is a durable document map with optimistic concurrency: CAS on
//! single records plus the one atomic group write that batch creation
//! requires. State-machine transitions (proposals) surface CAS conflicts to
//! the caller; commutative counters retry internally.

use crate::error::StoreResult;
use async_trait::async_trait;
use serde::Serialize;
use zkiot_core::crypto::Digest32;
use zkiot_core::types::{
    Device, MerkleBatch, MultiSigProposal, PendingDatum, ProposalState, Signer,
};
use zkiot_core::types::telemetry::ChainAnchor;

/// Aggregate counters over the persisted collections
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_devices: u64,
    pub active_devices: u64,
    pub total_data: u64,
    pub pending_data: u64,
    pub anchored_data: u64,
    pub total_batches: u64,
    pub total_auths: u64,
}

/// Outcome of a heartbeat write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatUpdate {
    /// Stored value before the write
    pub previous: Option<u64>,
    /// False when the submitted time preceded the stored one and was ignored
    pub applied: bool,
}

/// The document-store contract the service layer is written against
#[async_trait]
pub trait Store: Send + Sync {
    // ==================== Devices ====================

    /// Insert a new device; fails if the id is taken
    async fn put_new_device(&self, device: &Device) -> StoreResult<()>;

    async fn get_device(&self, device_id: &str) -> StoreResult<Option<Device>>;

    async fn list_devices(&self) -> StoreResult<Vec<Device>>;

    async fn set_device_active(&self, device_id: &str, active: bool) -> StoreResult<()>;

    /// Increment `total_data_submitted`; returns the new value
    async fn bump_device_counter(&self, device_id: &str) -> StoreResult<u64>;

    /// Raise `last_authenticated_at` to `at`; earlier values never lower it
    async fn touch_device_auth(&self, device_id: &str, at: u64) -> StoreResult<()>;

    // ==================== Pending data ====================

    /// Append a submission; the store assigns `insertion_seq` and returns
    /// the stored record
    async fn append_pending(&self, datum: PendingDatum) -> StoreResult<PendingDatum>;

    /// Unbatched data in `(submitted_at, device_id, insertion_seq)` order
    async fn list_pending_ordered(&self) -> StoreResult<Vec<PendingDatum>>;

    async fn pending_count(&self) -> StoreResult<u64>;

    /// Most recent submissions for one device, newest first
    async fn list_device_data(
        &self,
        device_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<PendingDatum>>;

    // ==================== Batches ====================

    /// Persist a batch and stamp `batch_id` on every included datum in one
    /// atomic write
    async fn create_batch_with_leaves(
        &self,
        batch: &MerkleBatch,
        datum_ids: &[String],
    ) -> StoreResult<()>;

    async fn get_batch(&self, batch_id: u64) -> StoreResult<Option<MerkleBatch>>;

    /// Newest batches first
    async fn list_batches(&self, limit: usize) -> StoreResult<Vec<MerkleBatch>>;

    async fn find_batch_by_root(&self, root: &Digest32) -> StoreResult<Option<MerkleBatch>>;

    async fn max_batch_id(&self) -> StoreResult<Option<u64>>;

    /// Upsert one chain's anchor record on a batch
    async fn update_anchor(
        &self,
        batch_id: u64,
        chain: &str,
        anchor: ChainAnchor,
    ) -> StoreResult<()>;

    // ==================== Proposals ====================

    async fn create_proposal(&self, proposal: &MultiSigProposal) -> StoreResult<()>;

    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<MultiSigProposal>>;

    async fn list_proposals(
        &self,
        state: Option<ProposalState>,
    ) -> StoreResult<Vec<MultiSigProposal>>;

    /// Replace the proposal document iff its stored state equals `expected`
    async fn update_proposal_cas(
        &self,
        expected: ProposalState,
        updated: &MultiSigProposal,
    ) -> StoreResult<()>;

    // ==================== Signers ====================

    async fn add_signer(&self, signer: &Signer) -> StoreResult<()>;

    async fn deactivate_signer(&self, signer_id: &str) -> StoreResult<()>;

    async fn list_signers(&self) -> StoreResult<Vec<Signer>>;

    async fn list_active_signers(&self) -> StoreResult<Vec<Signer>>;

    // ==================== Presence ====================

    /// Monotonic heartbeat write; regressions are ignored, not errors
    async fn record_heartbeat(&self, device_id: &str, at: u64) -> StoreResult<HeartbeatUpdate>;

    async fn get_heartbeat(&self, device_id: &str) -> StoreResult<Option<u64>>;

    async fn list_heartbeats(&self) -> StoreResult<Vec<(String, u64)>>;

    // ==================== Audit & stats ====================

    /// Append an authentication audit record
    async fn append_auth_log(&self, device_id: &str, at: u64) -> StoreResult<()>;

    async fn stats(&self) -> StoreResult<StoreStats>;
}
