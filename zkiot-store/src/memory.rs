//! In-memory store
//!
//! Thread-safe map-backed implementation for tests and development. The
//! atomic group write for batch creation holds both table locks for the
//! duration of the check-then-mutate sequence, so it is all-or-nothing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use zkiot_core::crypto::Digest32;
use zkiot_core::types::telemetry::ChainAnchor;
use zkiot_core::types::{
    Device, MerkleBatch, MultiSigProposal, PendingDatum, ProposalState, Signer,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{HeartbeatUpdate, Store, StoreStats};

/// Map-backed store
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: RwLock<HashMap<String, Device>>,
    pending: RwLock<HashMap<String, PendingDatum>>,
    batches: RwLock<HashMap<u64, MerkleBatch>>,
    proposals: RwLock<HashMap<String, MultiSigProposal>>,
    signers: RwLock<HashMap<String, Signer>>,
    heartbeats: RwLock<HashMap<String, u64>>,
    auth_log: RwLock<Vec<(String, u64)>>,
    insertion_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn ordered(mut data: Vec<PendingDatum>) -> Vec<PendingDatum> {
    data.sort_by(|a, b| {
        (a.submitted_at, &a.device_id, a.insertion_seq)
            .cmp(&(b.submitted_at, &b.device_id, b.insertion_seq))
    });
    data
}

#[async_trait]
impl Store for MemoryStore {
    // ==================== Devices ====================

    async fn put_new_device(&self, device: &Device) -> StoreResult<()> {
        let mut devices = self.devices.write().await;
        if devices.contains_key(&device.device_id) {
            return Err(StoreError::AlreadyExists(device.device_id.clone()));
        }
        devices.insert(device.device_id.clone(), device.clone());
        Ok(())
    }

    async fn get_device(&self, device_id: &str) -> StoreResult<Option<Device>> {
        Ok(self.devices.read().await.get(device_id).cloned())
    }

    async fn list_devices(&self) -> StoreResult<Vec<Device>> {
        let mut devices: Vec<Device> = self.devices.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(devices)
    }

    async fn set_device_active(&self, device_id: &str, active: bool) -> StoreResult<()> {
        let mut devices = self.devices.write().await;
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| StoreError::NotFound(device_id.to_string()))?;
        device.is_active = active;
        Ok(())
    }

    async fn bump_device_counter(&self, device_id: &str) -> StoreResult<u64> {
        let mut devices = self.devices.write().await;
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| StoreError::NotFound(device_id.to_string()))?;
        device.total_data_submitted += 1;
        Ok(device.total_data_submitted)
    }

    async fn touch_device_auth(&self, device_id: &str, at: u64) -> StoreResult<()> {
        let mut devices = self.devices.write().await;
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| StoreError::NotFound(device_id.to_string()))?;
        if device.last_authenticated_at.map_or(true, |prev| at > prev) {
            device.last_authenticated_at = Some(at);
        }
        Ok(())
    }

    // ==================== Pending data ====================

    async fn append_pending(&self, mut datum: PendingDatum) -> StoreResult<PendingDatum> {
        datum.insertion_seq = self.insertion_seq.fetch_add(1, Ordering::SeqCst);
        let mut pending = self.pending.write().await;
        pending.insert(datum.datum_id.clone(), datum.clone());
        Ok(datum)
    }

    async fn list_pending_ordered(&self) -> StoreResult<Vec<PendingDatum>> {
        let pending = self.pending.read().await;
        Ok(ordered(
            pending
                .values()
                .filter(|d| d.batch_id.is_none())
                .cloned()
                .collect(),
        ))
    }

    async fn pending_count(&self) -> StoreResult<u64> {
        let pending = self.pending.read().await;
        Ok(pending.values().filter(|d| d.batch_id.is_none()).count() as u64)
    }

    async fn list_device_data(
        &self,
        device_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<PendingDatum>> {
        let pending = self.pending.read().await;
        let mut data: Vec<PendingDatum> = pending
            .values()
            .filter(|d| d.device_id == device_id)
            .cloned()
            .collect();
        data.sort_by(|a, b| {
            (b.submitted_at, b.insertion_seq).cmp(&(a.submitted_at, a.insertion_seq))
        });
        data.truncate(limit);
        Ok(data)
    }

    // ==================== Batches ====================

    async fn create_batch_with_leaves(
        &self,
        batch: &MerkleBatch,
        datum_ids: &[String],
    ) -> StoreResult<()> {
        let mut batches = self.batches.write().await;
        let mut pending = self.pending.write().await;

        if batches.contains_key(&batch.batch_id) {
            return Err(StoreError::AlreadyExists(format!("batch {}", batch.batch_id)));
        }
        for id in datum_ids {
            match pending.get(id) {
                None => return Err(StoreError::NotFound(format!("pending datum {}", id))),
                Some(d) if d.batch_id.is_some() => {
                    return Err(StoreError::CasConflict(format!(
                        "datum {} already batched",
                        id
                    )))
                }
                Some(_) => {}
            }
        }

        batches.insert(batch.batch_id, batch.clone());
        for id in datum_ids {
            if let Some(d) = pending.get_mut(id) {
                d.batch_id = Some(batch.batch_id);
            }
        }
        Ok(())
    }

    async fn get_batch(&self, batch_id: u64) -> StoreResult<Option<MerkleBatch>> {
        Ok(self.batches.read().await.get(&batch_id).cloned())
    }

    async fn list_batches(&self, limit: usize) -> StoreResult<Vec<MerkleBatch>> {
        let batches = self.batches.read().await;
        let mut all: Vec<MerkleBatch> = batches.values().cloned().collect();
        all.sort_by(|a, b| b.batch_id.cmp(&a.batch_id));
        all.truncate(limit);
        Ok(all)
    }

    async fn find_batch_by_root(&self, root: &Digest32) -> StoreResult<Option<MerkleBatch>> {
        let batches = self.batches.read().await;
        Ok(batches.values().find(|b| &b.root == root).cloned())
    }

    async fn max_batch_id(&self) -> StoreResult<Option<u64>> {
        Ok(self.batches.read().await.keys().max().copied())
    }

    async fn update_anchor(
        &self,
        batch_id: u64,
        chain: &str,
        anchor: ChainAnchor,
    ) -> StoreResult<()> {
        let mut batches = self.batches.write().await;
        let batch = batches
            .get_mut(&batch_id)
            .ok_or_else(|| StoreError::NotFound(format!("batch {}", batch_id)))?;
        batch.anchors.insert(chain.to_string(), anchor);
        Ok(())
    }

    // ==================== Proposals ====================

    async fn create_proposal(&self, proposal: &MultiSigProposal) -> StoreResult<()> {
        let mut proposals = self.proposals.write().await;
        if proposals.contains_key(&proposal.proposal_id) {
            return Err(StoreError::AlreadyExists(proposal.proposal_id.clone()));
        }
        proposals.insert(proposal.proposal_id.clone(), proposal.clone());
        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<MultiSigProposal>> {
        Ok(self.proposals.read().await.get(proposal_id).cloned())
    }

    async fn list_proposals(
        &self,
        state: Option<ProposalState>,
    ) -> StoreResult<Vec<MultiSigProposal>> {
        let proposals = self.proposals.read().await;
        let mut all: Vec<MultiSigProposal> = proposals
            .values()
            .filter(|p| state.map_or(true, |s| p.state == s))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn update_proposal_cas(
        &self,
        expected: ProposalState,
        updated: &MultiSigProposal,
    ) -> StoreResult<()> {
        let mut proposals = self.proposals.write().await;
        let current = proposals
            .get(&updated.proposal_id)
            .ok_or_else(|| StoreError::NotFound(updated.proposal_id.clone()))?;
        if current.state != expected {
            return Err(StoreError::CasConflict(format!(
                "proposal {} is {}, expected {}",
                updated.proposal_id,
                current.state.as_str(),
                expected.as_str()
            )));
        }
        proposals.insert(updated.proposal_id.clone(), updated.clone());
        Ok(())
    }

    // ==================== Signers ====================

    async fn add_signer(&self, signer: &Signer) -> StoreResult<()> {
        let mut signers = self.signers.write().await;
        if signers.contains_key(&signer.signer_id) {
            return Err(StoreError::AlreadyExists(signer.signer_id.clone()));
        }
        signers.insert(signer.signer_id.clone(), signer.clone());
        Ok(())
    }

    async fn deactivate_signer(&self, signer_id: &str) -> StoreResult<()> {
        let mut signers = self.signers.write().await;
        let signer = signers
            .get_mut(signer_id)
            .ok_or_else(|| StoreError::NotFound(signer_id.to_string()))?;
        signer.is_active = false;
        Ok(())
    }

    async fn list_signers(&self) -> StoreResult<Vec<Signer>> {
        let mut all: Vec<Signer> = self.signers.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.signer_id.cmp(&b.signer_id));
        Ok(all)
    }

    async fn list_active_signers(&self) -> StoreResult<Vec<Signer>> {
        Ok(self
            .list_signers()
            .await?
            .into_iter()
            .filter(|s| s.is_active)
            .collect())
    }

    // ==================== Presence ====================

    async fn record_heartbeat(&self, device_id: &str, at: u64) -> StoreResult<HeartbeatUpdate> {
        let mut heartbeats = self.heartbeats.write().await;
        let previous = heartbeats.get(device_id).copied();
        if previous.map_or(false, |prev| at < prev) {
            return Ok(HeartbeatUpdate {
                previous,
                applied: false,
            });
        }
        heartbeats.insert(device_id.to_string(), at);
        Ok(HeartbeatUpdate {
            previous,
            applied: true,
        })
    }

    async fn get_heartbeat(&self, device_id: &str) -> StoreResult<Option<u64>> {
        Ok(self.heartbeats.read().await.get(device_id).copied())
    }

    async fn list_heartbeats(&self) -> StoreResult<Vec<(String, u64)>> {
        let mut all: Vec<(String, u64)> = self
            .heartbeats
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        all.sort();
        Ok(all)
    }

    // ==================== Audit & stats ====================

    async fn append_auth_log(&self, device_id: &str, at: u64) -> StoreResult<()> {
        self.auth_log
            .write()
            .await
            .push((device_id.to_string(), at));
        Ok(())
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let devices = self.devices.read().await;
        let pending = self.pending.read().await;
        let batches = self.batches.read().await;
        let auth_log = self.auth_log.read().await;

        let anchored = pending.values().filter(|d| d.batch_id.is_some()).count() as u64;
        Ok(StoreStats {
            total_devices: devices.len() as u64,
            active_devices: devices.values().filter(|d| d.is_active).count() as u64,
            total_data: pending.len() as u64,
            pending_data: pending.len() as u64 - anchored,
            anchored_data: anchored,
            total_batches: batches.len() as u64,
            total_auths: auth_log.len() as u64,
        })
    }
}
