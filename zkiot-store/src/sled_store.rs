//! Sled-backed store
//!
//! Embedded document store with one tree per collection. Batch creation uses
//! a multi-tree transaction so the batch record and the `batch_id` stamps on
//! its data land in one atomic write. Single-record updates go through
//! compare-and-swap on the raw document bytes.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use zkiot_core::constants::CAS_MAX_RETRIES;
use zkiot_core::crypto::Digest32;
use zkiot_core::types::telemetry::ChainAnchor;
use zkiot_core::types::{
    Device, MerkleBatch, MultiSigProposal, PendingDatum, ProposalState, Signer,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{HeartbeatUpdate, Store, StoreStats};

/// Sled store over one embedded database
#[derive(Debug)]
pub struct SledStore {
    db: sled::Db,
    devices: sled::Tree,
    pending: sled::Tree,
    batches: sled::Tree,
    proposals: sled::Tree,
    signers: sled::Tree,
    presence: sled::Tree,
    auth_log: sled::Tree,
}

impl SledStore {
    /// Open or create the store at `path`
    pub fn open(path: &str) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Open a throwaway store backed by a temporary directory
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> StoreResult<Self> {
        Ok(Self {
            devices: db.open_tree("devices")?,
            pending: db.open_tree("pending_data")?,
            batches: db.open_tree("merkle_batches")?,
            proposals: db.open_tree("multisig_proposals")?,
            signers: db.open_tree("authorized_signers")?,
            presence: db.open_tree("presence")?,
            auth_log: db.open_tree("auth_log")?,
            db,
        })
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn get_doc<T: DeserializeOwned>(tree: &sled::Tree, key: &[u8]) -> StoreResult<Option<T>> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(tree: &sled::Tree) -> StoreResult<Vec<T>> {
        let mut out = Vec::new();
        for entry in tree.iter() {
            let (_, bytes) = entry?;
            out.push(Self::decode(&bytes)?);
        }
        Ok(out)
    }

    /// Read-modify-CAS loop on a single document
    fn update_doc<T, F>(&self, tree: &sled::Tree, key: &[u8], mut apply: F) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T) -> StoreResult<()>,
    {
        for _ in 0..CAS_MAX_RETRIES {
            let old = tree
                .get(key)?
                .ok_or_else(|| StoreError::NotFound(String::from_utf8_lossy(key).into_owned()))?;
            let mut doc: T = Self::decode(&old)?;
            apply(&mut doc)?;
            let new = Self::encode(&doc)?;
            if tree
                .compare_and_swap(key, Some(&old), Some(new))?
                .is_ok()
            {
                return Ok(doc);
            }
        }
        Err(StoreError::CasConflict(format!(
            "document {} kept changing",
            String::from_utf8_lossy(key)
        )))
    }
}

fn batch_key(batch_id: u64) -> [u8; 8] {
    batch_id.to_be_bytes()
}

fn ordered(mut data: Vec<PendingDatum>) -> Vec<PendingDatum> {
    data.sort_by(|a, b| {
        (a.submitted_at, &a.device_id, a.insertion_seq)
            .cmp(&(b.submitted_at, &b.device_id, b.insertion_seq))
    });
    data
}

#[async_trait]
impl Store for SledStore {
    // ==================== Devices ====================

    async fn put_new_device(&self, device: &Device) -> StoreResult<()> {
        let key = device.device_id.as_bytes();
        let value = Self::encode(device)?;
        match self.devices.compare_and_swap(key, None as Option<&[u8]>, Some(value))? {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::AlreadyExists(device.device_id.clone())),
        }
    }

    async fn get_device(&self, device_id: &str) -> StoreResult<Option<Device>> {
        Self::get_doc(&self.devices, device_id.as_bytes())
    }

    async fn list_devices(&self) -> StoreResult<Vec<Device>> {
        let mut devices: Vec<Device> = Self::scan(&self.devices)?;
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(devices)
    }

    async fn set_device_active(&self, device_id: &str, active: bool) -> StoreResult<()> {
        self.update_doc::<Device, _>(&self.devices, device_id.as_bytes(), |d| {
            d.is_active = active;
            Ok(())
        })?;
        Ok(())
    }

    async fn bump_device_counter(&self, device_id: &str) -> StoreResult<u64> {
        let device = self.update_doc::<Device, _>(&self.devices, device_id.as_bytes(), |d| {
            d.total_data_submitted += 1;
            Ok(())
        })?;
        Ok(device.total_data_submitted)
    }

    async fn touch_device_auth(&self, device_id: &str, at: u64) -> StoreResult<()> {
        self.update_doc::<Device, _>(&self.devices, device_id.as_bytes(), |d| {
            if d.last_authenticated_at.map_or(true, |prev| at > prev) {
                d.last_authenticated_at = Some(at);
            }
            Ok(())
        })?;
        Ok(())
    }

    // ==================== Pending data ====================

    async fn append_pending(&self, mut datum: PendingDatum) -> StoreResult<PendingDatum> {
        datum.insertion_seq = self.db.generate_id()?;
        self.pending
            .insert(datum.datum_id.as_bytes(), Self::encode(&datum)?)?;
        Ok(datum)
    }

    async fn list_pending_ordered(&self) -> StoreResult<Vec<PendingDatum>> {
        let all: Vec<PendingDatum> = Self::scan(&self.pending)?;
        Ok(ordered(
            all.into_iter().filter(|d| d.batch_id.is_none()).collect(),
        ))
    }

    async fn pending_count(&self) -> StoreResult<u64> {
        let all: Vec<PendingDatum> = Self::scan(&self.pending)?;
        Ok(all.iter().filter(|d| d.batch_id.is_none()).count() as u64)
    }

    async fn list_device_data(
        &self,
        device_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<PendingDatum>> {
        let all: Vec<PendingDatum> = Self::scan(&self.pending)?;
        let mut data: Vec<PendingDatum> = all
            .into_iter()
            .filter(|d| d.device_id == device_id)
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
        let batch_bytes = Self::encode(batch)?;
        let key = batch_key(batch.batch_id);

        let result = (&self.batches, &self.pending).transaction(|(batches, pending)| {
            if batches.get(key)?.is_some() {
                return Err(ConflictableTransactionError::Abort(
                    StoreError::AlreadyExists(format!("batch {}", batch.batch_id)),
                ));
            }
            batches.insert(key.to_vec(), batch_bytes.clone())?;

            for id in datum_ids {
                let raw = pending.get(id.as_bytes())?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(StoreError::NotFound(format!(
                        "pending datum {}",
                        id
                    )))
                })?;
                let mut datum: PendingDatum = serde_json::from_slice(&raw).map_err(|e| {
                    ConflictableTransactionError::Abort(StoreError::Serialization(e))
                })?;
                if datum.batch_id.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        StoreError::CasConflict(format!("datum {} already batched", id)),
                    ));
                }
                datum.batch_id = Some(batch.batch_id);
                let updated = serde_json::to_vec(&datum).map_err(|e| {
                    ConflictableTransactionError::Abort(StoreError::Serialization(e))
                })?;
                pending.insert(id.as_bytes().to_vec(), updated)?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn get_batch(&self, batch_id: u64) -> StoreResult<Option<MerkleBatch>> {
        Self::get_doc(&self.batches, &batch_key(batch_id))
    }

    async fn list_batches(&self, limit: usize) -> StoreResult<Vec<MerkleBatch>> {
        let mut out = Vec::new();
        // Keys are big-endian ids, so reverse iteration is newest-first.
        for entry in self.batches.iter().rev().take(limit) {
            let (_, bytes) = entry?;
            out.push(Self::decode(&bytes)?);
        }
        Ok(out)
    }

    async fn find_batch_by_root(&self, root: &Digest32) -> StoreResult<Option<MerkleBatch>> {
        for entry in self.batches.iter() {
            let (_, bytes) = entry?;
            let batch: MerkleBatch = Self::decode(&bytes)?;
            if &batch.root == root {
                return Ok(Some(batch));
            }
        }
        Ok(None)
    }

    async fn max_batch_id(&self) -> StoreResult<Option<u64>> {
        match self.batches.last()? {
            Some((key, _)) => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&key);
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    async fn update_anchor(
        &self,
        batch_id: u64,
        chain: &str,
        anchor: ChainAnchor,
    ) -> StoreResult<()> {
        self.update_doc::<MerkleBatch, _>(&self.batches, &batch_key(batch_id), |b| {
            b.anchors.insert(chain.to_string(), anchor.clone());
            Ok(())
        })?;
        Ok(())
    }

    // ==================== Proposals ====================

    async fn create_proposal(&self, proposal: &MultiSigProposal) -> StoreResult<()> {
        let key = proposal.proposal_id.as_bytes();
        let value = Self::encode(proposal)?;
        match self
            .proposals
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::AlreadyExists(proposal.proposal_id.clone())),
        }
    }

    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<MultiSigProposal>> {
        Self::get_doc(&self.proposals, proposal_id.as_bytes())
    }

    async fn list_proposals(
        &self,
        state: Option<ProposalState>,
    ) -> StoreResult<Vec<MultiSigProposal>> {
        let all: Vec<MultiSigProposal> = Self::scan(&self.proposals)?;
        let mut filtered: Vec<MultiSigProposal> = all
            .into_iter()
            .filter(|p| state.map_or(true, |s| p.state == s))
            .collect();
        filtered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(filtered)
    }

    async fn update_proposal_cas(
        &self,
        expected: ProposalState,
        updated: &MultiSigProposal,
    ) -> StoreResult<()> {
        let key = updated.proposal_id.as_bytes();
        let old = self
            .proposals
            .get(key)?
            .ok_or_else(|| StoreError::NotFound(updated.proposal_id.clone()))?;
        let current: MultiSigProposal = Self::decode(&old)?;
        if current.state != expected {
            return Err(StoreError::CasConflict(format!(
                "proposal {} is {}, expected {}",
                updated.proposal_id,
                current.state.as_str(),
                expected.as_str()
            )));
        }
        let new = Self::encode(updated)?;
        match self.proposals.compare_and_swap(key, Some(&old), Some(new))? {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::CasConflict(format!(
                "proposal {} changed concurrently",
                updated.proposal_id
            ))),
        }
    }

    // ==================== Signers ====================

    async fn add_signer(&self, signer: &Signer) -> StoreResult<()> {
        let key = signer.signer_id.as_bytes();
        let value = Self::encode(signer)?;
        match self
            .signers
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::AlreadyExists(signer.signer_id.clone())),
        }
    }

    async fn deactivate_signer(&self, signer_id: &str) -> StoreResult<()> {
        self.update_doc::<Signer, _>(&self.signers, signer_id.as_bytes(), |s| {
            s.is_active = false;
            Ok(())
        })?;
        Ok(())
    }

    async fn list_signers(&self) -> StoreResult<Vec<Signer>> {
        let mut all: Vec<Signer> = Self::scan(&self.signers)?;
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
        let key = device_id.as_bytes();
        for _ in 0..CAS_MAX_RETRIES {
            let old = self.presence.get(key)?;
            let previous = old.as_ref().map(|bytes| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(bytes);
                u64::from_be_bytes(arr)
            });
            if previous.map_or(false, |prev| at < prev) {
                return Ok(HeartbeatUpdate {
                    previous,
                    applied: false,
                });
            }
            if self
                .presence
                .compare_and_swap(key, old.as_ref(), Some(at.to_be_bytes().to_vec()))?
                .is_ok()
            {
                return Ok(HeartbeatUpdate {
                    previous,
                    applied: true,
                });
            }
        }
        Err(StoreError::CasConflict(format!(
            "heartbeat for {} kept changing",
            device_id
        )))
    }

    async fn get_heartbeat(&self, device_id: &str) -> StoreResult<Option<u64>> {
        Ok(self.presence.get(device_id.as_bytes())?.map(|bytes| {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&bytes);
            u64::from_be_bytes(arr)
        }))
    }

    async fn list_heartbeats(&self) -> StoreResult<Vec<(String, u64)>> {
        let mut all = Vec::new();
        for entry in self.presence.iter() {
            let (key, bytes) = entry?;
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&bytes);
            all.push((
                String::from_utf8_lossy(&key).into_owned(),
                u64::from_be_bytes(arr),
            ));
        }
        all.sort();
        Ok(all)
    }

    // ==================== Audit & stats ====================

    async fn append_auth_log(&self, device_id: &str, at: u64) -> StoreResult<()> {
        let id = self.db.generate_id()?;
        let value = serde_json::json!({ "device_id": device_id, "at": at });
        self.auth_log
            .insert(id.to_be_bytes(), Self::encode(&value)?)?;
        Ok(())
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let devices: Vec<Device> = Self::scan(&self.devices)?;
        let data: Vec<PendingDatum> = Self::scan(&self.pending)?;
        let anchored = data.iter().filter(|d| d.batch_id.is_some()).count() as u64;

        Ok(StoreStats {
            total_devices: devices.len() as u64,
            active_devices: devices.iter().filter(|d| d.is_active).count() as u64,
            total_data: data.len() as u64,
            pending_data: data.len() as u64 - anchored,
            anchored_data: anchored,
            total_batches: self.batches.len() as u64,
            total_auths: self.auth_log.len() as u64,
        })
    }
}
