//! Anchor pipeline
//!
//! Turns accumulated pending telemetry into anchored batches. Assembly runs
//! under an exclusive lock: snapshot the pending set in submission order,
//! build the tree, allocate the next dense batch id and persist batch plus
//! leaf assignments in one atomic write. The lock is released before the
//! cross-chain dispatcher is invoked, so chain I/O never runs inside it.

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};
use zkiot_core::constants::{
    ANCHOR_SWEEP_SECS, ANCHOR_THRESHOLD_AGE_SECS, ANCHOR_THRESHOLD_LEAVES,
};
use zkiot_core::crypto::merkle::{verify as verify_inclusion, MerkleTree, ProofStep};
use zkiot_core::crypto::Digest32;
use zkiot_core::types::{EventKind, MerkleBatch};
use zkiot_store::{BatchSequence, Store};

use crate::dispatch::{CrossChainDispatcher, DispatchEntry};
use crate::error::{ServiceError, ServiceResult};
use crate::events::EventBus;
use crate::time::unix_now;

/// Trigger policy for automatic batch assembly
#[derive(Debug, Clone)]
pub struct AnchorPolicy {
    /// Assemble once this many leaves are pending
    pub threshold_leaves: usize,
    /// Assemble once the oldest pending datum is this old
    pub threshold_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for AnchorPolicy {
    fn default() -> Self {
        Self {
            threshold_leaves: ANCHOR_THRESHOLD_LEAVES,
            threshold_age_secs: ANCHOR_THRESHOLD_AGE_SECS,
            sweep_interval_secs: ANCHOR_SWEEP_SECS,
        }
    }
}

/// Result of a pipeline run
#[derive(Debug, Clone)]
pub struct AnchorOutcome {
    pub batch: MerkleBatch,
    pub dispatched: Vec<DispatchEntry>,
}

/// Verification report for an inclusion query
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub valid: bool,
    /// Chains where the containing batch is confirmed on-chain
    pub confirmed_chains: Vec<String>,
}

/// The batch assembly pipeline
pub struct AnchorPipeline {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    dispatcher: Arc<CrossChainDispatcher>,
    /// Exclusive assembly lock: at most one batch in flight globally
    assembly: Mutex<()>,
    sequence: BatchSequence,
    policy: AnchorPolicy,
    running: AtomicBool,
}

impl AnchorPipeline {
    pub async fn new(
        store: Arc<dyn Store>,
        bus: Arc<EventBus>,
        dispatcher: Arc<CrossChainDispatcher>,
        policy: AnchorPolicy,
    ) -> ServiceResult<Self> {
        let sequence = BatchSequence::load(store.as_ref()).await?;
        Ok(Self {
            store,
            bus,
            dispatcher,
            assembly: Mutex::new(()),
            sequence,
            policy,
            running: AtomicBool::new(false),
        })
    }

    /// Assemble and dispatch a batch from everything currently pending
    ///
    /// `targets` empty means the active network. Fails with `NO_PENDING`
    /// when the snapshot is empty.
    pub async fn anchor_now(
        &self,
        metadata: String,
        targets: &[String],
    ) -> ServiceResult<AnchorOutcome> {
        let batch = {
            let _guard = self.assembly.lock().await;

            let snapshot = self.store.list_pending_ordered().await?;
            if snapshot.is_empty() {
                return Err(ServiceError::NoPending);
            }

            let leaves: Vec<Digest32> = snapshot.iter().map(|d| d.leaf_hash).collect();
            let tree = MerkleTree::build(&leaves)?;

            let batch = MerkleBatch {
                batch_id: self.sequence.next(),
                leaf_count: leaves.len() as u64,
                root: tree.root(),
                leaves,
                created_at: unix_now(),
                metadata,
                anchors: HashMap::new(),
            };

            let datum_ids: Vec<String> =
                snapshot.iter().map(|d| d.datum_id.clone()).collect();
            self.store
                .create_batch_with_leaves(&batch, &datum_ids)
                .await?;

            info!(
                batch_id = batch.batch_id,
                leaf_count = batch.leaf_count,
                root = %batch.root,
                "batch assembled"
            );
            batch
            // Assembly lock released here; dispatch runs outside it.
        };

        self.bus
            .publish(
                EventKind::BatchCreated,
                json!({
                    "batch_id": batch.batch_id,
                    "leaf_count": batch.leaf_count,
                    "root": batch.root,
                }),
            )
            .await;

        let dispatched = self.dispatcher.dispatch(&batch, targets).await?;
        Ok(AnchorOutcome { batch, dispatched })
    }

    /// Inclusion proof for `(batch_id, leaf_hash)`
    pub async fn inclusion_proof(
        &self,
        batch_id: u64,
        leaf_hash: &Digest32,
    ) -> ServiceResult<Vec<ProofStep>> {
        let batch = self.get_batch(batch_id).await?;
        let index = batch
            .leaves
            .iter()
            .position(|l| l == leaf_hash)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("leaf {} not in batch {}", leaf_hash, batch_id))
            })?;

        let tree = MerkleTree::build(&batch.leaves)?;
        tree.inclusion_proof(index)
            .ok_or_else(|| ServiceError::Internal("proof index out of range".to_string()))
    }

    /// Recompute a proof against the stored root
    pub async fn verify(
        &self,
        batch_id: u64,
        leaf_hash: &Digest32,
        proof: &[ProofStep],
    ) -> ServiceResult<VerifyReport> {
        let batch = self.get_batch(batch_id).await?;
        Ok(VerifyReport {
            valid: verify_inclusion(leaf_hash, proof, &batch.root),
            confirmed_chains: batch.confirmed_chains(),
        })
    }

    pub async fn get_batch(&self, batch_id: u64) -> ServiceResult<MerkleBatch> {
        self.store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("batch {}", batch_id)))
    }

    pub async fn list_batches(&self, limit: usize) -> ServiceResult<Vec<MerkleBatch>> {
        Ok(self.store.list_batches(limit).await?)
    }

    /// Whether the trigger policy asks for a batch right now
    pub async fn trigger_due(&self, now: u64) -> ServiceResult<bool> {
        let pending = self.store.list_pending_ordered().await?;
        if pending.is_empty() {
            return Ok(false);
        }
        if pending.len() >= self.policy.threshold_leaves {
            return Ok(true);
        }
        let oldest = pending[0].submitted_at;
        Ok(now.saturating_sub(oldest) >= self.policy.threshold_age_secs)
    }

    /// Run the trigger-policy loop until `stop` is called
    pub fn spawn_trigger(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(pipeline.policy.sweep_interval_secs));
            info!(
                interval_secs = pipeline.policy.sweep_interval_secs,
                "anchor trigger started"
            );
            while pipeline.running.load(Ordering::SeqCst) {
                interval.tick().await;
                match pipeline.trigger_due(unix_now()).await {
                    Ok(true) => {
                        match pipeline.anchor_now("auto".to_string(), &[]).await {
                            Ok(outcome) => {
                                info!(batch_id = outcome.batch.batch_id, "auto-anchored")
                            }
                            // Raced with an explicit anchor; nothing to do.
                            Err(ServiceError::NoPending) => {}
                            Err(e) => error!(error = %e, "auto-anchor failed"),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => error!(error = %e, "trigger evaluation failed"),
                }
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
