//! Cross-chain dispatcher
//!
//! Fans a batch root out to a target set of chains in parallel, records the
//! per-chain outcome, and watches receipts in the background. Anchoring is
//! independent per chain: one failure never touches another chain's status,
//! and retry on a failed chain is an explicit operator action.

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zkiot_chain::{ChainRegistry, ClientPool, TxOp};
use zkiot_core::crypto::Digest32;
use zkiot_core::types::telemetry::ChainAnchor;
use zkiot_core::types::{AnchorStatus, EventKind, MerkleBatch};
use zkiot_store::Store;

use crate::error::{ServiceError, ServiceResult};
use crate::events::EventBus;

/// Immediate outcome of one chain's dispatch
#[derive(Debug, Clone, Serialize)]
pub struct DispatchEntry {
    pub chain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchEntry {
    pub fn is_dispatched(&self) -> bool {
        self.tx_hash.is_some()
    }
}

/// Per-chain anchor state for one root
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub batch_id: u64,
    pub root: Digest32,
    pub chains: HashMap<String, ChainAnchor>,
    /// True once at least one chain is confirmed
    pub available: bool,
}

/// Fan-out coordinator over the per-network client pool
pub struct CrossChainDispatcher {
    pool: Arc<ClientPool>,
    registry: Arc<ChainRegistry>,
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
}

impl CrossChainDispatcher {
    pub fn new(
        pool: Arc<ClientPool>,
        registry: Arc<ChainRegistry>,
        store: Arc<dyn Store>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            pool,
            registry,
            store,
            bus,
        }
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    /// Dispatch a batch root to `targets`; empty targets means the active
    /// network. Returns the immediate per-chain outcomes and leaves receipt
    /// watchers running in the background.
    pub async fn dispatch(
        &self,
        batch: &MerkleBatch,
        targets: &[String],
    ) -> ServiceResult<Vec<DispatchEntry>> {
        let targets: Vec<String> = if targets.is_empty() {
            vec![self.registry.active()]
        } else {
            targets.to_vec()
        };

        let sends = targets.iter().map(|chain| self.send_one(batch, chain));
        let results = join_all(sends).await;

        let mut entries = Vec::with_capacity(results.len());
        for (chain, result) in targets.iter().zip(results) {
            let entry = match result {
                Ok(tx_hash) => {
                    self.store
                        .update_anchor(batch.batch_id, chain, ChainAnchor::pending(tx_hash.clone()))
                        .await?;
                    self.spawn_watcher(batch.batch_id, chain.clone(), tx_hash.clone());
                    DispatchEntry {
                        chain: chain.clone(),
                        tx_hash: Some(tx_hash),
                        error: None,
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(batch_id = batch.batch_id, chain = %chain, error = %message, "anchor dispatch failed");
                    self.store
                        .update_anchor(
                            batch.batch_id,
                            chain,
                            ChainAnchor::failed(None, message.clone()),
                        )
                        .await?;
                    DispatchEntry {
                        chain: chain.clone(),
                        tx_hash: None,
                        error: Some(message),
                    }
                }
            };

            self.emit_progress(batch.batch_id, &entry.chain, &entry).await;
            entries.push(entry);
        }

        Ok(entries)
    }

    async fn send_one(&self, batch: &MerkleBatch, chain: &str) -> ServiceResult<String> {
        let contract = self
            .registry
            .anchor_contract(chain)
            .ok_or_else(|| ServiceError::Validation(format!(
                "no anchor contract configured for {}",
                chain
            )))?;
        let client = self.pool.client(chain)?;
        let op = TxOp::anchor_root(&contract, &batch.root, batch.leaf_count, &batch.metadata);
        Ok(client.send(&op).await?)
    }

    fn spawn_watcher(&self, batch_id: u64, chain: String, tx_hash: String) {
        let pool = Arc::clone(&self.pool);
        let store = Arc::clone(&self.store);
        let bus = Arc::clone(&self.bus);

        tokio::spawn(async move {
            let client = match pool.client(&chain) {
                Ok(c) => c,
                Err(e) => {
                    warn!(batch_id, chain = %chain, error = %e, "watcher has no client");
                    return;
                }
            };

            let anchor = match client.wait_receipt(&tx_hash, client.confirm_timeout()).await {
                Ok(receipt) => {
                    info!(batch_id, chain = %chain, tx_hash = %tx_hash, "anchor confirmed");
                    // Cross-check the contract's event against our record.
                    if let Some(event) = receipt
                        .logs
                        .iter()
                        .find_map(|log| client.decode_event(log).ok())
                    {
                        debug!(
                            batch_id,
                            chain = %chain,
                            onchain_root = %event.root,
                            onchain_leaf_count = event.leaf_count,
                            "anchor event decoded"
                        );
                    }
                    ChainAnchor::confirmed(
                        tx_hash.clone(),
                        receipt.block_number_u64().unwrap_or_default(),
                        receipt.gas_used_u64().unwrap_or_default(),
                    )
                }
                Err(e) => {
                    warn!(batch_id, chain = %chain, tx_hash = %tx_hash, error = %e, "anchor failed");
                    ChainAnchor::failed(Some(tx_hash.clone()), e.to_string())
                }
            };

            let status = anchor.status;
            if let Err(e) = store.update_anchor(batch_id, &chain, anchor.clone()).await {
                warn!(batch_id, chain = %chain, error = %e, "anchor status write failed");
                return;
            }
            bus.publish(
                EventKind::BatchAnchorProgress,
                json!({
                    "batch_id": batch_id,
                    "chain": chain,
                    "status": status,
                    "tx_hash": anchor.tx_hash,
                    "block_number": anchor.block_number,
                    "error": anchor.error,
                }),
            )
            .await;
        });
    }

    async fn emit_progress(&self, batch_id: u64, chain: &str, entry: &DispatchEntry) {
        let status = if entry.is_dispatched() {
            AnchorStatus::Pending
        } else {
            AnchorStatus::Failed
        };
        self.bus
            .publish(
                EventKind::BatchAnchorProgress,
                json!({
                    "batch_id": batch_id,
                    "chain": chain,
                    "status": status,
                    "tx_hash": entry.tx_hash,
                    "error": entry.error,
                }),
            )
            .await;
    }

    /// Per-chain anchor state for the batch carrying `root`
    pub async fn sync_status(&self, root: &Digest32) -> ServiceResult<SyncStatus> {
        let batch = self
            .store
            .find_batch_by_root(root)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no batch with root {}", root)))?;

        Ok(SyncStatus {
            batch_id: batch.batch_id,
            root: batch.root,
            available: batch.is_available(),
            chains: batch.anchors,
        })
    }

    /// Explicit operator retry of a failed chain
    pub async fn retry_chain(&self, batch_id: u64, chain: &str) -> ServiceResult<DispatchEntry> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("batch {}", batch_id)))?;

        match batch.anchors.get(chain) {
            Some(anchor) if anchor.status != AnchorStatus::Failed => {
                return Err(ServiceError::ConflictState {
                    current: format!("{:?}", anchor.status).to_lowercase(),
                    message: format!("anchor on {} is not failed", chain),
                });
            }
            _ => {}
        }

        let mut entries = self.dispatch(&batch, &[chain.to_string()]).await?;
        Ok(entries.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkiot_chain::ChainSetConfig;
    use zkiot_store::MemoryStore;

    fn batch(id: u64, root: Digest32) -> MerkleBatch {
        MerkleBatch {
            batch_id: id,
            leaf_count: 1,
            root,
            leaves: vec![root],
            created_at: 0,
            metadata: String::new(),
            anchors: HashMap::new(),
        }
    }

    async fn dispatcher() -> (CrossChainDispatcher, Arc<dyn Store>) {
        // Unreachable local endpoint with a single fast attempt: every send
        // fails quickly, which is exactly what these tests need.
        let config = ChainSetConfig::development();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let dispatcher = CrossChainDispatcher::new(
            Arc::new(ClientPool::new(&config).unwrap()),
            Arc::new(ChainRegistry::new(&config)),
            store.clone(),
            Arc::new(EventBus::default()),
        );
        (dispatcher, store)
    }

    #[tokio::test]
    async fn test_missing_contract_is_failed_entry() {
        let (dispatcher, store) = dispatcher().await;
        let root = zkiot_core::crypto::keccak256(b"root");
        let b = batch(1, root);
        store
            .create_batch_with_leaves(&b, &[])
            .await
            .unwrap();

        let entries = dispatcher.dispatch(&b, &[]).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chain, "localhost");
        assert!(!entries[0].is_dispatched());
        assert!(entries[0]
            .error
            .as_deref()
            .unwrap()
            .contains("no anchor contract"));

        // The failure landed on the batch record.
        let stored = store.get_batch(1).await.unwrap().unwrap();
        assert_eq!(stored.anchors["localhost"].status, AnchorStatus::Failed);
    }

    #[tokio::test]
    async fn test_per_chain_independence() {
        let (dispatcher, store) = dispatcher().await;
        let root = zkiot_core::crypto::keccak256(b"root2");
        let b = batch(1, root);
        store.create_batch_with_leaves(&b, &[]).await.unwrap();

        // One valid target, one unknown network.
        let entries = dispatcher
            .dispatch(&b, &["localhost".to_string(), "ghostnet".to_string()])
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| !e.is_dispatched()));

        // Both outcomes recorded independently.
        let stored = store.get_batch(1).await.unwrap().unwrap();
        assert!(stored.anchors.contains_key("localhost"));
        assert!(stored.anchors.contains_key("ghostnet"));
    }

    #[tokio::test]
    async fn test_sync_status_unknown_root() {
        let (dispatcher, _) = dispatcher().await;
        let missing = zkiot_core::crypto::keccak256(b"nope");
        assert!(matches!(
            dispatcher.sync_status(&missing).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_status_reports_failures() {
        let (dispatcher, store) = dispatcher().await;
        let root = zkiot_core::crypto::keccak256(b"root3");
        let b = batch(1, root);
        store.create_batch_with_leaves(&b, &[]).await.unwrap();
        dispatcher.dispatch(&b, &[]).await.unwrap();

        let status = dispatcher.sync_status(&root).await.unwrap();
        assert_eq!(status.batch_id, 1);
        assert!(!status.available);
        assert_eq!(status.chains["localhost"].status, AnchorStatus::Failed);
    }
}
