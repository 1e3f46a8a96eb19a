//! Per-network chain client
//!
//! One instance per configured network. Nonce allocation is serialized
//! behind a mutex so there is a single sender per network at a time;
//! `NonceTooLow` refreshes from the node and retries. Every outbound call
//! carries the configured deadline.

use k256::ecdsa::SigningKey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zkiot_core::constants::RECEIPT_POLL_SECS;

use crate::config::{ChainSetConfig, NetworkConfig};
use crate::error::{ChainError, ChainResult};
use crate::rpc::{to_quantity, CallRequest, EvmRpc, LogEntry, TxReceipt};
use crate::tx::{
    decode_anchor_event, encode_anchor_call, format_address, parse_address, parse_signing_key,
    signer_address, AnchoredRootEvent, LegacyTransaction,
};
use zkiot_core::crypto::Digest32;

/// Gas limit used when estimation is unavailable
const FALLBACK_GAS_LIMIT: u64 = 200_000;

/// Nonce refresh attempts before giving up on a send
const MAX_NONCE_RETRIES: u32 = 3;

/// Descriptor of an outbound contract operation
#[derive(Debug, Clone)]
pub struct TxOp {
    pub to: String,
    pub data: Vec<u8>,
    pub value: u128,
    /// Explicit gas limit; estimated when absent
    pub gas_limit: Option<u64>,
}

impl TxOp {
    /// The anchor publication: `anchorRoot(root, leaf_count, metadata)`
    pub fn anchor_root(contract: &str, root: &Digest32, leaf_count: u64, metadata: &str) -> Self {
        Self {
            to: contract.to_string(),
            data: encode_anchor_call(root, leaf_count, metadata),
            value: 0,
            gas_limit: None,
        }
    }
}

/// Gas estimation result; never submits
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct GasEstimate {
    pub gas_units: u64,
    pub gas_price_wei: u128,
}

/// Client for one RPC endpoint with its signing key
pub struct ChainClient {
    network: NetworkConfig,
    rpc: EvmRpc,
    signer: SigningKey,
    sender: [u8; 20],
    nonce: Mutex<Option<u64>>,
    confirm_timeout: Duration,
}

impl ChainClient {
    pub fn new(network: NetworkConfig, config: &ChainSetConfig) -> ChainResult<Self> {
        let rpc = EvmRpc::new(
            network.rpc_url.clone(),
            Duration::from_secs(config.rpc_timeout_secs),
            config.max_rpc_attempts,
            Duration::from_secs(config.max_rpc_backoff_secs),
        )?;
        let signer = parse_signing_key(&config.signing_key)?;
        let sender = signer_address(&signer);

        Ok(Self {
            network,
            rpc,
            signer,
            sender,
            nonce: Mutex::new(None),
            confirm_timeout: Duration::from_secs(config.confirm_timeout_secs),
        })
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn sender_address(&self) -> String {
        format_address(&self.sender)
    }

    pub fn confirm_timeout(&self) -> Duration {
        self.confirm_timeout
    }

    /// Verify the endpoint answers and reports the configured chain id
    pub async fn connect(&self) -> ChainResult<u64> {
        let actual = self
            .rpc
            .chain_id()
            .await
            .map_err(|e| ChainError::Connect(e.to_string()))?;
        if actual != self.network.chain_id {
            return Err(ChainError::ChainMismatch {
                expected: self.network.chain_id,
                actual,
            });
        }
        info!(chain = %self.network.name, chain_id = actual, "connected");
        Ok(actual)
    }

    /// Estimate gas units and price for an operation without submitting
    pub async fn estimate_gas(&self, op: &TxOp) -> ChainResult<GasEstimate> {
        let call = CallRequest {
            from: self.sender_address(),
            to: op.to.clone(),
            data: Some(format!("0x{}", hex::encode(&op.data))),
            value: (op.value > 0).then(|| to_quantity(op.value)),
        };
        let gas_units = self.rpc.estimate_gas(&call).await?;
        let gas_price_wei = self.rpc.gas_price().await?;
        Ok(GasEstimate {
            gas_units,
            gas_price_wei,
        })
    }

    /// Build, sign and broadcast; returns the transaction hash without
    /// waiting for inclusion
    pub async fn send(&self, op: &TxOp) -> ChainResult<String> {
        let to = parse_address(&op.to)?;
        let gas_price = self.rpc.gas_price().await?;
        let gas_limit = match op.gas_limit {
            Some(limit) => limit,
            None => match self.estimate_gas(op).await {
                // Headroom over the estimate
                Ok(estimate) => estimate.gas_units + estimate.gas_units / 5,
                Err(e) => {
                    debug!(chain = %self.network.name, error = %e, "gas estimation failed, using fallback");
                    FALLBACK_GAS_LIMIT
                }
            },
        };

        let mut nonce_slot = self.nonce.lock().await;
        let mut nonce = match *nonce_slot {
            Some(n) => n,
            None => {
                self.rpc
                    .transaction_count(&self.sender_address(), "pending")
                    .await?
            }
        };

        let mut attempts = 0;
        loop {
            let tx = LegacyTransaction {
                nonce,
                gas_price,
                gas_limit,
                to,
                value: op.value,
                data: op.data.clone(),
            };
            let raw = tx.sign(self.network.chain_id, &self.signer)?;

            match self.rpc.send_raw_transaction(&raw).await {
                Ok(tx_hash) => {
                    *nonce_slot = Some(nonce + 1);
                    info!(chain = %self.network.name, tx_hash = %tx_hash, nonce, "transaction broadcast");
                    return Ok(tx_hash);
                }
                Err(ChainError::NonceTooLow) if attempts < MAX_NONCE_RETRIES => {
                    attempts += 1;
                    nonce = self
                        .rpc
                        .transaction_count(&self.sender_address(), "pending")
                        .await?;
                    warn!(chain = %self.network.name, nonce, attempt = attempts, "nonce too low, refreshed");
                }
                Err(e) => {
                    // Unknown outcome: drop the cached nonce so the next
                    // send re-syncs with the node.
                    *nonce_slot = None;
                    return Err(e);
                }
            }
        }
    }

    /// Poll for the receipt until `deadline`; reverts surface as errors
    pub async fn wait_receipt(&self, tx_hash: &str, deadline: Duration) -> ChainResult<TxReceipt> {
        let poll = Duration::from_secs(RECEIPT_POLL_SECS);
        let watch = async {
            loop {
                match self.rpc.transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => {
                        if receipt.succeeded() {
                            return Ok(receipt);
                        }
                        return Err(ChainError::Reverted(tx_hash.to_string()));
                    }
                    Ok(None) => {}
                    // Transport trouble only ends the watch at the deadline.
                    Err(ChainError::RetryExhausted { last_error, .. }) => {
                        debug!(tx_hash, error = %last_error, "receipt poll failed, will retry");
                    }
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(poll).await;
            }
        };

        tokio::time::timeout(deadline, watch)
            .await
            .map_err(|_| ChainError::Timeout(format!("no receipt for {} in time", tx_hash)))?
    }

    /// Native balance of an address in wei
    pub async fn balance(&self, address: &str) -> ChainResult<u128> {
        self.rpc.balance(address).await
    }

    /// Current block height
    pub async fn block_number(&self) -> ChainResult<u64> {
        self.rpc.block_number().await
    }

    /// Decode an anchor event from a receipt log
    pub fn decode_event(&self, log: &LogEntry) -> ChainResult<AnchoredRootEvent> {
        decode_anchor_event(log)
    }
}

/// Per-network client pool shared by the dispatcher and the facade
pub struct ClientPool {
    clients: HashMap<String, Arc<ChainClient>>,
}

impl ClientPool {
    /// Build one client per configured network
    pub fn new(config: &ChainSetConfig) -> ChainResult<Self> {
        let mut clients = HashMap::new();
        for network in &config.networks {
            let client = ChainClient::new(network.clone(), config)?;
            clients.insert(network.name.clone(), Arc::new(client));
        }
        Ok(Self { clients })
    }

    pub fn client(&self, name: &str) -> ChainResult<Arc<ChainClient>> {
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| ChainError::UnknownNetwork(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }
}
