//! ZK-IoT chain layer
//!
//! EVM plumbing for the anchoring service:
//!
//! - **RPC transport**: JSON-RPC 2.0 over HTTP with per-call deadlines and
//!   capped exponential backoff on transient failures
//! - **Transactions**: legacy RLP encoding with EIP-155 signing, the anchor
//!   call ABI and its event decoder
//! - **Clients**: one [`ChainClient`] per network with serialized nonce
//!   allocation, pooled for cross-chain fan-out
//! - **Registry**: named networks, the active selection and deployment
//!   records
//!
//! Signing keys are process-scoped and never leave the client.

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod rpc;
pub mod tx;

pub use client::{ChainClient, ClientPool, GasEstimate, TxOp};
pub use config::{ChainSetConfig, NetworkConfig};
pub use error::{ChainError, ChainResult};
pub use registry::{ChainRegistry, DeploymentRecord};
pub use rpc::{EvmRpc, LogEntry, TxReceipt};
pub use tx::AnchoredRootEvent;
