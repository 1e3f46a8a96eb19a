//! ZK-IoT persistence adapter
//!
//! Document-store contract for devices, telemetry, batches, proposals,
//! signers and presence, with two backends:
//!
//! - [`MemoryStore`]: map-backed, for tests and development
//! - [`SledStore`]: embedded sled database with a multi-tree transaction
//!   for atomic batch creation
//!
//! Writes that drive state-machine transitions go through compare-and-set;
//! the underlying store is treated as a durable map with optimistic
//! concurrency and no transactional semantics beyond single-document CAS
//! plus the batch-creation group write.

pub mod error;
pub mod memory;
pub mod seq;
pub mod sled_store;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use seq::BatchSequence;
pub use sled_store::SledStore;
pub use traits::{HeartbeatUpdate, Store, StoreStats};
