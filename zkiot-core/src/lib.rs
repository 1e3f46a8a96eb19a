//! ZK-IoT core
//!
//! Core primitives for the trust-anchor service:
//! - keccak-256 hashing with the canonical tuple encoding (the ground truth
//!   for every downstream hash)
//! - the Merkle engine used for batch roots and inclusion proofs
//! - the commitment-based authentication scheme with replay defense
//! - the domain types shared by persistence, chain and service layers
//!
//! The crate is deliberately free of I/O: everything here is a pure engine
//! that upper layers compose.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod types;

pub use constants::*;
pub use crypto::{keccak256, AuthError, AuthProof, Digest32, MerkleTree, ProofStep, SiblingSide, ZkpEngine};
pub use error::{CoreError, CoreResult};
pub use types::*;
