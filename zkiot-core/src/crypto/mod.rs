//! Cryptographic primitives: keccak-256 hashing, the canonical tuple
//! encoding, the Merkle engine and the commitment-based authentication
//! scheme.

pub mod hash;
pub mod merkle;
pub mod zkp;

pub use hash::{keccak256, Digest32, DigestError, TupleEncoder, DIGEST_LEN};
pub use merkle::{leaf_hash, node_hash, verify as verify_inclusion, MerkleTree, ProofStep, SiblingSide};
pub use zkp::{AuthError, AuthProof, Nonce16, ReplayCache, SimpleProof, ZkpEngine};
