//! Merkle tree engine
//!
//! Binary hash tree over an ordered leaf sequence. Leaves are
//! `H("LEAF" ‖ canonical(payload))`, internal nodes `H("NODE" ‖ left ‖ right)`.
//! When a level has an odd node count the last node is paired with itself;
//! this rule is mandatory for proof compatibility.

use crate::crypto::hash::{Digest32, TupleEncoder};
use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Which side of the walked node a proof sibling sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiblingSide {
    Left,
    Right,
}

/// One bottom-up step of an inclusion proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Digest32,
    pub side: SiblingSide,
}

/// Canonical byte form of a telemetry payload
///
/// JSON with object keys in sorted order (serde_json maps are ordered), so
/// equal payloads hash equally regardless of the submitted key order.
pub fn canonical_payload(payload: &serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(payload).expect("JSON value always serializes")
}

/// Hash a telemetry payload into a leaf
pub fn leaf_hash(payload: &serde_json::Value) -> Digest32 {
    TupleEncoder::new()
        .tag("LEAF")
        .raw(&canonical_payload(payload))
        .hash()
}

/// Hash a pair of nodes into their parent
pub fn node_hash(left: &Digest32, right: &Digest32) -> Digest32 {
    TupleEncoder::new()
        .tag("NODE")
        .digest(left)
        .digest(right)
        .hash()
}

/// Merkle tree with all levels retained for proof generation
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Level 0 is the leaf layer; the last level holds the single root
    layers: Vec<Vec<Digest32>>,
}

impl MerkleTree {
    /// Build a tree from leaf digests; rejects empty input
    pub fn build(leaves: &[Digest32]) -> Result<Self, CoreError> {
        if leaves.is_empty() {
            return Err(CoreError::Validation(
                "cannot build a Merkle tree over zero leaves".to_string(),
            ));
        }

        let mut layers = vec![leaves.to_vec()];
        while layers.last().unwrap().len() > 1 {
            let current = layers.last().unwrap();
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                let left = &pair[0];
                // Odd level: the last node is duplicated
                let right = pair.get(1).unwrap_or(left);
                next.push(node_hash(left, right));
            }
            layers.push(next);
        }

        Ok(Self { layers })
    }

    pub fn root(&self) -> Digest32 {
        self.layers.last().unwrap()[0]
    }

    pub fn leaf_count(&self) -> usize {
        self.layers[0].len()
    }

    /// Inclusion proof for the leaf at `index`, bottom-up
    pub fn inclusion_proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut proof = Vec::with_capacity(self.layers.len() - 1);
        let mut idx = index;

        for level in &self.layers[..self.layers.len() - 1] {
            let (sibling_idx, side) = if idx % 2 == 0 {
                (idx + 1, SiblingSide::Right)
            } else {
                (idx - 1, SiblingSide::Left)
            };
            // Past the end means the walked node was duplicated
            let sibling = *level.get(sibling_idx).unwrap_or(&level[idx]);
            proof.push(ProofStep { sibling, side });
            idx /= 2;
        }

        Some(proof)
    }
}

/// Recompute the root from a leaf and its proof and compare byte-wise
pub fn verify(leaf: &Digest32, proof: &[ProofStep], root: &Digest32) -> bool {
    let mut current = *leaf;
    for step in proof {
        current = match step.side {
            SiblingSide::Right => node_hash(&current, &step.sibling),
            SiblingSide::Left => node_hash(&step.sibling, &current),
        };
    }
    &current == root
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaves(n: usize) -> Vec<Digest32> {
        (0..n)
            .map(|i| leaf_hash(&json!({ "v": i })))
            .collect()
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(MerkleTree::build(&[]).is_err());
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let l = leaves(1);
        let tree = MerkleTree::build(&l).unwrap();
        assert_eq!(tree.root(), l[0]);
        assert_eq!(tree.leaf_count(), 1);
        assert!(tree.inclusion_proof(0).unwrap().is_empty());
    }

    #[test]
    fn test_two_leaves() {
        let l = leaves(2);
        let tree = MerkleTree::build(&l).unwrap();
        assert_eq!(tree.root(), node_hash(&l[0], &l[1]));
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        let l = leaves(3);
        let tree = MerkleTree::build(&l).unwrap();
        let n01 = node_hash(&l[0], &l[1]);
        let n22 = node_hash(&l[2], &l[2]);
        assert_eq!(tree.root(), node_hash(&n01, &n22));
    }

    #[test]
    fn test_duplication_equals_pow2_padding() {
        // A tree over n leaves equals a tree over the same leaves padded to
        // the next power of two with copies of the last leaf.
        for n in [3usize, 5, 6, 7, 9] {
            let l = leaves(n);
            let plain = MerkleTree::build(&l).unwrap();

            let mut padded = l.clone();
            while !padded.len().is_power_of_two() {
                padded.push(*padded.last().unwrap());
            }
            let pow2 = MerkleTree::build(&padded).unwrap();

            assert_eq!(plain.root(), pow2.root(), "n = {}", n);
        }
    }

    #[test]
    fn test_proof_roundtrip_all_indices() {
        for n in 1..=9usize {
            let l = leaves(n);
            let tree = MerkleTree::build(&l).unwrap();
            let root = tree.root();
            for (i, leaf) in l.iter().enumerate() {
                let proof = tree.inclusion_proof(i).unwrap();
                assert!(verify(leaf, &proof, &root), "n = {}, i = {}", n, i);
            }
        }
    }

    #[test]
    fn test_bit_flip_breaks_verification() {
        let l = leaves(4);
        let tree = MerkleTree::build(&l).unwrap();
        let root = tree.root();
        let proof = tree.inclusion_proof(1).unwrap();

        // Flipped leaf
        let mut bad_leaf = l[1];
        bad_leaf.0[0] ^= 0x01;
        assert!(!verify(&bad_leaf, &proof, &root));

        // Flipped proof element
        let mut bad_proof = proof.clone();
        bad_proof[0].sibling.0[0] ^= 0x01;
        assert!(!verify(&l[1], &bad_proof, &root));

        // Flipped side bit
        let mut bad_side = proof.clone();
        bad_side[0].side = match bad_side[0].side {
            SiblingSide::Left => SiblingSide::Right,
            SiblingSide::Right => SiblingSide::Left,
        };
        assert!(!verify(&l[1], &bad_side, &root));
    }

    #[test]
    fn test_out_of_range_proof_index() {
        let tree = MerkleTree::build(&leaves(3)).unwrap();
        assert!(tree.inclusion_proof(3).is_none());
    }

    #[test]
    fn test_canonical_payload_sorts_keys() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        assert_eq!(leaf_hash(&a), leaf_hash(&b));
    }
}
