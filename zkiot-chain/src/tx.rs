//! Transaction encoding and signing
//!
//! Legacy (pre-EIP-1559) transactions with EIP-155 replay protection:
//! the sighash covers `(nonce, gas_price, gas, to, value, data, chain_id, 0, 0)`
//! and the recovery value is `chain_id * 2 + 35 + rec_id`. Also carries the
//! ABI encoding for the anchor call and the decoder for its event.

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::Serialize;
use zkiot_core::crypto::{keccak256, Digest32};

use crate::error::{ChainError, ChainResult};
use crate::rpc::LogEntry;

// ============================================================================
// RLP
// ============================================================================

/// RLP-encode a byte string
fn rlp_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return bytes.to_vec();
    }
    if bytes.len() <= 55 {
        let mut out = vec![0x80 + bytes.len() as u8];
        out.extend_from_slice(bytes);
        return out;
    }
    let len_bytes = minimal_be(bytes.len() as u128);
    let mut out = vec![0xb7 + len_bytes.len() as u8];
    out.extend_from_slice(&len_bytes);
    out.extend_from_slice(bytes);
    out
}

/// RLP-encode an unsigned integer (minimal big-endian, zero is empty)
fn rlp_uint(v: u128) -> Vec<u8> {
    rlp_bytes(&minimal_be(v))
}

/// RLP-encode a list of already-encoded items
fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(|i| i.len()).sum();
    let mut payload = Vec::with_capacity(payload_len);
    for item in items {
        payload.extend_from_slice(item);
    }
    if payload_len <= 55 {
        let mut out = vec![0xc0 + payload_len as u8];
        out.extend_from_slice(&payload);
        return out;
    }
    let len_bytes = minimal_be(payload_len as u128);
    let mut out = vec![0xf7 + len_bytes.len() as u8];
    out.extend_from_slice(&len_bytes);
    out.extend_from_slice(&payload);
    out
}

/// Minimal big-endian byte form of an integer; empty for zero
fn minimal_be(v: u128) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

/// Strip leading zeros from a fixed-width big-endian value
fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

// ============================================================================
// Keys and addresses
// ============================================================================

/// Parse a hex secp256k1 key into a signing key
pub fn parse_signing_key(hex_key: &str) -> ChainResult<SigningKey> {
    let stripped = hex_key.strip_prefix("0x").unwrap_or(hex_key);
    let bytes = hex::decode(stripped).map_err(|e| ChainError::InvalidKey(e.to_string()))?;
    SigningKey::from_slice(&bytes).map_err(|e| ChainError::InvalidKey(e.to_string()))
}

/// Derive the 20-byte sender address for a signing key
pub fn signer_address(key: &SigningKey) -> [u8; 20] {
    let point = key.verifying_key().to_encoded_point(false);
    // Skip the 0x04 uncompressed marker, hash the 64-byte public key.
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest.as_bytes()[12..]);
    address
}

/// Parse a `0x` hex address
pub fn parse_address(s: &str) -> ChainResult<[u8; 20]> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|e| ChainError::Encoding(e.to_string()))?;
    if bytes.len() != 20 {
        return Err(ChainError::Encoding(format!(
            "address must be 20 bytes, got {}",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 20];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Format an address for the wire
pub fn format_address(address: &[u8; 20]) -> String {
    format!("0x{}", hex::encode(address))
}

// ============================================================================
// Legacy transaction
// ============================================================================

/// An unsigned legacy transaction
#[derive(Debug, Clone)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: [u8; 20],
    pub value: u128,
    pub data: Vec<u8>,
}

impl LegacyTransaction {
    fn base_fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp_uint(self.nonce as u128),
            rlp_uint(self.gas_price),
            rlp_uint(self.gas_limit as u128),
            rlp_bytes(&self.to),
            rlp_uint(self.value),
            rlp_bytes(&self.data),
        ]
    }

    /// EIP-155 signing hash
    pub fn sighash(&self, chain_id: u64) -> Digest32 {
        let mut fields = self.base_fields();
        fields.push(rlp_uint(chain_id as u128));
        fields.push(rlp_uint(0));
        fields.push(rlp_uint(0));
        keccak256(&rlp_list(&fields))
    }

    /// Sign and return the raw transaction bytes for `eth_sendRawTransaction`
    pub fn sign(&self, chain_id: u64, key: &SigningKey) -> ChainResult<Vec<u8>> {
        let sighash = self.sighash(chain_id);
        let (signature, rec_id) = key
            .sign_prehash_recoverable(sighash.as_bytes())
            .map_err(|e| ChainError::InvalidKey(e.to_string()))?;

        let v = chain_id * 2 + 35 + rec_id.to_byte() as u64;
        let r = strip_leading_zeros(&signature.r().to_bytes());
        let s = strip_leading_zeros(&signature.s().to_bytes());

        let mut fields = self.base_fields();
        fields.push(rlp_uint(v as u128));
        fields.push(rlp_bytes(&r));
        fields.push(rlp_bytes(&s));
        Ok(rlp_list(&fields))
    }
}

// ============================================================================
// Anchor call ABI
// ============================================================================

/// Solidity signature of the anchor entry point
pub const ANCHOR_FN_SIGNATURE: &str = "anchorRoot(bytes32,uint256,string)";

/// Solidity signature of the emitted event (root is indexed)
pub const ANCHOR_EVENT_SIGNATURE: &str = "RootAnchored(bytes32,uint256,uint256)";

/// Decoded `RootAnchored` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchoredRootEvent {
    pub root: Digest32,
    pub batch_id: u64,
    pub leaf_count: u64,
}

fn abi_word_u128(v: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&v.to_be_bytes());
    word
}

/// Four-byte selector for a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&digest.as_bytes()[..4]);
    sel
}

/// Topic hash for the anchor event
pub fn anchor_event_topic() -> Digest32 {
    keccak256(ANCHOR_EVENT_SIGNATURE.as_bytes())
}

/// ABI-encode `anchorRoot(root, leaf_count, metadata)` calldata
pub fn encode_anchor_call(root: &Digest32, leaf_count: u64, metadata: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * 5);
    data.extend_from_slice(&selector(ANCHOR_FN_SIGNATURE));

    // Head: root, leaf_count, offset of the dynamic string.
    data.extend_from_slice(root.as_bytes());
    data.extend_from_slice(&abi_word_u128(leaf_count as u128));
    data.extend_from_slice(&abi_word_u128(0x60));

    // Tail: string length then contents padded to a word boundary.
    let bytes = metadata.as_bytes();
    data.extend_from_slice(&abi_word_u128(bytes.len() as u128));
    data.extend_from_slice(bytes);
    let rem = bytes.len() % 32;
    if rem != 0 {
        data.extend(std::iter::repeat(0u8).take(32 - rem));
    }
    data
}

/// Decode a `RootAnchored` log entry
pub fn decode_anchor_event(log: &LogEntry) -> ChainResult<AnchoredRootEvent> {
    let topic0 = log
        .topics
        .first()
        .ok_or_else(|| ChainError::Encoding("log has no topics".to_string()))?;
    if Digest32::from_hex(topic0).map_err(|e| ChainError::Encoding(e.to_string()))?
        != anchor_event_topic()
    {
        return Err(ChainError::Encoding("not a RootAnchored event".to_string()));
    }

    let root_topic = log
        .topics
        .get(1)
        .ok_or_else(|| ChainError::Encoding("missing root topic".to_string()))?;
    let root = Digest32::from_hex(root_topic).map_err(|e| ChainError::Encoding(e.to_string()))?;

    let data = hex::decode(log.data.strip_prefix("0x").unwrap_or(&log.data))
        .map_err(|e| ChainError::Encoding(e.to_string()))?;
    if data.len() < 64 {
        return Err(ChainError::Encoding(format!(
            "event data too short: {} bytes",
            data.len()
        )));
    }

    let word_u64 = |word: &[u8]| -> ChainResult<u64> {
        if word[..24].iter().any(|&b| b != 0) {
            return Err(ChainError::Encoding("event value overflows u64".to_string()));
        }
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&word[24..32]);
        Ok(u64::from_be_bytes(arr))
    };

    Ok(AnchoredRootEvent {
        root,
        batch_id: word_u64(&data[0..32])?,
        leaf_count: word_u64(&data[32..64])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rlp_primitives() {
        // Canonical vectors from the RLP spec.
        assert_eq!(rlp_bytes(b"dog"), vec![0x83, b'd', b'o', b'g']);
        assert_eq!(rlp_bytes(&[0x7f]), vec![0x7f]);
        assert_eq!(rlp_bytes(&[0x80]), vec![0x81, 0x80]);
        assert_eq!(rlp_uint(0), vec![0x80]);
        assert_eq!(rlp_uint(15), vec![0x0f]);
        assert_eq!(rlp_uint(1024), vec![0x82, 0x04, 0x00]);
        assert_eq!(
            rlp_list(&[rlp_bytes(b"cat"), rlp_bytes(b"dog")]),
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
        assert_eq!(rlp_list(&[]), vec![0xc0]);

        let long = vec![0xaau8; 56];
        let encoded = rlp_bytes(&long);
        assert_eq!(encoded[0], 0xb8);
        assert_eq!(encoded[1], 56);
    }

    #[test]
    fn test_signer_address_known_key() {
        // Hardhat account #0.
        let key = parse_signing_key(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        assert_eq!(
            format_address(&signer_address(&key)),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_sign_produces_valid_v() {
        let key = parse_signing_key(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        let tx = LegacyTransaction {
            nonce: 0,
            gas_price: 1_000_000_000,
            gas_limit: 21_000,
            to: [0x11; 20],
            value: 1,
            data: vec![],
        };
        let raw = tx.sign(31_337, &key).unwrap();
        // A signed tx is an RLP list and deterministic for the same inputs.
        assert!(raw[0] >= 0xc0);
        assert_eq!(raw, tx.sign(31_337, &key).unwrap());
        // Different chain ids change the signature.
        assert_ne!(raw, tx.sign(1, &key).unwrap());
    }

    #[test]
    fn test_anchor_calldata_layout() {
        let root = keccak256(b"root");
        let data = encode_anchor_call(&root, 3, "batch-1");

        assert_eq!(&data[..4], &selector(ANCHOR_FN_SIGNATURE));
        assert_eq!(&data[4..36], root.as_bytes());
        assert_eq!(&data[36..68], &abi_word_u128(3));
        assert_eq!(&data[68..100], &abi_word_u128(0x60));
        assert_eq!(&data[100..132], &abi_word_u128(7));
        assert_eq!(&data[132..139], b"batch-1");
        // Padded to a full word.
        assert_eq!(data.len(), 132 + 32);
    }

    #[test]
    fn test_anchor_event_roundtrip() {
        let root = keccak256(b"root");
        let mut data = Vec::new();
        data.extend_from_slice(&abi_word_u128(42));
        data.extend_from_slice(&abi_word_u128(3));
        let log = LogEntry {
            address: "0x0000000000000000000000000000000000000001".to_string(),
            topics: vec![anchor_event_topic().to_hex(), root.to_hex()],
            data: format!("0x{}", hex::encode(data)),
        };

        let event = decode_anchor_event(&log).unwrap();
        assert_eq!(event.root, root);
        assert_eq!(event.batch_id, 42);
        assert_eq!(event.leaf_count, 3);
    }

    #[test]
    fn test_decode_rejects_foreign_event() {
        let log = LogEntry {
            address: String::new(),
            topics: vec![keccak256(b"Other()").to_hex()],
            data: "0x".to_string(),
        };
        assert!(decode_anchor_event(&log).is_err());
    }
}
