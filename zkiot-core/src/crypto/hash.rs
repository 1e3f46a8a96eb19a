//! Hash primitives
//!
//! Fixed keccak-256 digests and the canonical tuple encoding used by every
//! downstream hash in the protocol. The encoding is byte-stable: domain tags
//! are raw ASCII, strings carry a 4-byte big-endian length prefix, integers
//! are 8-byte big-endian, digests and nonces are raw fixed-width bytes.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest as Sha3Digest, Keccak256};
use std::fmt;
use thiserror::Error;

/// Length of all protocol digests in bytes
pub const DIGEST_LEN: usize = 32;

/// Error type for digest parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("invalid digest length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex string: {0}")]
    InvalidHex(String),
}

impl From<hex::FromHexError> for DigestError {
    fn from(err: hex::FromHexError) -> Self {
        DigestError::InvalidHex(err.to_string())
    }
}

/// 32-byte keccak-256 digest
///
/// Wire representation is lowercase hex with a `0x` prefix; comparison is
/// byte-wise equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest32(pub [u8; DIGEST_LEN]);

impl Digest32 {
    /// Create a digest from raw bytes
    pub fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a hex string, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, DigestError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        if bytes.len() != DIGEST_LEN {
            return Err(DigestError::InvalidLength {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; DIGEST_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Lowercase `0x`-prefixed hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Underlying bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// All-zero digest (null marker)
    pub fn zero() -> Self {
        Self([0u8; DIGEST_LEN])
    }

    /// Check for the all-zero digest
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest32({}...)", &self.to_hex()[..18])
    }
}

impl fmt::Display for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Digest32 {
    fn default() -> Self {
        Self::zero()
    }
}

impl Serialize for Digest32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Compute keccak-256 over raw bytes
pub fn keccak256(data: &[u8]) -> Digest32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut arr = [0u8; DIGEST_LEN];
    arr.copy_from_slice(&out);
    Digest32(arr)
}

/// Canonical tuple encoder
///
/// Builds the byte string hashed by the protocol. Field order is the caller's
/// responsibility; the encoder guarantees an unambiguous byte layout.
#[derive(Debug, Default)]
pub struct TupleEncoder {
    buf: Vec<u8>,
}

impl TupleEncoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append a fixed domain tag as raw ASCII bytes
    pub fn tag(mut self, tag: &str) -> Self {
        self.buf.extend_from_slice(tag.as_bytes());
        self
    }

    /// Append a string with a 4-byte big-endian length prefix
    pub fn str(mut self, s: &str) -> Self {
        self.buf
            .extend_from_slice(&(s.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// Append an integer as 8 big-endian bytes
    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Append fixed-width raw bytes (digests, nonces)
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Append a digest
    pub fn digest(self, d: &Digest32) -> Self {
        self.raw(&d.0)
    }

    /// Finish and hash the encoded tuple
    pub fn hash(self) -> Digest32 {
        keccak256(&self.buf)
    }

    /// Finish without hashing
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex_roundtrip() {
        let original = Digest32::new([0x42u8; 32]);
        let hex = original.to_hex();
        assert!(hex.starts_with("0x"));
        let parsed = Digest32::from_hex(&hex).unwrap();
        assert_eq!(original, parsed);

        // Bare hex is accepted too
        let parsed = Digest32::from_hex(hex.trim_start_matches("0x")).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_digest_rejects_bad_length() {
        assert!(matches!(
            Digest32::from_hex("0xdead"),
            Err(DigestError::InvalidLength { .. })
        ));
        assert!(Digest32::from_hex("not hex").is_err());
    }

    #[test]
    fn test_keccak_known_vector() {
        // keccak256("") from the Ethereum yellow paper
        let empty = keccak256(b"");
        assert_eq!(
            empty.to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_tuple_encoding_layout() {
        let bytes = TupleEncoder::new()
            .tag("COMMIT")
            .str("dev")
            .u64(7)
            .into_bytes();

        assert_eq!(&bytes[..6], b"COMMIT");
        assert_eq!(&bytes[6..10], &3u32.to_be_bytes());
        assert_eq!(&bytes[10..13], b"dev");
        assert_eq!(&bytes[13..21], &7u64.to_be_bytes());
    }

    #[test]
    fn test_encoding_is_unambiguous() {
        // "ab" + "c" must not collide with "a" + "bc"
        let left = TupleEncoder::new().str("ab").str("c").hash();
        let right = TupleEncoder::new().str("a").str("bc").hash();
        assert_ne!(left, right);
    }

    #[test]
    fn test_digest_serde_as_hex() {
        let d = keccak256(b"payload");
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.starts_with("\"0x"));
        let back: Digest32 = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
