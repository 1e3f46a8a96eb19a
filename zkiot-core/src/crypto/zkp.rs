//! Commitment-based device authentication
//!
//! Implements the SIMPLE identification scheme: an HMAC-style proof with
//! timestamp binding and replay detection. The engine is polymorphic over a
//! tagged proof sum so SNARK/STARK back-ends can slot in behind the same
//! generate/verify contract; only SIMPLE has a verifier today.
//!
//! Registration stores `H("COMMIT" ‖ device_id ‖ H(secret))` and nothing
//! else; the secret never reaches persistence.

use crate::constants::{NONCE_LEN, VALIDITY_WINDOW_SECS};
use crate::crypto::hash::{keccak256, Digest32, TupleEncoder};
use rand::RngCore;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

/// Authentication failure taxonomy
///
/// The category is the only information disclosed to callers; nothing about
/// which byte of the proof mismatched leaks past `BadProof`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("proof timestamp is outside the validity window")]
    StaleProof,

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("device is inactive: {0}")]
    InactiveDevice(String),

    #[error("proof verification failed")]
    BadProof,

    #[error("proof was already used within its validity window")]
    Replay,

    #[error("unsupported proof scheme: {0}")]
    UnsupportedScheme(String),
}

/// 16-byte random challenge nonce, hex on the wire
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce16(pub [u8; NONCE_LEN]);

impl Nonce16 {
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, String> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| e.to_string())?;
        if bytes.len() != NONCE_LEN {
            return Err(format!("nonce must be {} bytes", NONCE_LEN));
        }
        let mut arr = [0u8; NONCE_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Nonce16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce16({})", self.to_hex())
    }
}

impl Serialize for Nonce16 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Nonce16 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// SIMPLE-scheme proof material
///
/// `secret_hash` is `H(secret)`: the verifier re-derives the public
/// commitment from it rather than storing it, and `response` binds the
/// attempt to `(device_id, nonce, t)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleProof {
    pub device_id: String,
    pub secret_hash: Digest32,
    pub nonce: Nonce16,
    pub timestamp: u64,
    pub response: Digest32,
}

/// Tagged proof sum over the declared schemes
///
/// SNARK and STARK are named extension points; submissions carrying them are
/// rejected until a real verifier backs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthProof {
    Simple(SimpleProof),
    Snark { proof: serde_json::Value },
    Stark { proof: serde_json::Value },
}

impl AuthProof {
    pub fn scheme_name(&self) -> &'static str {
        match self {
            AuthProof::Simple(_) => "simple",
            AuthProof::Snark { .. } => "snark",
            AuthProof::Stark { .. } => "stark",
        }
    }
}

/// `H(secret)` for a device secret
pub fn secret_hash(secret: &str) -> Digest32 {
    keccak256(secret.as_bytes())
}

/// `H("COMMIT" ‖ device_id ‖ H(secret))`
pub fn commitment(device_id: &str, secret: &str) -> Digest32 {
    commitment_from_hash(device_id, &secret_hash(secret))
}

/// Commitment re-derived from an already-hashed secret
pub fn commitment_from_hash(device_id: &str, secret_hash: &Digest32) -> Digest32 {
    TupleEncoder::new()
        .tag("COMMIT")
        .str(device_id)
        .digest(secret_hash)
        .hash()
}

/// `H("CHAL" ‖ device_id ‖ nonce ‖ t_be8)`
pub fn challenge(device_id: &str, nonce: &Nonce16, t: u64) -> Digest32 {
    TupleEncoder::new()
        .tag("CHAL")
        .str(device_id)
        .raw(&nonce.0)
        .u64(t)
        .hash()
}

/// `H(H(secret) ‖ challenge)`
pub fn response(secret_hash: &Digest32, challenge: &Digest32) -> Digest32 {
    TupleEncoder::new()
        .digest(secret_hash)
        .digest(challenge)
        .hash()
}

/// Replay-cache key: `H(device_id ‖ nonce ‖ t_be8)`
pub fn attempt_key(device_id: &str, nonce: &Nonce16, t: u64) -> Digest32 {
    TupleEncoder::new()
        .str(device_id)
        .raw(&nonce.0)
        .u64(t)
        .hash()
}

/// TTL cache of accepted authentication attempts
///
/// Entries expire at the validity window, so the cache is bounded by the
/// window times the authentication rate. Purging happens inline on insert.
#[derive(Debug)]
pub struct ReplayCache {
    ttl_secs: u64,
    seen: Mutex<HashMap<Digest32, u64>>,
}

impl ReplayCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt at time `now`; returns false if the key was already
    /// present and unexpired.
    pub fn insert(&self, key: Digest32, now: u64) -> bool {
        let mut seen = self.seen.lock().expect("replay cache poisoned");
        let ttl = self.ttl_secs;
        seen.retain(|_, inserted_at| now.saturating_sub(*inserted_at) <= ttl);

        if seen.contains_key(&key) {
            return false;
        }
        seen.insert(key, now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().expect("replay cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The SIMPLE-scheme engine: commitment issuance, proof generation,
/// verification and replay defense.
#[derive(Debug)]
pub struct ZkpEngine {
    validity_window_secs: u64,
    replay: ReplayCache,
}

impl Default for ZkpEngine {
    fn default() -> Self {
        Self::new(VALIDITY_WINDOW_SECS)
    }
}

impl ZkpEngine {
    pub fn new(validity_window_secs: u64) -> Self {
        Self {
            validity_window_secs,
            replay: ReplayCache::new(validity_window_secs),
        }
    }

    pub fn validity_window_secs(&self) -> u64 {
        self.validity_window_secs
    }

    /// Derive the public commitment stored at registration
    pub fn register(&self, device_id: &str, secret: &str) -> Digest32 {
        commitment(device_id, secret)
    }

    /// Generate a SIMPLE proof for `device_id` at time `t`
    pub fn generate(&self, device_id: &str, secret: &str, t: u64) -> AuthProof {
        let sh = secret_hash(secret);
        let nonce = Nonce16::random();
        let chal = challenge(device_id, &nonce, t);
        AuthProof::Simple(SimpleProof {
            device_id: device_id.to_string(),
            secret_hash: sh,
            nonce,
            timestamp: t,
            response: response(&sh, &chal),
        })
    }

    /// Verify a proof against the stored commitment at `t_verify`
    ///
    /// Device lookup and activity checks belong to the caller; this method
    /// covers staleness, the commitment equation, the response binding and
    /// replay, in that order.
    pub fn verify(
        &self,
        proof: &AuthProof,
        stored_commitment: &Digest32,
        t_verify: u64,
    ) -> Result<(), AuthError> {
        let simple = match proof {
            AuthProof::Simple(p) => p,
            other => {
                return Err(AuthError::UnsupportedScheme(
                    other.scheme_name().to_string(),
                ))
            }
        };

        if t_verify.abs_diff(simple.timestamp) > self.validity_window_secs {
            return Err(AuthError::StaleProof);
        }

        let derived = commitment_from_hash(&simple.device_id, &simple.secret_hash);
        if &derived != stored_commitment {
            return Err(AuthError::BadProof);
        }

        let chal = challenge(&simple.device_id, &simple.nonce, simple.timestamp);
        if response(&simple.secret_hash, &chal) != simple.response {
            return Err(AuthError::BadProof);
        }

        let key = attempt_key(&simple.device_id, &simple.nonce, simple.timestamp);
        if !self.replay.insert(key, t_verify) {
            return Err(AuthError::Replay);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: u64 = 1_700_000_000;

    #[test]
    fn test_commitment_is_deterministic() {
        let a = commitment("dev-001", "s3cr3t");
        let b = commitment("dev-001", "s3cr3t");
        assert_eq!(a, b);
        assert_ne!(a, commitment("dev-002", "s3cr3t"));
        assert_ne!(a, commitment("dev-001", "other"));
    }

    #[test]
    fn test_generated_proof_verifies() {
        let engine = ZkpEngine::default();
        let stored = engine.register("dev-001", "s3cr3t");
        let proof = engine.generate("dev-001", "s3cr3t", T);
        assert!(engine.verify(&proof, &stored, T).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_bad_proof() {
        let engine = ZkpEngine::default();
        let stored = engine.register("dev-001", "s3cr3t");
        let proof = engine.generate("dev-001", "wrong", T);
        assert_eq!(engine.verify(&proof, &stored, T), Err(AuthError::BadProof));
    }

    #[test]
    fn test_tampered_fields_fail() {
        let engine = ZkpEngine::default();
        let stored = engine.register("dev-001", "s3cr3t");

        let base = match engine.generate("dev-001", "s3cr3t", T) {
            AuthProof::Simple(p) => p,
            _ => unreachable!(),
        };

        let mut flipped_response = base.clone();
        flipped_response.response.0[0] ^= 0x01;
        assert_eq!(
            engine.verify(&AuthProof::Simple(flipped_response), &stored, T),
            Err(AuthError::BadProof)
        );

        let mut flipped_nonce = base.clone();
        flipped_nonce.nonce.0[0] ^= 0x01;
        assert_eq!(
            engine.verify(&AuthProof::Simple(flipped_nonce), &stored, T),
            Err(AuthError::BadProof)
        );

        let mut shifted_t = base.clone();
        shifted_t.timestamp += 1;
        assert_eq!(
            engine.verify(&AuthProof::Simple(shifted_t), &stored, T),
            Err(AuthError::BadProof)
        );

        let mut other_device = base;
        other_device.device_id = "dev-002".to_string();
        assert_eq!(
            engine.verify(&AuthProof::Simple(other_device), &stored, T),
            Err(AuthError::BadProof)
        );
    }

    #[test]
    fn test_stale_proof_outside_window() {
        let engine = ZkpEngine::default();
        let stored = engine.register("dev-001", "s3cr3t");
        let proof = engine.generate("dev-001", "s3cr3t", T);
        assert_eq!(
            engine.verify(&proof, &stored, T + 3600),
            Err(AuthError::StaleProof)
        );
    }

    #[test]
    fn test_replay_within_window() {
        let engine = ZkpEngine::default();
        let stored = engine.register("dev-001", "s3cr3t");
        let proof = engine.generate("dev-001", "s3cr3t", T);

        assert!(engine.verify(&proof, &stored, T).is_ok());
        assert_eq!(engine.verify(&proof, &stored, T), Err(AuthError::Replay));
    }

    #[test]
    fn test_after_window_staleness_wins_over_replay() {
        let engine = ZkpEngine::new(300);
        let stored = engine.register("dev-001", "s3cr3t");
        let proof = engine.generate("dev-001", "s3cr3t", T);
        assert!(engine.verify(&proof, &stored, T).is_ok());

        // Past the window the same proof is stale, not a replay.
        assert_eq!(
            engine.verify(&proof, &stored, T + 301),
            Err(AuthError::StaleProof)
        );
    }

    #[test]
    fn test_replay_cache_eviction() {
        let cache = ReplayCache::new(300);
        let key = attempt_key("dev-001", &Nonce16([1u8; 16]), T);
        assert!(cache.insert(key, T));
        assert!(!cache.insert(key, T + 100));
        // Expired entries are purged and the key is accepted again.
        assert!(cache.insert(key, T + 1000));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_snark_scheme_is_name_only() {
        let engine = ZkpEngine::default();
        let stored = engine.register("dev-001", "s3cr3t");
        let proof = AuthProof::Snark {
            proof: serde_json::json!({"a": [1, 2]}),
        };
        assert_eq!(
            engine.verify(&proof, &stored, T),
            Err(AuthError::UnsupportedScheme("snark".to_string()))
        );
    }

    #[test]
    fn test_proof_serde_tagging() {
        let engine = ZkpEngine::default();
        let proof = engine.generate("dev-001", "s3cr3t", T);
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["scheme"], "simple");
        let back: AuthProof = serde_json::from_value(json).unwrap();
        assert_eq!(proof, back);
    }
}
