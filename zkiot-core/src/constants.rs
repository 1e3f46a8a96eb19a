//! Protocol constants
//!
//! Centralized defaults and limits. Every tunable here can be overridden
//! through the environment by the owning component's config loader.

// ============================================================================
// Identity & proofs
// ============================================================================

/// Maximum device identifier length
pub const DEVICE_ID_MAX_LEN: usize = 64;

/// Proof validity window in seconds (staleness and replay TTL)
pub const VALIDITY_WINDOW_SECS: u64 = 300;

/// Challenge nonce length in bytes
pub const NONCE_LEN: usize = 16;

// ============================================================================
// Presence
// ============================================================================

/// Heartbeat age below which a device is ONLINE (seconds)
pub const LIVE_WINDOW_SECS: u64 = 60;

/// Heartbeat age below which a device is IDLE (seconds)
pub const IDLE_WINDOW_SECS: u64 = 300;

/// Presence sweep cadence (seconds)
pub const PRESENCE_SWEEP_SECS: u64 = 15;

// ============================================================================
// Event bus
// ============================================================================

/// Bounded ring size for cold event history
pub const EVENT_HISTORY: usize = 100;

/// Per-subscriber send queue bound; a subscriber exceeding it is dropped
pub const MAX_SUB_QUEUE: usize = 256;

// ============================================================================
// Chain I/O
// ============================================================================

/// Per-call RPC deadline (seconds)
pub const RPC_TIMEOUT_SECS: u64 = 20;

/// Receipt-watch deadline per anchor dispatch (seconds)
pub const CONFIRM_TIMEOUT_SECS: u64 = 180;

/// Attempt cap for transient RPC errors
pub const MAX_RPC_ATTEMPTS: u32 = 5;

/// Backoff ceiling between RPC attempts (seconds)
pub const MAX_RPC_BACKOFF_SECS: u64 = 30;

/// Receipt poll interval while waiting for inclusion (seconds)
pub const RECEIPT_POLL_SECS: u64 = 3;

// ============================================================================
// Anchoring policy
// ============================================================================

/// Pending-leaf count that triggers automatic batch assembly
pub const ANCHOR_THRESHOLD_LEAVES: usize = 64;

/// Age of the oldest pending datum that triggers assembly (seconds)
pub const ANCHOR_THRESHOLD_AGE_SECS: u64 = 300;

/// Trigger-policy evaluation cadence (seconds)
pub const ANCHOR_SWEEP_SECS: u64 = 30;

// ============================================================================
// Multi-sig
// ============================================================================

/// Proposal lifetime before expiry (seconds)
pub const PROPOSAL_TTL_SECS: u64 = 7 * 24 * 3600;

/// Expiry sweep cadence (seconds)
pub const PROPOSAL_SWEEP_SECS: u64 = 60;

// ============================================================================
// Persistence
// ============================================================================

/// Retry cap for compare-and-set conflicts within one request
pub const CAS_MAX_RETRIES: u32 = 5;
