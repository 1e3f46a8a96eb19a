//! Multi-signature proposal types

use crate::constants::PROPOSAL_TTL_SECS;
use serde::{Deserialize, Serialize};

/// Operation kinds executable through the multi-sig path
///
/// The enum is open for extension; each kind resolves to a registered
/// execution handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    RegisterDevice,
}

/// Proposal lifecycle states
///
/// PENDING → {APPROVED, REJECTED, EXPIRED}; APPROVED → {EXECUTED, EXPIRED}.
/// REJECTED, EXECUTED and EXPIRED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Pending,
    Approved,
    Rejected,
    Executed,
    Expired,
}

impl ProposalState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Rejected | ProposalState::Executed | ProposalState::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalState::Pending => "pending",
            ProposalState::Approved => "approved",
            ProposalState::Rejected => "rejected",
            ProposalState::Executed => "executed",
            ProposalState::Expired => "expired",
        }
    }
}

/// A recorded approval or rejection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerVote {
    pub signer_id: String,
    /// Opaque signature over the proposal id; verified by an injected
    /// predicate, not by the state machine
    pub signature: String,
    pub at: u64,
}

/// A multi-sig proposal awaiting threshold approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSigProposal {
    /// Random 128-bit identifier, hex
    pub proposal_id: String,
    pub kind: ProposalKind,
    /// Arguments for the execution handler (kind-specific shape)
    pub payload: serde_json::Value,
    pub proposer: String,
    pub required_approvals: u32,
    pub approvals: Vec<SignerVote>,
    pub rejections: Vec<SignerVote>,
    pub state: ProposalState,
    pub created_at: u64,
    pub expires_at: u64,
    pub executed_at: Option<u64>,
    /// Reference to the artifact produced by execution (e.g. a device id)
    pub artifact: Option<String>,
}

impl MultiSigProposal {
    pub fn new(
        proposal_id: String,
        kind: ProposalKind,
        payload: serde_json::Value,
        proposer: String,
        required_approvals: u32,
        created_at: u64,
    ) -> Self {
        Self {
            proposal_id,
            kind,
            payload,
            proposer,
            required_approvals,
            approvals: Vec::new(),
            rejections: Vec::new(),
            state: ProposalState::Pending,
            created_at,
            expires_at: created_at + PROPOSAL_TTL_SECS,
            executed_at: None,
            artifact: None,
        }
    }

    pub fn has_approved(&self, signer_id: &str) -> bool {
        self.approvals.iter().any(|v| v.signer_id == signer_id)
    }

    pub fn has_rejected(&self, signer_id: &str) -> bool {
        self.rejections.iter().any(|v| v.signer_id == signer_id)
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// An authorized multi-sig signer
///
/// Removal is soft: `is_active = false` keeps the audit trail intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub signer_id: String,
    /// Opaque public key bytes, hex
    pub public_key: String,
    pub added_at: u64,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_states() {
        assert!(!ProposalState::Pending.is_terminal());
        assert!(!ProposalState::Approved.is_terminal());
        assert!(ProposalState::Rejected.is_terminal());
        assert!(ProposalState::Executed.is_terminal());
        assert!(ProposalState::Expired.is_terminal());
    }

    #[test]
    fn test_expiry_is_seven_days() {
        let p = MultiSigProposal::new(
            "p1".into(),
            ProposalKind::RegisterDevice,
            json!({}),
            "ops".into(),
            2,
            1_700_000_000,
        );
        assert_eq!(p.expires_at - p.created_at, 7 * 24 * 3600);
        assert!(!p.is_expired_at(p.expires_at));
        assert!(p.is_expired_at(p.expires_at + 1));
    }

    #[test]
    fn test_vote_lookups() {
        let mut p = MultiSigProposal::new(
            "p1".into(),
            ProposalKind::RegisterDevice,
            json!({}),
            "ops".into(),
            2,
            0,
        );
        p.approvals.push(SignerVote {
            signer_id: "alice".into(),
            signature: "0x00".into(),
            at: 1,
        });
        assert!(p.has_approved("alice"));
        assert!(!p.has_rejected("alice"));
        assert!(!p.has_approved("bob"));
    }
}
