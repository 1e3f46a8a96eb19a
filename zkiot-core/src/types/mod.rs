//! Domain types for the trust-anchor service

pub mod device;
pub mod event;
pub mod presence;
pub mod proposal;
pub mod telemetry;

pub use device::{validate_device_id, Device};
pub use event::{Event, EventKind};
pub use presence::{status_at, PresenceRecord, PresenceStatus};
pub use proposal::{MultiSigProposal, ProposalKind, ProposalState, Signer, SignerVote};
pub use telemetry::{AnchorStatus, ChainAnchor, MerkleBatch, PendingDatum};
