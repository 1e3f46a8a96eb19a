//! ZK-IoT service layer
//!
//! Business services composing the core engines, the store and the chain
//! layer:
//!
//! - [`AuthService`]: registration, proof verification, telemetry intake
//! - [`AnchorPipeline`]: batch assembly under an exclusive lock plus the
//!   inclusion-proof service
//! - [`CrossChainDispatcher`]: parallel fan-out with per-chain outcome
//!   tracking and receipt watchers
//! - [`MultiSigService`]: the proposal state machine with CAS transitions
//! - [`PresenceTracker`]: heartbeat ingest and the liveness sweep
//! - [`EventBus`]: bounded fan-out to subscribers with ring history
//!
//! There is no process-wide state here: everything is constructed
//! explicitly and injected into the facade.

pub mod anchor;
pub mod auth;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod multisig;
pub mod presence;
pub mod time;

pub use anchor::{AnchorOutcome, AnchorPipeline, AnchorPolicy, VerifyReport};
pub use auth::{AuthService, RegisterDevice, SubmitOutcome};
pub use dispatch::{CrossChainDispatcher, DispatchEntry, SyncStatus};
pub use error::{ServiceError, ServiceResult};
pub use events::EventBus;
pub use multisig::{
    permissive_signatures, MultiSigService, ProposalHandler, RegisterDeviceHandler,
    RegisterDevicePayload, SignaturePredicate,
};
pub use presence::{PresenceConfig, PresenceTracker};
pub use time::unix_now;
