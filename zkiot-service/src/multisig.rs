//! Multi-signature proposal state machine
//!
//! Threshold approval of sensitive operations. Every transition goes
//! through compare-and-set on the proposal document, so concurrent votes
//! resolve at the persistence layer; the losing writer reloads and retries.
//! Signatures are opaque here and checked by an injected predicate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;
use zkiot_core::constants::{CAS_MAX_RETRIES, PROPOSAL_SWEEP_SECS};
use zkiot_core::types::{
    EventKind, MultiSigProposal, ProposalKind, ProposalState, Signer, SignerVote,
};
use zkiot_store::{Store, StoreError};

use crate::auth::{AuthService, RegisterDevice};
use crate::error::{ServiceError, ServiceResult};
use crate::events::EventBus;
use crate::time::unix_now;

/// Predicate verifying an opaque signature for a signer over a proposal id
pub type SignaturePredicate =
    Arc<dyn Fn(&Signer, &str, &str) -> bool + Send + Sync>;

/// Accept-anything predicate for development and tests
pub fn permissive_signatures() -> SignaturePredicate {
    Arc::new(|_, signature, _| !signature.is_empty())
}

/// Execution hook for one proposal kind
#[async_trait]
pub trait ProposalHandler: Send + Sync {
    /// Execute the proposal payload, returning an artifact reference
    async fn execute(&self, payload: &serde_json::Value) -> ServiceResult<String>;
}

/// Payload shape for `REGISTER_DEVICE`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDevicePayload {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    /// Secret ciphertext; consumed by the registration path on execution
    pub secret: String,
}

/// Handler wiring `REGISTER_DEVICE` into the registration path
pub struct RegisterDeviceHandler {
    auth: Arc<AuthService>,
}

impl RegisterDeviceHandler {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl ProposalHandler for RegisterDeviceHandler {
    async fn execute(&self, payload: &serde_json::Value) -> ServiceResult<String> {
        let payload: RegisterDevicePayload = serde_json::from_value(payload.clone())
            .map_err(|e| ServiceError::Validation(format!("bad register payload: {}", e)))?;

        let device = self
            .auth
            .register(RegisterDevice {
                device_id: payload.device_id,
                device_name: payload.device_name,
                device_type: payload.device_type,
                secret: payload.secret,
            })
            .await?;
        Ok(device.device_id)
    }
}

/// The proposal lifecycle service
pub struct MultiSigService {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    verify_signature: SignaturePredicate,
    handlers: HashMap<ProposalKind, Arc<dyn ProposalHandler>>,
    running: AtomicBool,
}

impl MultiSigService {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<EventBus>,
        verify_signature: SignaturePredicate,
    ) -> Self {
        Self {
            store,
            bus,
            verify_signature,
            handlers: HashMap::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Register the execution hook for a proposal kind
    pub fn with_handler(
        mut self,
        kind: ProposalKind,
        handler: Arc<dyn ProposalHandler>,
    ) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    // ==================== Signers ====================

    pub async fn add_signer(&self, signer_id: &str, public_key: &str) -> ServiceResult<Signer> {
        if signer_id.is_empty() {
            return Err(ServiceError::Validation("signer_id must not be empty".into()));
        }
        let signer = Signer {
            signer_id: signer_id.to_string(),
            public_key: public_key.to_string(),
            added_at: unix_now(),
            is_active: true,
        };
        self.store.add_signer(&signer).await?;
        info!(signer_id, "signer added");
        Ok(signer)
    }

    pub async fn deactivate_signer(&self, signer_id: &str) -> ServiceResult<()> {
        Ok(self.store.deactivate_signer(signer_id).await?)
    }

    pub async fn list_signers(&self) -> ServiceResult<Vec<Signer>> {
        Ok(self.store.list_signers().await?)
    }

    // ==================== Lifecycle ====================

    /// Create a PENDING proposal
    pub async fn propose(
        &self,
        kind: ProposalKind,
        payload: serde_json::Value,
        required_approvals: u32,
        proposer: &str,
    ) -> ServiceResult<MultiSigProposal> {
        if required_approvals < 1 {
            return Err(ServiceError::Validation(
                "required_approvals must be at least 1".to_string(),
            ));
        }

        let proposal = MultiSigProposal::new(
            Uuid::new_v4().simple().to_string(),
            kind,
            payload,
            proposer.to_string(),
            required_approvals,
            unix_now(),
        );
        self.store.create_proposal(&proposal).await?;

        info!(proposal_id = %proposal.proposal_id, ?kind, "proposal created");
        self.bus
            .publish(
                EventKind::ProposalCreated,
                json!({
                    "proposal_id": proposal.proposal_id,
                    "kind": kind,
                    "required_approvals": required_approvals,
                    "expires_at": proposal.expires_at,
                }),
            )
            .await;

        Ok(proposal)
    }

    /// Approve; reaching the threshold transitions PENDING → APPROVED
    pub async fn approve(
        &self,
        proposal_id: &str,
        signer_id: &str,
        signature: &str,
    ) -> ServiceResult<MultiSigProposal> {
        let signer = self.active_signer(signer_id).await?;
        self.vote(proposal_id, &signer, signature, true).await
    }

    /// Reject; once approval is unreachable the proposal is REJECTED
    pub async fn reject(
        &self,
        proposal_id: &str,
        signer_id: &str,
        signature: &str,
    ) -> ServiceResult<MultiSigProposal> {
        let signer = self.active_signer(signer_id).await?;
        self.vote(proposal_id, &signer, signature, false).await
    }

    async fn active_signer(&self, signer_id: &str) -> ServiceResult<Signer> {
        let signer = self
            .store
            .list_signers()
            .await?
            .into_iter()
            .find(|s| s.signer_id == signer_id)
            .ok_or_else(|| ServiceError::NotFound(format!("signer {}", signer_id)))?;
        if !signer.is_active {
            return Err(ServiceError::Forbidden(format!(
                "signer {} is inactive",
                signer_id
            )));
        }
        Ok(signer)
    }

    async fn vote(
        &self,
        proposal_id: &str,
        signer: &Signer,
        signature: &str,
        approve: bool,
    ) -> ServiceResult<MultiSigProposal> {
        if !(self.verify_signature)(signer, signature, proposal_id) {
            return Err(ServiceError::Unauthenticated(format!(
                "signature of {} did not verify",
                signer.signer_id
            )));
        }

        let now = unix_now();
        let mut last_conflict = None;
        for _ in 0..CAS_MAX_RETRIES {
            let mut proposal = self.get_proposal(proposal_id).await?;

            if proposal.state == ProposalState::Pending && proposal.is_expired_at(now) {
                self.expire(proposal).await?;
                return Err(ServiceError::ConflictState {
                    current: ProposalState::Expired.as_str().to_string(),
                    message: format!("proposal {} has expired", proposal_id),
                });
            }
            if proposal.state != ProposalState::Pending {
                return Err(ServiceError::ConflictState {
                    current: proposal.state.as_str().to_string(),
                    message: format!(
                        "proposal {} is not pending",
                        proposal_id
                    ),
                });
            }

            // Idempotent by signer.
            if approve && proposal.has_approved(&signer.signer_id) {
                return Ok(proposal);
            }
            if !approve && proposal.has_rejected(&signer.signer_id) {
                return Ok(proposal);
            }
            // Approvals and rejections stay disjoint.
            if approve && proposal.has_rejected(&signer.signer_id) {
                return Err(ServiceError::ConflictState {
                    current: proposal.state.as_str().to_string(),
                    message: format!("{} already rejected", signer.signer_id),
                });
            }
            if !approve && proposal.has_approved(&signer.signer_id) {
                return Err(ServiceError::ConflictState {
                    current: proposal.state.as_str().to_string(),
                    message: format!("{} already approved", signer.signer_id),
                });
            }

            let vote = SignerVote {
                signer_id: signer.signer_id.clone(),
                signature: signature.to_string(),
                at: now,
            };
            let mut transition = None;
            if approve {
                proposal.approvals.push(vote);
                if proposal.approvals.len() as u32 >= proposal.required_approvals {
                    proposal.state = ProposalState::Approved;
                    transition = Some(EventKind::ProposalApproved);
                }
            } else {
                proposal.rejections.push(vote);
                let active = self.store.list_active_signers().await?.len() as u32;
                // Approval becomes unreachable once the remaining approvers
                // cannot meet the threshold.
                let unreachable_at = active.saturating_sub(proposal.required_approvals) + 1;
                if proposal.rejections.len() as u32 >= unreachable_at {
                    proposal.state = ProposalState::Rejected;
                    transition = Some(EventKind::ProposalRejected);
                }
            }

            match self
                .store
                .update_proposal_cas(ProposalState::Pending, &proposal)
                .await
            {
                Ok(()) => {
                    if let Some(kind) = transition {
                        info!(proposal_id, state = proposal.state.as_str(), "proposal transitioned");
                        self.bus
                            .publish(
                                kind,
                                json!({
                                    "proposal_id": proposal_id,
                                    "state": proposal.state,
                                    "approvals": proposal.approvals.len(),
                                    "rejections": proposal.rejections.len(),
                                }),
                            )
                            .await;
                    }
                    return Ok(proposal);
                }
                Err(StoreError::CasConflict(msg)) => {
                    warn!(proposal_id, "vote lost CAS race, retrying");
                    last_conflict = Some(msg);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::ConflictState {
            current: "unknown".to_string(),
            message: last_conflict.unwrap_or_else(|| "vote kept conflicting".to_string()),
        })
    }

    /// Execute an APPROVED proposal through its kind's handler
    ///
    /// Handler failure leaves the proposal APPROVED, so execution is
    /// retriable.
    pub async fn execute(&self, proposal_id: &str) -> ServiceResult<MultiSigProposal> {
        let now = unix_now();
        let proposal = self.get_proposal(proposal_id).await?;

        if proposal.state == ProposalState::Approved && proposal.is_expired_at(now) {
            self.expire(proposal).await?;
            return Err(ServiceError::ConflictState {
                current: ProposalState::Expired.as_str().to_string(),
                message: format!("proposal {} has expired", proposal_id),
            });
        }
        if proposal.state != ProposalState::Approved {
            return Err(ServiceError::ConflictState {
                current: proposal.state.as_str().to_string(),
                message: format!("proposal {} must be approved before execution", proposal_id),
            });
        }

        let handler = self
            .handlers
            .get(&proposal.kind)
            .ok_or_else(|| {
                ServiceError::Internal(format!("no handler for {:?}", proposal.kind))
            })?;

        // No locks held across the handler; it may call back into services.
        let artifact = handler.execute(&proposal.payload).await?;

        let mut executed = proposal;
        executed.state = ProposalState::Executed;
        executed.executed_at = Some(now);
        executed.artifact = Some(artifact.clone());
        self.store
            .update_proposal_cas(ProposalState::Approved, &executed)
            .await?;

        info!(proposal_id, artifact = %artifact, "proposal executed");
        self.bus
            .publish(
                EventKind::ProposalExecuted,
                json!({
                    "proposal_id": proposal_id,
                    "artifact": artifact,
                }),
            )
            .await;

        Ok(executed)
    }

    pub async fn get_proposal(&self, proposal_id: &str) -> ServiceResult<MultiSigProposal> {
        self.store
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("proposal {}", proposal_id)))
    }

    pub async fn list_proposals(
        &self,
        state: Option<ProposalState>,
    ) -> ServiceResult<Vec<MultiSigProposal>> {
        Ok(self.store.list_proposals(state).await?)
    }

    async fn expire(&self, proposal: MultiSigProposal) -> ServiceResult<()> {
        let from = proposal.state;
        let mut expired = proposal;
        expired.state = ProposalState::Expired;
        match self.store.update_proposal_cas(from, &expired).await {
            Ok(()) => {
                self.bus
                    .publish(
                        EventKind::ProposalExpired,
                        json!({ "proposal_id": expired.proposal_id }),
                    )
                    .await;
                Ok(())
            }
            // Someone else moved it first; their transition stands.
            Err(StoreError::CasConflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// One expiry pass over non-terminal proposals
    pub async fn sweep_once(&self, now: u64) -> ServiceResult<u64> {
        let mut expired = 0;
        for proposal in self.store.list_proposals(None).await? {
            if !proposal.state.is_terminal() && proposal.is_expired_at(now) {
                self.expire(proposal).await?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Run the expiry sweeper until `stop` is called
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(PROPOSAL_SWEEP_SECS));
            info!(interval_secs = PROPOSAL_SWEEP_SECS, "proposal sweeper started");
            while service.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                match service.sweep_once(unix_now()).await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "proposals expired"),
                    Err(e) => error!(error = %e, "proposal sweep failed"),
                }
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkiot_core::crypto::ZkpEngine;
    use zkiot_store::MemoryStore;

    struct Fixture {
        service: MultiSigService,
        store: Arc<dyn Store>,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::default());
        let auth = Arc::new(AuthService::new(
            store.clone(),
            ZkpEngine::default(),
            bus.clone(),
        ));
        let service = MultiSigService::new(store.clone(), bus, permissive_signatures())
            .with_handler(
                ProposalKind::RegisterDevice,
                Arc::new(RegisterDeviceHandler::new(auth)),
            );
        for signer in ["alice", "bob", "carol"] {
            service.add_signer(signer, "0x00").await.unwrap();
        }
        Fixture { service, store }
    }

    fn register_payload(device_id: &str) -> serde_json::Value {
        json!({
            "device_id": device_id,
            "device_name": "Sensor",
            "device_type": "industrial",
            "secret": "s3cr3t",
        })
    }

    #[tokio::test]
    async fn test_threshold_approval_then_execute() {
        let f = fixture().await;
        let proposal = f
            .service
            .propose(
                ProposalKind::RegisterDevice,
                register_payload("dev-ms"),
                2,
                "ops",
            )
            .await
            .unwrap();

        let after_a = f
            .service
            .approve(&proposal.proposal_id, "alice", "sig-a")
            .await
            .unwrap();
        assert_eq!(after_a.state, ProposalState::Pending);

        let after_b = f
            .service
            .approve(&proposal.proposal_id, "bob", "sig-b")
            .await
            .unwrap();
        assert_eq!(after_b.state, ProposalState::Approved);

        let executed = f.service.execute(&proposal.proposal_id).await.unwrap();
        assert_eq!(executed.state, ProposalState::Executed);
        assert_eq!(executed.artifact.as_deref(), Some("dev-ms"));

        // The device exists now.
        assert!(f.store.get_device("dev-ms").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rejection_threshold_is_unreachability() {
        let f = fixture().await;
        let proposal = f
            .service
            .propose(
                ProposalKind::RegisterDevice,
                register_payload("dev-rej"),
                2,
                "ops",
            )
            .await
            .unwrap();

        f.service
            .approve(&proposal.proposal_id, "alice", "sig")
            .await
            .unwrap();

        // 3 active signers, 2 required: the second rejection makes approval
        // unreachable.
        let after_b = f
            .service
            .reject(&proposal.proposal_id, "bob", "sig")
            .await
            .unwrap();
        assert_eq!(after_b.state, ProposalState::Pending);

        let after_c = f
            .service
            .reject(&proposal.proposal_id, "carol", "sig")
            .await
            .unwrap();
        assert_eq!(after_c.state, ProposalState::Rejected);

        // Terminal: no further execution.
        assert!(matches!(
            f.service.execute(&proposal.proposal_id).await,
            Err(ServiceError::ConflictState { .. })
        ));
    }

    #[tokio::test]
    async fn test_approve_is_idempotent_per_signer() {
        let f = fixture().await;
        let proposal = f
            .service
            .propose(
                ProposalKind::RegisterDevice,
                register_payload("dev-idem"),
                2,
                "ops",
            )
            .await
            .unwrap();

        f.service
            .approve(&proposal.proposal_id, "alice", "sig")
            .await
            .unwrap();
        let again = f
            .service
            .approve(&proposal.proposal_id, "alice", "sig")
            .await
            .unwrap();
        assert_eq!(again.approvals.len(), 1);
        assert_eq!(again.state, ProposalState::Pending);
    }

    #[tokio::test]
    async fn test_vote_sets_stay_disjoint() {
        let f = fixture().await;
        let proposal = f
            .service
            .propose(
                ProposalKind::RegisterDevice,
                register_payload("dev-dis"),
                2,
                "ops",
            )
            .await
            .unwrap();

        f.service
            .approve(&proposal.proposal_id, "alice", "sig")
            .await
            .unwrap();
        assert!(matches!(
            f.service.reject(&proposal.proposal_id, "alice", "sig").await,
            Err(ServiceError::ConflictState { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_signers() {
        let f = fixture().await;
        let proposal = f
            .service
            .propose(
                ProposalKind::RegisterDevice,
                register_payload("dev-sig"),
                2,
                "ops",
            )
            .await
            .unwrap();

        assert!(matches!(
            f.service.approve(&proposal.proposal_id, "mallory", "sig").await,
            Err(ServiceError::NotFound(_))
        ));

        f.service.deactivate_signer("carol").await.unwrap();
        assert!(matches!(
            f.service.approve(&proposal.proposal_id, "carol", "sig").await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_requires_approved() {
        let f = fixture().await;
        let proposal = f
            .service
            .propose(
                ProposalKind::RegisterDevice,
                register_payload("dev-x"),
                2,
                "ops",
            )
            .await
            .unwrap();
        assert!(matches!(
            f.service.execute(&proposal.proposal_id).await,
            Err(ServiceError::ConflictState { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_execution_is_retriable() {
        let f = fixture().await;
        // Payload that the handler rejects (missing fields).
        let proposal = f
            .service
            .propose(ProposalKind::RegisterDevice, json!({"nope": 1}), 1, "ops")
            .await
            .unwrap();
        f.service
            .approve(&proposal.proposal_id, "alice", "sig")
            .await
            .unwrap();

        assert!(f.service.execute(&proposal.proposal_id).await.is_err());
        // Still approved, not consumed.
        let current = f.service.get_proposal(&proposal.proposal_id).await.unwrap();
        assert_eq!(current.state, ProposalState::Approved);
    }

    #[tokio::test]
    async fn test_sweeper_expires_stale_proposals() {
        let f = fixture().await;
        let proposal = f
            .service
            .propose(
                ProposalKind::RegisterDevice,
                register_payload("dev-exp"),
                2,
                "ops",
            )
            .await
            .unwrap();

        let expired = f
            .service
            .sweep_once(proposal.expires_at + 1)
            .await
            .unwrap();
        assert_eq!(expired, 1);

        let current = f.service.get_proposal(&proposal.proposal_id).await.unwrap();
        assert_eq!(current.state, ProposalState::Expired);

        // Expiry is terminal.
        assert!(matches!(
            f.service.approve(&proposal.proposal_id, "alice", "sig").await,
            Err(ServiceError::ConflictState { .. })
        ));
    }

    #[tokio::test]
    async fn test_required_approvals_minimum() {
        let f = fixture().await;
        assert!(matches!(
            f.service
                .propose(ProposalKind::RegisterDevice, json!({}), 0, "ops")
                .await,
            Err(ServiceError::Validation(_))
        ));
    }
}
