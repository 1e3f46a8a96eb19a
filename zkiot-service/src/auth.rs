//! Device registration, authentication and telemetry intake
//!
//! Composes the proof engine, the store and the event bus. The device
//! secret exists only inside the registration and proof-generation calls;
//! persistence only ever sees the public commitment.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use zkiot_core::crypto::merkle::leaf_hash;
use zkiot_core::crypto::{AuthProof, ZkpEngine};
use zkiot_core::types::{validate_device_id, Device, EventKind, PendingDatum};
use zkiot_store::Store;

use crate::error::{ServiceError, ServiceResult};
use crate::events::EventBus;
use crate::time::unix_now;

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDevice {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    /// Never persisted; consumed for commitment derivation only
    pub secret: String,
}

/// Accepted telemetry and the current backlog
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub datum: PendingDatum,
    pub pending_count: u64,
}

/// Registration and authentication service
pub struct AuthService {
    store: Arc<dyn Store>,
    engine: ZkpEngine,
    bus: Arc<EventBus>,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, engine: ZkpEngine, bus: Arc<EventBus>) -> Self {
        Self { store, engine, bus }
    }

    pub fn engine(&self) -> &ZkpEngine {
        &self.engine
    }

    /// Register a device and store its public commitment
    pub async fn register(&self, request: RegisterDevice) -> ServiceResult<Device> {
        validate_device_id(&request.device_id)?;
        if request.secret.is_empty() {
            return Err(ServiceError::Validation("secret must not be empty".to_string()));
        }
        if request.device_name.is_empty() {
            return Err(ServiceError::Validation(
                "device_name must not be empty".to_string(),
            ));
        }

        let commitment = self.engine.register(&request.device_id, &request.secret);
        let device = Device::new(
            request.device_id.clone(),
            request.device_name,
            request.device_type,
            commitment,
            unix_now(),
        );

        self.store.put_new_device(&device).await.map_err(|e| match e {
            zkiot_store::StoreError::AlreadyExists(id) => ServiceError::DeviceExists(id),
            other => other.into(),
        })?;

        info!(device_id = %device.device_id, "device registered");
        self.bus
            .publish(
                EventKind::DeviceRegistered,
                json!({
                    "device_id": device.device_id,
                    "device_type": device.device_type,
                    "public_commitment": device.public_commitment,
                }),
            )
            .await;

        Ok(device)
    }

    /// Verify a proof at the current time
    pub async fn authenticate(&self, proof: &AuthProof) -> ServiceResult<u64> {
        self.authenticate_at(proof, unix_now()).await
    }

    /// Verify a proof at `t_verify`
    pub async fn authenticate_at(&self, proof: &AuthProof, t_verify: u64) -> ServiceResult<u64> {
        let device_id = match proof {
            AuthProof::Simple(p) => p.device_id.clone(),
            other => {
                return Err(ServiceError::Validation(format!(
                    "unsupported proof scheme: {}",
                    other.scheme_name()
                )))
            }
        };

        let device = self
            .store
            .get_device(&device_id)
            .await?
            .ok_or_else(|| ServiceError::UnknownDevice(device_id.clone()))?;
        if !device.is_active {
            return Err(ServiceError::InactiveDevice(device_id.clone()));
        }

        self.engine
            .verify(proof, &device.public_commitment, t_verify)?;

        self.store.touch_device_auth(&device_id, t_verify).await?;
        self.store.append_auth_log(&device_id, t_verify).await?;

        info!(device_id = %device_id, at = t_verify, "device authenticated");
        self.bus
            .publish(
                EventKind::DeviceAuthenticated,
                json!({ "device_id": device_id, "at": t_verify }),
            )
            .await;

        Ok(t_verify)
    }

    /// Accept a telemetry payload into the pending bucket
    pub async fn submit_data(
        &self,
        device_id: &str,
        payload: serde_json::Value,
    ) -> ServiceResult<SubmitOutcome> {
        let device = self
            .store
            .get_device(device_id)
            .await?
            .ok_or_else(|| ServiceError::UnknownDevice(device_id.to_string()))?;
        if !device.is_active {
            return Err(ServiceError::InactiveDevice(device_id.to_string()));
        }

        let datum = PendingDatum {
            datum_id: Uuid::new_v4().simple().to_string(),
            device_id: device_id.to_string(),
            leaf_hash: leaf_hash(&payload),
            payload,
            submitted_at: unix_now(),
            insertion_seq: 0,
            batch_id: None,
        };

        let datum = self.store.append_pending(datum).await?;
        self.store.bump_device_counter(device_id).await?;
        let pending_count = self.store.pending_count().await?;

        self.bus
            .publish(
                EventKind::DataSubmitted,
                json!({
                    "device_id": device_id,
                    "datum_id": datum.datum_id,
                    "leaf_hash": datum.leaf_hash,
                    "pending_count": pending_count,
                }),
            )
            .await;

        Ok(SubmitOutcome {
            datum,
            pending_count,
        })
    }

    pub async fn get_device(&self, device_id: &str) -> ServiceResult<Device> {
        self.store
            .get_device(device_id)
            .await?
            .ok_or_else(|| ServiceError::UnknownDevice(device_id.to_string()))
    }

    pub async fn list_devices(&self) -> ServiceResult<Vec<Device>> {
        Ok(self.store.list_devices().await?)
    }

    pub async fn device_data(
        &self,
        device_id: &str,
        limit: usize,
    ) -> ServiceResult<Vec<PendingDatum>> {
        // 404 for unknown devices, empty list for quiet ones.
        self.get_device(device_id).await?;
        Ok(self.store.list_device_data(device_id, limit).await?)
    }

    pub async fn set_device_active(&self, device_id: &str, active: bool) -> ServiceResult<Device> {
        self.get_device(device_id).await?;
        self.store.set_device_active(device_id, active).await?;
        self.get_device(device_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zkiot_store::MemoryStore;

    fn service() -> AuthService {
        AuthService::new(
            Arc::new(MemoryStore::new()),
            ZkpEngine::default(),
            Arc::new(EventBus::default()),
        )
    }

    fn request(id: &str) -> RegisterDevice {
        RegisterDevice {
            device_id: id.to_string(),
            device_name: "Pump".to_string(),
            device_type: "industrial".to_string(),
            secret: "s3cr3t".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let service = service();
        let device = service.register(request("dev-001")).await.unwrap();
        assert!(!device.public_commitment.is_zero());

        let t = unix_now();
        let proof = service.engine().generate("dev-001", "s3cr3t", t);
        let at = service.authenticate_at(&proof, t).await.unwrap();
        assert_eq!(at, t);

        let loaded = service.get_device("dev-001").await.unwrap();
        assert_eq!(loaded.last_authenticated_at, Some(t));
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let service = service();
        service.register(request("dev-001")).await.unwrap();
        assert!(matches!(
            service.register(request("dev-001")).await,
            Err(ServiceError::DeviceExists(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_device_id_rejected() {
        let service = service();
        assert!(matches!(
            service.register(request("bad id!")).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_replay_is_distinct_failure() {
        let service = service();
        service.register(request("dev-001")).await.unwrap();
        let t = unix_now();
        let proof = service.engine().generate("dev-001", "s3cr3t", t);

        service.authenticate_at(&proof, t).await.unwrap();
        assert!(matches!(
            service.authenticate_at(&proof, t).await,
            Err(ServiceError::Replay)
        ));
    }

    #[tokio::test]
    async fn test_inactive_device_cannot_authenticate_or_submit() {
        let service = service();
        service.register(request("dev-001")).await.unwrap();
        service.set_device_active("dev-001", false).await.unwrap();

        let t = unix_now();
        let proof = service.engine().generate("dev-001", "s3cr3t", t);
        assert!(matches!(
            service.authenticate_at(&proof, t).await,
            Err(ServiceError::InactiveDevice(_))
        ));
        assert!(matches!(
            service.submit_data("dev-001", json!({"v": 1})).await,
            Err(ServiceError::InactiveDevice(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_data_counts() {
        let service = service();
        service.register(request("dev-001")).await.unwrap();

        let outcome = service.submit_data("dev-001", json!({"v": 1})).await.unwrap();
        assert_eq!(outcome.pending_count, 1);
        assert!(outcome.datum.batch_id.is_none());

        let outcome = service.submit_data("dev-001", json!({"v": 2})).await.unwrap();
        assert_eq!(outcome.pending_count, 2);

        let device = service.get_device("dev-001").await.unwrap();
        assert_eq!(device.total_data_submitted, 2);

        let data = service.device_data("dev-001", 10).await.unwrap();
        assert_eq!(data.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_device_submission() {
        let service = service();
        assert!(matches!(
            service.submit_data("ghost", json!({})).await,
            Err(ServiceError::UnknownDevice(_))
        ));
    }
}
