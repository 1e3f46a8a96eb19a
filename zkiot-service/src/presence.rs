//! Presence tracker
//!
//! Heartbeat ingest plus a fixed-cadence sweep. Status is always computed
//! from `last_heartbeat_at` and the observing clock, so queries are
//! consistent with the current time; the sweep exists only to detect class
//! transitions and emit events.

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};
use zkiot_core::constants::{IDLE_WINDOW_SECS, LIVE_WINDOW_SECS, PRESENCE_SWEEP_SECS};
use zkiot_core::types::{status_at, EventKind, PresenceRecord, PresenceStatus};
use zkiot_store::Store;

use crate::error::{ServiceError, ServiceResult};
use crate::events::EventBus;
use crate::time::unix_now;

/// Presence windows and sweep cadence
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub live_window_secs: u64,
    pub idle_window_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            live_window_secs: LIVE_WINDOW_SECS,
            idle_window_secs: IDLE_WINDOW_SECS,
            sweep_interval_secs: PRESENCE_SWEEP_SECS,
        }
    }
}

impl PresenceConfig {
    /// Read `LIVE_WINDOW` / `IDLE_WINDOW` overrides from the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = read_secs("LIVE_WINDOW") {
            config.live_window_secs = secs;
        }
        if let Some(secs) = read_secs("IDLE_WINDOW") {
            config.idle_window_secs = secs;
        }
        config
    }
}

fn read_secs(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

/// Heartbeat tracking and liveness classification
pub struct PresenceTracker {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    config: PresenceConfig,
    /// Last class observed per device, written only by heartbeats and the
    /// sweep, used to detect boundary crossings
    last_class: RwLock<HashMap<String, PresenceStatus>>,
    running: AtomicBool,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn Store>, bus: Arc<EventBus>, config: PresenceConfig) -> Self {
        Self {
            store,
            bus,
            config,
            last_class: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Record a heartbeat at the current time
    pub async fn heartbeat(&self, device_id: &str) -> ServiceResult<PresenceRecord> {
        self.heartbeat_at(device_id, unix_now()).await
    }

    /// Record a heartbeat at an explicit time; older timestamps are ignored
    pub async fn heartbeat_at(&self, device_id: &str, at: u64) -> ServiceResult<PresenceRecord> {
        if self.store.get_device(device_id).await?.is_none() {
            return Err(ServiceError::UnknownDevice(device_id.to_string()));
        }

        let update = self.store.record_heartbeat(device_id, at).await?;
        let stored = if update.applied {
            at
        } else {
            update.previous.unwrap_or(at)
        };

        let status = self.classify(stored, unix_now());
        let previous = {
            let mut classes = self.last_class.write().await;
            classes.insert(device_id.to_string(), status)
        };
        if update.applied && previous != Some(PresenceStatus::Online) && status == PresenceStatus::Online {
            self.emit_change(device_id, status, stored).await;
        }

        Ok(PresenceRecord {
            device_id: device_id.to_string(),
            last_heartbeat_at: stored,
            status,
        })
    }

    /// Presence of one device, classified at query time
    pub async fn status(&self, device_id: &str) -> ServiceResult<Option<PresenceRecord>> {
        let now = unix_now();
        Ok(self
            .store
            .get_heartbeat(device_id)
            .await?
            .map(|at| PresenceRecord {
                device_id: device_id.to_string(),
                last_heartbeat_at: at,
                status: self.classify(at, now),
            }))
    }

    /// Presence of every tracked device
    pub async fn list_statuses(&self) -> ServiceResult<Vec<PresenceRecord>> {
        let now = unix_now();
        Ok(self
            .store
            .list_heartbeats()
            .await?
            .into_iter()
            .map(|(device_id, at)| PresenceRecord {
                device_id,
                last_heartbeat_at: at,
                status: self.classify(at, now),
            })
            .collect())
    }

    fn classify(&self, last_heartbeat_at: u64, now: u64) -> PresenceStatus {
        status_at(
            last_heartbeat_at,
            now,
            self.config.live_window_secs,
            self.config.idle_window_secs,
        )
    }

    /// One sweep pass: reclassify everything and emit boundary crossings
    pub async fn sweep_once(&self, now: u64) -> ServiceResult<Vec<(String, PresenceStatus)>> {
        let heartbeats = self.store.list_heartbeats().await?;
        let mut transitions = Vec::new();

        for (device_id, at) in heartbeats {
            let status = self.classify(at, now);
            let previous = {
                let mut classes = self.last_class.write().await;
                classes.insert(device_id.clone(), status)
            };
            if previous.is_some() && previous != Some(status) {
                self.emit_change(&device_id, status, at).await;
                transitions.push((device_id, status));
            }
        }
        Ok(transitions)
    }

    async fn emit_change(&self, device_id: &str, status: PresenceStatus, last_heartbeat_at: u64) {
        self.bus
            .publish(
                EventKind::DeviceStatusChange,
                json!({
                    "device_id": device_id,
                    "status": status,
                    "last_heartbeat_at": last_heartbeat_at,
                }),
            )
            .await;
    }

    /// Run the sweep loop until `stop` is called
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(tracker.config.sweep_interval_secs));
            info!(
                interval_secs = tracker.config.sweep_interval_secs,
                "presence sweeper started"
            );
            while tracker.running.load(Ordering::SeqCst) {
                interval.tick().await;
                if let Err(e) = tracker.sweep_once(unix_now()).await {
                    error!(error = %e, "presence sweep failed");
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
    use zkiot_core::crypto::Digest32;
    use zkiot_core::types::Device;
    use zkiot_store::MemoryStore;

    async fn tracker() -> (Arc<PresenceTracker>, Arc<dyn Store>, Arc<EventBus>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::default());
        store
            .put_new_device(&Device::new(
                "dev-001".into(),
                "Sensor".into(),
                "industrial".into(),
                Digest32::zero(),
                0,
            ))
            .await
            .unwrap();
        (
            Arc::new(PresenceTracker::new(
                store.clone(),
                bus.clone(),
                PresenceConfig::default(),
            )),
            store,
            bus,
        )
    }

    #[tokio::test]
    async fn test_unknown_device_heartbeat_rejected() {
        let (tracker, _, _) = tracker().await;
        assert!(matches!(
            tracker.heartbeat("ghost").await,
            Err(ServiceError::UnknownDevice(_))
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_marks_online_and_emits_once() {
        let (tracker, _, bus) = tracker().await;
        let mut rx = bus.connect("watcher").await;

        let record = tracker.heartbeat("dev-001").await.unwrap();
        assert_eq!(record.status, PresenceStatus::Online);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::DeviceStatusChange);
        assert_eq!(event.payload["status"], "online");

        // A second fresh heartbeat is not a transition.
        tracker.heartbeat("dev-001").await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sweep_detects_idle_then_offline() {
        let (tracker, _, bus) = tracker().await;
        let now = unix_now();
        tracker.heartbeat_at("dev-001", now).await.unwrap();
        let mut rx = bus.connect("watcher").await;

        // 120 s later the device crosses into IDLE.
        let transitions = tracker.sweep_once(now + 120).await.unwrap();
        assert_eq!(transitions, vec![("dev-001".to_string(), PresenceStatus::Idle)]);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.payload["status"], "idle");

        // 600 s later it is OFFLINE.
        let transitions = tracker.sweep_once(now + 600).await.unwrap();
        assert_eq!(
            transitions,
            vec![("dev-001".to_string(), PresenceStatus::Offline)]
        );

        // Repeating the sweep emits nothing new.
        let transitions = tracker.sweep_once(now + 700).await.unwrap();
        assert!(transitions.is_empty());
    }

    #[tokio::test]
    async fn test_status_is_pure_function_of_clock() {
        let (tracker, _, _) = tracker().await;
        let now = unix_now();
        tracker.heartbeat_at("dev-001", now - 400).await.unwrap();

        // No sweep ran, yet the query reflects the stale heartbeat.
        let record = tracker.status("dev-001").await.unwrap().unwrap();
        assert_eq!(record.status, PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn test_stale_heartbeat_ignored() {
        let (tracker, store, _) = tracker().await;
        let now = unix_now();
        tracker.heartbeat_at("dev-001", now).await.unwrap();
        tracker.heartbeat_at("dev-001", now - 100).await.unwrap();
        assert_eq!(store.get_heartbeat("dev-001").await.unwrap(), Some(now));
    }
}
