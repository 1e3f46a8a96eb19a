//! Application state for the API server
//!
//! Everything the handlers touch is constructed here and injected; there
//! are no module-level singletons. The only process-wide state is the
//! immutable configuration the constructor consumed.

use std::env;
use std::sync::Arc;
use zkiot_chain::{ChainRegistry, ChainSetConfig, ClientPool};
use zkiot_core::constants::{EVENT_HISTORY, MAX_SUB_QUEUE, VALIDITY_WINDOW_SECS};
use zkiot_core::crypto::ZkpEngine;
use zkiot_core::logging::LogLevel;
use zkiot_core::types::ProposalKind;
use zkiot_service::{
    permissive_signatures, AnchorPipeline, AnchorPolicy, AuthService, CrossChainDispatcher,
    EventBus, MultiSigService, PresenceConfig, PresenceTracker, RegisterDeviceHandler,
};
use zkiot_store::Store;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub pipeline: Arc<AnchorPipeline>,
    pub dispatcher: Arc<CrossChainDispatcher>,
    pub multisig: Arc<MultiSigService>,
    pub presence: Arc<PresenceTracker>,
    pub bus: Arc<EventBus>,
    pub store: Arc<dyn Store>,
    pub version: String,
}

impl AppState {
    /// Wire every service over the given store and chain configuration
    pub async fn build(
        store: Arc<dyn Store>,
        chains: ChainSetConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let history = read_usize("EVENT_HISTORY").unwrap_or(EVENT_HISTORY);
        let queue_bound = read_usize("MAX_SUB_QUEUE").unwrap_or(MAX_SUB_QUEUE);
        let bus = Arc::new(EventBus::new(history, queue_bound));

        let registry = Arc::new(ChainRegistry::new(&chains));
        let pool = Arc::new(ClientPool::new(&chains)?);
        let dispatcher = Arc::new(CrossChainDispatcher::new(
            pool,
            registry,
            store.clone(),
            bus.clone(),
        ));

        let pipeline = Arc::new(
            AnchorPipeline::new(
                store.clone(),
                bus.clone(),
                dispatcher.clone(),
                AnchorPolicy::default(),
            )
            .await?,
        );

        let validity = read_u64("VALIDITY_WINDOW").unwrap_or(VALIDITY_WINDOW_SECS);
        let auth = Arc::new(AuthService::new(
            store.clone(),
            ZkpEngine::new(validity),
            bus.clone(),
        ));

        let multisig = Arc::new(
            MultiSigService::new(store.clone(), bus.clone(), permissive_signatures())
                .with_handler(
                    ProposalKind::RegisterDevice,
                    Arc::new(RegisterDeviceHandler::new(auth.clone())),
                ),
        );

        let presence = Arc::new(PresenceTracker::new(
            store.clone(),
            bus.clone(),
            PresenceConfig::from_env(),
        ));

        Ok(Self {
            auth,
            pipeline,
            dispatcher,
            multisig,
            presence,
            bus,
            store,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Start the sweepers and the anchor trigger
    pub fn spawn_background(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.presence.spawn_sweeper(),
            self.multisig.spawn_sweeper(),
            self.pipeline.spawn_trigger(),
        ]
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub log_level: LogLevel,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            log_level: LogLevel::default(),
        }
    }
}

impl ApiConfig {
    /// Read `ZKIOT_HOST` / `ZKIOT_PORT` / `ZKIOT_LOG_LEVEL`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = env::var("ZKIOT_HOST") {
            config.host = host;
        }
        if let Some(port) = env::var("ZKIOT_PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(level) = env::var("ZKIOT_LOG_LEVEL")
            .ok()
            .and_then(|l| LogLevel::parse(&l))
        {
            config.log_level = level;
        }
        config
    }
}

fn read_usize(var: &str) -> Option<usize> {
    env::var(var).ok().and_then(|s| s.parse().ok())
}

fn read_u64(var: &str) -> Option<u64> {
    env::var(var).ok().and_then(|s| s.parse().ok())
}
