//! Server entry point
//!
//! Configuration comes entirely from the environment: `STORE_URL` selects
//! the persistence backend (`mem://` or a sled path), `<NET>_RPC_URL` /
//! `SIGNING_KEY` configure the chain layer, and `ZKIOT_HOST` / `ZKIOT_PORT`
//! bind the listener.

use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zkiot_api::{run_server, ApiConfig, AppState};
use zkiot_chain::ChainSetConfig;
use zkiot_store::{MemoryStore, SledStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ApiConfig::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zkiot={}", config.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store_url = std::env::var("STORE_URL").unwrap_or_else(|_| "mem://".to_string());
    let store: Arc<dyn Store> = if store_url == "mem://" {
        tracing::warn!("using the in-memory store; data will not survive restarts");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SledStore::open(&store_url)?)
    };

    let chains = ChainSetConfig::from_env();
    tracing::info!(
        networks = chains.networks.len(),
        active = %chains.active,
        "chain configuration loaded"
    );

    let state = AppState::build(store, chains).await?;
    let background = state.spawn_background();
    tracing::info!(tasks = background.len(), "background tasks started");

    run_server(&config, state).await
}
