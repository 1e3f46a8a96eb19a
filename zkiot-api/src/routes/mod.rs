//! API route handlers

pub mod chains;
pub mod cross_chain;
pub mod devices;
pub mod health;
pub mod merkle;
pub mod multisig;
pub mod realtime;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::ws::ws_handler;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Devices
        .route("/devices/register", post(devices::register))
        .route("/devices/authenticate", post(devices::authenticate))
        .route("/devices/data", post(devices::submit_data))
        .route("/devices", get(devices::list_devices))
        .route("/devices/:device_id", get(devices::get_device))
        .route("/devices/:device_id/data", get(devices::device_data))
        // Merkle anchoring
        .route("/merkle/anchor", post(merkle::anchor))
        .route("/merkle/verify", post(merkle::verify))
        .route("/merkle/batches", get(merkle::list_batches))
        .route("/merkle/batches/:batch_id", get(merkle::get_batch))
        .route(
            "/merkle/batches/:batch_id/proof/:leaf_hash",
            get(merkle::inclusion_proof),
        )
        // Chain registry
        .route("/chains", get(chains::list_networks))
        .route("/chains/switch", post(chains::switch_network))
        .route("/chains/estimate-gas", post(chains::estimate_gas))
        .route("/chains/:network/balance/:address", get(chains::balance))
        // Cross-chain anchoring
        .route("/cross-chain/anchor", post(cross_chain::anchor))
        .route("/cross-chain/status/:root", get(cross_chain::status))
        .route("/cross-chain/retry", post(cross_chain::retry))
        // Realtime
        .route(
            "/realtime/device/:device_id/heartbeat",
            post(realtime::heartbeat),
        )
        .route("/realtime/devices/status", get(realtime::device_statuses))
        .route("/realtime/events", get(realtime::recent_events))
        // Multi-sig
        .route("/multisig/propose", post(multisig::propose))
        .route("/multisig/approve", post(multisig::approve))
        .route("/multisig/reject", post(multisig::reject))
        .route("/multisig/execute/:proposal_id", post(multisig::execute))
        .route("/multisig/proposals", get(multisig::list_proposals))
        .route("/multisig/proposals/:proposal_id", get(multisig::get_proposal))
        .route("/multisig/signers", get(multisig::list_signers))
        .route("/multisig/signers", post(multisig::add_signer))
        .route(
            "/multisig/signers/:signer_id/deactivate",
            post(multisig::deactivate_signer),
        )
        // System metrics
        .route("/stats", get(health::stats));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/ws/:client_id", get(ws_handler))
        .nest("/api", api)
        .with_state(state)
}
