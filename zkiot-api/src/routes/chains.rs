//! Chain registry endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use zkiot_chain::TxOp;
use zkiot_core::crypto::Digest32;
use zkiot_service::ServiceError;

use crate::dto::{
    BalanceResponse, GasEstimateRequest, GasEstimateResponse, NetworkResponse,
    SwitchNetworkRequest,
};
use crate::error::ApiResult;
use crate::state::AppState;

fn network_response(state: &AppState, network: zkiot_chain::NetworkConfig) -> NetworkResponse {
    let registry = state.dispatcher.registry();
    NetworkResponse {
        is_active: registry.active() == network.name,
        has_contract: registry.anchor_contract(&network.name).is_some(),
        name: network.name,
        display_name: network.display_name,
        chain_id: network.chain_id,
        native_symbol: network.native_symbol,
        explorer_base: network.explorer_base,
        is_testnet: network.testnet,
    }
}

/// All configured networks
pub async fn list_networks(State(state): State<AppState>) -> Json<Vec<NetworkResponse>> {
    let networks = state.dispatcher.registry().list();
    Json(
        networks
            .into_iter()
            .map(|n| network_response(&state, n))
            .collect(),
    )
}

/// Switch the active network
pub async fn switch_network(
    State(state): State<AppState>,
    Json(request): Json<SwitchNetworkRequest>,
) -> ApiResult<Json<NetworkResponse>> {
    let network = state
        .dispatcher
        .registry()
        .set_active(&request.network)
        .map_err(ServiceError::from)?;
    Ok(Json(network_response(&state, network)))
}

/// Estimate the cost of an anchor transaction without submitting
pub async fn estimate_gas(
    State(state): State<AppState>,
    Json(request): Json<GasEstimateRequest>,
) -> ApiResult<Json<GasEstimateResponse>> {
    let registry = state.dispatcher.registry();
    let network = request.network.unwrap_or_else(|| registry.active());
    let contract = registry.anchor_contract(&network).ok_or_else(|| {
        ServiceError::Validation(format!("no anchor contract configured for {}", network))
    })?;

    let client = state
        .dispatcher
        .pool()
        .client(&network)
        .map_err(ServiceError::from)?;
    let op = TxOp::anchor_root(&contract, &Digest32::zero(), 0, "estimate");
    let estimate = client.estimate_gas(&op).await.map_err(ServiceError::from)?;

    Ok(Json(GasEstimateResponse {
        network,
        gas_units: estimate.gas_units,
        gas_price_wei: estimate.gas_price_wei.to_string(),
    }))
}

/// Native balance of an address on a network
pub async fn balance(
    State(state): State<AppState>,
    Path((network, address)): Path<(String, String)>,
) -> ApiResult<Json<BalanceResponse>> {
    let client = state
        .dispatcher
        .pool()
        .client(&network)
        .map_err(ServiceError::from)?;
    let balance_wei = client.balance(&address).await.map_err(ServiceError::from)?;
    Ok(Json(BalanceResponse {
        network,
        address,
        balance_wei: balance_wei.to_string(),
    }))
}
