//! End-to-end tests over the HTTP surface
//!
//! The server runs on the in-memory store with the local-devnet chain
//! configuration, so anchor dispatches fail fast (no contract configured)
//! while the whole pipeline up to dispatch is exercised for real.

use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use zkiot_api::{create_router, AppState};
use zkiot_chain::ChainSetConfig;
use zkiot_core::crypto::ZkpEngine;
use zkiot_service::unix_now;
use zkiot_store::MemoryStore;

async fn test_server() -> TestServer {
    let state = AppState::build(Arc::new(MemoryStore::new()), ChainSetConfig::development())
        .await
        .unwrap();
    TestServer::new(create_router(state)).unwrap()
}

fn register_body(device_id: &str, secret: &str) -> Value {
    json!({
        "device_id": device_id,
        "device_name": "Test Sensor",
        "device_type": "industrial",
        "secret": secret,
    })
}

/// Client-side proof generation; the engine instance is independent of the
/// server's verifier.
fn proof_for(device_id: &str, secret: &str, t: u64) -> Value {
    let engine = ZkpEngine::default();
    serde_json::to_value(engine.generate(device_id, secret, t)).unwrap()
}

// ============ Health ============

#[tokio::test]
async fn test_health_and_ready() {
    let server = test_server().await;

    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "healthy");

    let response = server.get("/ready").await;
    response.assert_status_ok();
}

// ============ Register + authenticate ============

#[tokio::test]
async fn test_register_authenticate_replay_stale() {
    let server = test_server().await;

    let response = server
        .post("/api/devices/register")
        .json(&register_body("dev-001", "s3cr3t"))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["device_id"], "dev-001");
    let commitment = body["public_commitment"].as_str().unwrap();
    assert!(commitment.starts_with("0x"));
    assert_eq!(commitment.len(), 66);

    // Fresh proof verifies.
    let t = unix_now();
    let proof = proof_for("dev-001", "s3cr3t", t);
    let response = server.post("/api/devices/authenticate").json(&proof).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["ok"], true);

    // The identical (nonce, t) replays.
    let response = server.post("/api/devices/authenticate").json(&proof).await;
    response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "REPLAY");

    // A proof an hour out of window is stale.
    let stale = proof_for("dev-001", "s3cr3t", t - 3600);
    let response = server.post("/api/devices/authenticate").json(&stale).await;
    response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "STALE_PROOF");

    // Wrong secret is a bad proof.
    let wrong = proof_for("dev-001", "wrong", unix_now());
    let response = server.post("/api/devices/authenticate").json(&wrong).await;
    response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "BAD_PROOF");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let server = test_server().await;
    server
        .post("/api/devices/register")
        .json(&register_body("dev-001", "s3cr3t"))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let response = server
        .post("/api/devices/register")
        .json(&register_body("dev-001", "other"))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "DEVICE_EXISTS");
}

#[tokio::test]
async fn test_unknown_device_is_404() {
    let server = test_server().await;

    let response = server.get("/api/devices/ghost").await;
    response.assert_status_not_found();

    let proof = proof_for("ghost", "s3cr3t", unix_now());
    let response = server.post("/api/devices/authenticate").json(&proof).await;
    response.assert_status_not_found();
    assert_eq!(response.json::<Value>()["code"], "UNKNOWN_DEVICE");
}

#[tokio::test]
async fn test_snark_scheme_is_rejected() {
    let server = test_server().await;
    server
        .post("/api/devices/register")
        .json(&register_body("dev-001", "s3cr3t"))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let response = server
        .post("/api/devices/authenticate")
        .json(&json!({ "scheme": "snark", "proof": {"a": [1, 2]} }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION");
}

// ============ Telemetry + anchoring ============

#[tokio::test]
async fn test_submit_anchor_prove_verify() {
    let server = test_server().await;
    server
        .post("/api/devices/register")
        .json(&register_body("dev-001", "s3cr3t"))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let mut leaf_for_v2 = String::new();
    for v in 1..=3 {
        let response = server
            .post("/api/devices/data")
            .json(&json!({ "device_id": "dev-001", "payload": { "v": v } }))
            .await;
        response.assert_status(axum::http::StatusCode::ACCEPTED);
        let body: Value = response.json();
        assert_eq!(body["pending_count"], v);
        if v == 2 {
            leaf_for_v2 = body["leaf_hash"].as_str().unwrap().to_string();
        }
    }

    // First anchor ever: batch 1 with 3 leaves. Dispatch fails (no contract
    // on the devnet) but the batch itself is authoritative.
    let response = server.post("/api/merkle/anchor").json(&json!({})).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["batch_id"], 1);
    assert_eq!(body["leaf_count"], 3);
    let root = body["root"].as_str().unwrap().to_string();
    assert!(body["dispatched"].as_array().unwrap().is_empty());
    assert_eq!(body["failed"].as_array().unwrap().len(), 1);

    // Nothing pending afterwards.
    let response = server.post("/api/merkle/anchor").json(&json!({})).await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "NO_PENDING");

    // Inclusion proof for the second payload.
    let response = server
        .get(&format!("/api/merkle/batches/1/proof/{}", leaf_for_v2))
        .await;
    response.assert_status_ok();
    let proof_body: Value = response.json();
    assert_eq!(proof_body["root"], root);
    let proof = proof_body["proof"].clone();

    // The proof verifies against the stored root.
    let response = server
        .post("/api/merkle/verify")
        .json(&json!({ "batch_id": 1, "leaf_hash": leaf_for_v2, "proof": proof }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["valid"], true);

    // Flipping a proof byte invalidates it.
    let mut tampered = proof_body["proof"].clone();
    let sibling = tampered[0]["sibling"].as_str().unwrap().to_string();
    let flipped = if sibling.ends_with('0') {
        format!("{}1", &sibling[..sibling.len() - 1])
    } else {
        format!("{}0", &sibling[..sibling.len() - 1])
    };
    tampered[0]["sibling"] = json!(flipped);
    let response = server
        .post("/api/merkle/verify")
        .json(&json!({ "batch_id": 1, "leaf_hash": leaf_for_v2, "proof": tampered }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["valid"], false);

    // Cross-chain status reflects the failed dispatch.
    let response = server.get(&format!("/api/cross-chain/status/{}", root)).await;
    response.assert_status_ok();
    let status: Value = response.json();
    assert_eq!(status["batch_id"], 1);
    assert_eq!(status["available"], false);
    assert_eq!(status["chains"]["localhost"]["status"], "failed");
}

#[tokio::test]
async fn test_cross_chain_anchor_partial_failure_is_200() {
    let server = test_server().await;
    server
        .post("/api/devices/register")
        .json(&register_body("dev-001", "s3cr3t"))
        .await
        .assert_status(axum::http::StatusCode::CREATED);
    server
        .post("/api/devices/data")
        .json(&json!({ "device_id": "dev-001", "payload": { "v": 1 } }))
        .await
        .assert_status(axum::http::StatusCode::ACCEPTED);

    let response = server
        .post("/api/cross-chain/anchor")
        .json(&json!({ "targets": ["localhost", "ghostnet"] }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["failed"].as_array().unwrap().len(), 2);

    // Batch record carries both independent failures.
    let response = server.get("/api/merkle/batches/1").await;
    response.assert_status_ok();
    let batch: Value = response.json();
    assert_eq!(batch["anchors"]["localhost"]["status"], "failed");
    assert_eq!(batch["anchors"]["ghostnet"]["status"], "failed");
}

// ============ Multi-sig lifecycle ============

#[tokio::test]
async fn test_multisig_lifecycle_approve_execute() {
    let server = test_server().await;

    for signer in ["A", "B", "C"] {
        server
            .post("/api/multisig/signers")
            .json(&json!({ "signer_id": signer, "public_key": "0x00" }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    let response = server
        .post("/api/multisig/propose")
        .json(&json!({
            "kind": "register_device",
            "payload": {
                "device_id": "dev-ms",
                "device_name": "Gate",
                "device_type": "smart-city",
                "secret": "s3cr3t",
            },
            "required_approvals": 2,
            "proposer": "A",
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let proposal_id = response.json::<Value>()["proposal_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Premature execution conflicts.
    let response = server
        .post(&format!("/api/multisig/execute/{}", proposal_id))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "CONFLICT_STATE");

    let response = server
        .post("/api/multisig/approve")
        .json(&json!({ "proposal_id": proposal_id, "signer_id": "A", "signature": "sig-a" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["state"], "pending");

    let response = server
        .post("/api/multisig/approve")
        .json(&json!({ "proposal_id": proposal_id, "signer_id": "B", "signature": "sig-b" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["state"], "approved");

    let response = server
        .post(&format!("/api/multisig/execute/{}", proposal_id))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["executed"], true);
    assert_eq!(body["artifact"], "dev-ms");

    // The device was created through the registration path.
    server.get("/api/devices/dev-ms").await.assert_status_ok();
}

#[tokio::test]
async fn test_multisig_rejection_threshold() {
    let server = test_server().await;
    for signer in ["A", "B", "C"] {
        server
            .post("/api/multisig/signers")
            .json(&json!({ "signer_id": signer, "public_key": "0x00" }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    let response = server
        .post("/api/multisig/propose")
        .json(&json!({
            "kind": "register_device",
            "payload": { "device_id": "dev-rj", "device_name": "X", "device_type": "t", "secret": "s" },
            "required_approvals": 2,
            "proposer": "A",
        }))
        .await;
    let proposal_id = response.json::<Value>()["proposal_id"]
        .as_str()
        .unwrap()
        .to_string();

    server
        .post("/api/multisig/approve")
        .json(&json!({ "proposal_id": proposal_id, "signer_id": "A", "signature": "s" }))
        .await
        .assert_status_ok();
    server
        .post("/api/multisig/reject")
        .json(&json!({ "proposal_id": proposal_id, "signer_id": "B", "signature": "s" }))
        .await
        .assert_status_ok();

    // With 3 active signers and threshold 2, the second rejection makes
    // approval unreachable.
    let response = server
        .post("/api/multisig/reject")
        .json(&json!({ "proposal_id": proposal_id, "signer_id": "C", "signature": "s" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["state"], "rejected");
}

// ============ Presence + events ============

#[tokio::test]
async fn test_heartbeat_presence_and_events() {
    let server = test_server().await;
    server
        .post("/api/devices/register")
        .json(&register_body("dev-001", "s3cr3t"))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let response = server
        .post("/api/realtime/device/dev-001/heartbeat")
        .await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);

    let response = server.post("/api/realtime/device/ghost/heartbeat").await;
    response.assert_status_not_found();

    let response = server.get("/api/realtime/devices/status").await;
    response.assert_status_ok();
    let statuses: Value = response.json();
    assert_eq!(statuses[0]["device_id"], "dev-001");
    assert_eq!(statuses[0]["status"], "online");

    // The ring saw registration, the status change, and nothing else odd.
    let response = server.get("/api/realtime/events?limit=10").await;
    response.assert_status_ok();
    let events = response.json::<Value>();
    let kinds: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"DEVICE_REGISTERED"));
    assert!(kinds.contains(&"DEVICE_STATUS_CHANGE"));
}

// ============ Chain registry ============

#[tokio::test]
async fn test_chain_listing_and_switch() {
    let server = test_server().await;

    let response = server.get("/api/chains").await;
    response.assert_status_ok();
    let networks: Value = response.json();
    assert_eq!(networks.as_array().unwrap().len(), 1);
    assert_eq!(networks[0]["name"], "localhost");
    assert_eq!(networks[0]["is_active"], true);

    let response = server
        .post("/api/chains/switch")
        .json(&json!({ "network": "ghostnet" }))
        .await;
    response.assert_status_not_found();

    let response = server
        .post("/api/chains/switch")
        .json(&json!({ "network": "localhost" }))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_stats_endpoint() {
    let server = test_server().await;
    server
        .post("/api/devices/register")
        .json(&register_body("dev-001", "s3cr3t"))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let response = server.get("/api/stats").await;
    response.assert_status_ok();
    let stats: Value = response.json();
    assert_eq!(stats["devices"]["total"], 1);
    assert_eq!(stats["data"]["pending"], 0);
}
