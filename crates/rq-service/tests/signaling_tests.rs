//! Signaling relay integration tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use rq_test_utils::TestRqServer;
use serde_json::{json, Value};

async fn signal(
    client: &reqwest::Client,
    server: &TestRqServer,
    from: &str,
    to: &str,
    kind: &str,
    data: Value,
) -> Result<u16, anyhow::Error> {
    let response = client
        .post(format!("{}/api/webrtc/signal", server.url()))
        .json(&json!({
            "fromSessionId": from,
            "toSessionId": to,
            "type": kind,
            "data": data,
        }))
        .send()
        .await?;
    Ok(response.status().as_u16())
}

async fn drain(
    client: &reqwest::Client,
    server: &TestRqServer,
    session_id: &str,
) -> Result<Vec<Value>, anyhow::Error> {
    let body: Value = client
        .get(format!("{}/api/webrtc/signals/{}", server.url(), session_id))
        .send()
        .await?
        .json()
        .await?;
    Ok(body["signals"].as_array().cloned().unwrap_or_default())
}

#[tokio::test]
async fn test_handshake_is_delivered_in_order() -> Result<(), anyhow::Error> {
    let server = TestRqServer::spawn().await?;
    let client = reqwest::Client::new();

    assert_eq!(
        signal(&client, &server, "alice", "bob", "offer", json!({"sdp": "o"})).await?,
        200
    );
    signal(&client, &server, "alice", "bob", "ice-candidate", json!({"c": 1})).await?;
    signal(&client, &server, "alice", "bob", "ice-candidate", json!({"c": 2})).await?;
    signal(&client, &server, "bob", "alice", "answer", json!({"sdp": "a"})).await?;

    let for_bob = drain(&client, &server, "bob").await?;
    let kinds: Vec<&str> = for_bob.iter().map(|s| s["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["offer", "ice-candidate", "ice-candidate"]);
    assert_eq!(for_bob[2]["data"]["c"], 2);
    assert_eq!(for_bob[0]["from"], "alice");

    let for_alice = drain(&client, &server, "alice").await?;
    assert_eq!(for_alice.len(), 1);
    assert_eq!(for_alice[0]["type"], "answer");

    Ok(())
}

#[tokio::test]
async fn test_second_drain_is_empty() -> Result<(), anyhow::Error> {
    let server = TestRqServer::spawn().await?;
    let client = reqwest::Client::new();

    signal(&client, &server, "a", "b", "offer", json!(null)).await?;

    assert_eq!(drain(&client, &server, "b").await?.len(), 1);
    assert!(drain(&client, &server, "b").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_arbitrary_signal_type_is_delivered() -> Result<(), anyhow::Error> {
    let server = TestRqServer::spawn().await?;
    let client = reqwest::Client::new();

    assert_eq!(
        signal(&client, &server, "a", "b", "bye", json!({"reason": "hangup"})).await?,
        200
    );

    let signals = drain(&client, &server, "b").await?;
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["type"], "bye");
    assert_eq!(signals[0]["from"], "a");
    assert_eq!(signals[0]["data"]["reason"], "hangup");

    Ok(())
}

#[tokio::test]
async fn test_peers_lists_queue_participants() -> Result<(), anyhow::Error> {
    let server = TestRqServer::spawn().await?;
    let client = reqwest::Client::new();

    for (name, group) in [("a", "General"), ("b", "Lab A"), ("c", "Lab A")] {
        client
            .post(format!("{}/api/queue/join", server.url()))
            .json(&json!({ "name": name, "subGroup": group }))
            .send()
            .await?;
    }

    let body: Value = client
        .get(format!("{}/api/webrtc/peers?subGroup=Lab%20A", server.url()))
        .send()
        .await?
        .json()
        .await?;

    let names: Vec<&str> = body["peers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["b", "c"]);
    assert_eq!(body["subGroup"], "Lab A");

    Ok(())
}
