//! Websocket end-to-end tests.
//!
//! Spawns a real server with `TestSignalServer` and talks to it with
//! `TestWsClient`.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use futures::StreamExt;
use serde_json::json;
use signal_service::actors::Channel;
use signal_service::transport::{CLOSE_AUTHENTICATION_FAILED, CLOSE_INVALID_ROOM};
use signal_test_utils::{
    MockStore, TestSignalServer, TestTokenBuilder, TestUser, TestWsClient, TEST_JWT_SECRET,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

fn alice() -> TestUser {
    TestUser::new("1", "Alice")
}

fn bob() -> TestUser {
    TestUser::new("2", "Bob")
}

async fn server() -> Result<TestSignalServer> {
    TestSignalServer::builder()
        .with_user(&alice())
        .with_user(&bob())
        .spawn()
        .await
}

/// Wait until the registry reflects a connection change.
async fn wait_for_sessions(server: &TestSignalServer, expected: usize) {
    for _ in 0..100 {
        if server.registry().session_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.registry().session_count(), expected);
}

#[tokio::test]
async fn test_chat_without_token_closed_4001() -> Result<()> {
    let server = server().await?;
    let mut client = TestWsClient::connect(&server.ws_url("/ws/chat/lobby")).await?;

    assert_eq!(client.expect_close().await?, Some(CLOSE_AUTHENTICATION_FAILED));
    assert_eq!(server.registry().session_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_call_with_bad_tokens_closed_4001() -> Result<()> {
    let server = server().await?;

    let expired = TestTokenBuilder::new()
        .for_user("1")
        .expires_in(-3600)
        .sign(TEST_JWT_SECRET);
    let tampered = alice().token().replace('.', ".x");
    let refresh = TestTokenBuilder::new()
        .for_user("1")
        .token_type(Some("refresh"))
        .sign(TEST_JWT_SECRET);
    let unknown_user = TestTokenBuilder::new().for_user("404").sign(TEST_JWT_SECRET);

    for token in [expired, tampered, refresh, unknown_user] {
        let mut client = TestWsClient::connect(&server.call_url(&token)).await?;
        assert_eq!(client.expect_close().await?, Some(CLOSE_AUTHENTICATION_FAILED));
    }
    Ok(())
}

#[tokio::test]
async fn test_invalid_room_closed_4002() -> Result<()> {
    let server = server().await?;
    let long_room = "r".repeat(101);
    let mut client = TestWsClient::connect(&server.chat_url(&long_room, &alice().token())).await?;

    assert_eq!(client.expect_close().await?, Some(CLOSE_INVALID_ROOM));
    Ok(())
}

#[tokio::test]
async fn test_chat_fan_out_and_history() -> Result<()> {
    let server = server().await?;

    let mut a = TestWsClient::connect(&server.chat_url("lobby", &alice().token())).await?;
    let greeting = a.recv_json().await?;
    assert_eq!(greeting["type"], "connection_established");
    assert_eq!(greeting["user"]["id"], "1");
    assert_eq!(greeting["room"], "lobby");
    let history = a.recv_json().await?;
    assert_eq!(history["type"], "message_history");
    assert_eq!(history["messages"], json!([]));

    a.send_json(&json!({"type": "message", "message": "before bob"}))
        .await?;
    assert_eq!(a.recv_type("chat_message").await?["message"], "before bob");

    let mut b = TestWsClient::connect(&server.chat_url("lobby", &bob().token())).await?;
    b.recv_type("connection_established").await?;
    let history = b.recv_type("message_history").await?;
    assert_eq!(history["messages"][0]["content"], "before bob");

    b.send_json(&json!({"type": "message", "message": "hello alice"}))
        .await?;
    for client in [&mut a, &mut b] {
        let msg = client.recv_type("chat_message").await?;
        assert_eq!(msg["message"], "hello alice");
        assert_eq!(msg["sender"]["id"], "2");
    }
    Ok(())
}

#[tokio::test]
async fn test_malformed_json_keeps_connection() -> Result<()> {
    let server = server().await?;
    let mut a = TestWsClient::connect(&server.chat_url("lobby", &alice().token())).await?;
    a.recv_type("message_history").await?;

    a.send_text("{not json").await?;
    let err = a.recv_json().await?;
    assert_eq!(err["type"], "error");
    assert_eq!(err["error_code"], "INVALID_MESSAGE");

    // Unknown tags are ignored without a reply
    a.send_json(&json!({"type": "typing"})).await?;
    a.expect_silence(Duration::from_millis(200)).await?;

    a.send_json(&json!({"type": "message", "message": "still here"}))
        .await?;
    assert_eq!(a.recv_json().await?["type"], "chat_message");
    Ok(())
}

#[tokio::test]
async fn test_call_signaling_between_clients() -> Result<()> {
    let server = server().await?;
    let mut a = TestWsClient::connect(&server.call_url(&alice().token())).await?;
    let mut b = TestWsClient::connect(&server.call_url(&bob().token())).await?;
    let greeting = a.recv_type("connection_established").await?;
    assert!(greeting.get("room").is_none());
    b.recv_type("connection_established").await?;
    // Channels are joined right after the greeting
    wait_for_sessions(&server, 2).await;

    a.send_json(&json!({"type": "call_initiate", "receiver_id": "2"}))
        .await?;
    let incoming = b.recv_type("incoming_call").await?;
    let initiated = a.recv_type("call_initiated").await?;
    assert_eq!(incoming["call_id"], initiated["call_id"]);
    let call_id = incoming["call_id"].clone();

    b.send_json(&json!({"type": "call_answer", "call_id": call_id}))
        .await?;
    assert_eq!(a.recv_type("call_answered").await?["call_id"], call_id);

    a.send_json(&json!({"type": "offer", "target_id": "2", "offer": {"sdp": "o"}, "call_id": call_id}))
        .await?;
    let offer = b.recv_type("offer").await?;
    assert_eq!(offer["from_user"], "1");

    b.send_json(&json!({"type": "call_end", "call_id": call_id}))
        .await?;
    let ended = a.recv_type("call_ended").await?;
    assert_eq!(ended["reason"], "hangup");
    Ok(())
}

#[tokio::test]
async fn test_bearer_header_authenticates() -> Result<()> {
    let server = server().await?;
    let mut request = server.ws_url("/ws/call").into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", alice().token()).parse()?,
    );

    let (mut stream, _) = tokio_tungstenite::connect_async(request).await?;
    let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await?
        .unwrap()?;
    let greeting: serde_json::Value = serde_json::from_str(frame.to_text()?)?;
    assert_eq!(greeting["type"], "connection_established");
    Ok(())
}

#[tokio::test]
async fn test_disconnect_cleans_registry() -> Result<()> {
    let server = server().await?;
    let user_channel = Channel::user(&alice().user_id());

    let mut a = TestWsClient::connect(&server.chat_url("lobby", &alice().token())).await?;
    a.recv_type("message_history").await?;
    wait_for_sessions(&server, 1).await;
    assert_eq!(server.registry().subscriber_count(&user_channel), 1);
    assert_eq!(server.registry().subscriber_count(&Channel::room("lobby")), 1);

    a.close().await?;
    wait_for_sessions(&server, 0).await;
    assert_eq!(server.registry().channel_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_sessions_going_away() -> Result<()> {
    let server = server().await?;
    let mut a = TestWsClient::connect(&server.call_url(&alice().token())).await?;
    a.recv_type("connection_established").await?;

    server.shutdown_sessions();
    assert_eq!(a.expect_close().await?, Some(1001));
    wait_for_sessions(&server, 0).await;
    Ok(())
}

#[tokio::test]
async fn test_directory_timeout_is_anonymous() -> Result<()> {
    let store = Arc::new(
        MockStore::new()
            .with_user(alice().identity())
            .with_user_delay(Duration::from_secs(3)),
    );
    let server = TestSignalServer::builder()
        .with_stores(store.stores())
        .with_var("SIGNAL_AUTH_TIMEOUT_SECONDS", "1")
        .spawn()
        .await?;

    let mut a = TestWsClient::connect(&server.call_url(&alice().token())).await?;
    assert_eq!(a.expect_close().await?, Some(CLOSE_AUTHENTICATION_FAILED));
    Ok(())
}
