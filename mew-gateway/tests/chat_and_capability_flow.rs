//! End-to-end coverage over a real gateway: two participants connect,
//! exchange chat, and a capability violation is rejected with a
//! `system/error` rather than being routed.

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use common::{participant, spawn, ws_url};
use mew_gateway::config::SpaceConfig;

async fn recv_json(
    socket: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
) -> serde_json::Value {
    loop {
        match socket.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn two_participants_exchange_chat() {
    let space = SpaceConfig {
        name: "demo".to_string(),
        participants: vec![
            participant("alice", "alice-token", vec![json!({"kind": "chat"})]),
            participant("bob", "bob-token", vec![json!({"kind": "chat"})]),
        ],
    };
    let gateway = spawn(space).await;

    let (mut alice, _) = connect_async(ws_url(&gateway, "demo", "alice-token")).await.unwrap();
    let (mut bob, _) = connect_async(ws_url(&gateway, "demo", "bob-token")).await.unwrap();

    let alice_welcome = recv_json(&mut alice).await;
    assert_eq!(alice_welcome["kind"], "system/welcome");
    // alice connected before bob, so alice also receives bob's presence join.
    let bob_welcome = recv_json(&mut bob).await;
    assert_eq!(bob_welcome["kind"], "system/welcome");
    let alice_presence = recv_json(&mut alice).await;
    assert_eq!(alice_presence["kind"], "system/presence");
    assert_eq!(alice_presence["payload"]["event"], "join");

    let chat = json!({
        "protocol": "mew/v0.4",
        "kind": "chat",
        "payload": {"text": "hello bob"},
    });
    alice.send(Message::Text(chat.to_string().into())).await.unwrap();

    let received = recv_json(&mut bob).await;
    assert_eq!(received["kind"], "chat");
    assert_eq!(received["payload"]["text"], "hello bob");
}

#[tokio::test]
async fn capability_violation_is_rejected_not_routed() {
    let space = SpaceConfig {
        name: "demo".to_string(),
        participants: vec![
            participant("alice", "alice-token", vec![json!({"kind": "chat"})]),
            participant("bob", "bob-token", vec![json!({"kind": "chat"})]),
        ],
    };
    let gateway = spawn(space).await;

    let (mut alice, _) = connect_async(ws_url(&gateway, "demo", "alice-token")).await.unwrap();
    let (mut bob, _) = connect_async(ws_url(&gateway, "demo", "bob-token")).await.unwrap();
    let _ = recv_json(&mut alice).await; // welcome
    let _ = recv_json(&mut bob).await; // welcome
    let _ = recv_json(&mut alice).await; // bob's presence join

    let request = json!({
        "protocol": "mew/v0.4",
        "kind": "mcp/request",
        "payload": {"method": "tools/call", "params": {}},
    });
    alice.send(Message::Text(request.to_string().into())).await.unwrap();

    let error = recv_json(&mut alice).await;
    assert_eq!(error["kind"], "system/error");
    assert_eq!(error["payload"]["error"], "capability_violation");
    assert_eq!(error["payload"]["attempted_kind"], "mcp/request");
    assert_eq!(error["payload"]["your_capabilities"], json!([{"kind": "chat"}]));
}

/// A participant may never emit into the gateway's own `system/*`
/// namespace; the attempt is rejected, never routed.
#[tokio::test]
async fn reserved_namespace_is_rejected_not_routed() {
    let space = SpaceConfig {
        name: "demo".to_string(),
        participants: vec![
            participant("alice", "alice-token", vec![json!({"kind": "chat"})]),
            participant("bob", "bob-token", vec![json!({"kind": "chat"})]),
        ],
    };
    let gateway = spawn(space).await;

    let (mut alice, _) = connect_async(ws_url(&gateway, "demo", "alice-token")).await.unwrap();
    let (mut bob, _) = connect_async(ws_url(&gateway, "demo", "bob-token")).await.unwrap();
    let _ = recv_json(&mut alice).await; // welcome
    let _ = recv_json(&mut bob).await; // welcome
    let _ = recv_json(&mut alice).await; // bob's presence join

    let forged = json!({
        "protocol": "mew/v0.4",
        "kind": "system/presence",
        "payload": {"event": "join", "participant": {"id": "x"}},
    });
    alice.send(Message::Text(forged.to_string().into())).await.unwrap();

    let error = recv_json(&mut alice).await;
    assert_eq!(error["kind"], "system/error");
    assert_eq!(error["payload"]["error"], "reserved_namespace");
    assert_eq!(error["payload"]["attempted_kind"], "system/presence");

    // bob never sees the forged presence event.
    let ping = json!({"protocol": "mew/v0.4", "kind": "chat", "payload": {"text": "hi"}});
    alice.send(Message::Text(ping.to_string().into())).await.unwrap();
    let bob_msg = recv_json(&mut bob).await;
    assert_eq!(bob_msg["kind"], "chat");
}

/// Admin grants bob a capability; bob must observe the grant itself
/// before the refreshed welcome describing its effects, then ack the
/// grant.
#[tokio::test]
async fn grant_is_delivered_before_the_refreshed_welcome() {
    let space = SpaceConfig {
        name: "demo".to_string(),
        participants: vec![
            participant(
                "admin",
                "admin-token",
                vec![json!({"kind": "capability/grant"}), json!({"kind": "mcp/request"})],
            ),
            participant("bob", "bob-token", vec![json!({"kind": "chat"})]),
        ],
    };
    let gateway = spawn(space).await;

    let (mut admin, _) = connect_async(ws_url(&gateway, "demo", "admin-token")).await.unwrap();
    let (mut bob, _) = connect_async(ws_url(&gateway, "demo", "bob-token")).await.unwrap();
    let _ = recv_json(&mut admin).await; // welcome
    let _ = recv_json(&mut bob).await; // welcome
    let _ = recv_json(&mut admin).await; // bob's presence join

    let grant = json!({
        "protocol": "mew/v0.4",
        "kind": "capability/grant",
        "id": "g1",
        "to": ["bob"],
        "payload": {
            "recipient": "bob",
            "capabilities": [{"kind": "mcp/request", "payload": {"method": "tools/list"}}],
            "reason": "trial",
        },
    });
    admin.send(Message::Text(grant.to_string().into())).await.unwrap();

    let delivered_grant = recv_json(&mut bob).await;
    assert_eq!(delivered_grant["kind"], "capability/grant");

    let refreshed_welcome = recv_json(&mut bob).await;
    assert_eq!(refreshed_welcome["kind"], "system/welcome");
    let capabilities = refreshed_welcome["payload"]["you"]["capabilities"].as_array().unwrap();
    assert!(capabilities
        .iter()
        .any(|c| c["kind"] == "mcp/request" && c["payload"]["method"] == "tools/list"));

    let ack = json!({
        "protocol": "mew/v0.4",
        "kind": "capability/grant-ack",
        "correlation_id": ["g1"],
        "payload": {"status": "accepted"},
    });
    bob.send(Message::Text(ack.to_string().into())).await.unwrap();
}
