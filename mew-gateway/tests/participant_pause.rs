//! `participant/pause` halts a target's own outbound emission until an
//! explicit `participant/resume` or its embedded timeout elapses; it
//! never affects anyone else's ability to send to the paused target.

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
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
async fn paused_participant_cannot_emit_until_resumed() {
    let space = SpaceConfig {
        name: "demo".to_string(),
        participants: vec![
            participant(
                "admin",
                "admin-token",
                vec![json!({"kind": "participant/pause"}), json!({"kind": "participant/resume"})],
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

    let pause = json!({
        "protocol": "mew/v0.4",
        "kind": "participant/pause",
        "to": ["bob"],
        "payload": {"reason": "investigating a runaway loop"},
    });
    admin.send(Message::Text(pause.to_string().into())).await.unwrap();

    let delivered_pause = recv_json(&mut bob).await;
    assert_eq!(delivered_pause["kind"], "participant/pause");

    let chat = json!({"protocol": "mew/v0.4", "kind": "chat", "payload": {"text": "still here?"}});
    bob.send(Message::Text(chat.to_string().into())).await.unwrap();

    // While paused, bob's chat never reaches admin: resume the target,
    // then confirm it's the *next* chat (not the dropped one) that lands.
    let resume = json!({"protocol": "mew/v0.4", "kind": "participant/resume", "to": ["bob"]});
    admin.send(Message::Text(resume.to_string().into())).await.unwrap();
    let delivered_resume = recv_json(&mut bob).await;
    assert_eq!(delivered_resume["kind"], "participant/resume");

    bob.send(Message::Text(chat.to_string().into())).await.unwrap();
    let received = recv_json(&mut admin).await;
    assert_eq!(received["kind"], "chat");
    assert_eq!(received["payload"]["text"], "still here?");
}

#[tokio::test]
async fn pause_with_timeout_seconds_auto_resumes() {
    let space = SpaceConfig {
        name: "demo".to_string(),
        participants: vec![
            participant("admin", "admin-token", vec![json!({"kind": "participant/pause"})]),
            participant("bob", "bob-token", vec![json!({"kind": "chat"})]),
        ],
    };
    let gateway = spawn(space).await;

    let (mut admin, _) = connect_async(ws_url(&gateway, "demo", "admin-token")).await.unwrap();
    let (mut bob, _) = connect_async(ws_url(&gateway, "demo", "bob-token")).await.unwrap();
    let _ = recv_json(&mut admin).await; // welcome
    let _ = recv_json(&mut bob).await; // welcome
    let _ = recv_json(&mut admin).await; // bob's presence join

    let pause = json!({
        "protocol": "mew/v0.4",
        "kind": "participant/pause",
        "to": ["bob"],
        "payload": {"timeout_seconds": 0},
    });
    admin.send(Message::Text(pause.to_string().into())).await.unwrap();
    let _ = recv_json(&mut bob).await; // the pause notice itself

    tokio::time::sleep(Duration::from_millis(20)).await;

    let chat = json!({"protocol": "mew/v0.4", "kind": "chat", "payload": {"text": "back already"}});
    bob.send(Message::Text(chat.to_string().into())).await.unwrap();
    let received = recv_json(&mut admin).await;
    assert_eq!(received["kind"], "chat");
    assert_eq!(received["payload"]["text"], "back already");
}
