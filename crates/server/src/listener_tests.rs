// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::assignment::BuildUrls;
use crate::config::LoadedConfig;
use crate::coordinator::CoordinatorSettings;
use dv_core::test_support::{agent_config, runtime_record};
use dv_core::{DroverConfig, FakeClock};
use dv_wire::{Action, Report};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::MaybeTlsStream;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (SocketAddr, Arc<Coordinator<FakeClock>>) {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let settings = CoordinatorSettings {
        urls: BuildUrls { console_base: String::new(), artifact_base: String::new() },
        lost_contact_after: Duration::from_secs(60),
        auto_register: true,
    };
    let config = DroverConfig { agents: vec![agent_config("a1", &[])], ..DroverConfig::default() };
    let loaded = LoadedConfig { config, version: "cfg".to_string() };
    let coordinator = Arc::new(Coordinator::new(FakeClock::new(), loaded, settings));
    tokio::spawn(Listener::new(tcp, Arc::clone(&coordinator)).run());
    (addr, coordinator)
}

async fn connect(addr: SocketAddr, path: &str, uuid: Option<&str>, token: Option<&str>) -> Result<Client, WsError> {
    let mut request = format!("ws://{}{}", addr, path).into_client_request().unwrap();
    if let Some(uuid) = uuid {
        request.headers_mut().insert(AGENT_UUID_HEADER, HeaderValue::from_str(uuid).unwrap());
    }
    if let Some(token) = token {
        request
            .headers_mut()
            .insert("authorization", HeaderValue::from_str(&format!("Bearer {}", token)).unwrap());
    }
    tokio_tungstenite::connect_async(request).await.map(|(client, _)| client)
}

fn refused_with(result: Result<Client, WsError>) -> StatusCode {
    match result {
        Err(WsError::Http(response)) => response.status(),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("handshake was accepted"),
    }
}

async fn next_message(client: &mut Client) -> Option<Message> {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), client.next()).await.ok()?? {
            Ok(Frame::Text(text)) => return Some(decode(&text).unwrap()),
            Ok(Frame::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (addr, _) = start().await;
    let result = connect(addr, "/other", Some("a1"), Some("t")).await;
    assert_eq!(refused_with(result), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_uuid_or_token_is_unauthorized() {
    let (addr, _) = start().await;
    assert_eq!(refused_with(connect(addr, AGENT_PATH, None, Some("t")).await), StatusCode::UNAUTHORIZED);
    assert_eq!(refused_with(connect(addr, AGENT_PATH, Some("a1"), None).await), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_is_bound_on_first_connect() {
    let (addr, _) = start().await;
    // a1 is configured, so its credential binds at the handshake.
    let first = connect(addr, AGENT_PATH, Some("a1"), Some("right")).await.unwrap();
    drop(first);

    let result = connect(addr, AGENT_PATH, Some("a1"), Some("wrong")).await;
    assert_eq!(refused_with(result), StatusCode::FORBIDDEN);
    assert!(connect(addr, AGENT_PATH, Some("a1"), Some("right")).await.is_ok());
}

#[tokio::test]
async fn ping_is_answered_with_cookie_and_acknowledgement() {
    let (addr, coordinator) = start().await;
    let mut client = connect(addr, AGENT_PATH, Some("a1"), Some("t")).await.unwrap();

    let mut ping = Message::ping(&Report::heartbeat(runtime_record("a1"))).unwrap();
    let ack = ping.ensure_ack_id().unwrap();
    client.send(Frame::Text(encode(&ping).unwrap().into())).await.unwrap();

    let cookie = next_message(&mut client).await.unwrap();
    assert_eq!(cookie.action, Action::SetCookie);
    let acknowledge = next_message(&mut client).await.unwrap();
    assert_eq!(acknowledge.acknowledged_id(), Some(ack));
    assert!(coordinator.is_connected("a1"));
}

#[tokio::test]
async fn closing_the_socket_detaches_the_session() {
    let (addr, coordinator) = start().await;
    let mut client = connect(addr, AGENT_PATH, Some("a1"), Some("t")).await.unwrap();
    wait_until(|| coordinator.is_connected("a1")).await;

    client.close(None).await.unwrap();
    wait_until(|| !coordinator.is_connected("a1")).await;
}

#[tokio::test]
async fn second_connection_replaces_the_first() {
    let (addr, coordinator) = start().await;
    let mut old = connect(addr, AGENT_PATH, Some("a1"), Some("t")).await.unwrap();
    wait_until(|| coordinator.is_connected("a1")).await;
    let _new = connect(addr, AGENT_PATH, Some("a1"), Some("t")).await.unwrap();

    assert!(next_message(&mut old).await.is_none());
    assert!(coordinator.is_connected("a1"));
}
