//! Gateway integration tests: start a real gateway and talk to it over WS and HTTP.
//!
//! Run with: `cargo test -p inkroom-gateway --test integration`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use inkroom_core::config::{Config, RoomsConfig};
use inkroom_gateway::GatewayState;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestGateway {
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl TestGateway {
    fn ws_url(&self, room: &str) -> String {
        format!("ws://{}/ws/{room}", self.addr)
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn connect(&self, room: &str) -> Ws {
        let (ws, _) = connect_async(self.ws_url(room))
            .await
            .expect("WS connect failed");
        ws
    }

    async fn get_json(&self, path: &str) -> Value {
        reqwest::get(self.http_url(path))
            .await
            .expect("HTTP request failed")
            .json()
            .await
            .unwrap()
    }

    async fn user_count(&self, room: &str) -> u64 {
        let body = self.get_json(&format!("/api/rooms/{room}/users")).await;
        body["user_count"].as_u64().unwrap()
    }

    /// Poll until the room reports `expected` members.
    async fn wait_for_users(&self, room: &str, expected: u64) {
        for _ in 0..100 {
            if self.user_count(room).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("room {room} never reached {expected} users");
    }

    /// Poll until the room's replay buffer holds `expected` events.
    async fn wait_for_buffered(&self, room: &str, expected: u64) {
        for _ in 0..100 {
            let body = self.get_json("/api/rooms").await;
            let buffered = body["rooms"]
                .as_array()
                .unwrap()
                .iter()
                .find(|r| r["room_id"] == room)
                .and_then(|r| r["buffered_events"].as_u64());
            if buffered == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("room {room} never buffered {expected} events");
    }
}

async fn start_test_gateway(config: Config) -> TestGateway {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(GatewayState::new(Arc::new(config)));
    let shutdown = CancellationToken::new();

    let token = shutdown.clone();
    tokio::spawn(async move {
        let _ = inkroom_gateway::serve(listener, state, token).await;
    });

    TestGateway { addr, shutdown }
}

async fn send_text(ws: &mut Ws, text: &str) {
    ws.send(Message::Text(text.to_string().into())).await.unwrap();
}

/// Next text frame as a raw string, skipping control frames.
async fn recv_text(ws: &mut Ws) -> String {
    let deadline = Duration::from_secs(2);
    loop {
        let msg = tokio::time::timeout(deadline, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("WS error");
        if let Message::Text(text) = msg {
            return text.as_str().to_owned();
        }
    }
}

async fn recv_json(ws: &mut Ws) -> Value {
    serde_json::from_str(&recv_text(ws).await).unwrap()
}

async fn assert_silent(ws: &mut Ws) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "expected no frame, got {result:?}");
}

/// True once the server has dropped or closed the socket.
async fn wait_closed(ws: &mut Ws) -> bool {
    let deadline = Duration::from_secs(3);
    loop {
        match tokio::time::timeout(deadline, ws.next()).await {
            Err(_) => return false,
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => continue,
        }
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let gateway = start_test_gateway(Config::default()).await;

    let body = gateway.get_json("/health").await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert_eq!(body["rooms"], 0);
}

#[tokio::test]
async fn test_draw_reaches_peer_but_not_sender() {
    let gateway = start_test_gateway(Config::default()).await;

    let mut a = gateway.connect("r1").await;
    gateway.wait_for_users("r1", 1).await;
    let mut b = gateway.connect("r1").await;

    let joined = recv_json(&mut a).await;
    assert_eq!(joined["type"], "user_joined");
    assert_eq!(joined["message"], "A user joined the whiteboard");

    let draw = r#"{"type":"draw","x":1,"y":2}"#;
    send_text(&mut a, draw).await;

    assert_eq!(recv_text(&mut b).await, draw);
    assert_silent(&mut a).await;
    gateway.wait_for_buffered("r1", 1).await;
}

#[tokio::test]
async fn test_late_joiner_gets_replay_before_live_traffic() {
    let gateway = start_test_gateway(Config::default()).await;

    let mut a = gateway.connect("art").await;
    for n in 1..=3 {
        send_text(&mut a, &format!(r#"{{"type":"draw","n":{n}}}"#)).await;
    }
    gateway.wait_for_buffered("art", 3).await;

    let mut c = gateway.connect("art").await;
    let replay = recv_json(&mut c).await;
    assert_eq!(replay["type"], "existing_data");
    let order: Vec<i64> = replay["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["n"].as_i64().unwrap())
        .collect();
    assert_eq!(order, vec![1, 2, 3]);

    // A hears about C, then C gets live draws after the replay
    assert_eq!(recv_json(&mut a).await["type"], "user_joined");
    send_text(&mut a, r#"{"type":"draw","n":4}"#).await;
    assert_eq!(recv_json(&mut c).await["n"], 4);
}

#[tokio::test]
async fn test_last_disconnect_discards_room() {
    let gateway = start_test_gateway(Config::default()).await;

    let mut a = gateway.connect("r1").await;
    send_text(&mut a, r#"{"type":"draw","x":1}"#).await;
    gateway.wait_for_buffered("r1", 1).await;

    a.close(None).await.ok();
    gateway.wait_for_users("r1", 0).await;
    let rooms = gateway.get_json("/api/rooms").await;
    assert!(rooms["rooms"].as_array().unwrap().is_empty());

    // A fresh join finds an empty room: no replay frame
    let mut d = gateway.connect("r1").await;
    assert_silent(&mut d).await;
}

#[tokio::test]
async fn test_clear_from_one_client() {
    let gateway = start_test_gateway(Config::default()).await;

    let mut a = gateway.connect("r2").await;
    gateway.wait_for_users("r2", 1).await;
    let mut b = gateway.connect("r2").await;
    assert_eq!(recv_json(&mut a).await["type"], "user_joined");
    let mut c = gateway.connect("r2").await;
    assert_eq!(recv_json(&mut a).await["type"], "user_joined");
    assert_eq!(recv_json(&mut b).await["type"], "user_joined");

    send_text(&mut b, r#"{"type":"draw","x":9}"#).await;
    recv_text(&mut a).await;
    recv_text(&mut c).await;

    send_text(&mut b, r#"{"type":"clear"}"#).await;

    let expected = r#"{"type":"clear_canvas","message":"Canvas cleared"}"#;
    assert_eq!(recv_text(&mut a).await, expected);
    assert_eq!(recv_text(&mut c).await, expected);
    assert_silent(&mut b).await;
    gateway.wait_for_buffered("r2", 0).await;
}

#[tokio::test]
async fn test_admin_clear_reaches_everyone() {
    let gateway = start_test_gateway(Config::default()).await;

    let mut a = gateway.connect("board").await;
    gateway.wait_for_users("board", 1).await;
    let mut b = gateway.connect("board").await;
    assert_eq!(recv_json(&mut a).await["type"], "user_joined");

    send_text(&mut a, r#"{"type":"draw","x":3}"#).await;
    recv_text(&mut b).await;

    let resp: Value = reqwest::Client::new()
        .post(gateway.http_url("/api/rooms/board/clear"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["message"], "Room board cleared successfully");

    for ws in [&mut a, &mut b] {
        let frame = recv_json(ws).await;
        assert_eq!(frame["type"], "clear_canvas");
        assert_eq!(frame["message"], "Canvas cleared by user");
    }
    gateway.wait_for_buffered("board", 0).await;
}

#[tokio::test]
async fn test_malformed_frame_closes_sender() {
    let gateway = start_test_gateway(Config::default()).await;

    let mut a = gateway.connect("r1").await;
    gateway.wait_for_users("r1", 1).await;
    let mut b = gateway.connect("r1").await;
    assert_eq!(recv_json(&mut a).await["type"], "user_joined");

    send_text(&mut a, "this is not json").await;

    let left = recv_json(&mut b).await;
    assert_eq!(left["type"], "user_left");
    assert_eq!(left["message"], "A user left the whiteboard");
    assert!(wait_closed(&mut a).await);
    assert_eq!(gateway.user_count("r1").await, 1);
}

#[tokio::test]
async fn test_unknown_type_is_ignored() {
    let gateway = start_test_gateway(Config::default()).await;

    let mut a = gateway.connect("r1").await;
    gateway.wait_for_users("r1", 1).await;
    let mut b = gateway.connect("r1").await;
    assert_eq!(recv_json(&mut a).await["type"], "user_joined");

    send_text(&mut a, r#"{"type":"cursor","x":1}"#).await;
    assert_silent(&mut b).await;

    // The sender's session is still alive
    let draw = r#"{"type":"draw","x":2}"#;
    send_text(&mut a, draw).await;
    assert_eq!(recv_text(&mut b).await, draw);
}

#[tokio::test]
async fn test_idle_timeout_closes_connection() {
    let config = Config {
        rooms: Some(RoomsConfig {
            max_replay_events: None,
            idle_timeout_secs: Some(1),
        }),
        ..Config::default()
    };
    let gateway = start_test_gateway(config).await;

    let mut a = gateway.connect("quiet").await;
    gateway.wait_for_users("quiet", 1).await;

    assert!(wait_closed(&mut a).await);
    gateway.wait_for_users("quiet", 0).await;
}
