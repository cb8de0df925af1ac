//! Integration tests for the handshake and `Connection` against an
//! in-process WebSocket server speaking the Home Assistant protocol.
#![allow(clippy::unwrap_used)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use hasslink_api::websocket::{authenticate, open};
use hasslink_api::{Command, ConnectOptions, Connection, Error, EventFrame, EventSink, HassEvent};

// ── Helpers ─────────────────────────────────────────────────────────

type ServerSocket = WebSocketStream<TcpStream>;

/// Accept one connection and hand the socket to `handler`.
async fn serve<F, Fut>(handler: F) -> Url
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        handler(ws).await;
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn recv_json(ws: &mut ServerSocket) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Close(_) => panic!("client closed"),
            _ => {}
        }
    }
}

/// Server side of a successful handshake.
async fn accept_auth(ws: &mut ServerSocket) {
    send_json(ws, json!({ "type": "auth_required", "ha_version": "2026.2.1" })).await;
    let auth = recv_json(ws).await;
    assert_eq!(auth["type"], "auth");
    assert_eq!(auth["access_token"], "secret-token");
    send_json(ws, json!({ "type": "auth_ok", "ha_version": "2026.2.1" })).await;
}

fn token() -> SecretString {
    SecretString::from("secret-token")
}

fn options() -> ConnectOptions {
    ConnectOptions {
        handshake_timeout: Duration::from_secs(2),
        command_timeout: Duration::from_secs(2),
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<EventFrame>>);

impl EventSink for Recorder {
    fn on_event(&self, frame: EventFrame) {
        self.0.lock().unwrap().push(frame);
    }
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_handshake_returns_server_version() {
    let url = serve(|mut ws| async move {
        accept_auth(&mut ws).await;
        let _ = ws.next().await;
    })
    .await;

    let mut ws = open(&url).await.unwrap();
    let version = authenticate(&mut ws, &token(), Duration::from_secs(2)).await.unwrap();
    assert_eq!(version.as_deref(), Some("2026.2.1"));
}

#[tokio::test]
async fn test_invalid_token_is_authentication_error() {
    let url = serve(|mut ws| async move {
        send_json(&mut ws, json!({ "type": "auth_required" })).await;
        let _ = recv_json(&mut ws).await;
        send_json(&mut ws, json!({ "type": "auth_invalid", "message": "Invalid access token or password" })).await;
        let _ = ws.next().await;
    })
    .await;

    let mut ws = open(&url).await.unwrap();
    let err = authenticate(&mut ws, &token(), Duration::from_secs(2)).await.unwrap_err();
    assert!(err.is_auth_failure());
    assert!(err.to_string().contains("Invalid access token or password"));
}

#[tokio::test]
async fn test_unexpected_first_frame_fails_fast() {
    let url = serve(|mut ws| async move {
        send_json(&mut ws, json!({ "id": 1, "type": "result", "success": true })).await;
        let _ = ws.next().await;
    })
    .await;

    let mut ws = open(&url).await.unwrap();
    let err = authenticate(&mut ws, &token(), Duration::from_secs(2)).await.unwrap_err();
    assert!(
        matches!(err, Error::ProtocolViolation { ref got, .. } if got == "result"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_silent_server_times_out_handshake() {
    let url = serve(|mut ws| async move {
        let _ = ws.next().await;
    })
    .await;

    let mut ws = open(&url).await.unwrap();
    let err = authenticate(&mut ws, &token(), Duration::from_millis(200)).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { ref operation, .. } if operation == "handshake"));
}

#[tokio::test]
async fn test_refused_connection_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{addr}")).unwrap();
    let err = open(&url).await.unwrap_err();
    assert!(err.is_transient(), "unexpected error: {err:?}");
}

// ── Connection ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_out_of_order_responses_resolve_by_id() {
    let url = serve(|mut ws| async move {
        accept_auth(&mut ws).await;
        let first = recv_json(&mut ws).await;
        let second = recv_json(&mut ws).await;
        // Answer the later request first.
        for request in [second, first] {
            send_json(
                &mut ws,
                json!({ "id": request["id"], "type": "result", "success": true, "result": request["type"] }),
            )
            .await;
        }
        let _ = ws.next().await;
    })
    .await;

    let conn = Connection::connect(&url, &token(), &options(), Arc::new(Recorder::default()))
        .await
        .unwrap();
    assert_eq!(conn.ha_version(), Some("2026.2.1"));

    let (states, areas) = tokio::join!(
        conn.request(&Command::GetStates),
        conn.request(&Command::AreaRegistryList),
    );
    assert_eq!(states.unwrap(), json!("get_states"));
    assert_eq!(areas.unwrap(), json!("config/area_registry/list"));
}

#[tokio::test]
async fn test_server_close_rejects_all_pending() {
    let url = serve(|mut ws| async move {
        accept_auth(&mut ws).await;
        for _ in 0..3 {
            let _ = recv_json(&mut ws).await;
        }
        ws.close(None).await.unwrap();
    })
    .await;

    let conn = Connection::connect(&url, &token(), &options(), Arc::new(Recorder::default()))
        .await
        .unwrap();

    let (a, b, c) = tokio::join!(
        conn.send(&Command::GetStates),
        conn.send(&Command::DeviceRegistryList),
        conn.send(&Command::Ping),
    );
    for result in [a, b, c] {
        assert!(matches!(result, Err(Error::ConnectionLost)));
    }
    conn.closed().await;
    assert_eq!(conn.pending_count(), 0);

    let after = conn.send(&Command::Ping).await;
    assert!(matches!(after, Err(Error::ConnectionLost)));
}

#[tokio::test]
async fn test_events_reach_sink_and_pong_resolves_ping() {
    let url = serve(|mut ws| async move {
        accept_auth(&mut ws).await;
        let ping = recv_json(&mut ws).await;
        assert_eq!(ping["type"], "ping");
        send_json(
            &mut ws,
            json!({
                "id": 99,
                "type": "event",
                "event": {
                    "event_type": "state_changed",
                    "data": {
                        "entity_id": "light.kitchen",
                        "new_state": { "entity_id": "light.kitchen", "state": "on" },
                        "old_state": null
                    }
                }
            }),
        )
        .await;
        send_json(&mut ws, json!({ "id": ping["id"], "type": "pong" })).await;
        let _ = ws.next().await;
    })
    .await;

    let sink = Arc::new(Recorder::default());
    let conn = Connection::connect(&url, &token(), &options(), sink.clone())
        .await
        .unwrap();

    let pong = conn.send(&Command::Ping).await.unwrap();
    assert!(pong.success);

    // The event was written before the pong, so it has been dispatched.
    let events = sink.0.lock().unwrap();
    assert_eq!(events.len(), 1);
    let HassEvent::StateChanged { data } = &events[0].event else {
        panic!("expected state_changed");
    };
    assert_eq!(data.new_state.as_ref().unwrap().state, "on");
}

#[tokio::test]
async fn test_close_sends_close_frame() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let url = serve(|mut ws| async move {
        accept_auth(&mut ws).await;
        let got_close = loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) => break true,
                Some(Ok(_)) => {}
                _ => break false,
            }
        };
        let _ = tx.send(got_close);
    })
    .await;

    let conn = Connection::connect(&url, &token(), &options(), Arc::new(Recorder::default()))
        .await
        .unwrap();
    conn.close();
    conn.closed().await;
    assert!(conn.is_closed());
    assert!(rx.await.unwrap());
}
