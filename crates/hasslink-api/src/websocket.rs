//! WebSocket transport, session handshake, and the per-connection I/O task.
//!
//! A session goes through three steps, kept separate so the caller can
//! publish status between them:
//!
//! 1. [`open`] the socket (URL normalised with [`websocket_url`]),
//! 2. [`authenticate`] with a long-lived access token,
//! 3. [`Connection::spawn`] the reader/writer task that owns the socket
//!    from then on.
//!
//! Only step 3 creates a [`Correlator`], so no command can ever reach the
//! server before `auth_ok`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hasslink_api::{Command, ConnectOptions, Connection, EventFrame, EventSink};
//!
//! struct Print;
//! impl EventSink for Print {
//!     fn on_event(&self, frame: EventFrame) { println!("{frame:?}"); }
//! }
//!
//! let url = url::Url::parse("http://homeassistant.local:8123")?;
//! let conn = Connection::connect(&url, &token, &ConnectOptions::default(), Arc::new(Print)).await?;
//! let states = conn.request(&Command::GetStates).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::correlator::Correlator;
use crate::error::Error;
use crate::protocol::{AuthFrame, Command, EventFrame, Inbound, ResultFrame};

/// Client-side socket as returned by [`open`].
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WEBSOCKET_PATH: &str = "/api/websocket";

// ── URL normalisation ────────────────────────────────────────────────

/// Map a configured Home Assistant URL to its WebSocket endpoint.
///
/// `http` becomes `ws` and `https` becomes `wss`. A bare host (empty or
/// `/` path) gets `/api/websocket` appended; any other path is kept as
/// given so reverse-proxied installs work.
pub fn websocket_url(base: &Url) -> Result<Url, Error> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::UnsupportedScheme(other.to_owned())),
    };

    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::UnsupportedScheme(base.scheme().to_owned()))?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(WEBSOCKET_PATH);
    }
    Ok(url)
}

// ── ConnectOptions ───────────────────────────────────────────────────

/// Timeouts applied to one connection attempt and its commands.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Upper bound on `auth_required` → `auth_ok`. Default: 10s.
    pub handshake_timeout: Duration,

    /// Deadline for each correlated command. Default: 30s.
    pub command_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
        }
    }
}

// ── Handshake ────────────────────────────────────────────────────────

/// Open the WebSocket. `url` is normalised first.
pub async fn open(url: &Url) -> Result<WsStream, Error> {
    let url = websocket_url(url)?;
    tracing::info!(url = %url, "Connecting to Home Assistant");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let (ws, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::debug!("WebSocket open");
    Ok(ws)
}

/// Run the auth exchange on a freshly opened socket.
///
/// Returns the server's `ha_version` on `auth_ok`. The whole exchange is
/// bounded by `timeout`.
pub async fn authenticate(
    ws: &mut WsStream,
    token: &SecretString,
    timeout: Duration,
) -> Result<Option<String>, Error> {
    tokio::time::timeout(timeout, handshake(ws, token))
        .await
        .map_err(|_| Error::Timeout {
            operation: "handshake".into(),
            timeout,
        })?
}

async fn handshake(ws: &mut WsStream, token: &SecretString) -> Result<Option<String>, Error> {
    match decode_handshake_frame(&next_text(ws).await?, "auth_required")? {
        Inbound::AuthRequired { ha_version } => {
            tracing::debug!(ha_version = ?ha_version, "auth required");
        }
        other => {
            return Err(Error::ProtocolViolation {
                expected: "auth_required".into(),
                got: other.kind().into(),
            });
        }
    }

    let auth = serde_json::to_string(&AuthFrame::new(token.expose_secret()))?;
    ws.send(Message::Text(auth.into()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    match decode_handshake_frame(&next_text(ws).await?, "auth_ok")? {
        Inbound::AuthOk { ha_version } => {
            tracing::info!(ha_version = ?ha_version, "Authenticated");
            Ok(ha_version)
        }
        Inbound::AuthInvalid { message } => Err(Error::Authentication {
            message: message.unwrap_or_else(|| "Invalid access token".into()),
        }),
        other => Err(Error::ProtocolViolation {
            expected: "auth_ok".into(),
            got: other.kind().into(),
        }),
    }
}

fn decode_handshake_frame(text: &str, expected: &str) -> Result<Inbound, Error> {
    Inbound::decode(text).map_err(|_| Error::ProtocolViolation {
        expected: expected.into(),
        got: "malformed frame".into(),
    })
}

/// Next text frame, skipping control frames.
async fn next_text(ws: &mut WsStream) -> Result<String, Error> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
            Some(Ok(Message::Close(frame))) => return Err(closed_error(frame.as_ref())),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            None => {
                return Err(Error::WebSocketClosed {
                    code: 1006,
                    reason: "stream ended".into(),
                });
            }
        }
    }
}

fn closed_error(frame: Option<&tungstenite::protocol::CloseFrame>) -> Error {
    match frame {
        Some(cf) => Error::WebSocketClosed {
            code: u16::from(cf.code),
            reason: cf.reason.as_str().to_owned(),
        },
        None => Error::WebSocketClosed {
            code: 1005,
            reason: String::new(),
        },
    }
}

// ── EventSink ────────────────────────────────────────────────────────

/// Receives every `event` frame, in arrival order, on the reader task.
///
/// Implementations must not block: the reader does not read the next
/// frame until `on_event` returns.
pub trait EventSink: Send + Sync {
    fn on_event(&self, frame: EventFrame);
}

// ── Connection ───────────────────────────────────────────────────────

/// An authenticated session with its I/O task running.
///
/// Dropping the last handle closes the socket.
pub struct Connection {
    correlator: Arc<Correlator>,
    ha_version: Option<String>,
    shutdown: CancellationToken,
    closed: CancellationToken,
}

impl Connection {
    /// Open, authenticate, and spawn in one call.
    pub async fn connect(
        url: &Url,
        token: &SecretString,
        options: &ConnectOptions,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, Error> {
        let mut ws = open(url).await?;
        let ha_version = authenticate(&mut ws, token, options.handshake_timeout).await?;
        Ok(Self::spawn(ws, ha_version, options.command_timeout, sink))
    }

    /// Take ownership of an authenticated socket and start its I/O task.
    pub fn spawn(
        ws: WsStream,
        ha_version: Option<String>,
        command_timeout: Duration,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(Correlator::new(outgoing_tx, command_timeout));
        let shutdown = CancellationToken::new();
        let closed = CancellationToken::new();

        tokio::spawn(io_loop(
            ws,
            outgoing_rx,
            Arc::clone(&correlator),
            sink,
            shutdown.clone(),
            closed.clone(),
        ));

        Self {
            correlator,
            ha_version,
            shutdown,
            closed,
        }
    }

    /// Send a command and return its raw result frame.
    pub async fn send(&self, command: &Command) -> Result<ResultFrame, Error> {
        self.correlator.send(command).await
    }

    /// Send a command and return its payload, mapping `success: false`
    /// to [`Error::Server`].
    pub async fn request(&self, command: &Command) -> Result<serde_json::Value, Error> {
        self.correlator.send(command).await?.into_result()
    }

    pub fn ha_version(&self) -> Option<&str> {
        self.ha_version.as_deref()
    }

    pub fn pending_count(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Resolves once the I/O task has exited and every pending command
    /// has been rejected.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Send a close frame and stop the I/O task.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── I/O task ─────────────────────────────────────────────────────────

/// Single reader and writer for one socket.
///
/// Exits on shutdown, transport error, or server close. On exit the
/// outgoing queue is closed first, so no new command can slip in, then
/// all pending commands are rejected.
async fn io_loop(
    ws: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    correlator: Arc<Correlator>,
    sink: Arc<dyn EventSink>,
    shutdown: CancellationToken,
    closed: CancellationToken,
) {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::debug!("closing WebSocket");
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            Some(frame) = outgoing.recv() => {
                if let Err(e) = write.send(Message::Text(frame.into())).await {
                    tracing::warn!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(text.as_str(), &correlator, sink.as_ref());
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong; it goes out with the next write
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        match frame {
                            Some(cf) => tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "WebSocket closed by server"
                            ),
                            None => tracing::info!("WebSocket closed by server"),
                        }
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket read failed");
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    outgoing.close();
    correlator.fail_all();
    closed.cancel();
}

/// Route one decoded frame: results to the correlator, events to the sink.
fn dispatch(text: &str, correlator: &Correlator, sink: &dyn EventSink) {
    let inbound = match Inbound::decode(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            tracing::debug!(error = %e, "dropping undecodable frame");
            return;
        }
    };

    match inbound {
        Inbound::Result(frame) => {
            let id = frame.id;
            if !correlator.resolve(frame) {
                tracing::debug!(id, "dropping result with no pending command");
            }
        }
        Inbound::Pong { id } => {
            if !correlator.resolve(ResultFrame::pong(id)) {
                tracing::debug!(id, "dropping pong with no pending ping");
            }
        }
        Inbound::Event(frame) => sink.on_event(frame),
        Inbound::AuthRequired { .. } | Inbound::AuthOk { .. } | Inbound::AuthInvalid { .. } => {
            tracing::debug!(kind = inbound.kind(), "ignoring auth frame after handshake");
        }
        Inbound::Unknown => tracing::trace!("ignoring unknown frame type"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn http_base_maps_to_ws_endpoint() {
        assert_eq!(
            websocket_url(&url("http://homeassistant.local:8123")).unwrap().as_str(),
            "ws://homeassistant.local:8123/api/websocket"
        );
        assert_eq!(
            websocket_url(&url("https://ha.example.com/")).unwrap().as_str(),
            "wss://ha.example.com/api/websocket"
        );
    }

    #[test]
    fn explicit_websocket_path_is_kept() {
        assert_eq!(
            websocket_url(&url("ws://10.0.0.5:8123/api/websocket")).unwrap().as_str(),
            "ws://10.0.0.5:8123/api/websocket"
        );
        assert_eq!(
            websocket_url(&url("https://proxy.lan/ha/api/websocket")).unwrap().as_str(),
            "wss://proxy.lan/ha/api/websocket"
        );
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let err = websocket_url(&url("ftp://ha.local")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(ref s) if s == "ftp"));
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EventFrame>>);

    impl EventSink for Recorder {
        fn on_event(&self, frame: EventFrame) {
            self.0.lock().unwrap().push(frame);
        }
    }

    #[test]
    fn dispatch_routes_events_to_sink() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let correlator = Correlator::new(tx, Duration::from_secs(1));
        let sink = Recorder::default();

        dispatch(
            r#"{"id":2,"type":"event","event":{"event_type":"state_changed","data":{"entity_id":"light.a","new_state":null,"old_state":null}}}"#,
            &correlator,
            &sink,
        );
        dispatch(r#"{"id":99,"type":"result","success":true,"result":null}"#, &correlator, &sink);
        dispatch("garbage", &correlator, &sink);

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, 2);
    }
}
