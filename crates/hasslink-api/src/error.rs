use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `hasslink-api` crate.
///
/// Covers every failure mode of a Home Assistant WebSocket session:
/// handshake, transport, command correlation, and frame decoding.
/// `hasslink-core` maps these into its user-facing taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The server answered the auth frame with `auth_invalid`.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The server sent a frame that is not valid at this point of the
    /// session (e.g. anything other than `auth_required` first).
    #[error("Protocol violation: expected {expected}, got {got}")]
    ProtocolViolation { expected: String, got: String },

    // ── Transport ───────────────────────────────────────────────────
    /// WebSocket connection could not be opened or failed mid-stream.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the server.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The connection went away while a command was still waiting for
    /// its response. No response will ever arrive.
    #[error("Connection lost before a response arrived")]
    ConnectionLost,

    /// A command or the handshake did not complete in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    // ── Server ──────────────────────────────────────────────────────
    /// A correlated `result` frame reported `success: false`.
    #[error("Home Assistant error ({code}): {message}")]
    Server { code: String, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw frame for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An outgoing command could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Configuration ───────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// URL scheme that cannot be mapped to a WebSocket endpoint.
    #[error("Unsupported URL scheme '{0}' (expected http, https, ws, or wss)")]
    UnsupportedScheme(String),
}

impl Error {
    /// Returns `true` if the token was rejected by the server.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_)
                | Self::WebSocketClosed { .. }
                | Self::ConnectionLost
                | Self::Timeout { .. }
        )
    }

    /// Returns `true` if the server understood the command and rejected it.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}
