// ── Core error types ──
//
// User-facing errors from hasslink-core. Consumers never see frame
// decoding failures or WebSocket close codes directly; the
// `From<hasslink_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to Home Assistant at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The connection dropped while the command was in flight.
    #[error("Connection to Home Assistant lost")]
    ConnectionLost,

    /// A command was issued while the client is not `Ready`. Nothing was
    /// sent.
    #[error("Not connected to Home Assistant")]
    NotConnected,

    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout { operation: String, timeout_secs: u64 },

    // ── Server errors ────────────────────────────────────────────────
    /// Home Assistant understood the command and rejected it.
    #[error("Home Assistant rejected the command ({code}): {message}")]
    Server { code: String, message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` when a later attempt could succeed without any
    /// change on the caller's side.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ConnectionLost
                | Self::NotConnected
                | Self::Timeout { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hasslink_api::Error> for CoreError {
    fn from(err: hasslink_api::Error) -> Self {
        use hasslink_api::Error as Api;

        match err {
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::ProtocolViolation { expected, got } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("protocol violation: expected {expected}, got {got}"),
            },
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            Api::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            Api::ConnectionLost => CoreError::ConnectionLost,
            Api::Timeout { operation, timeout } if operation == "handshake" => {
                CoreError::ConnectionFailed {
                    url: String::new(),
                    reason: format!("handshake timed out after {}s", timeout.as_secs()),
                }
            }
            Api::Timeout { operation, timeout } => CoreError::Timeout {
                operation,
                timeout_secs: timeout.as_secs(),
            },
            Api::Server { code, message } => CoreError::Server { code, message },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            Api::Serialization(e) => CoreError::Internal(format!("Serialization error: {e}")),
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::UnsupportedScheme(scheme) => CoreError::Config {
                message: format!("Unsupported URL scheme '{scheme}'"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn api_errors_map_to_user_facing_variants() {
        assert!(matches!(
            CoreError::from(hasslink_api::Error::ConnectionLost),
            CoreError::ConnectionLost
        ));
        assert!(matches!(
            CoreError::from(hasslink_api::Error::Authentication {
                message: "bad".into()
            }),
            CoreError::AuthenticationFailed { .. }
        ));

        let timeout = CoreError::from(hasslink_api::Error::Timeout {
            operation: "call_service".into(),
            timeout: Duration::from_secs(30),
        });
        assert_eq!(timeout.to_string(), "call_service timed out after 30s");
        assert!(timeout.is_transient());
    }

    #[test]
    fn handshake_timeout_is_a_connection_failure() {
        let err = CoreError::from(hasslink_api::Error::Timeout {
            operation: "handshake".into(),
            timeout: Duration::from_secs(10),
        });
        assert!(
            matches!(err, CoreError::ConnectionFailed { ref reason, .. } if reason == "handshake timed out after 10s")
        );
        assert!(err.is_transient());
    }

    #[test]
    fn server_rejection_is_not_transient() {
        let err = CoreError::from(hasslink_api::Error::Server {
            code: "not_found".into(),
            message: "Service light.explode not found.".into(),
        });
        assert!(!err.is_transient());
        assert!(err.to_string().contains("not_found"));
    }
}
