//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use hasslink_config::ConfigError;
use hasslink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to Home Assistant at {url}")]
    #[diagnostic(
        code(hasslink::connection_failed),
        help(
            "Check that Home Assistant is running and reachable.\n\
             URL: {url}\n\
             Try: hasslink status --url http://homeassistant.local:8123"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Not connected to Home Assistant")]
    #[diagnostic(
        code(hasslink::not_connected),
        help("The connection dropped before the command could be sent. Retry the command.")
    )]
    NotConnected,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(hasslink::auth_failed),
        help(
            "Verify your long-lived access token (Profile > Security in Home Assistant).\n\
             Run: hasslink config set-token --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(hasslink::no_token),
        help(
            "Configure a token with: hasslink config init\n\
             Or set the HASSLINK_TOKEN environment variable."
        )
    )]
    NoToken { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(hasslink::not_found),
        help("Run: hasslink {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Server ───────────────────────────────────────────────────────
    #[error("Home Assistant error ({code}): {message}")]
    #[diagnostic(code(hasslink::server_error))]
    Server { code: String, message: String },

    #[error("Internal error: {0}")]
    #[diagnostic(code(hasslink::internal))]
    Internal(String),

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hasslink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(hasslink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: hasslink config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No Home Assistant URL configured")]
    #[diagnostic(
        code(hasslink::no_config),
        help(
            "Create a profile with: hasslink config init\n\
             Expected at: {path}\n\
             Or pass --url / set HASSLINK_URL."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(hasslink::config))]
    Config(Box<figment::Error>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("{operation} timed out after {seconds}s")]
    #[diagnostic(
        code(hasslink::timeout),
        help("Increase the timeout with --timeout or check Home Assistant responsiveness.")
    )]
    Timeout { operation: String, seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(hasslink::json), help("Service data must be a JSON object."))]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::NotConnected => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoToken { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile name to an authentication failure.
    pub fn with_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { message, .. } => Self::AuthFailed {
                profile: profile.into(),
                message,
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "default".into(),
                message,
            },
            CoreError::ConnectionLost | CoreError::NotConnected => CliError::NotConnected,
            CoreError::Timeout {
                operation,
                timeout_secs,
            } => CliError::Timeout {
                operation,
                seconds: timeout_secs,
            },
            CoreError::Server { code, message } => CliError::Server { code, message },
            CoreError::Config { message } => CliError::Validation {
                field: "url".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoToken { profile } => CliError::NoToken { profile },
            ConfigError::Serialization(e) => CliError::Internal(e.to_string()),
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_exits_with_auth_code() {
        let err = CliError::from(CoreError::AuthenticationFailed {
            message: "Invalid access token".into(),
        })
        .with_profile("home");
        assert_eq!(err.exit_code(), exit_code::AUTH);
        assert!(matches!(err, CliError::AuthFailed { ref profile, .. } if profile == "home"));
    }

    #[test]
    fn lost_connection_exits_with_connection_code() {
        assert_eq!(
            CliError::from(CoreError::ConnectionLost).exit_code(),
            exit_code::CONNECTION
        );
        assert_eq!(
            CliError::from(CoreError::Timeout {
                operation: "get_states".into(),
                timeout_secs: 30
            })
            .exit_code(),
            exit_code::TIMEOUT
        );
    }
}
