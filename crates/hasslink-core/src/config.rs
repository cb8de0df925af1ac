// ── Runtime connection configuration ──
//
// Describes *how* to reach one Home Assistant instance. Carries the
// access token and connection tuning, but never touches disk or the
// environment. The CLI constructs a `ClientConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::model::SupportedDomain;

/// Configuration for a single Home Assistant connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL (`http://homeassistant.local:8123`) or WebSocket URL.
    pub url: Url,
    /// Long-lived access token.
    pub token: SecretString,
    /// Deadline for each correlated command.
    pub command_timeout: Duration,
    /// Deadline for `auth_required` → `auth_ok`.
    pub handshake_timeout: Duration,
    /// Fixed wait between a lost connection and the next attempt.
    pub reconnect_delay: Duration,
    /// Where to persist the catalog after each seed. `None` = don't.
    pub catalog_path: Option<PathBuf>,
    /// Treat an entity-registry fetch failure as a failed seed instead
    /// of continuing with an empty registry.
    pub require_entity_registry: bool,
    /// Domains included in the catalog.
    pub domains: Vec<SupportedDomain>,
}

impl ClientConfig {
    pub fn new(url: Url, token: SecretString) -> Self {
        Self {
            url,
            token,
            command_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
            catalog_path: None,
            require_entity_registry: false,
            domains: SupportedDomain::all(),
        }
    }
}
