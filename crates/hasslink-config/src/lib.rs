//! Shared configuration for the hasslink CLI and embedders.
//!
//! TOML profiles, token resolution (env var + keyring + plaintext),
//! and translation to `hasslink_core::ClientConfig`. The CLI adds
//! `GlobalOpts`-aware overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hasslink_core::catalog::DASHBOARD_CATALOG_PATH;
use hasslink_core::{ClientConfig, SupportedDomain};

/// Keyring service name; entries are keyed `<profile>/token`.
pub const KEYRING_SERVICE: &str = "hasslink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured for profile '{profile}'")]
    NoToken { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named Home Assistant profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Per-command timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Delay between reconnect attempts, seconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_reconnect_delay() -> u64 {
    5
}

/// A named Home Assistant instance.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Base URL (e.g., "http://homeassistant.local:8123").
    pub url: String,

    /// Long-lived access token (plaintext; prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable name containing the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Dashboard project root; the catalog goes to `src/lib/ha-catalog.json` under it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_dir: Option<PathBuf>,

    /// Explicit catalog file path. Wins over `dashboard_dir`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    /// Domains included in the catalog (default: all supported).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domains: Option<Vec<String>>,

    /// Fail the seed when the entity registry is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_entity_registry: Option<bool>,

    /// Override command timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Override reconnect delay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_delay: Option<u64>,
}

impl Profile {
    /// Where this profile writes the catalog, if anywhere.
    pub fn resolved_catalog_path(&self) -> Option<PathBuf> {
        self.catalog_path.clone().or_else(|| {
            self.dashboard_dir
                .as_ref()
                .map(|dir| dir.join(DASHBOARD_CATALOG_PATH))
        })
    }

    pub fn resolved_domains(&self) -> Result<Vec<SupportedDomain>, ConfigError> {
        let Some(ref names) = self.domains else {
            return Ok(SupportedDomain::all());
        };
        names
            .iter()
            .map(|name| {
                SupportedDomain::from_str(name).map_err(|_| ConfigError::Validation {
                    field: "domains".into(),
                    reason: format!("unsupported domain '{name}'"),
                })
            })
            .collect()
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "hasslink", "hasslink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hasslink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file, merged with `HASSLINK_*` environment.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HASSLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Keyring entry name for a profile's token.
pub fn keyring_key(profile_name: &str) -> String {
    format!("{profile_name}/token")
}

/// Resolve the access token from the credential chain (no CLI flag step).
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_key(profile_name)) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoToken {
        profile: profile_name.into(),
    })
}

/// Build a `ClientConfig` from a profile and an already-resolved token.
pub fn client_config(
    profile: &Profile,
    token: SecretString,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let mut config = ClientConfig::new(url, token);
    config.command_timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.reconnect_delay =
        Duration::from_secs(profile.reconnect_delay.unwrap_or(defaults.reconnect_delay));
    config.catalog_path = profile.resolved_catalog_path();
    config.require_entity_registry = profile.require_entity_registry.unwrap_or(false);
    config.domains = profile.resolved_domains()?;
    Ok(config)
}

/// Build a `ClientConfig` from a profile -- no CLI flag overrides.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let token = resolve_token(profile, profile_name)?;
    client_config(profile, token, defaults)
}
