//! CLI configuration: thin wrapper around `hasslink_config` shared types.
//!
//! Re-exports the shared types and adds CLI-specific resolution that
//! respects `GlobalOpts` flag overrides (--url, --token, --timeout).

use std::time::Duration;

use secrecy::SecretString;

use hasslink_core::ClientConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use hasslink_config::{
    Config, Defaults, Profile, config_path, keyring_key, load_config_or_default, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Comma-separated profile names for error help text.
pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().cloned().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}

/// Build a `ClientConfig` from the config file, profile, and CLI overrides.
///
/// Flag > env > profile for the URL and token. Without a profile, the
/// URL and token must both come from flags or environment.
pub fn build_client_config(global: &GlobalOpts) -> Result<(ClientConfig, String), CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut client = match cfg.profiles.get(&profile_name) {
        Some(profile) => resolve_profile(profile, &profile_name, &cfg.defaults, global)?,
        None => {
            if global.profile.is_some() {
                return Err(CliError::ProfileNotFound {
                    name: profile_name,
                    available: available_profiles(&cfg),
                });
            }
            let url = global.url.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            let token = global.token.clone().ok_or_else(|| CliError::NoToken {
                profile: profile_name.clone(),
            })?;
            let adhoc = Profile {
                url: url.to_owned(),
                ..Profile::default()
            };
            hasslink_config::client_config(&adhoc, SecretString::from(token), &cfg.defaults)?
        }
    };

    if let Some(secs) = global.timeout {
        client.command_timeout = Duration::from_secs(secs);
    }
    Ok((client, profile_name))
}

/// Translate a `Profile` + global flags into a `ClientConfig`.
fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    global: &GlobalOpts,
) -> Result<ClientConfig, CliError> {
    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => hasslink_config::resolve_token(profile, profile_name)?,
    };

    let mut client = hasslink_config::client_config(profile, token, defaults)?;
    if let Some(ref url) = global.url {
        client.url = url.parse().map_err(|_| CliError::Validation {
            field: "url".into(),
            reason: format!("invalid URL: {url}"),
        })?;
    }
    Ok(client)
}
