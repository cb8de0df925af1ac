//! Config subcommand handlers.

use std::collections::HashMap;

use dialoguer::{Input, Select};

use hasslink_config::KEYRING_SERVICE;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Defaults, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking the plaintext token.
fn format_config_redacted(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "reconnect_delay = {}", cfg.defaults.reconnect_delay);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "url = \"{}\"", p.url);
        if p.token.is_some() {
            let _ = writeln!(out, "token = \"****\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ref dir) = p.dashboard_dir {
            let _ = writeln!(out, "dashboard_dir = \"{}\"", dir.display());
        }
        if let Some(ref path) = p.catalog_path {
            let _ = writeln!(out, "catalog_path = \"{}\"", path.display());
        }
        if let Some(ref domains) = p.domains {
            let _ = writeln!(out, "domains = {domains:?}");
        }
        if let Some(required) = p.require_entity_registry {
            let _ = writeln!(out, "require_entity_registry = {required}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(delay) = p.reconnect_delay {
            let _ = writeln!(out, "reconnect_delay = {delay}");
        }
    }

    out.trim_end().to_owned()
}

fn save_config(cfg: &Config) -> Result<(), CliError> {
    config::save_config(cfg)?;
    Ok(())
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn store_in_keyring(profile_name: &str, token: &str) -> Result<(), CliError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &config::keyring_key(profile_name))
        .map_err(|e| CliError::Validation {
            field: "keyring".into(),
            reason: format!("failed to access keyring: {e}"),
        })?;
    entry.set_password(token).map_err(|e| CliError::Validation {
        field: "keyring".into(),
        reason: format!("failed to store token in keyring: {e}"),
    })
}

fn prompt_token() -> Result<String, CliError> {
    let token = rpassword::prompt_password("Long-lived access token: ").map_err(prompt_err)?;
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(token)
}

fn parse_number(field: &str, value: &str) -> Result<u64, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: "must be a number (seconds)".into(),
    })
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("hasslink configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;

            let url: String = Input::new()
                .with_prompt("Home Assistant URL")
                .default("http://homeassistant.local:8123".into())
                .interact_text()
                .map_err(prompt_err)?;

            let token = prompt_token()?;
            let choices = &[
                "Store in system keyring (recommended)",
                "Save to config file (plaintext)",
            ];
            let selection = Select::new()
                .with_prompt("Where to store the token?")
                .items(choices)
                .default(0)
                .interact()
                .map_err(prompt_err)?;
            let plaintext = if selection == 0 {
                store_in_keyring(&profile_name, &token)?;
                eprintln!("   ✓ Token stored in system keyring");
                None
            } else {
                Some(token)
            };

            let dashboard: String = Input::new()
                .with_prompt("Dashboard project directory (blank to skip)")
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_err)?;

            let profile = Profile {
                url,
                token: plaintext,
                dashboard_dir: (!dashboard.is_empty()).then(|| dashboard.into()),
                ..Profile::default()
            };

            let mut cfg = config::load_config_or_default();
            if cfg.profiles.is_empty() {
                cfg = Config {
                    default_profile: Some(profile_name.clone()),
                    defaults: Defaults::default(),
                    profiles: HashMap::new(),
                };
            }
            cfg.profiles.insert(profile_name.clone(), profile);
            save_config(&cfg)?;

            eprintln!("\n✓ Configuration written to {}", config_path.display());
            eprintln!("  Profile: {profile_name}");
            eprintln!("\n  Test it: hasslink status --profile {profile_name}");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(&global.output, &cfg, format_config_redacted, |_| {
                "config".into()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(profile_name.clone()).or_default();

            match key.as_str() {
                "url" => profile.url = value,
                "token" => profile.token = Some(value),
                "token_env" | "token-env" => profile.token_env = Some(value),
                "dashboard_dir" | "dashboard-dir" => profile.dashboard_dir = Some(value.into()),
                "catalog_path" | "catalog-path" => profile.catalog_path = Some(value.into()),
                "domains" => {
                    profile.domains =
                        Some(value.split(',').map(|d| d.trim().to_owned()).collect());
                    profile.resolved_domains()?;
                }
                "require_entity_registry" | "require-entity-registry" => {
                    profile.require_entity_registry =
                        Some(value.parse().map_err(|_| CliError::Validation {
                            field: key.clone(),
                            reason: "must be 'true' or 'false'".into(),
                        })?);
                }
                "timeout" => profile.timeout = Some(parse_number("timeout", &value)?),
                "reconnect_delay" | "reconnect-delay" => {
                    profile.reconnect_delay = Some(parse_number("reconnect_delay", &value)?);
                }
                other => {
                    return Err(CliError::Validation {
                        field: other.into(),
                        reason: format!(
                            "unknown config key '{other}'. Valid keys: url, token, token_env, \
                             dashboard_dir, catalog_path, domains, require_entity_registry, \
                             timeout, reconnect_delay"
                        ),
                    });
                }
            }

            save_config(&cfg)?;
            eprintln!("✓ Set {key} on profile '{profile_name}'");
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: hasslink config init");
            } else {
                let mut names: Vec<_> = cfg.profiles.keys().collect();
                names.sort();
                for name in names {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    name,
                    available: config::available_profiles(&cfg),
                });
            }

            cfg.default_profile = Some(name.clone());
            save_config(&cfg)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }

        // ── SetToken ────────────────────────────────────────────────
        ConfigCommand::SetToken { profile } => {
            let cfg = config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    name: profile_name,
                    available: config::available_profiles(&cfg),
                });
            }

            let token = prompt_token()?;
            store_in_keyring(&profile_name, &token)?;
            eprintln!("✓ Token stored in system keyring for profile '{profile_name}'");
            Ok(())
        }
    }
}
