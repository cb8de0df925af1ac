//! Command dispatch: bridges CLI args -> HassClient -> output formatting.

pub mod call;
pub mod catalog;
pub mod config_cmd;
pub mod entities;
pub mod registry;
pub mod status;
pub mod watch;

use hasslink_core::ClientConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a connection-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    config: ClientConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Status => status::handle(oneshot(config), global).await,
        Command::Entities(args) => entities::handle(oneshot(config), args, global).await,
        Command::Areas => registry::areas(oneshot(config), global).await,
        Command::Devices => registry::devices(oneshot(config), global).await,
        Command::Catalog(args) => catalog::handle(oneshot(config), args, global).await,
        Command::Call(args) => call::handle(oneshot(config), args, global).await,
        Command::Watch(args) => watch::handle(config, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}

/// One-shot commands never touch the profile's catalog file; only
/// `catalog --write` and `watch` do.
fn oneshot(mut config: ClientConfig) -> ClientConfig {
    config.catalog_path = None;
    config
}
