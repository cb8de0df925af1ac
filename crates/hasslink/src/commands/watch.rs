//! Long-running watch: keeps the mirror live, prints changes, and keeps
//! the catalog file fresh across reconnects until Ctrl-C.

use owo_colors::OwoColorize;

use hasslink_core::{ClientConfig, ConnectionStatus, EntityMap, EntityState, HassClient};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

fn paint_status(status: ConnectionStatus, color: bool) -> String {
    let label = format!("● {status}");
    if !color {
        return label;
    }
    match status {
        ConnectionStatus::Ready => label.green().to_string(),
        ConnectionStatus::Disconnected => label.red().to_string(),
        ConnectionStatus::Connecting | ConnectionStatus::Authenticating => {
            label.yellow().to_string()
        }
    }
}

fn is_unchanged(previous: &EntityMap, state: &EntityState) -> bool {
    previous
        .get(&state.entity_id)
        .is_some_and(|old| old.state == state.state && old.last_updated == state.last_updated)
}

pub async fn handle(
    mut config: ClientConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if let Some(path) = args.catalog {
        config.catalog_path = Some(path);
    }
    let color = output::should_color(&global.color);
    let quiet = global.quiet;

    let client = HassClient::new(config);
    let _status = client.on_status_changed(move |status| {
        if !quiet {
            eprintln!("{}", paint_status(*status, color));
        }
    });
    client.connect().await?;

    let mut entities = client.entities();
    let mut previous = entities.current().clone();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            next = entities.changed() => {
                let Some(snapshot) = next else { break };
                if previous.is_empty() {
                    if !quiet {
                        eprintln!("mirroring {} entities", snapshot.len());
                    }
                } else {
                    for state in snapshot.values() {
                        if is_unchanged(&previous, state)
                            || args.domain.as_deref().is_some_and(|d| state.domain() != d)
                        {
                            continue;
                        }
                        let when = state.last_changed.with_timezone(&chrono::Local);
                        output::print_output(
                            &format!("{} {} = {}", when.format("%H:%M:%S"), state.entity_id, state.state),
                            quiet,
                        );
                    }
                }
                previous = snapshot;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
