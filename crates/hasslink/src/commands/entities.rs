//! Entity command handlers.

use std::fmt::Write;
use std::sync::Arc;

use tabled::Tabled;

use hasslink_core::{ClientConfig, EntityState, HassClient};

use crate::cli::{EntitiesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity ID")]
    id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Last Changed")]
    last_changed: String,
}

impl From<&Arc<EntityState>> for EntityRow {
    fn from(e: &Arc<EntityState>) -> Self {
        Self {
            id: e.entity_id.to_string(),
            state: e.state.clone(),
            name: e.display_name().to_owned(),
            last_changed: e.last_changed.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn detail(e: &Arc<EntityState>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ID:            {}", e.entity_id);
    let _ = writeln!(out, "Name:          {}", e.display_name());
    let _ = writeln!(out, "State:         {}", e.state);
    let _ = writeln!(out, "Last changed:  {}", e.last_changed.to_rfc3339());
    let _ = writeln!(out, "Last updated:  {}", e.last_updated.to_rfc3339());
    if !e.attributes.is_empty() {
        let _ = writeln!(out, "Attributes:");
        for (key, value) in &e.attributes {
            let _ = writeln!(out, "  {key}: {value}");
        }
    }
    out.trim_end().to_owned()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    config: ClientConfig,
    args: EntitiesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let snapshot =
        HassClient::oneshot(config, |client| async move { Ok(client.entities_snapshot()) })
            .await?;

    let out = if let Some(id) = args.entity_id {
        let entity = snapshot
            .get(id.as_str())
            .ok_or_else(|| CliError::NotFound {
                resource_type: "entity".into(),
                identifier: id.clone(),
                list_command: "entities".into(),
            })?;
        output::render_single(&global.output, entity, detail, |e| e.state.clone())
    } else {
        let entities: Vec<Arc<EntityState>> = snapshot
            .values()
            .filter(|e| args.domain.as_deref().is_none_or(|d| e.domain() == d))
            .cloned()
            .collect();
        output::render_list(&global.output, &entities, |e| EntityRow::from(e), |e| {
            e.entity_id.to_string()
        })
    };

    output::print_output(&out, global.quiet);
    Ok(())
}
