//! Area and device registry handlers.

use std::sync::Arc;

use tabled::Tabled;

use hasslink_core::{Area, ClientConfig, Device, HassClient};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct AreaRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Manufacturer")]
    manufacturer: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Area")]
    area: String,
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn areas(config: ClientConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let snapshot =
        HassClient::oneshot(config, |client| async move { Ok(client.areas_snapshot()) }).await?;
    let areas: Vec<Arc<Area>> = snapshot.values().cloned().collect();

    let out = output::render_list(
        &global.output,
        &areas,
        |a| AreaRow {
            id: a.area_id.clone(),
            name: a.name.clone(),
        },
        |a| a.area_id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn devices(config: ClientConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let (devices, areas) = HassClient::oneshot(config, |client| async move {
        Ok((client.devices_snapshot(), client.areas_snapshot()))
    })
    .await?;
    let devices: Vec<Arc<Device>> = devices.values().cloned().collect();

    let out = output::render_list(
        &global.output,
        &devices,
        |d| DeviceRow {
            id: d.id.clone(),
            name: d.name.clone(),
            manufacturer: d.manufacturer.clone().unwrap_or_default(),
            model: d.model.clone().unwrap_or_default(),
            area: d
                .area_id
                .as_deref()
                .map(|id| areas.get(id).map_or_else(|| id.to_owned(), |a| a.name.clone()))
                .unwrap_or_default(),
        },
        |d| d.id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
