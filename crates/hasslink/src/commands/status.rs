//! Status command handler.

use std::fmt::Write;

use serde::Serialize;

use hasslink_core::{ClientConfig, HassClient};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct StatusReport {
    url: String,
    ha_version: Option<String>,
    latency_ms: u64,
    entities: usize,
    devices: usize,
    areas: usize,
    catalogued: usize,
}

fn detail(r: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "URL:         {}", r.url);
    let _ = writeln!(
        out,
        "Version:     {}",
        r.ha_version.as_deref().unwrap_or("unknown")
    );
    let _ = writeln!(out, "Latency:     {} ms", r.latency_ms);
    let _ = writeln!(out, "Entities:    {}", r.entities);
    let _ = writeln!(out, "Devices:     {}", r.devices);
    let _ = writeln!(out, "Areas:       {}", r.areas);
    let _ = write!(out, "Catalogued:  {}", r.catalogued);
    out
}

pub async fn handle(config: ClientConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let url = config.url.to_string();
    let report = HassClient::oneshot(config, |client| async move {
        let latency = client.ping().await?;
        let store = client.store();
        let catalogued = client
            .catalog()
            .map_or(0, |catalog| catalog.entity_count());
        Ok(StatusReport {
            url,
            ha_version: client.ha_version(),
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            entities: store.entity_count(),
            devices: store.device_count(),
            areas: store.area_count(),
            catalogued,
        })
    })
    .await?;

    let out = output::render_single(&global.output, &report, detail, |r| {
        r.ha_version.clone().unwrap_or_default()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
