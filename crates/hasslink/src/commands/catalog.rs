//! Catalog command handler.

use std::fmt::Write;
use std::sync::Arc;

use hasslink_core::{Catalog, CatalogWriter, ClientConfig, HassClient, SupportedDomain};

use crate::cli::{CatalogArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

fn summary(catalog: &Arc<Catalog>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Areas: {}", catalog.areas.join(", "));
    for domain in SupportedDomain::all() {
        if let Some(entries) = catalog.entities.get(domain.as_ref()) {
            let _ = writeln!(
                out,
                "{:<14} {:<14} {}",
                domain.as_ref(),
                domain.component(),
                entries.len()
            );
        }
    }
    let _ = write!(out, "Total: {}", catalog.entity_count());
    out
}

fn entity_ids(catalog: &Arc<Catalog>) -> String {
    catalog
        .entities
        .values()
        .flatten()
        .map(|e| e.id.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn handle(
    config: ClientConfig,
    args: CatalogArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let catalog = HassClient::oneshot(config, |client| async move {
        Ok(client.catalog().unwrap_or_else(|| client.rebuild_catalog()))
    })
    .await?;

    let writer = args
        .write
        .map(CatalogWriter::new)
        .or_else(|| args.dashboard.as_deref().map(CatalogWriter::for_dashboard));

    if let Some(writer) = writer {
        let changed = writer.write(&catalog)?;
        if !global.quiet {
            let verb = if changed { "Wrote" } else { "Unchanged" };
            eprintln!(
                "✓ {verb} {} ({} entities)",
                writer.path().display(),
                catalog.entity_count()
            );
        }
        return Ok(());
    }

    // JSON output matches the on-disk file byte for byte.
    let out = match global.output {
        OutputFormat::Json => String::from_utf8_lossy(&catalog.to_json()?).into_owned(),
        _ => output::render_single(&global.output, &catalog, summary, entity_ids),
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
