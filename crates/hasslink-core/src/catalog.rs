//! Compact, domain-grouped discovery document for dashboard generation.
//!
//! [`build`] is a pure function of the mirror and the registries. All
//! maps are `BTreeMap`s and entries follow entity-id order, so identical
//! inputs serialise to identical bytes. [`CatalogWriter`] relies on that
//! to skip rewriting an unchanged file.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{Area, Device, EntityMap, EntityRegistryEntry, SupportedDomain};
use crate::store::DataStore;

// ── Catalog ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// Sorted, distinct names of every area an entity resolved to.
    pub areas: Vec<String>,
    /// Supported entities grouped by domain.
    pub entities: BTreeMap<String, Vec<CatalogEntry>>,
    /// Domain → dashboard component name.
    pub component_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    /// Resolved area name; serialised as `null` when unknown.
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Catalog {
    pub fn entity_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    /// Pretty JSON exactly as written to disk.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Build the catalog from the mirror and registries.
///
/// An entity's area is its own registry area if set, else the area of
/// its device. An area id with no matching area yields no name.
/// Entities outside `domains` are left out of `entities`, but their
/// areas still count towards `areas`.
pub fn build<'a>(
    entities: &EntityMap,
    devices: impl IntoIterator<Item = &'a Device>,
    areas: impl IntoIterator<Item = &'a Area>,
    registry: impl IntoIterator<Item = &'a EntityRegistryEntry>,
    domains: &[SupportedDomain],
) -> Catalog {
    let area_names: HashMap<&str, &str> = areas
        .into_iter()
        .map(|a| (a.area_id.as_str(), a.name.as_str()))
        .collect();

    let device_areas: HashMap<&str, &str> = devices
        .into_iter()
        .filter_map(|d| d.area_id.as_deref().map(|area| (d.id.as_str(), area)))
        .collect();

    let mut entity_areas: HashMap<&str, Option<&str>> = HashMap::new();
    for entry in registry {
        let resolved = entry.area_id.as_deref().or_else(|| {
            entry
                .device_id
                .as_deref()
                .and_then(|device| device_areas.get(device).copied())
        });
        if let Some(area_id) = resolved {
            entity_areas.insert(
                entry.entity_id.as_str(),
                area_names.get(area_id).copied(),
            );
        }
    }
    let area_of = |id: &str| entity_areas.get(id).copied().flatten();

    let mut grouped: BTreeMap<String, Vec<CatalogEntry>> = BTreeMap::new();
    let mut referenced: BTreeSet<&str> = BTreeSet::new();

    for (id, state) in entities {
        let area = area_of(id.as_str());
        if let Some(name) = area {
            referenced.insert(name);
        }

        let Ok(domain) = id.domain().parse::<SupportedDomain>() else {
            continue;
        };
        if !domains.contains(&domain) {
            continue;
        }

        let mut entry = CatalogEntry {
            id: id.to_string(),
            name: state.display_name().to_owned(),
            area: area.map(str::to_owned),
            class: None,
            unit: None,
        };
        match domain {
            SupportedDomain::Sensor => {
                entry.class = state.attribute_str("device_class").map(str::to_owned);
                entry.unit = state.attribute_str("unit_of_measurement").map(str::to_owned);
            }
            SupportedDomain::BinarySensor => {
                entry.class = state.attribute_str("device_class").map(str::to_owned);
            }
            _ => {}
        }

        grouped.entry(domain.to_string()).or_default().push(entry);
    }

    Catalog {
        areas: referenced.into_iter().map(str::to_owned).collect(),
        entities: grouped,
        component_map: domains
            .iter()
            .map(|d| (d.to_string(), d.component().to_owned()))
            .collect(),
    }
}

/// Build from the store's current snapshots.
pub fn from_store(store: &DataStore, domains: &[SupportedDomain]) -> Catalog {
    let entities = store.entities_snapshot();
    let devices = store.devices_snapshot();
    let areas = store.areas_snapshot();
    let registry = store.registry_snapshot();

    build(
        &entities,
        devices.values().map(Arc::as_ref),
        areas.values().map(Arc::as_ref),
        registry.values().map(Arc::as_ref),
        domains,
    )
}

// ── CatalogWriter ────────────────────────────────────────────────────

/// Catalog location inside a dashboard project.
pub const DASHBOARD_CATALOG_PATH: &str = "src/lib/ha-catalog.json";

/// Persists the catalog for file-based discovery tools.
#[derive(Debug, Clone)]
pub struct CatalogWriter {
    path: PathBuf,
}

impl CatalogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Writer targeting `<dir>/src/lib/ha-catalog.json`.
    pub fn for_dashboard(dir: &Path) -> Self {
        Self::new(dir.join(DASHBOARD_CATALOG_PATH))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the catalog, creating parent directories as needed.
    ///
    /// Returns `Ok(false)` without touching the file when its current
    /// contents are already identical. The new file is written beside the
    /// target and renamed over it, so readers never see a partial file.
    pub fn write(&self, catalog: &Catalog) -> io::Result<bool> {
        let bytes = catalog.to_json().map_err(io::Error::other)?;

        if std::fs::read(&self.path).is_ok_and(|existing| existing == bytes) {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::info!(
            path = %self.path.display(),
            entities = catalog.entity_count(),
            areas = catalog.areas.len(),
            "wrote entity catalog"
        );
        Ok(true)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
