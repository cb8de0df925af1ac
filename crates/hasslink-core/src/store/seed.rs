// ── Full seed application ──
//
// Applies the result of one bulk fetch (states + three registries) to
// the DataStore. Each collection is swapped whole, so nothing from a
// previous connection survives a reseed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use super::DataStore;
use crate::model::{Area, Device, EntityRegistryEntry, EntityState};

/// Everything fetched by a single seed.
#[derive(Debug, Default)]
pub struct SeedSnapshot {
    pub entities: Vec<EntityState>,
    pub devices: Vec<Device>,
    pub areas: Vec<Area>,
    pub registry: Vec<EntityRegistryEntry>,
}

impl DataStore {
    /// Replace every collection with the seed's contents.
    pub fn apply_seed(&self, snap: SeedSnapshot) {
        self.entities.replace_all(
            snap.entities
                .into_iter()
                .map(|e| (e.entity_id.clone(), Arc::new(e)))
                .collect(),
        );
        self.devices.replace_all(
            snap.devices
                .into_iter()
                .map(|d| (d.id.clone(), Arc::new(d)))
                .collect(),
        );
        self.areas.replace_all(
            snap.areas
                .into_iter()
                .map(|a| (a.area_id.clone(), Arc::new(a)))
                .collect(),
        );
        self.registry.replace_all(
            snap.registry
                .into_iter()
                .map(|r| (r.entity_id.clone(), Arc::new(r)))
                .collect::<BTreeMap<_, _>>(),
        );
        self.last_seed.send_replace(Some(Utc::now()));
    }
}
