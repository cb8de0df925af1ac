// ── Central reactive data store ──
//
// Holds the entity mirror, devices, areas, and the entity registry.
// Every collection is published through a `watch` channel, so readers
// never block the reader task that applies events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::collection::{Collection, Snapshot};
use crate::model::{Area, Device, EntityId, EntityMap, EntityRegistryEntry, EntityState};
use crate::stream::EntityStream;

/// Central reactive store for the mirrored Home Assistant state.
pub struct DataStore {
    pub(crate) entities: Collection<EntityId, EntityState>,
    pub(crate) devices: Collection<String, Device>,
    pub(crate) areas: Collection<String, Area>,
    pub(crate) registry: Collection<EntityId, EntityRegistryEntry>,
    pub(crate) last_seed: watch::Sender<Option<DateTime<Utc>>>,
    pub(crate) last_event: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new() -> Self {
        let (last_seed, _) = watch::channel(None);
        let (last_event, _) = watch::channel(None);

        Self {
            entities: Collection::new(),
            devices: Collection::new(),
            areas: Collection::new(),
            registry: Collection::new(),
            last_seed,
            last_event,
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Replace one entity's snapshot with the state carried by a
    /// `state_changed` event. Returns `true` if the entity was new.
    pub fn apply_state(&self, state: EntityState) -> bool {
        let is_new = self.entities.upsert(state.entity_id.clone(), state);
        self.last_event.send_replace(Some(Utc::now()));
        is_new
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn entities_snapshot(&self) -> Arc<EntityMap> {
        self.entities.snapshot()
    }

    pub fn devices_snapshot(&self) -> Snapshot<String, Device> {
        self.devices.snapshot()
    }

    pub fn areas_snapshot(&self) -> Snapshot<String, Area> {
        self.areas.snapshot()
    }

    pub fn registry_snapshot(&self) -> Snapshot<EntityId, EntityRegistryEntry> {
        self.registry.snapshot()
    }

    // ── Single-entity lookups ────────────────────────────────────────

    pub fn entity(&self, id: &str) -> Option<Arc<EntityState>> {
        self.entities.get(id)
    }

    pub fn device(&self, id: &str) -> Option<Arc<Device>> {
        self.devices.get(id)
    }

    pub fn area(&self, id: &str) -> Option<Arc<Area>> {
        self.areas.get(id)
    }

    // ── Count accessors ──────────────────────────────────────────────

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_entities(&self) -> EntityStream<EntityId, EntityState> {
        EntityStream::new(self.entities.subscribe())
    }

    pub fn subscribe_devices(&self) -> EntityStream<String, Device> {
        EntityStream::new(self.devices.subscribe())
    }

    pub fn subscribe_areas(&self) -> EntityStream<String, Area> {
        EntityStream::new(self.areas.subscribe())
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_seed(&self) -> Option<DateTime<Utc>> {
        *self.last_seed.borrow()
    }

    pub fn last_event(&self) -> Option<DateTime<Utc>> {
        *self.last_event.borrow()
    }

    /// How long ago the last full seed completed, or `None` if never seeded.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_seed().map(|t| Utc::now() - t)
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
