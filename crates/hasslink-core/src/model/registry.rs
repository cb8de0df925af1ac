// ── Registry types ──
//
// Areas, devices, and entity-registry rows. Together they let the catalog
// place an entity in a room: the entity's own area wins, otherwise the
// area of the device it belongs to.

use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub area_id: String,
    pub name: String,
}

/// A physical or virtual device grouping one or more entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    /// User-assigned name when set, else the integration's name, else empty.
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub area_id: Option<String>,
}

/// Placement metadata for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRegistryEntry {
    pub entity_id: EntityId,
    pub area_id: Option<String>,
    pub device_id: Option<String>,
}
