// Wire types for the payloads Home Assistant returns from the bulk
// list commands and inside `state_changed` events.
//
// Deserialization is lenient: the server sends many more fields than
// we consume, and optional fields may be absent or `null`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A state object as returned by `get_states` and carried in
/// `state_changed` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: DateTime<Utc>,
    #[serde(default)]
    pub last_updated: DateTime<Utc>,
}

/// One row of `config/device_registry/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// User-assigned name; takes precedence over `name` when set.
    #[serde(default)]
    pub name_by_user: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
}

/// One row of `config/area_registry/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaEntry {
    pub area_id: String,
    pub name: String,
}

/// One row of `config/entity_registry/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRegistryEntry {
    pub entity_id: String,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}
