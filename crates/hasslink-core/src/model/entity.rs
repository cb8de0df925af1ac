use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity_id::EntityId;

/// Latest known state of one entity.
///
/// Snapshots are replaced whole on every `state_changed` event, never
/// merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: EntityId,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl EntityState {
    pub fn domain(&self) -> &str {
        self.entity_id.domain()
    }

    /// String-valued attribute, if present.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attribute_str("friendly_name")
    }

    /// `friendly_name`, falling back to the object id when it is absent
    /// or empty.
    pub fn display_name(&self) -> &str {
        self.friendly_name()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.entity_id.object_id())
    }
}

/// Every mirrored entity, ordered by id.
pub type EntityMap = BTreeMap<EntityId, Arc<EntityState>>;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn state(id: &str, attributes: Value) -> EntityState {
        EntityState {
            entity_id: EntityId::from(id),
            state: "on".into(),
            attributes: attributes.as_object().cloned().unwrap_or_default(),
            last_changed: DateTime::default(),
            last_updated: DateTime::default(),
        }
    }

    #[test]
    fn display_name_prefers_friendly_name() {
        let s = state("light.kitchen", json!({ "friendly_name": "Kitchen Light" }));
        assert_eq!(s.display_name(), "Kitchen Light");
    }

    #[test]
    fn display_name_falls_back_to_object_id() {
        let s = state("light.kitchen", json!({ "friendly_name": 42 }));
        assert_eq!(s.display_name(), "kitchen");
    }
}
