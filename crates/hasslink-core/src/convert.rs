// ── API-to-domain type conversions ──
//
// Bridges raw `hasslink_api` payload types into canonical
// `hasslink_core::model` types. Optional names collapse to empty strings
// here so nothing downstream has to care which field the server filled.

use hasslink_api::models::{AreaEntry, DeviceEntry, EntityRegistryEntry as RegistryRow, State};

use crate::model::{Area, Device, EntityId, EntityRegistryEntry, EntityState};

/// Treat `""` the same as an absent value.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

// ── Entity state ───────────────────────────────────────────────────

impl From<State> for EntityState {
    fn from(s: State) -> Self {
        Self {
            entity_id: EntityId::from(s.entity_id),
            state: s.state,
            attributes: s.attributes,
            last_changed: s.last_changed,
            last_updated: s.last_updated,
        }
    }
}

// ── Registries ─────────────────────────────────────────────────────

impl From<DeviceEntry> for Device {
    fn from(d: DeviceEntry) -> Self {
        let name = non_empty(d.name_by_user)
            .or_else(|| non_empty(d.name))
            .unwrap_or_default();
        Self {
            id: d.id,
            name,
            manufacturer: non_empty(d.manufacturer),
            model: non_empty(d.model),
            area_id: non_empty(d.area_id),
        }
    }
}

impl From<AreaEntry> for Area {
    fn from(a: AreaEntry) -> Self {
        Self {
            area_id: a.area_id,
            name: a.name,
        }
    }
}

impl From<RegistryRow> for EntityRegistryEntry {
    fn from(r: RegistryRow) -> Self {
        Self {
            entity_id: EntityId::from(r.entity_id),
            area_id: non_empty(r.area_id),
            device_id: non_empty(r.device_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: Option<&str>, name_by_user: Option<&str>) -> DeviceEntry {
        DeviceEntry {
            id: "dev1".into(),
            name: name.map(Into::into),
            name_by_user: name_by_user.map(Into::into),
            manufacturer: Some("Signify".into()),
            model: None,
            area_id: Some(String::new()),
        }
    }

    #[test]
    fn device_name_prefers_user_override() {
        let d = Device::from(device(Some("Hue Bridge"), Some("Living Room Hub")));
        assert_eq!(d.name, "Living Room Hub");
    }

    #[test]
    fn device_name_falls_back_to_integration_name() {
        assert_eq!(Device::from(device(Some("Hue Bridge"), Some(""))).name, "Hue Bridge");
        assert_eq!(Device::from(device(None, None)).name, "");
    }

    #[test]
    fn empty_area_is_no_area() {
        assert!(Device::from(device(None, None)).area_id.is_none());
    }
}
