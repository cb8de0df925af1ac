// ── Entity identity ──
//
// Every Home Assistant entity is addressed as `<domain>.<object_id>`.
// EntityId keeps the raw string and derives both halves on demand.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Canonical identifier for a Home Assistant entity, e.g. `light.kitchen`.
///
/// Ordered by its string form, so maps keyed by `EntityId` iterate in
/// entity-id order. Lookups accept a plain `&str` via [`Borrow`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the first `.`; the whole id if there is none.
    pub fn domain(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(domain, _)| domain)
    }

    /// The part after the first `.`; the whole id if there is none.
    pub fn object_id(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(_, object)| object)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn splits_domain_and_object_id() {
        let id = EntityId::from("binary_sensor.front_door");
        assert_eq!(id.domain(), "binary_sensor");
        assert_eq!(id.object_id(), "front_door");
    }

    #[test]
    fn splits_on_first_dot_only() {
        let id = EntityId::from("sensor.outdoor.temp");
        assert_eq!(id.domain(), "sensor");
        assert_eq!(id.object_id(), "outdoor.temp");
    }

    #[test]
    fn id_without_dot_is_its_own_domain() {
        let id = EntityId::from("sun");
        assert_eq!(id.domain(), "sun");
        assert_eq!(id.object_id(), "sun");
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = BTreeMap::new();
        map.insert(EntityId::from("light.kitchen"), 1);
        assert_eq!(map.get("light.kitchen"), Some(&1));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id: EntityId = "light.kitchen".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"light.kitchen\"");
    }
}
