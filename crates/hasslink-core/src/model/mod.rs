// ── Domain model ──
//
// Canonical types the rest of the crate and its consumers depend on.
// Wire types from `hasslink-api` are converted into these at the seed
// and event boundaries (see `convert`).

pub mod domain;
pub mod entity;
pub mod entity_id;
pub mod registry;

// ── Re-exports ──────────────────────────────────────────────────────
// Flat access: `use hasslink_core::model::*` gives you everything.

pub use domain::SupportedDomain;
pub use entity::{EntityMap, EntityState};
pub use entity_id::EntityId;
pub use registry::{Area, Device, EntityRegistryEntry};
