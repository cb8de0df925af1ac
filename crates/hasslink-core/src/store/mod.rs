// ── Reactive data store ──
//
// Mirror of every entity plus the registries the catalog needs, with
// push-based change notification.

mod collection;
mod data_store;
mod seed;

pub use collection::Snapshot;
pub use data_store::DataStore;
pub use seed::SeedSnapshot;
