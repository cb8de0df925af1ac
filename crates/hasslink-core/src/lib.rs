//! Reactive Home Assistant state layer between `hasslink-api` and consumers.
//!
//! This crate owns the connection lifecycle, the state mirror, and the
//! dashboard catalog:
//!
//! - **[`HassClient`]** -- Central facade. [`connect()`](HassClient::connect)
//!   starts a supervisor that authenticates, seeds the mirror from
//!   `get_states` plus the three registries, subscribes to `state_changed`,
//!   and reconnects after a fixed delay whenever the socket drops.
//!   [`HassClient::oneshot()`](HassClient::oneshot) runs a single closure
//!   against a ready connection for CLI use.
//!
//! - **[`DataStore`]** -- Snapshot storage built on `tokio::sync::watch`
//!   channels holding `Arc<BTreeMap<_, Arc<_>>>`. A state change swaps one
//!   entry; a reseed swaps the whole collection.
//!
//! - **[`EntityStream`]** -- Subscription handle vended by the `DataStore`,
//!   with `current()` / `latest()` / `changed()` and a `Stream` adapter.
//!
//! - **[`catalog`]** -- Derives the dashboard catalog (areas, entities per
//!   supported domain, component map) and writes it to disk.
//!
//! - **[`listeners`]** -- Callback registry with removable
//!   [`Subscription`] handles; a panicking listener never affects the others.

pub mod catalog;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod listeners;
pub mod model;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use catalog::{Catalog, CatalogEntry, CatalogWriter};
pub use client::{ConnectionStatus, HassClient};
pub use config::ClientConfig;
pub use error::CoreError;
pub use listeners::{Listeners, Subscription};
pub use store::{DataStore, SeedSnapshot, Snapshot};
pub use stream::EntityStream;

pub use model::{Area, Device, EntityId, EntityMap, EntityRegistryEntry, EntityState, SupportedDomain};

// Commands are sent through the client as-is.
pub use hasslink_api::Command;
