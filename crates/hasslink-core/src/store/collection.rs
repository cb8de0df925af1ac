// ── Generic reactive collection ──
//
// Ordered map published through a `watch` channel. Readers get cheap
// `Arc` snapshots; writers replace or patch the map and every
// subscriber sees the new version.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

/// Immutable point-in-time view of a collection.
pub type Snapshot<K, T> = Arc<BTreeMap<K, Arc<T>>>;

/// A reactive collection for a single entity type.
///
/// Writes are serialised by the channel's internal lock. A snapshot
/// handed out earlier is never mutated; patching a shared snapshot
/// clones the map (entries stay shared behind their `Arc`).
pub(crate) struct Collection<K, T> {
    snapshot: watch::Sender<Snapshot<K, T>>,
}

impl<K: Ord + Clone, T> Collection<K, T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(BTreeMap::new()));
        Self { snapshot }
    }

    /// Swap in a whole new map. Keys absent from `items` are gone.
    pub(crate) fn replace_all(&self, items: BTreeMap<K, Arc<T>>) {
        // `send_replace` updates unconditionally, even with zero receivers.
        self.snapshot.send_replace(Arc::new(items));
    }

    /// Insert or replace one entry. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: K, entity: T) -> bool {
        let mut is_new = false;
        self.snapshot.send_modify(|snap| {
            is_new = Arc::make_mut(snap).insert(key, Arc::new(entity)).is_none();
        });
        is_new
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<Arc<T>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.snapshot.borrow().get(key).cloned()
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Snapshot<K, T> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<K, T>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.snapshot.borrow().len()
    }
}
