// ── Reactive entity streams ──
//
// Subscription types for consuming collection changes from the DataStore.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::Snapshot;

/// A subscription to one collection of the store.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed()`](Self::changed) or by converting to a `Stream`. A slow
/// consumer only ever sees the latest snapshot; it never holds up writers.
pub struct EntityStream<K, T> {
    current: Snapshot<K, T>,
    receiver: watch::Receiver<Snapshot<K, T>>,
}

impl<K, T> EntityStream<K, T>
where
    K: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub(crate) fn new(mut receiver: watch::Receiver<Snapshot<K, T>>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// Get the snapshot captured at creation time (or at the last
    /// [`changed()`](Self::changed)).
    pub fn current(&self) -> &Snapshot<K, T> {
        &self.current
    }

    /// Get the latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Snapshot<K, T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` if the store has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot<K, T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    ///
    /// The first item is the current snapshot.
    pub fn into_stream(self) -> EntityWatchStream<K, T> {
        EntityWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct EntityWatchStream<K, T> {
    inner: WatchStream<Snapshot<K, T>>,
}

impl<K, T> Stream for EntityWatchStream<K, T>
where
    K: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    type Item = Snapshot<K, T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // WatchStream is Unpin; a snapshot is just an Arc.
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::DateTime;
    use futures_util::StreamExt;

    use crate::model::{EntityId, EntityState};
    use crate::store::DataStore;

    fn state(id: &str, value: &str) -> EntityState {
        EntityState {
            entity_id: EntityId::from(id),
            state: value.into(),
            attributes: serde_json::Map::new(),
            last_changed: DateTime::default(),
            last_updated: DateTime::default(),
        }
    }

    #[tokio::test]
    async fn changed_yields_latest_snapshot() {
        let store = DataStore::new();
        let mut stream = store.subscribe_entities();
        assert!(stream.current().is_empty());

        store.apply_state(state("light.a", "on"));
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap["light.a"].state, "on");
        assert_eq!(stream.current().len(), 1);
    }

    #[tokio::test]
    async fn slow_consumer_skips_to_latest() {
        let store = DataStore::new();
        let mut stream = store.subscribe_entities().into_stream();
        // First item is the snapshot at subscription time.
        assert!(stream.next().await.unwrap().is_empty());

        store.apply_state(state("light.a", "on"));
        store.apply_state(state("light.a", "off"));
        store.apply_state(state("light.b", "on"));

        let snap = stream.next().await.unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap["light.a"].state, "off");
    }
}
