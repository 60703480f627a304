use crate::core::rates::RateSnapshot;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Holds the latest published [`RateSnapshot`].
///
/// A snapshot is fully built before `publish` swaps it in, so readers see
/// either the previous snapshot or the new one, never a mix.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<watch::Sender<Option<Arc<RateSnapshot>>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            inner: Arc::new(tx),
        }
    }

    pub fn publish(&self, snapshot: RateSnapshot) -> Arc<RateSnapshot> {
        let snapshot = Arc::new(snapshot);
        debug!(value_date = %snapshot.value_date, "Cache PUT");
        self.inner.send_replace(Some(Arc::clone(&snapshot)));
        snapshot
    }

    pub fn latest(&self) -> Option<Arc<RateSnapshot>> {
        self.inner.borrow().clone()
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.inner.subscribe(),
        }
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Read handle given to consumers such as the calculator.
#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Option<Arc<RateSnapshot>>>,
}

impl SnapshotReader {
    pub fn latest(&self) -> Option<Arc<RateSnapshot>> {
        self.rx.borrow().clone()
    }

    /// Waits for the next publish. Returns `false` once the cache is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
