use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::path::StorePath;
use crate::Value;

/// Value observed at a subscribed path. `None` means nothing is stored there.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: StorePath,
    pub value: Option<Value>,
}

impl Snapshot {
    pub fn new(path: StorePath, value: Option<Value>) -> Self {
        Self { path, value }
    }

    /// Child entries of an object value, in key order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.value
            .as_ref()
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|map| map.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        self.value
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|source| StoreError::Decode {
                path: self.path.to_string(),
                source,
            })
    }
}

/// Live feed of snapshots for one path.
///
/// The first snapshot is delivered immediately on subscribe. Dropping the
/// subscription (or calling [`Subscription::detach`]) unregisters it; no
/// further snapshots are produced after that point.
#[derive(Debug)]
pub struct Subscription {
    feed: SnapshotFeed,
    guard: DetachGuard,
}

impl Subscription {
    pub fn new(
        path: StorePath,
        rx: mpsc::UnboundedReceiver<Snapshot>,
        on_detach: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            feed: SnapshotFeed { path, rx },
            guard: DetachGuard(Some(Box::new(on_detach))),
        }
    }

    pub fn path(&self) -> &StorePath {
        &self.feed.path
    }

    /// Wait for the next snapshot. `None` once detached or the store is gone.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.feed.next().await
    }

    pub fn detach(self) {
        self.guard.detach();
    }

    /// Separate the receiving half from the registration, so a task can own
    /// the feed while its owner keeps the power to detach synchronously.
    pub fn split(self) -> (SnapshotFeed, DetachGuard) {
        (self.feed, self.guard)
    }
}

/// Receiving half of a [`Subscription`].
#[derive(Debug)]
pub struct SnapshotFeed {
    path: StorePath,
    rx: mpsc::UnboundedReceiver<Snapshot>,
}

impl SnapshotFeed {
    pub fn path(&self) -> &StorePath {
        &self.path
    }

    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }
}

/// Registration half of a [`Subscription`]. Unregisters on drop.
pub struct DetachGuard(Option<Box<dyn FnOnce() + Send + Sync>>);

impl DetachGuard {
    pub fn detach(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for DetachGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DetachGuard").field(&self.0.is_some()).finish()
    }
}
