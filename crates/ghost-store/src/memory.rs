use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::path::StorePath;
use crate::push_id::PushIdGenerator;
use crate::store::{RealtimeStore, TransactionOutcome, TxDecision};
use crate::subscription::{Snapshot, Subscription};
use crate::tree::{get_at, resolve_server_values, write_at};
use crate::Value;

/// Conditional updates give up after this many lost races.
const MAX_TX_ATTEMPTS: u32 = 25;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Listener {
    path: StorePath,
    tx: mpsc::UnboundedSender<Snapshot>,
    /// Last value delivered, so unchanged subtrees are not re-announced.
    last: Option<Value>,
}

/// In-process realtime store.
///
/// Cloning is cheap; clones share the same tree, so several simulated
/// clients can attach to one instance.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Lock order: `tree` before `listeners`.
    tree: Mutex<Value>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener: AtomicU64,
    push_ids: Mutex<PushIdGenerator>,
    server_clock: Arc<dyn Clock>,
    connected: watch::Sender<bool>,
    offset: watch::Sender<i64>,
    rejected: Mutex<Option<StorePath>>,
}

impl MemoryStore {
    pub fn new(server_clock: Arc<dyn Clock>) -> Self {
        let (connected, _) = watch::channel(true);
        let (offset, _) = watch::channel(0);
        Self {
            inner: Arc::new(MemoryStoreInner {
                tree: Mutex::new(Value::Object(Default::default())),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
                push_ids: Mutex::new(PushIdGenerator::new()),
                server_clock,
                connected,
                offset,
                rejected: Mutex::new(None),
            }),
        }
    }

    /// Flip the connectivity signal.
    pub fn set_connected(&self, online: bool) {
        self.inner.connected.send_replace(online);
    }

    /// Publish a new server-minus-local offset.
    pub fn set_clock_offset(&self, offset_ms: i64) {
        self.inner.offset.send_replace(offset_ms);
    }

    /// Make every write at or below `path` fail until cleared with `None`.
    pub fn reject_writes_under(&self, path: Option<StorePath>) {
        *lock(&self.inner.rejected) = path;
    }

    /// Apply a write immediately, as if another client's write just landed.
    pub fn apply_remote(&self, path: &StorePath, value: Option<Value>) {
        self.apply(path, value);
    }

    pub fn listener_count(&self) -> usize {
        let mut listeners = lock(&self.inner.listeners);
        listeners.retain(|_, l| !l.tx.is_closed());
        listeners.len()
    }

    /// Copy of the whole tree.
    pub fn dump(&self) -> Value {
        lock(&self.inner.tree).clone()
    }

    pub fn server_now(&self) -> i64 {
        self.inner.server_clock.now_ms()
    }

    fn read(&self, path: &StorePath) -> Option<Value> {
        get_at(&lock(&self.inner.tree), path).cloned()
    }

    fn check_writable(&self, path: &StorePath) -> Result<(), StoreError> {
        match &*lock(&self.inner.rejected) {
            Some(rejected) if rejected.is_ancestor_of(path) => {
                warn!(path = %path, "write rejected by store");
                Err(StoreError::WriteRejected {
                    path: path.to_string(),
                    reason: "permission denied".into(),
                })
            }
            _ => Ok(()),
        }
    }

    fn apply(&self, path: &StorePath, value: Option<Value>) {
        let now = self.inner.server_clock.now_ms();
        let value = value.map(|v| resolve_server_values(v, now));
        let mut tree = lock(&self.inner.tree);
        write_at(&mut tree, path, value);
        self.notify(&tree, path);
    }

    /// Called with the tree lock held so listeners observe writes in order.
    fn notify(&self, tree: &Value, written: &StorePath) {
        let mut listeners = lock(&self.inner.listeners);
        listeners.retain(|_, l| !l.tx.is_closed());
        for listener in listeners.values_mut().filter(|l| l.path.overlaps(written)) {
            let current = get_at(tree, &listener.path).cloned();
            if current != listener.last {
                listener.last = current.clone();
                let _ = listener.tx.send(Snapshot::new(listener.path.clone(), current));
            }
        }
    }
}

impl RealtimeStore for MemoryStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        Ok(self.read(path))
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        self.check_writable(path)?;
        let key = {
            let now = self.inner.server_clock.now_ms();
            let mut rng = rand::rng();
            lock(&self.inner.push_ids).next_id(now, &mut rng)
        };
        let child = path.child(&key)?;
        self.apply(&child, Some(value));
        debug!(path = %child, "pushed");
        Ok(key)
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.check_writable(path)?;
        self.apply(path, Some(value));
        Ok(())
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.check_writable(path)?;
        self.apply(path, None);
        Ok(())
    }

    async fn transaction<F>(
        &self,
        path: &StorePath,
        mut update: F,
    ) -> Result<TransactionOutcome, StoreError>
    where
        F: FnMut(Option<Value>) -> TxDecision + Send + 'static,
    {
        self.check_writable(path)?;
        for attempt in 1..=MAX_TX_ATTEMPTS {
            let seen = self.read(path);
            let next = match update(seen.clone()) {
                TxDecision::Abort => {
                    return Ok(TransactionOutcome {
                        committed: false,
                        snapshot: seen,
                    });
                }
                TxDecision::Commit(next) => next,
            };
            let now = self.inner.server_clock.now_ms();
            let next = next.map(|v| resolve_server_values(v, now));

            {
                let mut tree = lock(&self.inner.tree);
                if get_at(&tree, path) == seen.as_ref() {
                    write_at(&mut tree, path, next);
                    let snapshot = get_at(&tree, path).cloned();
                    self.notify(&tree, path);
                    return Ok(TransactionOutcome {
                        committed: true,
                        snapshot,
                    });
                }
            }

            debug!(path = %path, attempt, "transaction lost a race, retrying");
            tokio::task::yield_now().await;
        }

        Err(StoreError::TransactionContention {
            path: path.to_string(),
            attempts: MAX_TX_ATTEMPTS,
        })
    }

    fn subscribe(&self, path: &StorePath) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        {
            let tree = lock(&self.inner.tree);
            let current = get_at(&tree, path).cloned();
            let _ = tx.send(Snapshot::new(path.clone(), current.clone()));
            lock(&self.inner.listeners).insert(
                id,
                Listener {
                    path: path.clone(),
                    tx,
                    last: current,
                },
            );
        }
        debug!(path = %path, listener = id, "subscribed");

        let weak: Weak<MemoryStoreInner> = Arc::downgrade(&self.inner);
        Subscription::new(path.clone(), rx, move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner.listeners).remove(&id);
            }
        })
    }

    fn connectivity(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    fn clock_offset(&self) -> watch::Receiver<i64> {
        self.inner.offset.subscribe()
    }
}
