use std::future::Future;

use serde_json::json;
use tokio::sync::watch;

use crate::error::StoreError;
use crate::path::StorePath;
use crate::subscription::Subscription;
use crate::Value;

/// Placeholder the store replaces with its own write time (milliseconds).
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

/// What a conditional update wants to do with the value it was shown.
#[derive(Debug, Clone, PartialEq)]
pub enum TxDecision {
    /// Write this value (`None` removes) if nobody changed it meanwhile.
    Commit(Option<Value>),
    /// Leave the value alone.
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    pub committed: bool,
    /// Value at the path after the transaction finished.
    pub snapshot: Option<Value>,
}

/// Operations the coordination core needs from the realtime store.
///
/// All calls are non-blocking; results arrive whenever the store gets to
/// them. Writes racing on the same path are serialized by
/// [`RealtimeStore::transaction`]'s retry loop, never by client-side locks.
pub trait RealtimeStore: Send + Sync + 'static {
    fn get(&self, path: &StorePath)
    -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Append under `path` with a generated, time-ordered key. Returns the key.
    fn push(
        &self,
        path: &StorePath,
        value: Value,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;

    fn set(&self, path: &StorePath, value: Value)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removing an absent path succeeds.
    fn remove(&self, path: &StorePath) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Optimistic read-compute-write. `update` may run several times if
    /// another writer changes the value between the read and the write.
    fn transaction<F>(
        &self,
        path: &StorePath,
        update: F,
    ) -> impl Future<Output = Result<TransactionOutcome, StoreError>> + Send
    where
        F: FnMut(Option<Value>) -> TxDecision + Send + 'static;

    /// Watch a subtree. The current value is delivered first.
    fn subscribe(&self, path: &StorePath) -> Subscription;

    /// Live connectivity signal.
    fn connectivity(&self) -> watch::Receiver<bool>;

    /// Live server-minus-local clock offset in milliseconds.
    fn clock_offset(&self) -> watch::Receiver<i64>;
}
