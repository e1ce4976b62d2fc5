//! Realtime store port.
//!
//! The coordination core talks to a hierarchical key/value tree through the
//! [`RealtimeStore`] trait: subtree subscriptions, append-with-generated-key,
//! set, remove, optimistic conditional updates, a server write timestamp and
//! two out-of-band signals (connectivity, clock offset).
//!
//! [`MemoryStore`] is the in-process binding used by tests and the loopback
//! client. It resolves server timestamps from an injected [`Clock`], so runs
//! are deterministic.

pub mod clock;
pub mod error;
pub mod memory;
pub mod path;
pub mod push_id;
pub mod store;
pub mod subscription;
mod tree;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use path::StorePath;
pub use store::{RealtimeStore, TransactionOutcome, TxDecision, server_timestamp};
pub use subscription::{DetachGuard, Snapshot, SnapshotFeed, Subscription};

/// Values held in the tree.
pub use serde_json::Value;
