use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use ghost_store::{DetachGuard, RealtimeStore, Snapshot};
use ghost_types::{ChannelId, Message};

use crate::layout::Layout;
use crate::lifecycle::RetentionPolicy;
use crate::router::ChannelRouter;

/// Ordered, deduplicated messages of one channel.
///
/// Always replaced wholesale, never patched.
#[derive(Debug, Clone, Default)]
pub struct MessageView {
    /// `None` until the first channel is attached.
    pub channel: Option<ChannelId>,
    /// Bumped on every attach; updates tagged with an older generation are
    /// dropped.
    pub generation: u64,
    pub messages: Arc<Vec<Message>>,
}

impl MessageView {
    /// Messages still inside their retention budget at `now`.
    pub fn visible(&self, now: i64, policy: &RetentionPolicy) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| !policy.is_expired(m, now))
            .cloned()
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }
}

/// Rebuild the full message sequence from a channel snapshot.
///
/// Entries that fail to decode are skipped. Ordering is by server timestamp,
/// ties broken by store key; only the most recent `window` survive.
pub fn assemble(snapshot: &Snapshot, window: usize) -> Vec<Message> {
    let mut messages: Vec<Message> = snapshot
        .children()
        .filter_map(|(id, value)| match Message::from_entry(id, value) {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!(path = %snapshot.path, message = id, "skipping malformed message: {}", e);
                None
            }
        })
        .collect();
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    messages.dedup_by(|a, b| a.id == b.id);
    if messages.len() > window {
        messages.drain(..messages.len() - window);
    }
    messages
}

struct Attached {
    guard: DetachGuard,
    task: JoinHandle<()>,
}

/// Keeps a [`MessageView`] in step with the active channel's collection.
pub struct MessageSynchronizer<S> {
    store: Arc<S>,
    layout: Layout,
    window: usize,
    router: ChannelRouter,
    view: Arc<watch::Sender<MessageView>>,
    generation: AtomicU64,
    active: Mutex<Option<Attached>>,
}

impl<S: RealtimeStore> MessageSynchronizer<S> {
    pub fn new(store: Arc<S>, layout: Layout, window: usize, router: ChannelRouter) -> Self {
        let (view, _) = watch::channel(MessageView::default());
        Self {
            store,
            layout,
            window,
            router,
            view: Arc::new(view),
            generation: AtomicU64::new(0),
            active: Mutex::new(None),
        }
    }

    pub fn watch(&self) -> watch::Receiver<MessageView> {
        self.view.subscribe()
    }

    pub fn current(&self) -> MessageView {
        self.view.borrow().clone()
    }

    /// Switch to `channel`. The previous subscription is gone before this
    /// returns, and the view is emptied until the new channel reports in.
    pub fn attach(&self, channel: ChannelId) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = active.take() {
            prev.guard.detach();
            prev.task.abort();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.view.send_replace(MessageView {
            channel: Some(channel.clone()),
            generation,
            messages: Arc::new(Vec::new()),
        });

        let (mut feed, guard) = self.store.subscribe(&self.layout.messages(&channel)).split();
        let view = self.view.clone();
        let router = self.router.clone();
        let window = self.window;
        debug!(channel = %channel, generation, "attached message feed");

        let task = tokio::spawn(async move {
            let mut settled = false;
            while let Some(snapshot) = feed.next().await {
                let messages = Arc::new(assemble(&snapshot, window));
                view.send_if_modified(|current| {
                    if current.generation != generation {
                        return false;
                    }
                    current.messages = messages;
                    true
                });
                if !settled {
                    router.settle();
                    settled = true;
                }
            }
        });
        *active = Some(Attached { guard, task });
    }

    /// Drop the active subscription and clear the view.
    pub fn detach(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = active.take() {
            prev.guard.detach();
            prev.task.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.view.send_replace(MessageView {
            channel: None,
            generation,
            messages: Arc::new(Vec::new()),
        });
    }

    /// Track the router until the task is aborted.
    pub async fn follow(self: Arc<Self>) {
        let mut channels = self.router.watch();
        let first = channels.borrow_and_update().clone();
        self.attach(first);
        while channels.changed().await.is_ok() {
            let next = channels.borrow_and_update().clone();
            self.attach(next);
        }
    }
}

impl<S> Drop for MessageSynchronizer<S> {
    fn drop(&mut self) {
        let active = self.active.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = active.take() {
            prev.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghost_store::StorePath;
    use serde_json::json;

    #[test]
    fn assemble_orders_by_timestamp_then_key_and_caps() {
        let snapshot = Snapshot::new(
            StorePath::root(),
            Some(json!({
                "-c": {"text": "third", "senderId": "a", "timestamp": 30},
                "-b": {"text": "tie-b", "senderId": "a", "timestamp": 20},
                "-a": {"text": "tie-a", "senderId": "a", "timestamp": 20},
                "-z": {"text": "first", "senderId": "a", "timestamp": 10},
                "-bad": {"text": 5}
            })),
        );
        let all: Vec<_> = assemble(&snapshot, 50).into_iter().map(|m| m.id).collect();
        assert_eq!(all, ["-z", "-a", "-b", "-c"]);

        let recent: Vec<_> = assemble(&snapshot, 2).into_iter().map(|m| m.text).collect();
        assert_eq!(recent, ["tie-b", "third"]);
    }

    #[test]
    fn assemble_of_missing_collection_is_empty() {
        let snapshot = Snapshot::new(StorePath::root(), None);
        assert!(assemble(&snapshot, 50).is_empty());
    }
}
