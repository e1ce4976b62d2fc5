use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, warn};

use ghost_store::{RealtimeStore, Snapshot, Subscription, server_timestamp};
use ghost_types::{ChannelId, IdentityId, Profile, TypingState};

use crate::clock::SkewClock;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::layout::Layout;
use crate::ms;
use crate::router::ChannelRouter;

/// Names of everyone in `snapshot` whose heartbeat is younger than
/// `window_ms`, excluding `exclude`. Sorted for stable display.
pub fn active_typists(
    snapshot: &Snapshot,
    now: i64,
    window_ms: i64,
    exclude: &IdentityId,
) -> Vec<String> {
    let mut names: Vec<String> = snapshot
        .children()
        .filter(|(id, _)| *id != exclude.as_str())
        .filter_map(|(_, value)| serde_json::from_value::<TypingState>(value.clone()).ok())
        .filter(|state| now - state.timestamp < window_ms)
        .map(|state| state.name)
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Per-channel "is typing" heartbeats. Stale entries are never deleted
/// here; readers filter them out.
pub struct PresenceTracker<S> {
    store: Arc<S>,
    layout: Layout,
    identity: IdentityId,
    name: String,
    clock: SkewClock,
    window_ms: i64,
    throttle_ms: i64,
    interval: Duration,
    last_beat: Mutex<Option<(ChannelId, i64)>>,
}

impl<S: RealtimeStore> PresenceTracker<S> {
    pub fn new(
        store: Arc<S>,
        layout: Layout,
        profile: &Profile,
        config: &CoreConfig,
        clock: SkewClock,
    ) -> Self {
        Self {
            store,
            layout,
            identity: profile.id.clone(),
            name: profile.name.clone(),
            clock,
            window_ms: ms(config.typing_window),
            throttle_ms: ms(config.typing_throttle),
            interval: config.watch_interval,
            last_beat: Mutex::new(None),
        }
    }

    pub async fn set_typing(&self, channel: &ChannelId, typing: bool) -> Result<(), CoreError> {
        let path = self.layout.typing_entry(channel, &self.identity);
        if typing {
            self.store
                .set(&path, json!({ "name": self.name, "timestamp": server_timestamp() }))
                .await?;
            *self.last_beat.lock().unwrap_or_else(PoisonError::into_inner) =
                Some((channel.clone(), self.clock.now_ms()));
        } else {
            self.store.remove(&path).await?;
            *self.last_beat.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
        Ok(())
    }

    /// Refresh the heartbeat unless one went out for this channel within the
    /// throttle window. Returns whether a write was issued.
    pub async fn keystroke(&self, channel: &ChannelId) -> Result<bool, CoreError> {
        let now = self.clock.now_ms();
        let recent = self
            .last_beat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|(last, at)| last == channel && now - *at < self.throttle_ms);
        if recent {
            return Ok(false);
        }
        self.set_typing(channel, true).await?;
        Ok(true)
    }

    pub fn typists(&self, snapshot: &Snapshot) -> Vec<String> {
        active_typists(snapshot, self.clock.now_ms(), self.window_ms, &self.identity)
    }

    /// Publish who is typing in the router's active channel. Re-filters on a
    /// timer too, since entries expire without any write.
    pub async fn follow(
        self: Arc<Self>,
        router: ChannelRouter,
        out: Arc<watch::Sender<Vec<String>>>,
    ) {
        let mut channels = router.watch();
        let mut ticker = tokio::time::interval(self.interval);
        let mut latest: Option<Snapshot> = None;
        let mut subscription: Option<Subscription> = None;
        let mut current: Option<ChannelId> = None;

        loop {
            let wanted = channels.borrow_and_update().clone();
            if current.as_ref() != Some(&wanted) {
                if let Some(prev) = subscription.take() {
                    prev.detach();
                }
                latest = None;
                debug!(channel = %wanted, "watching typing");
                subscription = Some(self.store.subscribe(&self.layout.typing(&wanted)));
                current = Some(wanted);
            }

            let Some(sub) = subscription.as_mut() else {
                continue;
            };
            tokio::select! {
                changed = channels.changed() => {
                    if changed.is_err() {
                        warn!("router gone; typing watch stopped");
                        return;
                    }
                    continue;
                }
                Some(snapshot) = sub.next() => latest = Some(snapshot),
                _ = ticker.tick() => {}
            }

            let names = latest
                .as_ref()
                .map(|snap| self.typists(snap))
                .unwrap_or_default();
            out.send_if_modified(|prev| {
                if *prev == names {
                    return false;
                }
                *prev = names;
                true
            });
        }
    }
}
