use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use ghost_store::{RealtimeStore, Snapshot};
use ghost_types::{ClientEvent, FloatingReaction, IdentityId};

use crate::bus::EventBus;
use crate::clock::SkewClock;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::layout::Layout;
use crate::ms;

/// Turns the shared reaction log into one-shot animation events.
#[derive(Debug)]
pub struct FloatingFeed {
    seen: HashSet<String>,
    keep: usize,
    window_ms: i64,
}

impl FloatingFeed {
    pub fn new(keep: usize, window_ms: i64) -> Self {
        Self {
            seen: HashSet::new(),
            keep,
            window_ms,
        }
    }

    /// Reactions in `snapshot` that have not been surfaced yet and are
    /// recent enough to animate. Only the latest `keep` keys are considered.
    pub fn ingest(&mut self, snapshot: &Snapshot, now: i64) -> Vec<FloatingReaction> {
        let entries: Vec<(&str, &serde_json::Value)> = snapshot.children().collect();
        let latest = &entries[entries.len().saturating_sub(self.keep)..];

        let mut fresh = Vec::new();
        for (key, value) in latest {
            if !self.seen.insert(key.to_string()) {
                continue;
            }
            match serde_json::from_value::<FloatingReaction>((*value).clone()) {
                Ok(reaction) if now - reaction.timestamp < self.window_ms => fresh.push(reaction),
                Ok(_) => {}
                Err(e) => debug!(key, "ignoring malformed floating reaction: {}", e),
            }
        }
        self.seen
            .retain(|k| latest.iter().any(|(key, _)| *key == k.as_str()));
        fresh
    }
}

/// Floating reaction sender and listener.
pub struct FloatingReactions<S> {
    store: Arc<S>,
    layout: Layout,
    identity: IdentityId,
    clock: SkewClock,
    events: EventBus,
    keep: usize,
    window_ms: i64,
}

impl<S: RealtimeStore> FloatingReactions<S> {
    pub fn new(
        store: Arc<S>,
        layout: Layout,
        identity: IdentityId,
        config: &CoreConfig,
        clock: SkewClock,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            layout,
            identity,
            clock,
            events,
            keep: config.floating_keep,
            window_ms: ms(config.floating_window),
        }
    }

    /// Broadcast a burst. Stamped with corrected local time so it animates
    /// immediately instead of waiting on the server clock.
    pub async fn trigger(&self, emoji: &str) -> Result<(), CoreError> {
        let value = json!({
            "emoji": emoji,
            "senderId": self.identity,
            "timestamp": self.clock.now_ms(),
        });
        self.store
            .push(&self.layout.floating_reactions(), value)
            .await?;
        Ok(())
    }

    pub async fn run(self: Arc<Self>) {
        let mut subscription = self.store.subscribe(&self.layout.floating_reactions());
        let mut feed = FloatingFeed::new(self.keep, self.window_ms);
        while let Some(snapshot) = subscription.next().await {
            for reaction in feed.ingest(&snapshot, self.clock.now_ms()) {
                self.events.emit(ClientEvent::FloatingReaction(reaction));
            }
        }
        warn!("floating reaction feed closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghost_store::StorePath;
    use serde_json::{Map, Value};

    fn log(entries: &[(&str, &str, i64)]) -> Snapshot {
        let mut map = Map::new();
        for (key, emoji, ts) in entries {
            map.insert(
                key.to_string(),
                json!({"emoji": emoji, "senderId": "x", "timestamp": ts}),
            );
        }
        Snapshot::new(StorePath::root(), Some(Value::Object(map)))
    }

    #[test]
    fn surfaces_each_recent_reaction_once() {
        let mut feed = FloatingFeed::new(10, 10_000);
        let first = log(&[("-a", "👻", 1_000), ("-b", "🔥", 95_000)]);
        let out = feed.ingest(&first, 100_000);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].emoji, "🔥");

        let second = log(&[("-a", "👻", 1_000), ("-b", "🔥", 95_000), ("-c", "💀", 99_000)]);
        let out = feed.ingest(&second, 100_000);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].emoji, "💀");
    }

    #[test]
    fn only_latest_keys_are_considered() {
        let mut feed = FloatingFeed::new(2, 10_000);
        let snapshot = log(&[("-a", "1", 99_000), ("-b", "2", 99_000), ("-c", "3", 99_000)]);
        let emojis: Vec<_> = feed
            .ingest(&snapshot, 100_000)
            .into_iter()
            .map(|r| r.emoji)
            .collect();
        assert_eq!(emojis, ["2", "3"]);
    }
}
