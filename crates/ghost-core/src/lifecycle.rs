use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use ghost_store::RealtimeStore;
use ghost_types::{ChannelId, IdentityId, Message};

use crate::clock::SkewClock;
use crate::config::CoreConfig;
use crate::layout::Layout;
use crate::ms;
use crate::sync::MessageView;

/// Deletion deadlines for authored messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub ephemeral_ttl_ms: i64,
    pub retention_ttl_ms: i64,
}

impl RetentionPolicy {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            ephemeral_ttl_ms: ms(config.ephemeral_ttl),
            retention_ttl_ms: ms(config.retention_ttl),
        }
    }

    /// Short budget for ephemeral or image-carrying messages, long otherwise.
    pub fn ttl_for(&self, message: &Message) -> i64 {
        if message.ephemeral || message.image.is_some() {
            self.ephemeral_ttl_ms
        } else {
            self.retention_ttl_ms
        }
    }

    pub fn expires_at(&self, message: &Message) -> i64 {
        message.timestamp.saturating_add(self.ttl_for(message))
    }

    pub fn is_expired(&self, message: &Message, now: i64) -> bool {
        now >= self.expires_at(message)
    }

    /// Milliseconds left before deletion, clamped at zero. Drives fade-out.
    pub fn remaining(&self, message: &Message, now: i64) -> i64 {
        (self.expires_at(message) - now).max(0)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

/// Deletes the local identity's own expired messages from the active channel.
pub struct LifecycleSweeper<S> {
    store: Arc<S>,
    layout: Layout,
    identity: IdentityId,
    policy: RetentionPolicy,
    clock: SkewClock,
    view: watch::Receiver<MessageView>,
    interval: Duration,
}

impl<S: RealtimeStore> LifecycleSweeper<S> {
    pub fn new(
        store: Arc<S>,
        layout: Layout,
        identity: IdentityId,
        config: &CoreConfig,
        clock: SkewClock,
        view: watch::Receiver<MessageView>,
    ) -> Self {
        Self {
            store,
            layout,
            identity,
            policy: RetentionPolicy::from_config(config),
            clock,
            view,
            interval: config.sweep_interval,
        }
    }

    /// Authored messages in the current view whose budget has elapsed.
    pub fn due(&self, now: i64) -> Vec<(ChannelId, String)> {
        let view = self.view.borrow();
        let Some(channel) = view.channel.clone() else {
            return Vec::new();
        };
        view.messages
            .iter()
            .filter(|m| m.is_from(&self.identity) && self.policy.is_expired(m, now))
            .map(|m| (channel.clone(), m.id.clone()))
            .collect()
    }

    /// One pass. Failed removals are left for the next tick.
    pub async fn sweep_once(&self) -> SweepReport {
        let now = self.clock.now_ms();
        let mut report = SweepReport::default();
        for (channel, id) in self.due(now) {
            match self.store.remove(&self.layout.message(&channel, &id)).await {
                Ok(()) => {
                    debug!(channel = %channel, message = %id, "expired message removed");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(channel = %channel, message = %id, "sweep failed: {}", e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            let report = self.sweep_once().await;
            if report.removed > 0 || report.failed > 0 {
                info!(
                    removed = report.removed,
                    failed = report.failed,
                    "sweep finished"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(ts: i64, ephemeral: bool, image: Option<&str>) -> Message {
        Message {
            id: "m".into(),
            text: "hi".into(),
            sender_id: IdentityId::new("me"),
            sender_name: "Me".into(),
            sender_color: "rose".into(),
            timestamp: ts,
            ephemeral,
            image: image.map(str::to_string),
            reply_to: None,
            reactions: Default::default(),
            poll: None,
            game: None,
        }
    }

    #[test]
    fn ttl_depends_on_ephemeral_flag_and_image() {
        let policy = RetentionPolicy::from_config(&CoreConfig::default());
        assert_eq!(policy.ttl_for(&message(0, true, None)), 45_000);
        assert_eq!(policy.ttl_for(&message(0, false, Some("data:"))), 45_000);
        assert_eq!(policy.ttl_for(&message(0, false, None)), 3_600_000);
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let policy = RetentionPolicy::from_config(&CoreConfig::default());
        let msg = message(1_000, true, None);
        assert!(!policy.is_expired(&msg, 45_999));
        assert!(policy.is_expired(&msg, 46_000));
        assert_eq!(policy.remaining(&msg, 40_000), 6_000);
        assert_eq!(policy.remaining(&msg, 50_000), 0);
    }
}
