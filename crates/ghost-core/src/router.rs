use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::info;

use ghost_types::{ChannelId, RoomId};

/// Single source of "which channel is active". Everything else reads the
/// current channel id from here.
#[derive(Clone)]
pub struct ChannelRouter {
    current: Arc<watch::Sender<ChannelId>>,
    /// Set from a switch until the new channel's first snapshot lands.
    switching: Arc<AtomicBool>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ChannelId::Public);
        Self {
            current: Arc::new(tx),
            switching: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn current(&self) -> ChannelId {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ChannelId> {
        self.current.subscribe()
    }

    /// Returns false if `channel` is already active.
    pub fn switch_to(&self, channel: ChannelId) -> bool {
        if *self.current.borrow() == channel {
            return false;
        }
        info!(channel = %channel, "switching channel");
        self.switching.store(true, Ordering::SeqCst);
        self.current.send_replace(channel);
        true
    }

    pub fn enter_room(&self, room: RoomId) -> bool {
        self.switch_to(ChannelId::Private(room))
    }

    pub fn leave_room(&self) -> bool {
        self.switch_to(ChannelId::Public)
    }

    /// True while an intentional switch is settling.
    pub fn is_switching(&self) -> bool {
        self.switching.load(Ordering::SeqCst)
    }

    /// Mark the switch as complete.
    pub fn settle(&self) {
        self.switching.store(false, Ordering::SeqCst);
    }
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghost_types::IdentityId;

    #[test]
    fn switching_flag_tracks_intentional_moves() {
        let router = ChannelRouter::new();
        assert_eq!(router.current(), ChannelId::Public);
        assert!(!router.switch_to(ChannelId::Public));
        assert!(!router.is_switching());

        let room = RoomId::between(&IdentityId::new("a"), &IdentityId::new("b"));
        let mut rx = router.watch();
        assert!(router.enter_room(room.clone()));
        assert!(router.is_switching());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ChannelId::Private(room));

        router.settle();
        assert!(!router.is_switching());
        assert!(router.leave_room());
        assert_eq!(router.current(), ChannelId::Public);
    }
}
