use tokio::sync::broadcast;

use ghost_types::ClientEvent;

/// Fan-out of client-facing events. Every subscriber sees every event sent
/// after it subscribed; slow subscribers lag rather than block senders.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    /// Passive, dismissible notification.
    pub fn notice(&self, text: impl Into<String>) {
        self.emit(ClientEvent::Notice { text: text.into() });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
