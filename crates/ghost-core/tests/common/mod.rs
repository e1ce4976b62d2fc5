#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use ghost_core::{AssistantBridge, CoreConfig, Layout, SkewClock};
use ghost_local::LocalDb;
use ghost_store::{
    ManualClock, MemoryStore, RealtimeStore, StoreError, StorePath, Subscription,
    TransactionOutcome, TxDecision, Value, server_timestamp,
};
use ghost_types::{ChannelId, ClientEvent, IdentityId, Message, Profile};

pub const T0: i64 = 1_700_000_000_000;

/// One shared in-memory store plus a hand-driven clock standing in for both
/// the server and every client.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub config: CoreConfig,
    pub layout: Layout,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let config = CoreConfig::default();
        let layout = Layout::new(&config.app_id);
        Self {
            store,
            clock,
            config,
            layout,
        }
    }

    pub fn skew(&self) -> SkewClock {
        SkewClock::new(self.clock.clone(), self.store.clock_offset())
    }

    /// Write a message the way a client would, server-stamped.
    pub async fn post(&self, channel: &ChannelId, message: &Message) -> String {
        let mut value = serde_json::to_value(message).unwrap();
        value["timestamp"] = server_timestamp();
        self.store
            .push(&self.layout.messages(channel), value)
            .await
            .unwrap()
    }
}

/// Store that gives up the scheduler before every call, like a network
/// round-trip would.
pub struct Latent(pub Arc<MemoryStore>);

impl RealtimeStore for Latent {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        tokio::task::yield_now().await;
        self.0.get(path).await
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        tokio::task::yield_now().await;
        self.0.push(path, value).await
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.0.set(path, value).await
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.0.remove(path).await
    }

    async fn transaction<F>(
        &self,
        path: &StorePath,
        update: F,
    ) -> Result<TransactionOutcome, StoreError>
    where
        F: FnMut(Option<Value>) -> TxDecision + Send + 'static,
    {
        tokio::task::yield_now().await;
        self.0.transaction(path, update).await
    }

    fn subscribe(&self, path: &StorePath) -> Subscription {
        self.0.subscribe(path)
    }

    fn connectivity(&self) -> watch::Receiver<bool> {
        self.0.connectivity()
    }

    fn clock_offset(&self) -> watch::Receiver<i64> {
        self.0.clock_offset()
    }
}

pub fn profile(id: &str, name: &str) -> Profile {
    Profile {
        id: IdentityId::new(id),
        name: name.into(),
        color: "cyan".into(),
    }
}

pub fn local() -> Arc<LocalDb> {
    Arc::new(LocalDb::open_in_memory().unwrap())
}

pub fn message(sender: &str, text: &str) -> Message {
    Message {
        id: String::new(),
        text: text.into(),
        sender_id: IdentityId::new(sender),
        sender_name: sender.to_uppercase(),
        sender_color: "rose".into(),
        timestamp: 0,
        ephemeral: false,
        image: None,
        reply_to: None,
        reactions: BTreeMap::new(),
        poll: None,
        game: None,
    }
}

/// Wait (bounded) until the watched value satisfies `pred`.
pub async fn wait_for<T: Clone>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("watch sender dropped")
        .clone()
}

/// Next event matching `pred`, skipping the rest.
pub async fn next_event(
    rx: &mut broadcast::Receiver<ClientEvent>,
    mut pred: impl FnMut(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Replies with a canned answer and remembers every prompt.
#[derive(Default)]
pub struct ScriptedBridge {
    pub reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedBridge {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl AssistantBridge for ScriptedBridge {
    async fn ask(&self, prompt: String) -> String {
        self.prompts.lock().unwrap().push(prompt);
        self.reply.clone()
    }
}
