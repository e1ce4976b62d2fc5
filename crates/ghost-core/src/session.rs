use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ghost_local::LocalDb;
use ghost_store::{Clock, RealtimeStore, server_timestamp};
use ghost_types::{
    ChannelId, ClientEvent, Embed, IdentityId, Message, PairingState, Profile, ReplyRef, RoomId,
};

use crate::assistant::{
    ASSISTANT_COLOR, ASSISTANT_NAME, AssistantBridge, assistant_identity, build_prompt,
    is_summoned, recent_names,
};
use crate::bus::EventBus;
use crate::clock::SkewClock;
use crate::config::CoreConfig;
use crate::directive::DirectiveParser;
use crate::error::CoreError;
use crate::floating::FloatingReactions;
use crate::layout::Layout;
use crate::lifecycle::{LifecycleSweeper, RetentionPolicy};
use crate::pairing::PairingProtocol;
use crate::polls::{PollEngine, PollStatus, resolve};
use crate::presence::PresenceTracker;
use crate::reactions::ReactionCoordinator;
use crate::router::ChannelRouter;
use crate::sync::{MessageSynchronizer, MessageView};

const DISCONNECTED: &str = "Disconnected from the void.";
const SEND_FAILED: &str = "Failed to broadcast.";

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub ephemeral: bool,
    /// Encoded image payload. Makes the message short-lived.
    pub image: Option<String>,
    /// Id of a message in the current view to quote.
    pub reply_to: Option<String>,
}

/// Everything one signed-in identity needs, wired together.
///
/// Cheap to clone; clones share the same background tasks.
pub struct ChatSession<S, B> {
    inner: Arc<SessionInner<S, B>>,
}

impl<S, B> Clone for ChatSession<S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct SessionInner<S, B> {
    store: Arc<S>,
    bridge: Arc<B>,
    local: Arc<LocalDb>,
    config: CoreConfig,
    layout: Layout,
    profile: Profile,
    clock: SkewClock,
    router: ChannelRouter,
    events: EventBus,
    policy: RetentionPolicy,
    parser: DirectiveParser,
    sync: Arc<MessageSynchronizer<S>>,
    reactions: ReactionCoordinator<S>,
    polls: PollEngine<S>,
    pairing: Arc<PairingProtocol<S>>,
    presence: Arc<PresenceTracker<S>>,
    floating: Arc<FloatingReactions<S>>,
    typists: Arc<watch::Sender<Vec<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: RealtimeStore, B: AssistantBridge> ChatSession<S, B> {
    pub fn new(
        store: Arc<S>,
        bridge: Arc<B>,
        local: Arc<LocalDb>,
        profile: Profile,
        config: CoreConfig,
        local_clock: Arc<dyn Clock>,
    ) -> Self {
        let layout = Layout::new(&config.app_id);
        let clock = SkewClock::new(local_clock, store.clock_offset());
        let router = ChannelRouter::new();
        let events = EventBus::new();

        let sync = Arc::new(MessageSynchronizer::new(
            store.clone(),
            layout.clone(),
            config.message_window,
            router.clone(),
        ));
        let reactions = ReactionCoordinator::new(store.clone(), layout.clone());
        let polls = PollEngine::new(
            store.clone(),
            layout.clone(),
            local.clone(),
            clock.clone(),
            &config,
        );
        let pairing = Arc::new(PairingProtocol::new(
            store.clone(),
            layout.clone(),
            &profile,
            &config,
            clock.clone(),
            router.clone(),
            events.clone(),
        ));
        let presence = Arc::new(PresenceTracker::new(
            store.clone(),
            layout.clone(),
            &profile,
            &config,
            clock.clone(),
        ));
        let floating = Arc::new(FloatingReactions::new(
            store.clone(),
            layout.clone(),
            profile.id.clone(),
            &config,
            clock.clone(),
            events.clone(),
        ));
        let (typists, _) = watch::channel(Vec::new());
        let typists = Arc::new(typists);

        Self {
            inner: Arc::new(SessionInner {
                policy: RetentionPolicy::from_config(&config),
                parser: DirectiveParser::from_config(&config),
                store,
                bridge,
                local,
                config,
                layout,
                profile,
                clock,
                router,
                events,
                sync,
                reactions,
                polls,
                pairing,
                presence,
                floating,
                typists,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawn the background loops: message sync, sweeper, handshake,
    /// floating reactions, typing, connectivity and kick watchers.
    pub fn start(&self) {
        let inner = &self.inner;
        let sweeper = LifecycleSweeper::new(
            inner.store.clone(),
            inner.layout.clone(),
            inner.profile.id.clone(),
            &inner.config,
            inner.clock.clone(),
            inner.sync.watch(),
        );

        let mut handles = vec![
            tokio::spawn(inner.sync.clone().follow()),
            tokio::spawn(sweeper.run()),
            tokio::spawn(inner.pairing.clone().run()),
            tokio::spawn(inner.floating.clone().run()),
            tokio::spawn(
                inner
                    .presence
                    .clone()
                    .follow(inner.router.clone(), inner.typists.clone()),
            ),
        ];
        handles.push(tokio::spawn(watch_connectivity(
            inner.store.connectivity(),
            inner.router.clone(),
            inner.events.clone(),
        )));
        handles.push(tokio::spawn(announce_channels(
            inner.router.watch(),
            inner.events.clone(),
        )));
        let session = self.clone();
        handles.push(tokio::spawn(async move { session.watch_kicks().await }));

        info!(identity = %inner.profile.id, name = %inner.profile.name, "session started");
        inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);
    }

    /// Stop every background loop and clear our typing entry.
    pub async fn shutdown(&self) {
        let channel = self.channel();
        if let Err(e) = self.inner.presence.set_typing(&channel, false).await {
            debug!("could not clear typing entry: {}", e);
        }
        let handles: Vec<_> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            handle.abort();
        }
        self.inner.sync.detach();
        info!(identity = %self.inner.profile.id, "session stopped");
    }

    /// Forget the local profile and stop.
    pub async fn logout(&self) -> Result<(), CoreError> {
        self.inner.local.clear_profile()?;
        self.shutdown().await;
        Ok(())
    }

    pub fn profile(&self) -> &Profile {
        &self.inner.profile
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn channel(&self) -> ChannelId {
        self.inner.router.current()
    }

    pub fn now_ms(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    pub fn view(&self) -> MessageView {
        self.inner.sync.current()
    }

    pub fn watch_view(&self) -> watch::Receiver<MessageView> {
        self.inner.sync.watch()
    }

    /// Current channel's messages that are still within their lifetime.
    pub fn messages(&self) -> Vec<Message> {
        self.view().visible(self.now_ms(), &self.inner.policy)
    }

    /// Milliseconds until `message` is swept. Drives fade-out.
    pub fn remaining_ms(&self, message: &Message) -> i64 {
        self.inner.policy.remaining(message, self.now_ms())
    }

    pub fn poll_status(&self, message: &Message) -> Option<PollStatus> {
        message
            .poll
            .as_ref()
            .map(|poll| resolve(poll, self.now_ms()))
    }

    /// Post to the active channel. A failed write raises a notice as well as
    /// returning the error. Mentioning the assistant (or replying to it)
    /// asks it for a reply in the background.
    pub async fn send(&self, text: &str, options: SendOptions) -> Result<String, CoreError> {
        let text = text.trim();
        if text.is_empty() && options.image.is_none() {
            return Err(CoreError::EmptyMessage);
        }
        let channel = self.channel();
        let view = self.view();
        let quoted = options.reply_to.as_deref().and_then(|id| view.find(id));
        let assistant = assistant_identity();
        let prior_reply = quoted
            .filter(|m| m.is_from(&assistant))
            .map(|m| m.text.clone());

        let profile = &self.inner.profile;
        let message = Message {
            id: String::new(),
            text: text.to_string(),
            sender_id: profile.id.clone(),
            sender_name: profile.name.clone(),
            sender_color: profile.color.clone(),
            timestamp: 0,
            ephemeral: options.ephemeral,
            image: options.image,
            reply_to: quoted.map(|m| ReplyRef {
                id: m.id.clone(),
                sender_name: m.sender_name.clone(),
                text: m.text.clone(),
            }),
            reactions: BTreeMap::new(),
            poll: None,
            game: None,
        };

        let id = match self.post(&channel, &message).await {
            Ok(id) => id,
            Err(e) => {
                warn!(channel = %channel, "send failed: {}", e);
                self.inner.events.notice(SEND_FAILED);
                return Err(e);
            }
        };
        if let Err(e) = self.inner.presence.set_typing(&channel, false).await {
            debug!("could not clear typing entry: {}", e);
        }

        if is_summoned(text, prior_reply.is_some()) {
            let session = self.clone();
            let text = text.to_string();
            tokio::spawn(async move {
                if let Err(e) = session
                    .consult_assistant(&channel, &text, prior_reply.as_deref())
                    .await
                {
                    warn!("assistant reply failed: {}", e);
                }
            });
        }
        Ok(id)
    }

    /// Ask the assistant about `text` and post its reply to `channel`, with
    /// any directive lifted into a poll or game.
    pub async fn consult_assistant(
        &self,
        channel: &ChannelId,
        text: &str,
        prior_reply: Option<&str>,
    ) -> Result<String, CoreError> {
        let names = recent_names(&self.view().messages);
        let prompt = build_prompt(&self.inner.profile.name, text, &names, prior_reply);
        let reply = self.inner.bridge.ask(prompt).await;

        let parsed = {
            let mut rng = rand::rng();
            self.inner.parser.parse(&reply, self.now_ms(), &mut rng)
        };
        let (poll, game) = match parsed.embed {
            Some(Embed::Poll(poll)) => (Some(poll), None),
            Some(Embed::Game(game)) => (None, Some(game)),
            None => (None, None),
        };
        let message = Message {
            id: String::new(),
            text: parsed.body,
            sender_id: assistant_identity(),
            sender_name: ASSISTANT_NAME.to_string(),
            sender_color: ASSISTANT_COLOR.to_string(),
            timestamp: 0,
            ephemeral: false,
            image: None,
            reply_to: None,
            reactions: BTreeMap::new(),
            poll,
            game,
        };
        let id = self.post(channel, &message).await?;
        debug!(channel = %channel, message = %id, "assistant replied");
        Ok(id)
    }

    async fn post(&self, channel: &ChannelId, message: &Message) -> Result<String, CoreError> {
        let mut value = serde_json::to_value(message)?;
        if let Some(record) = value.as_object_mut() {
            record.insert("timestamp".into(), server_timestamp());
        }
        let id = self
            .inner
            .store
            .push(&self.inner.layout.messages(channel), value)
            .await?;
        debug!(channel = %channel, message = %id, "message posted");
        Ok(id)
    }

    pub async fn toggle_reaction(&self, message_id: &str, emoji: &str) -> Result<(), CoreError> {
        let channel = self.channel();
        self.inner
            .reactions
            .toggle(&channel, message_id, emoji, &self.inner.profile.id)
            .await
    }

    /// Animated burst for everyone, followed by the emoji as a message.
    pub async fn react_floating(&self, emoji: &str) -> Result<(), CoreError> {
        if let Err(e) = self.inner.floating.trigger(emoji).await {
            warn!(emoji, "floating reaction failed: {}", e);
        }
        self.send(emoji, SendOptions::default()).await?;
        Ok(())
    }

    pub async fn vote(&self, message_id: &str, option: &str) -> Result<(), CoreError> {
        let channel = self.channel();
        let view = self.view();
        let message = view
            .find(message_id)
            .ok_or_else(|| CoreError::UnknownMessage(message_id.to_string()))?;
        self.inner.polls.cast_vote(&channel, message, option).await
    }

    pub fn my_vote(&self, poll_id: &str) -> Result<Option<String>, CoreError> {
        self.inner.polls.my_vote(poll_id)
    }

    /// Look for a kick vote that just banished us. Clears the local profile
    /// and raises [`ClientEvent::Banished`] when one is found.
    pub fn check_kicks(&self) -> Result<Option<String>, CoreError> {
        let view = self.view();
        let hit = self
            .inner
            .polls
            .scan(&view.messages, &self.inner.profile, self.now_ms())?;
        if let Some(poll_id) = &hit {
            self.inner.events.emit(ClientEvent::Banished {
                poll_id: poll_id.clone(),
            });
        }
        Ok(hit)
    }

    async fn watch_kicks(&self) {
        let mut view = self.inner.sync.watch();
        let mut ticker = tokio::time::interval(self.inner.config.watch_interval);
        loop {
            tokio::select! {
                changed = view.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = ticker.tick() => {}
            }
            match self.check_kicks() {
                Ok(Some(_)) => return,
                Ok(None) => {}
                Err(e) => warn!("kick check failed: {}", e),
            }
        }
    }

    pub fn pairing_state(&self) -> PairingState {
        self.inner.pairing.state()
    }

    pub fn watch_pairing(&self) -> watch::Receiver<PairingState> {
        self.inner.pairing.watch()
    }

    pub async fn invite(&self, target: &IdentityId) -> Result<RoomId, CoreError> {
        self.inner.pairing.invite(target).await
    }

    pub async fn accept(&self) -> Result<RoomId, CoreError> {
        self.inner.pairing.accept().await
    }

    pub async fn decline(&self) -> Result<(), CoreError> {
        self.inner.pairing.decline().await
    }

    pub fn leave_room(&self) -> bool {
        self.inner.pairing.leave()
    }

    /// Typing heartbeat for the active channel, throttled.
    pub async fn keystroke(&self) -> Result<(), CoreError> {
        self.inner.presence.keystroke(&self.channel()).await?;
        Ok(())
    }

    pub async fn stop_typing(&self) -> Result<(), CoreError> {
        self.inner.presence.set_typing(&self.channel(), false).await
    }

    /// Names currently typing in the active channel, ourselves excluded.
    pub fn typists(&self) -> watch::Receiver<Vec<String>> {
        self.inner.typists.subscribe()
    }
}

/// Surface connectivity changes, except drops while a channel switch settles.
async fn watch_connectivity(
    mut online: watch::Receiver<bool>,
    router: ChannelRouter,
    events: EventBus,
) {
    while online.changed().await.is_ok() {
        let is_online = *online.borrow_and_update();
        if !is_online && router.is_switching() {
            debug!("connectivity drop during channel switch suppressed");
            continue;
        }
        info!(online = is_online, "connectivity changed");
        events.emit(ClientEvent::ConnectivityChanged { online: is_online });
        if !is_online {
            events.notice(DISCONNECTED);
        }
    }
}

async fn announce_channels(mut channels: watch::Receiver<ChannelId>, events: EventBus) {
    while channels.changed().await.is_ok() {
        let channel = channels.borrow_and_update().clone();
        events.emit(ClientEvent::ChannelSwitched { channel });
    }
}
