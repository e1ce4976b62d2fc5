use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ghost_store::{RealtimeStore, Snapshot, server_timestamp};
use ghost_types::{
    ClientEvent, IdentityId, Invitation, InvitationResponse, PairingState, Profile, RoomId,
};

/// Our own invitation, still waiting for an answer.
#[derive(Debug, Clone)]
struct Outgoing {
    target: IdentityId,
    room_id: RoomId,
    sent_at: i64,
}

use crate::bus::EventBus;
use crate::clock::SkewClock;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::layout::Layout;
use crate::ms;
use crate::router::ChannelRouter;

/// Two-phase invite/answer handshake that provisions a private room.
///
/// ```text
/// IDLE ──invite──► INVITE_SENT ──accepted response──► PAIRED
///   │                   └──declined / stale──► IDLE
///   └──fresh invitation──► INVITE_RECEIVED ──accept──► PAIRED
///                               └──decline / stale──► IDLE
/// ```
///
/// The outgoing invitation lives beside the displayed state: an invitation
/// received while ours is pending shows as INVITE_RECEIVED, and the answer to
/// ours is still honoured.
pub struct PairingProtocol<S> {
    store: Arc<S>,
    layout: Layout,
    identity: IdentityId,
    name: String,
    clock: SkewClock,
    router: ChannelRouter,
    events: EventBus,
    freshness_ms: i64,
    interval: Duration,
    state: watch::Sender<PairingState>,
    outgoing: Mutex<Option<Outgoing>>,
}

impl<S: RealtimeStore> PairingProtocol<S> {
    pub fn new(
        store: Arc<S>,
        layout: Layout,
        profile: &Profile,
        config: &CoreConfig,
        clock: SkewClock,
        router: ChannelRouter,
        events: EventBus,
    ) -> Self {
        let (state, _) = watch::channel(PairingState::Idle);
        Self {
            store,
            layout,
            identity: profile.id.clone(),
            name: profile.name.clone(),
            clock,
            router,
            events,
            freshness_ms: ms(config.invitation_freshness),
            interval: config.watch_interval,
            state,
            outgoing: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PairingState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<PairingState> {
        self.state.subscribe()
    }

    fn transition(&self, next: PairingState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        if changed {
            debug!(identity = %self.identity, state = ?next, "pairing state changed");
            self.events.emit(ClientEvent::PairingChanged { state: next });
        }
    }

    fn outgoing(&self) -> Option<Outgoing> {
        self.outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_outgoing(&self, next: Option<Outgoing>) -> Option<Outgoing> {
        std::mem::replace(
            &mut *self.outgoing.lock().unwrap_or_else(PoisonError::into_inner),
            next,
        )
    }

    /// State to fall back to once an incoming invitation is gone.
    fn resting(&self) -> PairingState {
        match self.outgoing() {
            Some(out) => PairingState::InviteSent {
                target: out.target,
                room_id: out.room_id,
                sent_at: out.sent_at,
            },
            None => PairingState::Idle,
        }
    }

    fn is_receiving(&self) -> bool {
        matches!(*self.state.borrow(), PairingState::InviteReceived { .. })
    }

    fn is_fresh(&self, timestamp: i64, now: i64) -> bool {
        now - timestamp < self.freshness_ms
    }

    /// Phase 1: drop an invitation into `target`'s mailbox, replacing
    /// whatever was pending there. A previous invitation of ours to someone
    /// else is withdrawn.
    pub async fn invite(&self, target: &IdentityId) -> Result<RoomId, CoreError> {
        if self.state.borrow().is_paired() {
            return Err(CoreError::AlreadyPaired);
        }
        if *target == self.identity {
            return Err(CoreError::SelfInvite);
        }

        let room_id = RoomId::between(&self.identity, target);
        let invitation = json!({
            "fromId": self.identity,
            "fromName": self.name,
            "roomId": room_id,
            "timestamp": server_timestamp(),
        });
        self.store
            .set(&self.layout.invitation(target), invitation)
            .await?;
        info!(from = %self.identity, to = %target, room = %room_id, "invitation sent");

        let previous = self.replace_outgoing(Some(Outgoing {
            target: target.clone(),
            room_id: room_id.clone(),
            sent_at: self.clock.now_ms(),
        }));
        if let Some(previous) = previous.filter(|p| p.target != *target) {
            self.withdraw(&previous).await;
        }
        if !self.is_receiving() {
            self.transition(self.resting());
        }
        Ok(room_id)
    }

    /// React to the content of our own mailbox.
    pub async fn on_mailbox(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        let invitation = match snapshot.decode::<Invitation>() {
            Ok(Some(invitation)) => invitation,
            Ok(None) => {
                // Withdrawn or overwritten elsewhere.
                if self.is_receiving() {
                    self.transition(self.resting());
                }
                return Ok(());
            }
            Err(e) => {
                warn!(identity = %self.identity, "discarding malformed invitation: {}", e);
                self.store.remove(&snapshot.path).await?;
                return Ok(());
            }
        };

        if self.state.borrow().is_paired() {
            debug!(from = %invitation.from_id, "ignoring invitation while paired");
            return Ok(());
        }

        if !self.is_fresh(invitation.timestamp, self.clock.now_ms()) {
            debug!(from = %invitation.from_id, "discarding stale invitation");
            self.store.remove(&snapshot.path).await?;
            if self.is_receiving() {
                self.transition(self.resting());
            }
            return Ok(());
        }

        let already_shown = matches!(
            &*self.state.borrow(),
            PairingState::InviteReceived { invitation: pending } if *pending == invitation
        );
        if !already_shown {
            info!(from = %invitation.from_id, room = %invitation.room_id, "invitation received");
            self.events.emit(ClientEvent::InvitationReceived {
                from_id: invitation.from_id.clone(),
                from_name: invitation.from_name.clone(),
                room_id: invitation.room_id.clone(),
            });
            self.transition(PairingState::InviteReceived { invitation });
        }
        Ok(())
    }

    /// Phase 2a: answer yes, clear our mailbox, enter the room. Our own
    /// pending invitation, if any, is withdrawn.
    pub async fn accept(&self) -> Result<RoomId, CoreError> {
        let PairingState::InviteReceived { invitation } = self.state() else {
            return Err(CoreError::NoPendingInvitation);
        };
        let mailbox = self.layout.invitation(&self.identity);
        if !self.is_fresh(invitation.timestamp, self.clock.now_ms()) {
            self.store.remove(&mailbox).await?;
            self.transition(self.resting());
            return Err(CoreError::InvitationStale);
        }

        let room_id = RoomId::between(&self.identity, &invitation.from_id);
        if room_id != invitation.room_id {
            warn!(
                proposed = %invitation.room_id,
                derived = %room_id,
                "invitation carried a foreign room id"
            );
        }

        self.respond(&invitation.from_id, true, &room_id).await?;
        // The peer is pairing now; a stuck mailbox must not hold us back.
        if let Err(e) = self.store.remove(&mailbox).await {
            warn!(identity = %self.identity, "could not clear mailbox: {}", e);
        }
        info!(peer = %invitation.from_id, room = %room_id, "invitation accepted");

        self.transition(PairingState::Paired {
            room_id: room_id.clone(),
            peer_id: invitation.from_id,
            peer_name: invitation.from_name,
        });
        self.router.enter_room(room_id.clone());
        if let Some(out) = self.replace_outgoing(None) {
            self.withdraw(&out).await;
        }
        Ok(room_id)
    }

    /// Phase 2b: clear our mailbox and stay idle. The sender is told so it
    /// can stop waiting.
    pub async fn decline(&self) -> Result<(), CoreError> {
        let PairingState::InviteReceived { invitation } = self.state() else {
            return Err(CoreError::NoPendingInvitation);
        };
        self.store
            .remove(&self.layout.invitation(&self.identity))
            .await?;
        self.turn_down(&invitation).await;
        info!(peer = %invitation.from_id, "invitation declined");
        self.transition(self.resting());
        Ok(())
    }

    /// Tell an inviter no. Best effort.
    async fn turn_down(&self, invitation: &Invitation) {
        if let Err(e) = self
            .respond(&invitation.from_id, false, &invitation.room_id)
            .await
        {
            warn!(peer = %invitation.from_id, "could not deliver decline: {}", e);
        }
    }

    /// Take our invitation back out of the target's mailbox, unless someone
    /// else's has replaced it. Best effort.
    async fn withdraw(&self, out: &Outgoing) {
        let mailbox = self.layout.invitation(&out.target);
        let ours = match self.store.get(&mailbox).await {
            Ok(value) => Snapshot::new(mailbox.clone(), value)
                .decode::<Invitation>()
                .ok()
                .flatten()
                .is_some_and(|inv| inv.from_id == self.identity),
            Err(e) => {
                warn!(to = %out.target, "could not read invitation to withdraw: {}", e);
                false
            }
        };
        if !ours {
            return;
        }
        match self.store.remove(&mailbox).await {
            Ok(()) => debug!(to = %out.target, "invitation withdrawn"),
            Err(e) => warn!(to = %out.target, "could not withdraw invitation: {}", e),
        }
    }

    async fn respond(
        &self,
        sender: &IdentityId,
        accepted: bool,
        room_id: &RoomId,
    ) -> Result<(), CoreError> {
        let response = json!({
            "accepted": accepted,
            "roomId": room_id,
            "responderId": self.identity,
            "responderName": self.name,
            "timestamp": server_timestamp(),
        });
        self.store
            .set(&self.layout.invitation_response(sender), response)
            .await?;
        Ok(())
    }

    /// React to our response slot. Whatever is there is consumed.
    pub async fn on_response(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        let response = match snapshot.decode::<InvitationResponse>() {
            Ok(Some(response)) => response,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(identity = %self.identity, "discarding malformed response: {}", e);
                self.store.remove(&snapshot.path).await?;
                return Ok(());
            }
        };

        let awaiting = self.outgoing().is_some_and(|out| {
            out.target == response.responder_id && out.room_id == response.room_id
        });

        if awaiting && response.accepted {
            info!(peer = %response.responder_id, room = %response.room_id, "invitation accepted by peer");
            self.replace_outgoing(None);
            let displaced = self.state();
            self.transition(PairingState::Paired {
                room_id: response.room_id.clone(),
                peer_id: response.responder_id.clone(),
                peer_name: response.responder_name.clone(),
            });
            self.router.enter_room(response.room_id.clone());
            if let PairingState::InviteReceived { invitation } = displaced {
                // Someone else's invitation was waiting on us; answer it.
                if let Err(e) = self
                    .store
                    .remove(&self.layout.invitation(&self.identity))
                    .await
                {
                    warn!(identity = %self.identity, "could not clear mailbox: {}", e);
                }
                self.turn_down(&invitation).await;
            }
        } else if awaiting {
            info!(peer = %response.responder_id, "invitation declined by peer");
            self.replace_outgoing(None);
            self.events
                .notice(format!("{} declined the invitation.", response.responder_name));
            if !self.is_receiving() {
                self.transition(PairingState::Idle);
            }
        } else {
            debug!(from = %response.responder_id, "ignoring unexpected response");
        }

        self.store.remove(&snapshot.path).await?;
        Ok(())
    }

    /// Fetch and handle the mailbox once.
    pub async fn poll_mailbox(&self) -> Result<(), CoreError> {
        let path = self.layout.invitation(&self.identity);
        let value = self.store.get(&path).await?;
        self.on_mailbox(&Snapshot::new(path, value)).await
    }

    /// Fetch and handle the response slot once.
    pub async fn poll_responses(&self) -> Result<(), CoreError> {
        let path = self.layout.invitation_response(&self.identity);
        let value = self.store.get(&path).await?;
        self.on_response(&Snapshot::new(path, value)).await
    }

    /// Expire handshakes that outlived the freshness window.
    pub async fn reevaluate(&self, now: i64) -> Result<(), CoreError> {
        if let Some(out) = self.outgoing().filter(|out| !self.is_fresh(out.sent_at, now)) {
            debug!(to = %out.target, "invitation went unanswered");
            self.replace_outgoing(None);
            if !self.is_receiving() && !self.state.borrow().is_paired() {
                self.transition(PairingState::Idle);
            }
        }
        if let PairingState::InviteReceived { invitation } = self.state() {
            if !self.is_fresh(invitation.timestamp, now) {
                debug!(from = %invitation.from_id, "pending invitation expired");
                self.store
                    .remove(&self.layout.invitation(&self.identity))
                    .await?;
                self.transition(self.resting());
            }
        }
        Ok(())
    }

    /// Leave the private room and return to the public channel.
    pub fn leave(&self) -> bool {
        if !self.state.borrow().is_paired() {
            return false;
        }
        info!(identity = %self.identity, "leaving private room");
        self.replace_outgoing(None);
        self.transition(PairingState::Idle);
        self.router.leave_room();
        true
    }

    pub async fn run(self: Arc<Self>) {
        let mut mailbox = self.store.subscribe(&self.layout.invitation(&self.identity));
        let mut responses = self
            .store
            .subscribe(&self.layout.invitation_response(&self.identity));
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            let result = tokio::select! {
                Some(snapshot) = mailbox.next() => self.on_mailbox(&snapshot).await,
                Some(snapshot) = responses.next() => self.on_response(&snapshot).await,
                _ = ticker.tick() => self.reevaluate(self.clock.now_ms()).await,
            };
            if let Err(e) = result {
                warn!(identity = %self.identity, "pairing step failed: {}", e);
            }
        }
    }
}
