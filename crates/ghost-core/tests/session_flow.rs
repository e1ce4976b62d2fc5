mod common;

use std::sync::Arc;

use common::{Harness, ScriptedBridge, next_event, profile, wait_for};
use ghost_core::{ChatSession, CoreError, PollStatus, SendOptions};
use ghost_core::assistant::{ASSISTANT_ID, ASSISTANT_NAME};
use ghost_local::LocalDb;
use ghost_store::MemoryStore;
use ghost_types::{ChannelId, ClientEvent, IdentityId, PairingState};

type Session = ChatSession<MemoryStore, ScriptedBridge>;

fn session(h: &Harness, id: &str, name: &str, bridge: Arc<ScriptedBridge>) -> Session {
    let db = Arc::new(LocalDb::open_in_memory().unwrap());
    let profile = profile(id, name);
    db.save_profile(&profile).unwrap();
    ChatSession::new(
        h.store.clone(),
        bridge,
        db,
        profile,
        h.config.clone(),
        h.clock.clone(),
    )
}

#[tokio::test]
async fn summoning_the_assistant_posts_its_directive_as_a_poll() {
    let h = Harness::new();
    let bridge = Arc::new(ScriptedBridge::new(
        r#"Omo, settle it like adults. [POLL: "Whose jollof?", "Ghana", "Naija"]"#,
    ));
    let s = session(&h, "alice", "Wisp", bridge.clone());
    s.start();
    let mut view = s.watch_view();

    s.send("@oracle whose jollof wins", SendOptions::default())
        .await
        .unwrap();
    let current = wait_for(&mut view, |v| v.messages.len() == 2).await;

    let reply = &current.messages[1];
    assert_eq!(reply.sender_id, IdentityId::new(ASSISTANT_ID));
    assert_eq!(reply.sender_name, ASSISTANT_NAME);
    assert_eq!(reply.text, "Omo, settle it like adults.");
    let poll = reply.poll.as_ref().expect("assistant reply carries a poll");
    assert_eq!(poll.question, "Whose jollof?");
    assert_eq!(poll.options.len(), 2);
    assert!(matches!(s.poll_status(reply), Some(PollStatus::Open { .. })));

    let prompts = bridge.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Wisp said: \"@oracle whose jollof wins\""));

    s.vote(&reply.id, "Naija").await.unwrap();
    assert_eq!(s.my_vote(&reply.id).unwrap().as_deref(), Some("Naija"));
    let tallied = wait_for(&mut view, |v| {
        v.messages
            .get(1)
            .and_then(|m| m.poll.as_ref())
            .is_some_and(|p| p.count("Naija") == 1)
    })
    .await;
    assert_eq!(tallied.messages[1].poll.as_ref().unwrap().total_votes(), 1);

    s.shutdown().await;
}

#[tokio::test]
async fn replying_to_the_assistant_passes_its_last_words_along() {
    let h = Harness::new();
    let bridge = Arc::new(ScriptedBridge::new("Fate decides. [GAME: COIN]"));
    let s = session(&h, "alice", "Wisp", bridge.clone());
    s.start();
    let mut view = s.watch_view();

    s.send("hey @ORACLE flip for me", SendOptions::default())
        .await
        .unwrap();
    let current = wait_for(&mut view, |v| v.messages.len() == 2).await;
    let oracle = current.messages[1].clone();
    assert!(oracle.game.is_some());
    assert_eq!(oracle.text, "Fate decides.");

    s.send(
        "again",
        SendOptions {
            reply_to: Some(oracle.id.clone()),
            ..SendOptions::default()
        },
    )
    .await
    .unwrap();
    let current = wait_for(&mut view, |v| v.messages.len() == 4).await;
    let quoted = current.messages[2].reply_to.as_ref().unwrap();
    assert_eq!(quoted.id, oracle.id);
    assert_eq!(quoted.sender_name, ASSISTANT_NAME);

    let prompts = bridge.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("You previously said: \"Fate decides.\""));

    s.shutdown().await;
}

#[tokio::test]
async fn failed_send_raises_a_notice() {
    let h = Harness::new();
    let s = session(&h, "alice", "Wisp", Arc::new(ScriptedBridge::default()));
    let mut events = s.events();
    h.store
        .reject_writes_under(Some(h.layout.messages(&ChannelId::Public)));

    let err = s.send("hello?", SendOptions::default()).await.unwrap_err();
    assert!(matches!(err, CoreError::Store(_)));
    let notice = next_event(&mut events, |e| matches!(e, ClientEvent::Notice { .. })).await;
    assert_eq!(
        notice,
        ClientEvent::Notice {
            text: "Failed to broadcast.".into()
        }
    );

    assert!(matches!(
        s.send("   ", SendOptions::default()).await,
        Err(CoreError::EmptyMessage)
    ));
}

#[tokio::test]
async fn floating_reactions_reach_other_sessions() {
    let h = Harness::new();
    let a = session(&h, "alice", "Wisp", Arc::new(ScriptedBridge::default()));
    let b = session(&h, "bob", "Echo", Arc::new(ScriptedBridge::default()));
    let mut b_events = b.events();
    b.start();

    a.react_floating("🔥").await.unwrap();
    let event = next_event(&mut b_events, |e| {
        matches!(e, ClientEvent::FloatingReaction(_))
    })
    .await;
    let ClientEvent::FloatingReaction(reaction) = event else {
        unreachable!()
    };
    assert_eq!(reaction.emoji, "🔥");
    assert_eq!(reaction.sender_id, IdentityId::new("alice"));

    let mut view = b.watch_view();
    let current = wait_for(&mut view, |v| !v.messages.is_empty()).await;
    assert_eq!(current.messages[0].text, "🔥");

    b.shutdown().await;
}

#[tokio::test]
async fn connectivity_drop_is_reported_as_a_notice() {
    let h = Harness::new();
    let s = session(&h, "alice", "Wisp", Arc::new(ScriptedBridge::default()));
    let mut events = s.events();
    s.start();

    h.store.set_connected(false);
    next_event(&mut events, |e| {
        *e == ClientEvent::ConnectivityChanged { online: false }
    })
    .await;
    let notice = next_event(&mut events, |e| matches!(e, ClientEvent::Notice { .. })).await;
    assert_eq!(
        notice,
        ClientEvent::Notice {
            text: "Disconnected from the void.".into()
        }
    );

    h.store.set_connected(true);
    next_event(&mut events, |e| {
        *e == ClientEvent::ConnectivityChanged { online: true }
    })
    .await;
    s.shutdown().await;
}

#[tokio::test]
async fn typing_shows_up_for_others_and_expires_on_read() {
    let h = Harness::new();
    let a = session(&h, "alice", "Wisp", Arc::new(ScriptedBridge::default()));
    let b = session(&h, "bob", "Echo", Arc::new(ScriptedBridge::default()));
    a.start();
    b.start();
    let mut seen_by_b = b.typists();
    let mut seen_by_a = a.typists();

    a.keystroke().await.unwrap();
    wait_for(&mut seen_by_b, |names| names == &["Wisp".to_string()]).await;
    assert!(seen_by_a.borrow_and_update().is_empty());

    // No heartbeat for the whole window: readers drop the entry on their own.
    h.clock.advance(3_000);
    wait_for(&mut seen_by_b, |names| names.is_empty()).await;

    a.keystroke().await.unwrap();
    wait_for(&mut seen_by_b, |names| !names.is_empty()).await;
    a.stop_typing().await.unwrap();
    wait_for(&mut seen_by_b, |names| names.is_empty()).await;

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn paired_sessions_move_into_the_private_room() {
    let h = Harness::new();
    let a = session(&h, "alice", "Wisp", Arc::new(ScriptedBridge::default()));
    let b = session(&h, "bob", "Echo", Arc::new(ScriptedBridge::default()));
    a.start();
    b.start();
    let mut a_pairing = a.watch_pairing();
    let mut b_pairing = b.watch_pairing();

    a.invite(&IdentityId::new("bob")).await.unwrap();
    wait_for(&mut b_pairing, |s| {
        matches!(s, PairingState::InviteReceived { .. })
    })
    .await;
    let room = b.accept().await.unwrap();
    wait_for(&mut a_pairing, PairingState::is_paired).await;

    let private = ChannelId::Private(room);
    assert_eq!(a.channel(), private);
    assert_eq!(b.channel(), private);

    let mut a_view = a.watch_view();
    wait_for(&mut a_view, |v| v.channel.as_ref() == Some(&private)).await;
    b.send("just us now", SendOptions::default()).await.unwrap();
    let current = wait_for(&mut a_view, |v| v.messages.len() == 1).await;
    assert_eq!(current.messages[0].text, "just us now");

    assert!(a.leave_room());
    assert_eq!(a.channel(), ChannelId::Public);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn banished_session_clears_its_profile() {
    let h = Harness::new();
    let bridge = Arc::new(ScriptedBridge::new("Dave is doing too much. [VOTE_KICK: Dave]"));
    let dave_db = Arc::new(LocalDb::open_in_memory().unwrap());
    let dave_profile = profile("dave", "Dave");
    dave_db.save_profile(&dave_profile).unwrap();
    let dave: Session = ChatSession::new(
        h.store.clone(),
        Arc::new(ScriptedBridge::default()),
        dave_db.clone(),
        dave_profile,
        h.config.clone(),
        h.clock.clone(),
    );
    let voter = session(&h, "v0", "Voter", bridge);

    let mut dave_events = dave.events();
    dave.start();
    voter.start();
    let mut view = voter.watch_view();

    voter
        .send("@oracle do something about dave", SendOptions::default())
        .await
        .unwrap();
    let current = wait_for(&mut view, |v| v.messages.len() == 2).await;
    let kick = current.messages[1].clone();
    assert!(kick.poll.as_ref().unwrap().is_kick());
    voter.vote(&kick.id, "BANISH").await.unwrap();

    let mut dave_view = dave.watch_view();
    wait_for(&mut dave_view, |v| {
        v.messages
            .iter()
            .any(|m| m.poll.as_ref().is_some_and(|p| p.count("BANISH") >= 1))
    })
    .await;

    h.clock.advance(15_000);
    let event = next_event(&mut dave_events, |e| {
        matches!(e, ClientEvent::Banished { .. })
    })
    .await;
    assert_eq!(
        event,
        ClientEvent::Banished {
            poll_id: kick.id.clone()
        }
    );
    assert!(dave_db.load_profile().unwrap().is_none());

    dave.shutdown().await;
    voter.shutdown().await;
}
