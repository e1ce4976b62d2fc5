mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Harness, T0, message, wait_for};
use ghost_core::{
    ChannelRouter, LifecycleSweeper, MessageSynchronizer, RetentionPolicy, SweepReport,
};
use ghost_store::{MemoryStore, RealtimeStore};
use ghost_types::{ChannelId, IdentityId, RoomId};

fn synchronizer(h: &Harness, router: &ChannelRouter) -> Arc<MessageSynchronizer<MemoryStore>> {
    Arc::new(MessageSynchronizer::new(
        h.store.clone(),
        h.layout.clone(),
        h.config.message_window,
        router.clone(),
    ))
}

#[tokio::test]
async fn ephemeral_message_is_gone_once_its_ttl_elapses() {
    let h = Harness::new();
    let router = ChannelRouter::new();
    let sync = synchronizer(&h, &router);
    sync.attach(ChannelId::Public);
    let mut view = sync.watch();

    let mut boo = message("me", "boo");
    boo.ephemeral = true;
    let boo_id = h.post(&ChannelId::Public, &boo).await;
    let theirs = {
        let mut m = message("them", "also boo");
        m.ephemeral = true;
        h.post(&ChannelId::Public, &m).await
    };

    let current = wait_for(&mut view, |v| v.messages.len() == 2).await;
    assert_eq!(current.messages[0].timestamp, T0);
    let policy = RetentionPolicy::from_config(&h.config);
    assert_eq!(current.visible(T0 + 44_999, &policy).len(), 2);
    assert!(current.visible(T0 + 45_000, &policy).is_empty());

    let sweeper = LifecycleSweeper::new(
        h.store.clone(),
        h.layout.clone(),
        IdentityId::new("me"),
        &h.config,
        h.skew(),
        sync.watch(),
    );
    h.clock.set(T0 + 44_999);
    assert_eq!(sweeper.sweep_once().await, SweepReport::default());

    h.clock.set(T0 + 45_000);
    let report = sweeper.sweep_once().await;
    assert_eq!(report.removed, 1);
    assert_eq!(report.failed, 0);

    let after = wait_for(&mut view, |v| v.messages.len() == 1).await;
    assert_eq!(after.messages[0].id, theirs);
    let stored = h
        .store
        .get(&h.layout.message(&ChannelId::Public, &boo_id))
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn plain_text_uses_the_long_retention_window() {
    let h = Harness::new();
    let router = ChannelRouter::new();
    let sync = synchronizer(&h, &router);
    sync.attach(ChannelId::Public);
    let mut view = sync.watch();

    h.post(&ChannelId::Public, &message("me", "staying a while"))
        .await;
    let mut pic = message("me", "");
    pic.image = Some("data:image/jpeg;base64,AAAA".into());
    h.post(&ChannelId::Public, &pic).await;
    wait_for(&mut view, |v| v.messages.len() == 2).await;

    let sweeper = LifecycleSweeper::new(
        h.store.clone(),
        h.layout.clone(),
        IdentityId::new("me"),
        &h.config,
        h.skew(),
        sync.watch(),
    );
    h.clock.set(T0 + 45_000);
    assert_eq!(sweeper.sweep_once().await.removed, 1);
    let left = wait_for(&mut view, |v| v.messages.len() == 1).await;
    assert_eq!(left.messages[0].text, "staying a while");

    h.clock.set(T0 + 3_599_999);
    assert_eq!(sweeper.sweep_once().await.removed, 0);
    h.clock.set(T0 + 3_600_000);
    assert_eq!(sweeper.sweep_once().await.removed, 1);
    wait_for(&mut view, |v| v.messages.is_empty()).await;
}

#[tokio::test]
async fn sweeper_uses_skew_corrected_time() {
    let h = Harness::new();
    let router = ChannelRouter::new();
    let sync = synchronizer(&h, &router);
    sync.attach(ChannelId::Public);
    let mut view = sync.watch();

    let mut boo = message("me", "boo");
    boo.ephemeral = true;
    h.post(&ChannelId::Public, &boo).await;
    wait_for(&mut view, |v| v.messages.len() == 1).await;

    let sweeper = LifecycleSweeper::new(
        h.store.clone(),
        h.layout.clone(),
        IdentityId::new("me"),
        &h.config,
        h.skew(),
        sync.watch(),
    );
    // Local clock lags the server by 10s; the raw local reading alone would
    // not have reached the deadline yet.
    h.store.set_clock_offset(10_000);
    h.clock.set(T0 + 35_000);
    assert_eq!(sweeper.sweep_once().await.removed, 1);
}

#[tokio::test]
async fn failed_removal_is_retried_next_tick() {
    let h = Harness::new();
    let router = ChannelRouter::new();
    let sync = synchronizer(&h, &router);
    sync.attach(ChannelId::Public);
    let mut view = sync.watch();

    let mut boo = message("me", "boo");
    boo.ephemeral = true;
    h.post(&ChannelId::Public, &boo).await;
    wait_for(&mut view, |v| v.messages.len() == 1).await;

    let sweeper = LifecycleSweeper::new(
        h.store.clone(),
        h.layout.clone(),
        IdentityId::new("me"),
        &h.config,
        h.skew(),
        sync.watch(),
    );
    h.clock.set(T0 + 60_000);
    h.store
        .reject_writes_under(Some(h.layout.messages(&ChannelId::Public)));
    let report = sweeper.sweep_once().await;
    assert_eq!((report.removed, report.failed), (0, 1));

    h.store.reject_writes_under(None);
    assert_eq!(sweeper.sweep_once().await.removed, 1);
}

#[tokio::test]
async fn view_keeps_only_the_most_recent_window() {
    let h = Harness::new();
    let router = ChannelRouter::new();
    let sync = synchronizer(&h, &router);
    sync.attach(ChannelId::Public);
    let mut view = sync.watch();

    for i in 0..55 {
        h.clock.advance(1);
        h.post(&ChannelId::Public, &message("them", &format!("msg {i}")))
            .await;
    }
    let current = wait_for(&mut view, |v| {
        v.messages.last().is_some_and(|m| m.text == "msg 54")
    })
    .await;
    assert_eq!(current.messages.len(), 50);
    assert_eq!(current.messages[0].text, "msg 5");
    assert!(
        current
            .messages
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp)
    );
}

#[tokio::test]
async fn switching_channels_drops_the_old_feed_first() {
    let h = Harness::new();
    let router = ChannelRouter::new();
    let sync = synchronizer(&h, &router);
    let follower = tokio::spawn(sync.clone().follow());
    let mut view = sync.watch();

    h.post(&ChannelId::Public, &message("them", "in public")).await;
    wait_for(&mut view, |v| v.messages.len() == 1).await;
    assert_eq!(h.store.listener_count(), 1);

    let room = RoomId::between(&IdentityId::new("me"), &IdentityId::new("them"));
    let private = ChannelId::Private(room);
    assert!(router.switch_to(private.clone()));
    assert!(router.is_switching());

    let switched = wait_for(&mut view, |v| v.channel.as_ref() == Some(&private)).await;
    assert!(switched.messages.is_empty());
    tokio::time::timeout(Duration::from_secs(5), async {
        while router.is_switching() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("switch never settled");
    assert_eq!(h.store.listener_count(), 1);

    // Writes to the old channel no longer reach the view.
    h.post(&ChannelId::Public, &message("them", "still public"))
        .await;
    h.post(&private, &message("them", "whisper")).await;
    let current = wait_for(&mut view, |v| v.messages.len() == 1).await;
    assert_eq!(current.messages[0].text, "whisper");

    follower.abort();
}

#[tokio::test]
async fn detach_clears_the_view_and_the_listener() {
    let h = Harness::new();
    let router = ChannelRouter::new();
    let sync = synchronizer(&h, &router);
    sync.attach(ChannelId::Public);
    let mut view = sync.watch();
    h.post(&ChannelId::Public, &message("them", "hello")).await;
    wait_for(&mut view, |v| v.messages.len() == 1).await;

    sync.detach();
    let current = sync.current();
    assert!(current.channel.is_none());
    assert!(current.messages.is_empty());
    assert_eq!(h.store.listener_count(), 0);
}
