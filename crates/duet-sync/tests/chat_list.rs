mod common;

use common::{auth_user, world, Op, Target};
use duet_shared::{ChatId, UserId};
use duet_store::Preference;
use duet_sync::{NoticeSeverity, SyncError};

fn ids(items: &[duet_sync::ChatListItem]) -> Vec<String> {
    items.iter().map(|i| i.chat_id.to_string()).collect()
}

#[tokio::test]
async fn test_list_follows_activity() {
    let w = world().await;
    w.ada.client.register_profile(&auth_user("u3", "Cyd")).await.unwrap();

    let mut feed = w.ada.client.chat_list().unwrap();
    feed.sync_pending();
    assert!(feed.view().active.is_empty());

    let mut with_bea = w.ada.client.open_chat(&UserId::new("u2")).await.unwrap();
    let _with_cyd = w.ada.client.open_chat(&UserId::new("u3")).await.unwrap();
    feed.sync_pending();
    assert_eq!(ids(&feed.view().active), vec!["u1_u3", "u1_u2"]);
    assert_eq!(feed.view().active[1].summary.preview, "No messages yet");

    with_bea.sync_pending().await;
    with_bea.set_draft("hi Bea").await;
    with_bea.send().await.unwrap();
    feed.sync_pending();

    let view = feed.view();
    assert_eq!(ids(&view.active), vec!["u1_u2", "u1_u3"]);
    let item = &view.active[0];
    assert_eq!(item.summary.preview, "hi Bea");
    assert_eq!(item.summary.counterpart_name, "Bea");
    assert_eq!(item.summary.unread, 0);
    assert!(!item.emphasized);
}

#[tokio::test]
async fn test_pin_mute_archive() {
    let w = world().await;
    w.ada.client.register_profile(&auth_user("u3", "Cyd")).await.unwrap();
    w.ada.client.open_chat(&UserId::new("u2")).await.unwrap();
    w.ada.client.open_chat(&UserId::new("u3")).await.unwrap();
    let bea_chat = ChatId("u1_u2".into());

    let mut feed = w.ada.client.chat_list().unwrap();
    feed.sync_pending();
    assert_eq!(ids(&feed.view().active), vec!["u1_u3", "u1_u2"]);

    // The flip shows before the write lands.
    let pending = feed.begin_toggle(Preference::Pin, &bea_chat);
    assert_eq!(ids(&feed.view().active), vec!["u1_u2", "u1_u3"]);
    assert!(feed.view().active[0].pinned);
    let result = pending.write.await;
    feed.settle(pending.id, result).unwrap();
    feed.sync_pending();
    assert!(feed.preferences().unwrap().pinned_chats.contains(&bea_chat));

    let stored = w.ada.client.profiles().get(&UserId::new("u1")).await.unwrap().unwrap();
    assert!(stored.has_preference(Preference::Pin, &bea_chat));

    // Bea writes while the chat is muted.
    assert!(feed.toggle(Preference::Mute, &bea_chat).await.unwrap());
    let mut bea = w.bea.client.open_session(bea_chat.clone()).unwrap();
    bea.sync_pending().await;
    bea.set_draft("psst").await;
    bea.send().await.unwrap();
    feed.sync_pending();
    let item = feed.view().find(&bea_chat).cloned().unwrap();
    assert!(item.muted);
    assert_eq!(item.summary.unread, 1);
    assert!(!item.emphasized);

    assert!(feed.toggle(Preference::Archive, &bea_chat).await.unwrap());
    feed.sync_pending();
    let view = feed.view();
    assert_eq!(ids(&view.active), vec!["u1_u3"]);
    assert_eq!(ids(&view.archived), vec!["u1_u2"]);
    assert!(!view.archived[0].pinned);

    assert!(!feed.toggle(Preference::Archive, &bea_chat).await.unwrap());
    assert!(!feed.toggle(Preference::Pin, &bea_chat).await.unwrap());
    feed.sync_pending();
    assert_eq!(ids(&feed.view().active), vec!["u1_u2", "u1_u3"]);
    assert!(!feed.view().active[0].pinned);
}

#[tokio::test]
async fn test_failed_toggle_rolls_back() {
    let mut w = world().await;
    w.ada.client.open_chat(&UserId::new("u2")).await.unwrap();
    let chat = ChatId("u1_u2".into());

    let mut feed = w.ada.client.chat_list().unwrap();
    feed.sync_pending();
    w.ada.drain_notices();

    w.store.fail(Op::Update, Target::Users, 1);
    assert!(matches!(
        feed.toggle(Preference::Pin, &chat).await,
        Err(SyncError::StoreWrite(_))
    ));
    assert!(!feed.view().active[0].pinned);

    let notices = w.ada.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].severity, NoticeSeverity::Transient);

    feed.sync_pending();
    assert!(!feed.preferences().unwrap().has_preference(Preference::Pin, &chat));
}

#[tokio::test]
async fn test_chat_list_subscription_error() {
    let mut w = world().await;
    w.ada.client.open_chat(&UserId::new("u2")).await.unwrap();
    let mut feed = w.ada.client.chat_list().unwrap();
    feed.sync_pending();
    w.ada.drain_notices();

    w.store.break_subscriptions(Target::Chats);
    w.store.break_subscriptions(Target::Users);
    assert_eq!(feed.sync_pending(), 2);

    // Last known list is kept.
    assert_eq!(feed.view().active.len(), 1);
    let notices = w.ada.drain_notices();
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.severity == NoticeSeverity::Persistent));
}
