mod common;

use common::{auth_user, chat_id, world, Op, Target};
use duet_shared::identity::IdentityProvider;
use duet_shared::{UserId, ValidationError};
use duet_sync::{Avatar, NoticeSeverity, SyncError};

fn u1() -> UserId {
    UserId::new("u1")
}

fn u2() -> UserId {
    UserId::new("u2")
}

#[tokio::test]
async fn test_list_and_search_users() {
    let w = world().await;
    w.ada.client.register_profile(&auth_user("u3", "Cyd")).await.unwrap();
    let directory = w.ada.client.directory();

    let names: Vec<_> = directory
        .list_users(&u1())
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.display_name)
        .collect();
    assert_eq!(names, vec!["Bea", "Cyd"]);

    let found = directory.search(&u1(), "BE").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].uid, u2());

    let by_email = directory.search(&u1(), "cyd@duet").await.unwrap();
    assert_eq!(by_email[0].display_name, "Cyd");
    assert!(directory.search(&u1(), "ada").await.unwrap().is_empty());
    assert_eq!(directory.search(&u1(), "  ").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_open_chat_is_idempotent() {
    let w = world().await;
    let directory = w.ada.client.directory();
    assert_eq!(directory.open_chat(&u1(), &u2()).await.unwrap(), chat_id());
    assert_eq!(directory.open_chat(&u1(), &u2()).await.unwrap(), chat_id());
    assert_eq!(
        w.bea.client.directory().open_chat(&u2(), &u1()).await.unwrap(),
        chat_id()
    );

    let mut session = w.ada.client.open_session(chat_id()).unwrap();
    session.sync_pending().await;
    assert_eq!(session.messages().len(), 1);

    let chat = session.chat().unwrap();
    assert_eq!(chat.users, vec![u1(), u2()]);
    assert_eq!(chat.display_name_of(&u2()), Some("Bea"));
    assert_eq!(chat.unread_for(&u1()), 0);
    assert_eq!(chat.unread_for(&u2()), 0);
    assert!(chat.last_message.is_none());
}

#[tokio::test]
async fn test_open_chat_rejects_bad_pairs() {
    let w = world().await;
    let directory = w.ada.client.directory();
    assert!(matches!(
        directory.open_chat(&u1(), &UserId::new("u9")).await,
        Err(SyncError::UnknownUser(uid)) if uid == UserId::new("u9")
    ));
    assert!(matches!(
        directory.open_chat(&u1(), &u1()).await,
        Err(SyncError::Validation(ValidationError::SelfChat))
    ));
    assert!(matches!(
        directory.open_chat(&u1(), &UserId::new("a_b")).await,
        Err(SyncError::Validation(ValidationError::InvalidUserId(_)))
    ));
}

#[tokio::test]
async fn test_failed_chat_creation() {
    let w = world().await;
    w.store.fail(Op::Create, Target::Chats, 1);
    assert!(matches!(
        w.ada.client.directory().open_chat(&u1(), &u2()).await,
        Err(SyncError::StoreWrite(_))
    ));
    assert!(w.ada.client.chats().get(&chat_id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_register_twice_keeps_profile() {
    let w = world().await;
    let again = w
        .ada
        .client
        .register_profile(&auth_user("u1", "Somebody Else"))
        .await
        .unwrap();
    assert_eq!(again.display_name, "Ada");
    assert!(again.last_seen.is_some());
}

#[tokio::test]
async fn test_profile_update_refreshes_chats() {
    let w = world().await;
    w.ada.client.open_chat(&u2()).await.unwrap();

    let avatar = Avatar {
        file_name: "Pictures/me.png".into(),
        bytes: b"\x89PNG fake".to_vec(),
    };
    let profile = w
        .ada
        .client
        .profile_service()
        .update(&u1(), "  Ada L. ", Some(avatar))
        .await
        .unwrap();
    assert_eq!(profile.display_name, "Ada L.");
    let url = profile.photo_url.clone().unwrap();
    assert!(url.contains("avatars/u1/me.png"));

    let mut bea = w.bea.client.open_session(chat_id()).unwrap();
    bea.sync_pending().await;
    let summary = bea.summary().unwrap();
    assert_eq!(summary.counterpart_name, "Ada L.");
    assert_eq!(summary.counterpart_photo, Some(url));

    // A rename without a new avatar keeps the old picture.
    let renamed = w
        .ada
        .client
        .profile_service()
        .update(&u1(), "Ada", None)
        .await
        .unwrap();
    assert_eq!(renamed.photo_url, profile.photo_url);
}

#[tokio::test]
async fn test_profile_update_validation_and_failure() {
    let mut w = world().await;
    let service = w.ada.client.profile_service();
    assert!(matches!(
        service.update(&u1(), "Al", None).await,
        Err(SyncError::Validation(ValidationError::DisplayNameTooShort { .. }))
    ));

    w.ada.drain_notices();
    w.store.fail(Op::Update, Target::Users, 1);
    assert!(matches!(
        service.update(&u1(), "Ada Lovelace", None).await,
        Err(SyncError::StoreWrite(_))
    ));
    let notices = w.ada.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].severity, NoticeSeverity::Transient);

    let stored = w.ada.client.profiles().get(&u1()).await.unwrap().unwrap();
    assert_eq!(stored.display_name, "Ada");
}

#[tokio::test]
async fn test_sign_out_publishes_offline() {
    let mut w = world().await;
    assert!(w.ada.client.profiles().get(&u1()).await.unwrap().unwrap().is_online);

    w.ada.client.sign_out().await;
    let profile = w.ada.client.profiles().get(&u1()).await.unwrap().unwrap();
    assert!(!profile.is_online);
    assert!(profile.last_seen.is_some());

    assert!(w.ada.identity.current_user().is_none());
    assert!(matches!(w.ada.client.me(), Err(SyncError::Identity(_))));
    assert!(matches!(w.ada.client.chat_list(), Err(SyncError::Identity(_))));
}

#[tokio::test]
async fn test_sign_out_stops_heartbeat() {
    let mut w = world().await;
    w.bea.client.start_presence().unwrap();
    w.bea.client.visibility_regained();
    w.bea.client.sign_out().await;

    let profile = w.bea.client.profiles().get(&u2()).await.unwrap().unwrap();
    assert!(!profile.is_online);
    assert!(w.bea.identity.current_user().is_none());
}
