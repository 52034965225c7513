//! # duet
//!
//! Local driver for the Duet sync engine.
//!
//! Signs in two users against the embedded store, opens the conversation
//! between them and plays a short exchange through two independent
//! sessions: send, reply, react, edit, delete, read tracking and the chat
//! list. Useful as a smoke test of a data directory.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use duet_shared::identity::{AuthUser, LocalIdentity};
use duet_shared::UserId;
use duet_store::{Database, DocumentStore, FsBlobStore};
use duet_sync::{ChatSession, Client, Notice, NoticeSink, SyncConfig};

fn user(uid: &str, name: &str) -> AuthUser {
    AuthUser {
        uid: UserId::new(uid),
        display_name: name.to_string(),
        email: format!("{uid}@duet.local"),
        photo_url: String::new(),
    }
}

async fn client(
    config: &SyncConfig,
    backend: Arc<dyn DocumentStore>,
    blobs: Arc<FsBlobStore>,
    auth: AuthUser,
) -> anyhow::Result<(Client, mpsc::UnboundedReceiver<Notice>)> {
    let identity = Arc::new(LocalIdentity::signed_in(auth.clone()));
    let (notices, rx) = NoticeSink::channel();
    let mut client = Client::new(config.clone(), backend, identity, blobs)?.with_notices(notices);
    client.register_profile(&auth).await?;
    client.start_presence()?;
    Ok((client, rx))
}

fn print_transcript(label: &str, session: &ChatSession) {
    println!("--- {label} ({}) ---", session.chat_id());
    for (message, starts_group) in session.messages().iter().zip(session.group_starts()) {
        let sender = if starts_group {
            session
                .chat()
                .and_then(|c| c.display_name_of(&message.sender_id))
                .unwrap_or(message.sender_id.as_str())
                .to_string()
        } else {
            String::new()
        };
        let mut line = format!("{sender:>8} | {}", message.text);
        if message.edited && !message.is_deleted {
            line.push_str(" (edited)");
        }
        if let Some(reply) = &message.reply_to {
            line.push_str(&format!("  [re {}: {}]", reply.sender_display_name, reply.text_preview));
        }
        for (emoji, count) in message.reaction_tally() {
            line.push_str(&format!(" {emoji}{count}"));
        }
        println!("{line}");
    }
    if let Some(summary) = session.summary() {
        println!(
            "{:>8} | unread={} seen={} preview={:?}",
            "", summary.unread, summary.seen, summary.preview
        );
    }
}

fn drain(label: &str, rx: &mut mpsc::UnboundedReceiver<Notice>) {
    while let Ok(notice) = rx.try_recv() {
        warn!(user = label, severity = ?notice.severity, "{}", notice.text);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,duet_sync=debug,duet_store=info")),
        )
        .init();

    info!("Starting Duet v{}", env!("CARGO_PKG_VERSION"));

    let config = SyncConfig::from_env();
    info!(?config, "Loaded configuration");

    let database = match &config.db_path {
        Some(path) => Database::open_at(path),
        None => Database::new(),
    }
    .context("opening the document store")?;
    info!(path = ?database.path(), "Document store ready");
    let backend: Arc<dyn DocumentStore> = Arc::new(database);

    let blobs = Arc::new(
        FsBlobStore::new(
            config.blob_path.clone(),
            config.blob_base_url.clone(),
            FsBlobStore::DEFAULT_MAX_SIZE,
        )
        .await?,
    );

    let (mut ada, mut ada_notices) = client(&config, backend.clone(), blobs.clone(), user("ada", "Ada")).await?;
    let (mut bea, mut bea_notices) = client(&config, backend, blobs, user("bea", "Bea")).await?;

    let mut ada_chat = ada.open_chat(&UserId::new("bea")).await?;
    ada_chat.sync_pending().await;
    let mut bea_chat = bea.open_session(ada_chat.chat_id().clone())?;
    bea_chat.sync_pending().await;

    ada_chat.set_draft("Hi Bea, are we still on for lunch?").await;
    let question = ada_chat.send().await?.message_id;
    bea_chat.sync_pending().await;

    bea_chat.set_reply_target(&question);
    bea_chat.set_draft("Yes! Noon works.").await;
    let answer = bea_chat.send().await?;
    info!(message = %answer.message_id, summary = ?answer.summary, "Bea replied");

    ada_chat.sync_pending().await;
    ada_chat.react(&answer.message_id, "👍").await?;
    ada_chat.set_draft("See you at 12:30").await;
    let typo = ada_chat.send().await?.message_id;
    ada_chat.sync_pending().await;
    ada_chat.edit(&typo, "See you at noon").await?;

    ada_chat.set_draft("you are subhuman").await;
    if let Err(e) = ada_chat.send().await {
        info!(error = %e, "Message blocked as expected");
    }

    ada_chat.set_draft("Bringing snacks").await;
    let extra = ada_chat.send().await?.message_id;
    ada_chat.sync_pending().await;
    ada_chat.delete(&extra).await?;

    bea_chat.sync_pending().await;
    ada_chat.sync_pending().await;
    print_transcript("Ada", &ada_chat);
    print_transcript("Bea", &bea_chat);

    let mut list = ada.chat_list()?;
    list.sync_pending();
    for item in list.view().active {
        println!(
            "chat {} with {}: {:?} (unread {})",
            item.chat_id, item.summary.counterpart_name, item.summary.preview, item.summary.unread
        );
    }

    ada_chat.close().await;
    bea_chat.close().await;
    drain("ada", &mut ada_notices);
    drain("bea", &mut bea_notices);

    ada.sign_out().await;
    bea.sign_out().await;
    info!("Done");
    Ok(())
}
