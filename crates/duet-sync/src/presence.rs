//! Presence heartbeat.
//!
//! Writes `isOnline=true` when started, again on every interval tick and
//! whenever the app becomes visible again, and `isOnline=false` when
//! stopped. All writes are best-effort.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use duet_shared::identity::PresenceAdapter;
use duet_shared::{IdentityError, UserId};
use duet_store::{ChatStore, ProfileStore};

/// Publishes presence on the profile and copies it into `userDetails` of
/// every chat the user is in, where sessions and the chat list read it.
#[derive(Clone)]
pub struct ChatPresence {
    profiles: ProfileStore,
    chats: ChatStore,
}

impl ChatPresence {
    pub fn new(profiles: ProfileStore, chats: ChatStore) -> Self {
        Self { profiles, chats }
    }
}

#[async_trait]
impl PresenceAdapter for ChatPresence {
    async fn set_presence(&self, uid: &UserId, is_online: bool) -> Result<(), IdentityError> {
        self.profiles.set_presence(uid, is_online).await?;

        let chats = match self.chats.list_for_user(uid).await {
            Ok(chats) => chats,
            Err(e) => {
                warn!(uid = %uid, error = %e, "failed to list chats for presence");
                return Ok(());
            }
        };
        for chat in chats {
            if let Err(e) = self.chats.set_participant_presence(&chat.id, uid, is_online).await {
                warn!(chat = %chat.id, uid = %uid, error = %e, "failed to mirror presence");
            }
        }
        Ok(())
    }
}

enum Command {
    Visible,
    Stop,
}

pub struct PresenceHeartbeat;

impl PresenceHeartbeat {
    pub fn start(adapter: Arc<dyn PresenceAdapter>, uid: UserId, every: Duration) -> PresenceHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(adapter, uid, every, rx));
        PresenceHandle { tx, task }
    }
}

/// Control handle for a running heartbeat.
pub struct PresenceHandle {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl PresenceHandle {
    pub fn visibility_regained(&self) {
        let _ = self.tx.send(Command::Visible);
    }

    /// Write offline and wait for the task to finish.
    pub async fn stop(self) {
        let _ = self.tx.send(Command::Stop);
        if let Err(e) = self.task.await {
            warn!(error = %e, "presence task ended abnormally");
        }
    }
}

async fn run(
    adapter: Arc<dyn PresenceAdapter>,
    uid: UserId,
    every: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // The first tick completes immediately: online on start.
            _ = ticker.tick() => publish(adapter.as_ref(), &uid, true).await,
            cmd = rx.recv() => match cmd {
                Some(Command::Visible) => {
                    publish(adapter.as_ref(), &uid, true).await;
                    ticker.reset();
                }
                Some(Command::Stop) | None => {
                    publish(adapter.as_ref(), &uid, false).await;
                    break;
                }
            },
        }
    }
    debug!(uid = %uid, "presence heartbeat stopped");
}

async fn publish(adapter: &dyn PresenceAdapter, uid: &UserId, online: bool) {
    if let Err(e) = adapter.set_presence(uid, online).await {
        warn!(uid = %uid, online, error = %e, "presence update failed");
    }
}
