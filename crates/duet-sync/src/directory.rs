//! User discovery and conversation creation.

use std::collections::BTreeMap;

use tracing::{info, warn};

use duet_shared::constants::CONVERSATION_STARTED;
use duet_shared::{ChatId, UserId};
use duet_store::{ChatStore, MessageStore, NewChat, ParticipantDetails, ProfileStore, UserProfile};

use crate::error::{Result, SyncError};

#[derive(Clone)]
pub struct Directory {
    profiles: ProfileStore,
    chats: ChatStore,
    messages: MessageStore,
}

impl Directory {
    pub fn new(profiles: ProfileStore, chats: ChatStore, messages: MessageStore) -> Self {
        Self {
            profiles,
            chats,
            messages,
        }
    }

    /// Everyone except `me`, ordered by display name.
    pub async fn list_users(&self, me: &UserId) -> Result<Vec<UserProfile>> {
        let mut users = self.profiles.list().await?;
        users.retain(|u| u.uid != *me);
        Ok(users)
    }

    /// Case-insensitive match on display name or email.
    pub async fn search(&self, me: &UserId, query: &str) -> Result<Vec<UserProfile>> {
        let needle = query.trim().to_lowercase();
        let mut users = self.list_users(me).await?;
        if !needle.is_empty() {
            users.retain(|u| {
                u.display_name.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
            });
        }
        Ok(users)
    }

    /// Create the conversation between `me` and `other` if needed and
    /// return its id. Only the call that creates it appends the opening
    /// system message.
    pub async fn open_chat(&self, me: &UserId, other: &UserId) -> Result<ChatId> {
        let chat_id = ChatId::for_pair(me, other)?;

        let mine = self
            .profiles
            .get(me)
            .await?
            .ok_or_else(|| SyncError::UnknownUser(me.clone()))?;
        let theirs = self
            .profiles
            .get(other)
            .await?
            .ok_or_else(|| SyncError::UnknownUser(other.clone()))?;

        let (lo, hi) = if me < other { (me, other) } else { (other, me) };
        let details: BTreeMap<UserId, ParticipantDetails> = [&mine, &theirs]
            .into_iter()
            .map(|p| (p.uid.clone(), ParticipantDetails::from(p)))
            .collect();

        let created = self
            .chats
            .create(&NewChat {
                id: chat_id.clone(),
                users: [lo.clone(), hi.clone()],
                details,
            })
            .await
            .map_err(SyncError::StoreWrite)?;

        if created {
            info!(chat = %chat_id, "conversation started");
            if let Err(e) = self.messages.append_system(&chat_id, CONVERSATION_STARTED).await {
                warn!(chat = %chat_id, error = %e, "failed to append opening message");
            }
        }
        Ok(chat_id)
    }
}
