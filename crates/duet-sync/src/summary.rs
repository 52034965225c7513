//! Derived chat-summary state and the send-path repair hook.
//!
//! The message append and the summary update are two separate writes with no
//! transaction between them. When the second one fails the message exists
//! but `lastMessage` and the counterpart's unread counter are stale.

use chrono::{DateTime, Utc};
use tracing::warn;

use duet_shared::constants::EMPTY_CHAT_PREVIEW;
use duet_shared::{ChatId, MessageId, UserId};
use duet_store::{Chat, StoreError};

/// Consistency of the chat summary after a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryState {
    /// Both writes landed.
    Current,
    /// The message was appended but the summary update failed.
    Stale,
}

/// Called when a send leaves the summary stale.
pub trait SummaryRepair: Send + Sync {
    fn summary_stale(&self, chat: &ChatId, message: &MessageId, error: &StoreError);
}

/// Default hook: record the inconsistency and move on. The next successful
/// send overwrites `lastMessage` anyway.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyRepair;

impl SummaryRepair for LogOnlyRepair {
    fn summary_stale(&self, chat: &ChatId, message: &MessageId, error: &StoreError) {
        warn!(chat = %chat, message = %message, error = %error, "chat summary left stale after send");
    }
}

/// What the chat header and list need, computed from the summary document.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryView {
    pub counterpart: Option<UserId>,
    pub counterpart_name: String,
    pub counterpart_photo: Option<String>,
    pub counterpart_online: bool,
    pub counterpart_last_seen: Option<DateTime<Utc>>,
    pub counterpart_typing: bool,
    pub unread: i64,
    pub preview: String,
    pub last_activity: DateTime<Utc>,
    /// My last message has been read by the counterpart.
    pub seen: bool,
}

impl SummaryView {
    pub fn derive(chat: &Chat, me: &UserId) -> Self {
        let counterpart = chat.counterpart(me).cloned();
        let details = counterpart.as_ref().and_then(|u| chat.user_details.get(u));

        let seen = match (&chat.last_message, &counterpart) {
            (Some(last), Some(other)) => {
                last.sender_id.as_ref() == Some(me) && last.read_by.contains(other)
            }
            _ => false,
        };

        Self {
            counterpart_name: details
                .map(|d| d.display_name.clone())
                .or_else(|| counterpart.as_ref().map(|u| u.to_string()))
                .unwrap_or_default(),
            counterpart_photo: details.and_then(|d| d.photo_url.clone()),
            counterpart_online: details.is_some_and(|d| d.is_online),
            counterpart_last_seen: details.and_then(|d| d.last_seen),
            counterpart_typing: counterpart.as_ref().is_some_and(|u| chat.is_typing(u)),
            unread: chat.unread_for(me),
            preview: chat
                .last_message
                .as_ref()
                .map(|m| m.text.clone())
                .unwrap_or_else(|| EMPTY_CHAT_PREVIEW.to_string()),
            last_activity: chat.last_activity(),
            seen,
            counterpart,
        }
    }
}
