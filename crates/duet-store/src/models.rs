//! Domain model structs persisted as documents.
//!
//! Field names are camelCase on the wire. Timestamps are stored as integer
//! microseconds so the store can order by them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::serde::{ts_microseconds, ts_microseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use duet_shared::constants::{DELETED_PLACEHOLDER, REACTION_PALETTE};
use duet_shared::{ChatId, MessageId, UserId};

use crate::document::Document;
use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// UserProfile
// ---------------------------------------------------------------------------

/// Per-user profile document (`users/{uid}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: UserId,
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(with = "ts_microseconds_option", default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pinned_chats: BTreeSet<ChatId>,
    #[serde(default)]
    pub muted_chats: BTreeSet<ChatId>,
    #[serde(default)]
    pub archived_chats: BTreeSet<ChatId>,
}

impl UserProfile {
    pub fn from_document(doc: &Document) -> Result<Self> {
        doc.decode()
    }

    pub fn preference(&self, preference: Preference) -> &BTreeSet<ChatId> {
        match preference {
            Preference::Pin => &self.pinned_chats,
            Preference::Mute => &self.muted_chats,
            Preference::Archive => &self.archived_chats,
        }
    }

    pub fn preference_mut(&mut self, preference: Preference) -> &mut BTreeSet<ChatId> {
        match preference {
            Preference::Pin => &mut self.pinned_chats,
            Preference::Mute => &mut self.muted_chats,
            Preference::Archive => &mut self.archived_chats,
        }
    }

    pub fn has_preference(&self, preference: Preference, chat: &ChatId) -> bool {
        self.preference(preference).contains(chat)
    }
}

/// One of the per-user chat preference sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preference {
    Pin,
    Mute,
    Archive,
}

impl Preference {
    /// Profile field holding the set.
    pub fn field(self) -> &'static str {
        match self {
            Preference::Pin => "pinnedChats",
            Preference::Mute => "mutedChats",
            Preference::Archive => "archivedChats",
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Denormalised per-participant details carried on the chat summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDetails {
    pub display_name: String,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(with = "ts_microseconds_option", default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<&UserProfile> for ParticipantDetails {
    fn from(profile: &UserProfile) -> Self {
        Self {
            display_name: profile.display_name.clone(),
            photo_url: profile.photo_url.clone(),
            is_online: profile.is_online,
            last_seen: profile.last_seen,
        }
    }
}

/// Summary of the newest message, mirrored onto the chat document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub text: String,
    #[serde(with = "ts_microseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sender_id: Option<UserId>,
    #[serde(default)]
    pub read_by: Vec<UserId>,
}

/// Chat summary document (`chats/{a}_{b}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(skip)]
    pub id: ChatId,
    pub users: Vec<UserId>,
    #[serde(default)]
    pub user_details: BTreeMap<UserId, ParticipantDetails>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_counts: BTreeMap<UserId, i64>,
    #[serde(default)]
    pub typing: BTreeMap<UserId, bool>,
    #[serde(with = "ts_microseconds")]
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// Decode and validate a chat document.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let mut chat: Chat = doc.decode()?;
        chat.id = ChatId(doc.id.clone());
        chat.check_invariants()?;
        Ok(chat)
    }

    pub fn is_member(&self, uid: &UserId) -> bool {
        self.users.contains(uid)
    }

    /// The participant that is not `me`.
    pub fn counterpart(&self, me: &UserId) -> Option<&UserId> {
        self.users.iter().find(|u| *u != me)
    }

    pub fn unread_for(&self, uid: &UserId) -> i64 {
        self.unread_counts.get(uid).copied().unwrap_or(0)
    }

    pub fn is_typing(&self, uid: &UserId) -> bool {
        self.typing.get(uid).copied().unwrap_or(false)
    }

    /// Timestamp used to order the chat list.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.created_at)
    }

    /// Display name of a participant as denormalised on this chat.
    pub fn display_name_of(&self, uid: &UserId) -> Option<&str> {
        self.user_details.get(uid).map(|d| d.display_name.as_str())
    }

    pub fn check_invariants(&self) -> Result<()> {
        let corrupt = |reason: String| StoreError::Corrupt {
            path: format!("chats/{}", self.id),
            reason,
        };

        if self.users.len() != 2 || self.users[0] == self.users[1] {
            return Err(corrupt(format!("expected 2 distinct users, got {:?}", self.users)));
        }

        let keys = self
            .unread_counts
            .keys()
            .chain(self.typing.keys())
            .chain(self.user_details.keys());
        for key in keys {
            if !self.is_member(key) {
                return Err(corrupt(format!("{key} is not a participant")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    User,
    System,
}

/// Frozen snapshot of the message being replied to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyTo {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub text_preview: String,
    pub sender_display_name: String,
}

/// A message document (`chats/{chat}/messages/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(skip)]
    pub id: MessageId,
    pub text: String,
    pub sender_id: UserId,
    #[serde(with = "ts_microseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub reactions: BTreeMap<UserId, String>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyTo>,
}

impl Message {
    pub fn from_document(doc: &Document) -> Result<Self> {
        let mut message: Message = doc.decode()?;
        message.id = MessageId(doc.id.clone());
        Ok(message)
    }

    pub fn is_system(&self) -> bool {
        self.kind == MessageKind::System || self.sender_id.is_system()
    }

    /// Turn the message into its tombstone.
    pub fn tombstone(&mut self) {
        self.is_deleted = true;
        self.text = DELETED_PLACEHOLDER.to_string();
        self.reactions.clear();
    }

    /// Per-emoji counts: palette emoji first in palette order, then any
    /// other emoji in codepoint order. Emoji with no reactions are omitted.
    pub fn reaction_tally(&self) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for emoji in self.reactions.values() {
            *counts.entry(emoji.as_str()).or_default() += 1;
        }

        let mut tally = Vec::with_capacity(counts.len());
        for emoji in REACTION_PALETTE {
            if let Some(n) = counts.remove(emoji) {
                tally.push((emoji.to_string(), n));
            }
        }
        tally.extend(counts.into_iter().map(|(e, n)| (e.to_string(), n)));
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chat_doc(data: serde_json::Value) -> Document {
        Document::new("u1_u2", data)
    }

    #[test]
    fn test_chat_decodes_and_validates() {
        let doc = chat_doc(json!({
            "users": ["u1", "u2"],
            "unreadCounts": {"u1": 0, "u2": 3},
            "typing": {"u1": true},
            "lastMessage": null,
            "createdAt": 1_000_000,
        }));
        let chat = Chat::from_document(&doc).unwrap();
        assert_eq!(chat.id.as_str(), "u1_u2");
        assert_eq!(chat.unread_for(&"u2".into()), 3);
        assert!(chat.is_typing(&"u1".into()));
        assert_eq!(chat.counterpart(&"u1".into()), Some(&"u2".into()));
        assert_eq!(chat.last_activity().timestamp(), 1);
    }

    #[test]
    fn test_chat_rejects_foreign_keys() {
        let doc = chat_doc(json!({
            "users": ["u1", "u2"],
            "unreadCounts": {"u3": 1},
            "createdAt": 0,
        }));
        assert!(matches!(
            Chat::from_document(&doc),
            Err(StoreError::Corrupt { .. })
        ));

        let lonely = chat_doc(json!({"users": ["u1"], "createdAt": 0}));
        assert!(Chat::from_document(&lonely).is_err());
    }

    #[test]
    fn test_message_wire_names() {
        let doc = Document::new(
            "m1",
            json!({
                "text": "hi",
                "senderId": "system",
                "createdAt": 5,
                "type": "system",
            }),
        );
        let msg = Message::from_document(&doc).unwrap();
        assert!(msg.is_system());
        assert!(!msg.edited);

        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(encoded["type"], json!("system"));
        assert_eq!(encoded["isDeleted"], json!(false));
        assert!(encoded.get("replyTo").is_none());
    }

    #[test]
    fn test_reaction_tally_palette_order() {
        let mut msg = Message::from_document(&Document::new(
            "m1",
            json!({"text": "x", "senderId": "u1", "createdAt": 0}),
        ))
        .unwrap();
        msg.reactions.insert("u1".into(), "🎉".into());
        msg.reactions.insert("u2".into(), "❤️".into());
        msg.reactions.insert("u3".into(), "👍".into());
        msg.reactions.insert("u4".into(), "❤️".into());

        let tally = msg.reaction_tally();
        assert_eq!(
            tally,
            vec![
                ("👍".to_string(), 1),
                ("❤️".to_string(), 2),
                ("🎉".to_string(), 1),
            ]
        );

        msg.tombstone();
        assert!(msg.reaction_tally().is_empty());
        assert_eq!(msg.text, DELETED_PLACEHOLDER);
    }

    #[test]
    fn test_profile_defaults() {
        let doc = Document::new(
            "u1",
            json!({"uid": "u1", "displayName": "Ada", "email": "ada@x.io"}),
        );
        let profile = UserProfile::from_document(&doc).unwrap();
        assert!(profile.pinned_chats.is_empty());
        assert!(profile.last_seen.is_none());
        assert_eq!(Preference::Archive.field(), "archivedChats");
    }
}
