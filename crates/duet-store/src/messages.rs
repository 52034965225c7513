//! Message documents, scoped per chat under `chats/{chat}/messages`.
//!
//! Ordering is `createdAt` with the document id as tie-breaker. Pages are
//! returned newest first, exactly as the store delivers them; the sync
//! engine flips them into its ascending window.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use duet_shared::constants::DELETED_PLACEHOLDER;
use duet_shared::{ChatId, MessageId, UserId};

use crate::backend::{DocumentStore, Live};
use crate::document::{DocRef, Patch};
use crate::error::Result;
use crate::models::{Message, MessageKind, ReplyTo};
use crate::query::{Cursor, Direction, Query, Snapshot};

const ORDER_FIELD: &str = "createdAt";

/// A message about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub text: String,
    pub sender: UserId,
    pub kind: MessageKind,
    pub reply_to: Option<ReplyTo>,
}

impl NewMessage {
    pub fn user(sender: UserId, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender,
            kind: MessageKind::User,
            reply_to: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: UserId::system(),
            kind: MessageKind::System,
            reply_to: None,
        }
    }

    pub fn with_reply(mut self, reply_to: Option<ReplyTo>) -> Self {
        self.reply_to = reply_to;
        self
    }

    fn to_patch(&self) -> Result<Patch> {
        let mut patch = Patch::new()
            .set("text", self.text.as_str())
            .set("senderId", self.sender.as_str())
            .set("type", serde_json::to_value(self.kind)?)
            .set("reactions", json!({}))
            .set("edited", false)
            .set("isDeleted", false)
            .server_timestamp(ORDER_FIELD);
        if let Some(reply) = &self.reply_to {
            patch = patch.set("replyTo", serde_json::to_value(reply)?);
        }
        Ok(patch)
    }
}

/// Typed access to the per-chat message collections.
#[derive(Clone)]
pub struct MessageStore {
    backend: Arc<dyn DocumentStore>,
}

impl MessageStore {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self { backend }
    }

    fn collection(chat: &ChatId) -> String {
        format!("chats/{chat}/messages")
    }

    fn doc(chat: &ChatId, id: &MessageId) -> DocRef {
        DocRef::new(Self::collection(chat), id.as_str())
    }

    /// Position of `message` in the store's ordering.
    pub fn cursor(message: &Message) -> Cursor {
        Cursor::at(Value::from(message.created_at.timestamp_micros()), message.id.as_str())
    }

    /// Append a message. The store assigns both id and `createdAt`.
    pub async fn append(&self, chat: &ChatId, message: &NewMessage) -> Result<MessageId> {
        let id = self
            .backend
            .add(&Self::collection(chat), message.to_patch()?)
            .await?;
        debug!(chat = %chat, message = %id, "message appended");
        Ok(MessageId(id))
    }

    pub async fn append_system(&self, chat: &ChatId, text: &str) -> Result<MessageId> {
        self.append(chat, &NewMessage::system(text)).await
    }

    pub async fn get(&self, chat: &ChatId, id: &MessageId) -> Result<Option<Message>> {
        self.backend
            .get(&Self::doc(chat, id))
            .await?
            .map(|doc| Message::from_document(&doc))
            .transpose()
    }

    fn latest_query(chat: &ChatId, page: usize) -> Query {
        Query::collection(Self::collection(chat))
            .order_by(ORDER_FIELD, Direction::Descending)
            .limit(page)
    }

    /// Live view of the newest `page` messages, newest first.
    pub fn subscribe_latest(&self, chat: &ChatId, page: usize) -> Result<Live<Vec<Message>>> {
        let sub = self.backend.subscribe(Self::latest_query(chat, page))?;
        Ok(Live::new(sub, decode_page))
    }

    /// Up to `page` messages strictly older than `oldest`, newest first.
    pub async fn fetch_before(&self, chat: &ChatId, oldest: &Message, page: usize) -> Result<Vec<Message>> {
        let query = Self::latest_query(chat, page).start_after(Self::cursor(oldest));
        let docs = self.backend.query(&query).await?;
        decode_page(Snapshot::new(docs))
    }

    pub async fn update_text(&self, chat: &ChatId, id: &MessageId, text: &str) -> Result<()> {
        let patch = Patch::new().set("text", text).set("edited", true);
        self.backend.update(&Self::doc(chat, id), patch).await
    }

    /// Tombstone a message. The document itself is kept.
    pub async fn soft_delete(&self, chat: &ChatId, id: &MessageId) -> Result<()> {
        let patch = Patch::new()
            .set("isDeleted", true)
            .set("text", DELETED_PLACEHOLDER)
            .set("reactions", json!({}));
        self.backend.update(&Self::doc(chat, id), patch).await
    }

    /// Set or clear `uid`'s reaction. Other users' reactions are untouched.
    pub async fn set_reaction(
        &self,
        chat: &ChatId,
        id: &MessageId,
        uid: &UserId,
        emoji: Option<&str>,
    ) -> Result<()> {
        let path = format!("reactions.{uid}");
        let patch = match emoji {
            Some(emoji) => Patch::new().set(path, emoji),
            None => Patch::new().delete(path),
        };
        self.backend.update(&Self::doc(chat, id), patch).await
    }
}

fn decode_page(snapshot: Snapshot) -> Result<Vec<Message>> {
    Ok(snapshot
        .docs
        .iter()
        .filter_map(|doc| match Message::from_document(doc) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(message = %doc.id, error = %e, "skipping malformed message");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn chat() -> ChatId {
        ChatId("u1_u2".into())
    }

    fn store() -> MessageStore {
        MessageStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    async fn seed(messages: &MessageStore, n: usize) -> Vec<MessageId> {
        let mut ids = Vec::new();
        for i in 0..n {
            let msg = NewMessage::user("u1".into(), format!("m{i}"));
            ids.push(messages.append(&chat(), &msg).await.unwrap());
        }
        ids
    }

    #[tokio::test]
    async fn test_append_assigns_id_and_timestamp() {
        let messages = store();
        let id = messages.append_system(&chat(), "Conversation started").await.unwrap();
        let msg = messages.get(&chat(), &id).await.unwrap().unwrap();
        assert_eq!(msg.id, id);
        assert!(msg.is_system());
        assert!(msg.reactions.is_empty());
        assert!(msg.created_at.timestamp() > 0);
    }

    #[tokio::test]
    async fn test_pagination_round_trip() {
        let messages = store();
        seed(&messages, 7).await;

        let mut live = messages.subscribe_latest(&chat(), 3).unwrap();
        let newest = live.try_next().unwrap().unwrap();
        let texts: Vec<_> = newest.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m6", "m5", "m4"]);

        let older = messages
            .fetch_before(&chat(), newest.last().unwrap(), 3)
            .await
            .unwrap();
        let texts: Vec<_> = older.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m3", "m2", "m1"]);

        let oldest = messages
            .fetch_before(&chat(), older.last().unwrap(), 3)
            .await
            .unwrap();
        assert_eq!(oldest.len(), 1);
        assert_eq!(oldest[0].text, "m0");
    }

    #[tokio::test]
    async fn test_malformed_message_is_skipped() {
        let backend = Arc::new(Database::open_in_memory().unwrap());
        let messages = MessageStore::new(backend.clone());
        seed(&messages, 2).await;
        backend
            .add(
                &MessageStore::collection(&chat()),
                Patch::from_object(json!({"text": 5, "senderId": "u1", "createdAt": 10})),
            )
            .await
            .unwrap();

        let mut live = messages.subscribe_latest(&chat(), 5).unwrap();
        let page = live.try_next().unwrap().unwrap();
        let texts: Vec<_> = page.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m1", "m0"]);
    }

    #[tokio::test]
    async fn test_soft_delete_and_reactions() {
        let messages = store();
        let ids = seed(&messages, 1).await;
        let id = &ids[0];

        messages
            .set_reaction(&chat(), id, &"u1".into(), Some("❤️"))
            .await
            .unwrap();
        messages
            .set_reaction(&chat(), id, &"u2".into(), Some("👍"))
            .await
            .unwrap();
        messages.set_reaction(&chat(), id, &"u1".into(), None).await.unwrap();
        let msg = messages.get(&chat(), id).await.unwrap().unwrap();
        assert_eq!(msg.reactions.len(), 1);

        messages.update_text(&chat(), id, "fixed").await.unwrap();
        let msg = messages.get(&chat(), id).await.unwrap().unwrap();
        assert!(msg.edited);

        messages.soft_delete(&chat(), id).await.unwrap();
        let msg = messages.get(&chat(), id).await.unwrap().unwrap();
        assert!(msg.is_deleted);
        assert_eq!(msg.text, DELETED_PLACEHOLDER);
        assert!(msg.reactions.is_empty());
    }

    #[tokio::test]
    async fn test_reply_snapshot_is_stored() {
        let messages = store();
        let ids = seed(&messages, 1).await;
        let reply = ReplyTo {
            message_id: ids[0].clone(),
            sender_id: "u1".into(),
            text_preview: "m0".into(),
            sender_display_name: "Ada".into(),
        };
        let msg = NewMessage::user("u2".into(), "re").with_reply(Some(reply.clone()));
        let id = messages.append(&chat(), &msg).await.unwrap();
        let stored = messages.get(&chat(), &id).await.unwrap().unwrap();
        assert_eq!(stored.reply_to, Some(reply));
    }
}
