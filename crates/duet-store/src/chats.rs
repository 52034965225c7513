//! Chat summary documents.
//!
//! Every write to a shared chat is a map-scoped partial update that touches
//! only the acting user's keys, so the two participants never overwrite each
//! other's unread counters or typing flags.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use duet_shared::{ChatId, UserId};

use crate::backend::{DocumentStore, Live};
use crate::document::{DocRef, Patch};
use crate::error::{Result, StoreError};
use crate::models::{Chat, ParticipantDetails};
use crate::query::{Filter, Query, Snapshot};

const COLLECTION: &str = "chats";

/// Everything needed to create a chat document.
#[derive(Debug, Clone)]
pub struct NewChat {
    pub id: ChatId,
    pub users: [UserId; 2],
    pub details: BTreeMap<UserId, ParticipantDetails>,
}

/// Typed access to the `chats` collection.
#[derive(Clone)]
pub struct ChatStore {
    backend: Arc<dyn DocumentStore>,
}

impl ChatStore {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self { backend }
    }

    fn doc(chat: &ChatId) -> DocRef {
        DocRef::new(COLLECTION, chat.as_str())
    }

    pub async fn get(&self, chat: &ChatId) -> Result<Option<Chat>> {
        self.backend
            .get(&Self::doc(chat))
            .await?
            .map(|doc| Chat::from_document(&doc))
            .transpose()
    }

    /// Create the chat if it does not exist yet. Returns `true` when this
    /// call created it.
    pub async fn create(&self, new: &NewChat) -> Result<bool> {
        let [a, b] = &new.users;
        let patch = Patch::new()
            .set("users", json!([a, b]))
            .set("userDetails", serde_json::to_value(&new.details)?)
            .set("lastMessage", Value::Null)
            .set("unreadCounts", json!({ a.as_str(): 0, b.as_str(): 0 }))
            .set("typing", json!({ a.as_str(): false, b.as_str(): false }))
            .server_timestamp("createdAt");

        match self.backend.create(&Self::doc(&new.id), patch).await {
            Ok(()) => {
                debug!(chat = %new.id, "chat created");
                Ok(true)
            }
            Err(StoreError::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Mirror a freshly sent message onto the summary and bump the
    /// counterpart's unread counter.
    pub async fn record_last_message(
        &self,
        chat: &ChatId,
        sender: &UserId,
        counterpart: &UserId,
        text: &str,
    ) -> Result<()> {
        let patch = Patch::new()
            .set(
                "lastMessage",
                json!({ "text": text, "senderId": sender, "readBy": [sender] }),
            )
            .server_timestamp("lastMessage.createdAt")
            .increment(format!("unreadCounts.{counterpart}"), 1);
        self.backend.update(&Self::doc(chat), patch).await
    }

    pub async fn mark_read(&self, chat: &ChatId, uid: &UserId) -> Result<()> {
        let patch = Patch::new().array_union("lastMessage.readBy", vec![Value::from(uid.as_str())]);
        self.backend.update(&Self::doc(chat), patch).await
    }

    pub async fn reset_unread(&self, chat: &ChatId, uid: &UserId) -> Result<()> {
        let patch = Patch::new().set(format!("unreadCounts.{uid}"), 0);
        self.backend.update(&Self::doc(chat), patch).await
    }

    pub async fn set_typing(&self, chat: &ChatId, uid: &UserId, typing: bool) -> Result<()> {
        let patch = Patch::new().set(format!("typing.{uid}"), typing);
        self.backend.update(&Self::doc(chat), patch).await
    }

    pub async fn set_participant_details(
        &self,
        chat: &ChatId,
        uid: &UserId,
        details: &ParticipantDetails,
    ) -> Result<()> {
        let patch = Patch::new().set(format!("userDetails.{uid}"), serde_json::to_value(details)?);
        self.backend.update(&Self::doc(chat), patch).await
    }

    /// Mirror a participant's presence into `userDetails.{uid}`. Only that
    /// user's keys are touched.
    pub async fn set_participant_presence(&self, chat: &ChatId, uid: &UserId, is_online: bool) -> Result<()> {
        let patch = Patch::new()
            .set(format!("userDetails.{uid}.isOnline"), is_online)
            .server_timestamp(format!("userDetails.{uid}.lastSeen"));
        self.backend.update(&Self::doc(chat), patch).await
    }

    /// Live view of one chat. `None` while the chat does not exist.
    pub fn subscribe(&self, chat: &ChatId) -> Result<Live<Option<Chat>>> {
        let sub = self.backend.subscribe_doc(&Self::doc(chat))?;
        Ok(Live::new(sub, decode_one))
    }

    /// Live view of every chat `uid` participates in.
    pub fn subscribe_for_user(&self, uid: &UserId) -> Result<Live<Vec<Chat>>> {
        let sub = self.backend.subscribe(Self::member_query(uid))?;
        Ok(Live::new(sub, decode_all))
    }

    pub async fn list_for_user(&self, uid: &UserId) -> Result<Vec<Chat>> {
        let docs = self.backend.query(&Self::member_query(uid)).await?;
        decode_all(Snapshot::new(docs))
    }

    fn member_query(uid: &UserId) -> Query {
        Query::collection(COLLECTION).filter(Filter::ArrayContains("users".into(), Value::from(uid.as_str())))
    }
}

fn decode_one(snapshot: Snapshot) -> Result<Option<Chat>> {
    snapshot.docs.first().map(Chat::from_document).transpose()
}

// A malformed chat is dropped from the list rather than failing it.
fn decode_all(snapshot: Snapshot) -> Result<Vec<Chat>> {
    Ok(snapshot
        .docs
        .iter()
        .filter_map(|doc| match Chat::from_document(doc) {
            Ok(chat) => Some(chat),
            Err(e) => {
                warn!(chat = %doc.id, error = %e, "skipping malformed chat");
                None
            }
        })
        .collect())
}
