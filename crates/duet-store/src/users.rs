//! Profile documents: CRUD, preference sets and presence.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use duet_shared::identity::PresenceAdapter;
use duet_shared::{ChatId, IdentityError, UserId};

use crate::backend::{DocumentStore, Live};
use crate::document::{DocRef, Patch};
use crate::error::Result;
use crate::models::{Preference, UserProfile};
use crate::query::{Direction, Query, Snapshot};

const COLLECTION: &str = "users";

/// Typed access to the `users` collection.
#[derive(Clone)]
pub struct ProfileStore {
    backend: Arc<dyn DocumentStore>,
}

impl ProfileStore {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self { backend }
    }

    fn doc(uid: &UserId) -> DocRef {
        DocRef::new(COLLECTION, uid.as_str())
    }

    /// Create the profile document. `lastSeen` is taken from the store clock.
    pub async fn create(&self, profile: &UserProfile) -> Result<()> {
        let patch = Patch::from_object(serde_json::to_value(profile)?).server_timestamp("lastSeen");
        self.backend.create(&Self::doc(&profile.uid), patch).await?;
        debug!(uid = %profile.uid, "profile created");
        Ok(())
    }

    pub async fn get(&self, uid: &UserId) -> Result<Option<UserProfile>> {
        self.backend
            .get(&Self::doc(uid))
            .await?
            .map(|doc| UserProfile::from_document(&doc))
            .transpose()
    }

    /// Every profile, ordered by display name.
    pub async fn list(&self) -> Result<Vec<UserProfile>> {
        let query = Query::collection(COLLECTION).order_by("displayName", Direction::Ascending);
        self.backend
            .query(&query)
            .await?
            .iter()
            .map(UserProfile::from_document)
            .collect()
    }

    pub async fn update_profile(
        &self,
        uid: &UserId,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> Result<()> {
        let mut patch = Patch::new().set("displayName", display_name);
        if let Some(url) = photo_url {
            patch = patch.set("photoURL", url);
        }
        self.backend.update(&Self::doc(uid), patch).await
    }

    /// Add `chat` to one of the user's preference sets. Idempotent.
    pub async fn add_preference(&self, uid: &UserId, preference: Preference, chat: &ChatId) -> Result<()> {
        let patch = Patch::new().array_union(preference.field(), vec![Value::from(chat.as_str())]);
        self.backend.update(&Self::doc(uid), patch).await
    }

    /// Remove `chat` from one of the user's preference sets. Idempotent.
    pub async fn remove_preference(
        &self,
        uid: &UserId,
        preference: Preference,
        chat: &ChatId,
    ) -> Result<()> {
        let patch = Patch::new().array_remove(preference.field(), vec![Value::from(chat.as_str())]);
        self.backend.update(&Self::doc(uid), patch).await
    }

    /// Live view of one profile. `None` while the document does not exist.
    pub fn subscribe(&self, uid: &UserId) -> Result<Live<Option<UserProfile>>> {
        let sub = self.backend.subscribe_doc(&Self::doc(uid))?;
        Ok(Live::new(sub, decode_profile))
    }
}

fn decode_profile(snapshot: Snapshot) -> Result<Option<UserProfile>> {
    snapshot.docs.first().map(UserProfile::from_document).transpose()
}

#[async_trait]
impl PresenceAdapter for ProfileStore {
    async fn set_presence(&self, uid: &UserId, is_online: bool) -> std::result::Result<(), IdentityError> {
        let patch = Patch::new()
            .set("isOnline", is_online)
            .server_timestamp("lastSeen");
        self.backend
            .update(&Self::doc(uid), patch)
            .await
            .map_err(|e| IdentityError::Presence(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    pub(crate) fn profile(uid: &str, name: &str) -> UserProfile {
        UserProfile {
            uid: uid.into(),
            display_name: name.into(),
            email: format!("{uid}@duet.test"),
            photo_url: None,
            is_online: true,
            last_seen: None,
            pinned_chats: Default::default(),
            muted_chats: Default::default(),
            archived_chats: Default::default(),
        }
    }

    fn store() -> ProfileStore {
        ProfileStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_create_and_list_sorted() {
        let profiles = store();
        profiles.create(&profile("u2", "Zed")).await.unwrap();
        profiles.create(&profile("u1", "Ada")).await.unwrap();

        let names: Vec<_> = profiles
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.display_name)
            .collect();
        assert_eq!(names, vec!["Ada", "Zed"]);

        let ada = profiles.get(&"u1".into()).await.unwrap().unwrap();
        assert!(ada.last_seen.is_some());
    }

    #[tokio::test]
    async fn test_preferences_are_idempotent() {
        let profiles = store();
        let uid: UserId = "u1".into();
        let chat = ChatId("u1_u2".into());
        profiles.create(&profile("u1", "Ada")).await.unwrap();

        profiles.add_preference(&uid, Preference::Pin, &chat).await.unwrap();
        profiles.add_preference(&uid, Preference::Pin, &chat).await.unwrap();
        let p = profiles.get(&uid).await.unwrap().unwrap();
        assert_eq!(p.pinned_chats.len(), 1);

        profiles.remove_preference(&uid, Preference::Pin, &chat).await.unwrap();
        profiles.remove_preference(&uid, Preference::Pin, &chat).await.unwrap();
        let p = profiles.get(&uid).await.unwrap().unwrap();
        assert!(p.pinned_chats.is_empty());
    }

    #[tokio::test]
    async fn test_presence_updates_last_seen() {
        let profiles = store();
        let uid: UserId = "u1".into();
        profiles.create(&profile("u1", "Ada")).await.unwrap();
        let before = profiles.get(&uid).await.unwrap().unwrap().last_seen;

        profiles.set_presence(&uid, false).await.unwrap();
        let after = profiles.get(&uid).await.unwrap().unwrap();
        assert!(!after.is_online);
        assert!(after.last_seen > before);

        let missing = profiles.set_presence(&"ghost".into(), true).await;
        assert!(matches!(missing, Err(IdentityError::Presence(_))));
    }

    #[tokio::test]
    async fn test_subscribe_follows_profile() {
        let profiles = store();
        let uid: UserId = "u1".into();
        let mut live = profiles.subscribe(&uid).unwrap();
        assert_eq!(live.try_next().unwrap().unwrap(), None);

        profiles.create(&profile("u1", "Ada")).await.unwrap();
        let seen = live.try_next().unwrap().unwrap().unwrap();
        assert_eq!(seen.display_name, "Ada");
    }
}
