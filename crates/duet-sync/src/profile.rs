//! Profile registration and editing.

use std::sync::Arc;

use tracing::{debug, warn};

use duet_shared::identity::AuthUser;
use duet_shared::validation::validate_display_name;
use duet_shared::UserId;
use duet_store::{BlobStore, ChatStore, ParticipantDetails, ProfileStore, StoreError, UserProfile};

use crate::error::{Result, SyncError};
use crate::events::NoticeSink;

/// A new avatar image chosen by the user.
#[derive(Debug, Clone)]
pub struct Avatar {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct ProfileService {
    profiles: ProfileStore,
    chats: ChatStore,
    blobs: Arc<dyn BlobStore>,
    notices: NoticeSink,
}

impl ProfileService {
    pub fn new(
        profiles: ProfileStore,
        chats: ChatStore,
        blobs: Arc<dyn BlobStore>,
        notices: NoticeSink,
    ) -> Self {
        Self {
            profiles,
            chats,
            blobs,
            notices,
        }
    }

    /// Create the profile document for a freshly authenticated user.
    /// Registering twice returns the existing profile.
    pub async fn register(&self, user: &AuthUser) -> Result<UserProfile> {
        user.uid.check()?;
        let profile = UserProfile {
            uid: user.uid.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            photo_url: Some(user.photo_url.clone()).filter(|url| !url.is_empty()),
            is_online: true,
            last_seen: None,
            pinned_chats: Default::default(),
            muted_chats: Default::default(),
            archived_chats: Default::default(),
        };

        match self.profiles.create(&profile).await {
            Ok(()) | Err(StoreError::AlreadyExists(_)) => {}
            Err(e) => return Err(SyncError::StoreWrite(e)),
        }
        self.profiles
            .get(&profile.uid)
            .await?
            .ok_or_else(|| SyncError::UnknownUser(profile.uid.clone()))
    }

    /// Rename and optionally replace the avatar, then refresh the copy of
    /// the profile denormalised onto each of the user's chats.
    pub async fn update(&self, me: &UserId, display_name: &str, avatar: Option<Avatar>) -> Result<UserProfile> {
        let display_name = display_name.trim();
        validate_display_name(display_name)?;

        let photo_url = match avatar {
            Some(avatar) => Some(self.upload_avatar(me, &avatar).await?),
            None => None,
        };

        if let Err(e) = self
            .profiles
            .update_profile(me, display_name, photo_url.as_deref())
            .await
        {
            self.notices.transient("Could not update your profile.");
            return Err(SyncError::StoreWrite(e));
        }

        let profile = self
            .profiles
            .get(me)
            .await?
            .ok_or_else(|| SyncError::UnknownUser(me.clone()))?;
        self.refresh_chat_details(&profile).await;
        Ok(profile)
    }

    async fn upload_avatar(&self, me: &UserId, avatar: &Avatar) -> Result<String> {
        let file_name = avatar
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let path = format!("avatars/{me}/{file_name}");
        match self.blobs.upload(&path, &avatar.bytes).await {
            Ok(url) => {
                debug!(uid = %me, url = %url, "avatar uploaded");
                Ok(url)
            }
            Err(e) => {
                self.notices.transient("Could not upload your picture.");
                Err(SyncError::StoreWrite(e))
            }
        }
    }

    // Best-effort: a chat left with old details is corrected on the next
    // profile update.
    async fn refresh_chat_details(&self, profile: &UserProfile) {
        let chats = match self.chats.list_for_user(&profile.uid).await {
            Ok(chats) => chats,
            Err(e) => {
                warn!(uid = %profile.uid, error = %e, "failed to list chats for profile refresh");
                return;
            }
        };
        let details = ParticipantDetails::from(profile);
        for chat in chats {
            if let Err(e) = self
                .chats
                .set_participant_details(&chat.id, &profile.uid, &details)
                .await
            {
                warn!(chat = %chat.id, error = %e, "failed to refresh participant details");
            }
        }
    }
}
