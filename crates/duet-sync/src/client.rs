//! Top-level client facade.
//!
//! [`Client`] wires the typed stores, the moderation gate and the identity
//! provider together and hands out per-chat sessions, the chat list and the
//! directory. It holds no per-chat state itself.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use duet_shared::identity::{AuthUser, IdentityProvider, PresenceAdapter};
use duet_shared::moderation::{HttpModerator, KeywordModerator, Moderator};
use duet_shared::{ChatId, IdentityError, UserId};
use duet_store::{BlobStore, ChatStore, DocumentStore, MessageStore, ProfileStore, UserProfile};

use crate::chat_list::ChatListFeed;
use crate::config::SyncConfig;
use crate::directory::Directory;
use crate::error::Result;
use crate::events::NoticeSink;
use crate::presence::{ChatPresence, PresenceHandle, PresenceHeartbeat};
use crate::profile::ProfileService;
use crate::session::{ChatSession, SessionContext};
use crate::summary::{LogOnlyRepair, SummaryRepair};

const MODERATION_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Client {
    config: SyncConfig,
    identity: Arc<dyn IdentityProvider>,
    profiles: ProfileStore,
    chats: ChatStore,
    messages: MessageStore,
    blobs: Arc<dyn BlobStore>,
    moderator: Arc<dyn Moderator>,
    repair: Arc<dyn SummaryRepair>,
    notices: NoticeSink,
    heartbeat: Option<PresenceHandle>,
}

impl Client {
    pub fn new(
        config: SyncConfig,
        backend: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let moderator: Arc<dyn Moderator> = match &config.moderation_url {
            Some(url) => {
                info!(url = %url, "using remote moderation");
                Arc::new(HttpModerator::new(url.clone(), MODERATION_TIMEOUT)?)
            }
            None => Arc::new(KeywordModerator::default()),
        };

        Ok(Self {
            config,
            identity,
            profiles: ProfileStore::new(backend.clone()),
            chats: ChatStore::new(backend.clone()),
            messages: MessageStore::new(backend),
            blobs,
            moderator,
            repair: Arc::new(LogOnlyRepair),
            notices: NoticeSink::discard(),
            heartbeat: None,
        })
    }

    pub fn with_moderator(mut self, moderator: Arc<dyn Moderator>) -> Self {
        self.moderator = moderator;
        self
    }

    pub fn with_repair(mut self, repair: Arc<dyn SummaryRepair>) -> Self {
        self.repair = repair;
        self
    }

    pub fn with_notices(mut self, notices: NoticeSink) -> Self {
        self.notices = notices;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn chats(&self) -> &ChatStore {
        &self.chats
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    /// The signed-in user.
    pub fn me(&self) -> Result<UserId> {
        self.identity
            .current_user()
            .map(|u| u.uid)
            .ok_or_else(|| IdentityError::NotSignedIn.into())
    }

    pub fn directory(&self) -> Directory {
        Directory::new(self.profiles.clone(), self.chats.clone(), self.messages.clone())
    }

    pub fn profile_service(&self) -> ProfileService {
        ProfileService::new(
            self.profiles.clone(),
            self.chats.clone(),
            self.blobs.clone(),
            self.notices.clone(),
        )
    }

    /// Create the profile document after sign-up.
    pub async fn register_profile(&self, user: &AuthUser) -> Result<UserProfile> {
        self.profile_service().register(user).await
    }

    pub fn session_context(&self) -> Result<SessionContext> {
        Ok(SessionContext {
            me: self.me()?,
            chats: self.chats.clone(),
            messages: self.messages.clone(),
            moderator: self.moderator.clone(),
            repair: self.repair.clone(),
            notices: self.notices.clone(),
            config: self.config.clone(),
        })
    }

    /// Create-or-get the conversation with `other` and open it.
    pub async fn open_chat(&self, other: &UserId) -> Result<ChatSession> {
        let me = self.me()?;
        let chat_id = self.directory().open_chat(&me, other).await?;
        self.open_session(chat_id)
    }

    pub fn open_session(&self, chat_id: ChatId) -> Result<ChatSession> {
        ChatSession::open(self.session_context()?, chat_id)
    }

    fn presence(&self) -> ChatPresence {
        ChatPresence::new(self.profiles.clone(), self.chats.clone())
    }

    pub fn chat_list(&self) -> Result<ChatListFeed> {
        ChatListFeed::open(self.me()?, &self.chats, self.profiles.clone(), self.notices.clone())
    }

    /// Start the presence heartbeat for the signed-in user. Idempotent.
    pub fn start_presence(&mut self) -> Result<()> {
        if self.heartbeat.is_some() {
            return Ok(());
        }
        let adapter: Arc<dyn PresenceAdapter> = Arc::new(self.presence());
        self.heartbeat = Some(PresenceHeartbeat::start(adapter, self.me()?, self.config.heartbeat));
        Ok(())
    }

    pub fn visibility_regained(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.visibility_regained();
        }
    }

    /// Publish offline, then clear the identity.
    pub async fn sign_out(&mut self) {
        match self.heartbeat.take() {
            Some(heartbeat) => heartbeat.stop().await,
            None => {
                if let Ok(me) = self.me() {
                    if let Err(e) = self.presence().set_presence(&me, false).await {
                        warn!(uid = %me, error = %e, "failed to publish offline presence");
                    }
                }
            }
        }
        self.identity.sign_out();
    }
}
