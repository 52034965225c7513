//! Identity & presence boundary.
//!
//! Authentication itself lives outside Duet. The sync engine only needs to
//! know who is signed in, to be told when that changes, and to publish the
//! user's online state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::error::IdentityError;
use crate::types::UserId;

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: UserId,
    pub display_name: String,
    pub email: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
}

pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;

    /// Every change of the signed-in user, starting with the current value.
    fn observe_auth_state(&self) -> watch::Receiver<Option<AuthUser>>;

    fn sign_out(&self);
}

/// Publishes `isOnline` / `lastSeen` for a user.
#[async_trait]
pub trait PresenceAdapter: Send + Sync {
    async fn set_presence(&self, uid: &UserId, is_online: bool) -> Result<(), IdentityError>;
}

/// In-process identity holder, driven by whatever performed the sign-in.
pub struct LocalIdentity {
    tx: watch::Sender<Option<AuthUser>>,
}

impl LocalIdentity {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn signed_in(user: AuthUser) -> Self {
        let identity = Self::new();
        identity.sign_in(user);
        identity
    }

    pub fn sign_in(&self, user: AuthUser) {
        info!(uid = %user.uid, "user signed in");
        self.tx.send_replace(Some(user));
    }
}

impl Default for LocalIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for LocalIdentity {
    fn current_user(&self) -> Option<AuthUser> {
        self.tx.borrow().clone()
    }

    fn observe_auth_state(&self) -> watch::Receiver<Option<AuthUser>> {
        self.tx.subscribe()
    }

    fn sign_out(&self) {
        if let Some(prev) = self.tx.send_replace(None) {
            info!(uid = %prev.uid, "user signed out");
        }
    }
}
