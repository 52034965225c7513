use thiserror::Error;

use duet_shared::{IdentityError, MessageId, ModerationError, UserId, ValidationError};
use duet_store::StoreError;

/// Errors surfaced by the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Input rejected before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The moderation gate rejected the text. The draft is kept.
    #[error("Message blocked: {reason}")]
    Blocked { reason: String },

    /// The moderation verdict could not be obtained, so nothing was sent.
    #[error(transparent)]
    Moderation(#[from] ModerationError),

    /// A write backing a user action failed; local state was rolled back.
    #[error("Store write failed: {0}")]
    StoreWrite(#[source] StoreError),

    /// A read or subscription failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Message not loaded: {0}")]
    MessageNotFound(MessageId),

    #[error("Only the author can change this message")]
    NotAuthor,

    #[error("Message was deleted")]
    MessageDeleted,

    #[error("System messages cannot be changed")]
    SystemMessage,

    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    #[error("Not a participant of this chat")]
    NotMember,

    #[error("Chat session is closed")]
    SessionClosed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
