use serde::{Deserialize, Serialize};

use crate::constants::{CHAT_ID_SEPARATOR, SYSTEM_SENDER};
use crate::error::ValidationError;

// Opaque, stable user id issued by the identity provider
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Sender id carried by system messages.
    pub fn system() -> Self {
        Self(SYSTEM_SENDER.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_SENDER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ids end up as map keys in dot-path updates and as halves of a chat
    /// id, so separators are not allowed inside them.
    pub fn check(&self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            return Err(ValidationError::InvalidUserId(self.0.clone()));
        }
        if self
            .0
            .chars()
            .any(|c| c == CHAT_ID_SEPARATOR || c == '.' || c == '/')
        {
            return Err(ValidationError::InvalidUserId(self.0.clone()));
        }
        if self.is_system() {
            return Err(ValidationError::InvalidUserId(self.0.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Deterministic id of the conversation between two users.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    /// Both clients compute the same id without a lookup: the two uids are
    /// sorted and joined, so there is at most one chat per unordered pair.
    pub fn for_pair(a: &UserId, b: &UserId) -> Result<Self, ValidationError> {
        a.check()?;
        b.check()?;
        if a == b {
            return Err(ValidationError::SelfChat);
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        Ok(Self(format!("{lo}{CHAT_ID_SEPARATOR}{hi}")))
    }

    /// Split the id back into its two participants.
    pub fn participants(&self) -> Option<(UserId, UserId)> {
        let (a, b) = self.0.split_once(CHAT_ID_SEPARATOR)?;
        if a.is_empty() || b.is_empty() || b.contains(CHAT_ID_SEPARATOR) {
            return None;
        }
        Some((UserId::new(a), UserId::new(b)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned message id, unique within its chat.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
