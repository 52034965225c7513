//! # duet-shared
//!
//! Types shared by every Duet crate: identifiers, protocol constants, input
//! validation, the moderation gate and the identity/presence boundary.

pub mod constants;
pub mod error;
pub mod identity;
pub mod moderation;
pub mod types;
pub mod validation;

pub use error::{AuthError, AuthFlow, IdentityError, ModerationError, ValidationError};
pub use types::{ChatId, MessageId, UserId};
