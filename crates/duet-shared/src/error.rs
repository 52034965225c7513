use thiserror::Error;

/// Input rejected before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Message is too long ({len} characters, max {max})")]
    MessageTooLong { len: usize, max: usize },

    #[error("Display name must be at least {min} characters")]
    DisplayNameTooShort { min: usize },

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Password is required")]
    PasswordRequired,

    #[error("Passwords don't match")]
    PasswordMismatch,

    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("Cannot start a conversation with yourself")]
    SelfChat,
}

/// The moderation verdict could not be obtained.
#[derive(Error, Debug)]
pub enum ModerationError {
    #[error("Moderation service unavailable: {0}")]
    Unavailable(String),

    #[error("Moderation service returned an invalid verdict: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ModerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ModerationError::InvalidResponse(e.to_string())
        } else {
            ModerationError::Unavailable(e.to_string())
        }
    }
}

/// Which credential flow produced an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlow {
    SignUp,
    Login,
}

/// User-facing authentication failures, mapped from provider codes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password.")]
    InvalidCredential,

    #[error("This email is already registered.")]
    EmailAlreadyInUse,

    #[error("An error occurred during sign up.")]
    SignUpFailed,

    #[error("An error occurred during login.")]
    LoginFailed,
}

impl AuthError {
    /// Map a provider error code onto the small fixed set of messages the
    /// user is shown.
    pub fn from_code(code: &str, flow: AuthFlow) -> Self {
        match code {
            "auth/invalid-credential" => AuthError::InvalidCredential,
            "auth/email-already-in-use" => AuthError::EmailAlreadyInUse,
            _ => match flow {
                AuthFlow::SignUp => AuthError::SignUpFailed,
                AuthFlow::Login => AuthError::LoginFailed,
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Presence update failed: {0}")]
    Presence(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_code_mapping() {
        assert_eq!(
            AuthError::from_code("auth/invalid-credential", AuthFlow::Login),
            AuthError::InvalidCredential
        );
        assert_eq!(
            AuthError::from_code("auth/email-already-in-use", AuthFlow::SignUp),
            AuthError::EmailAlreadyInUse
        );
        assert_eq!(
            AuthError::from_code("auth/network-request-failed", AuthFlow::SignUp)
                .to_string(),
            "An error occurred during sign up."
        );
        assert_eq!(
            AuthError::from_code("auth/too-many-requests", AuthFlow::Login),
            AuthError::LoginFailed
        );
    }
}
