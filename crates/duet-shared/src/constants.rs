use std::time::Duration;

/// Application name
pub const APP_NAME: &str = "Duet";

/// Maximum message length in characters
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Messages per live page and per backfill page
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Characters kept in a reply preview
pub const REPLY_PREVIEW_CHARS: usize = 100;

/// Typing indicator coalescing window
pub const TYPING_WINDOW: Duration = Duration::from_secs(3);

/// Presence heartbeat interval
pub const PRESENCE_HEARTBEAT: Duration = Duration::from_secs(120);

/// Consecutive messages closer than this are rendered as one group
pub const GROUPING_GAP_SECS: i64 = 180;

/// Text that replaces the body of a deleted message
pub const DELETED_PLACEHOLDER: &str = "This message was deleted.";

/// Body of the system message appended when a chat is created
pub const CONVERSATION_STARTED: &str = "Conversation started";

/// Sender id used for system messages
pub const SYSTEM_SENDER: &str = "system";

/// Moderation reason reported for clean text
pub const NO_VIOLATION: &str = "No violation";

/// Separator between the two uids of a chat id
pub const CHAT_ID_SEPARATOR: char = '_';

/// Minimum display name length
pub const MIN_DISPLAY_NAME_CHARS: usize = 3;

/// Minimum password length at sign-up
pub const MIN_PASSWORD_CHARS: usize = 6;

/// Reaction palette, in display order
pub const REACTION_PALETTE: [&str; 4] = ["👍", "❤️", "😂", "😮"];

/// Preview shown for a chat without messages
pub const EMPTY_CHAT_PREVIEW: &str = "No messages yet";
