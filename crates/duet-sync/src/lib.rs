//! # duet-sync
//!
//! Client-side synchronization engine for two-party chats.
//!
//! A [`ChatSession`] keeps a live, consistent view of one conversation on top
//! of a document store that offers only per-document last-writer-wins writes
//! and push subscriptions. User actions are applied optimistically and
//! reconciled against later snapshots; the send path is a two-step write
//! whose partial failure is surfaced rather than hidden.

pub mod chat_list;
pub mod client;
pub mod config;
pub mod directory;
pub mod events;
pub mod grouping;
pub mod optimistic;
pub mod preferences;
pub mod presence;
pub mod profile;
pub mod session;
pub mod summary;
pub mod typing;
pub mod window;

mod error;

pub use chat_list::{ChatListFeed, ChatListItem, ChatListView};
pub use client::Client;
pub use config::SyncConfig;
pub use directory::Directory;
pub use error::{Result, SyncError};
pub use events::{Notice, NoticeSeverity, NoticeSink};
pub use optimistic::{MessageMutation, PendingLedger, PendingWrite, WriteId};
pub use presence::{ChatPresence, PresenceHandle, PresenceHeartbeat};
pub use profile::{Avatar, ProfileService};
pub use session::{ChatSession, SendOutcome, SessionContext, SessionState, SessionUpdate};
pub use summary::{LogOnlyRepair, SummaryRepair, SummaryState, SummaryView};
pub use typing::TypingDebouncer;
pub use window::MessageWindow;
