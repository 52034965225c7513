//! # duet-store
//!
//! Document-store contract consumed by the Duet sync engine, plus the typed
//! stores built on it (profiles, chat summaries, messages) and an embedded
//! SQLite backend that satisfies the contract.
//!
//! The contract is deliberately small: point reads, create / add / partial
//! update with per-field last-writer-wins, one-shot queries and live query
//! subscriptions. Nothing spans more than one document, so there are no
//! transactions.

pub mod backend;
pub mod blobs;
pub mod chats;
pub mod database;
pub mod document;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod query;
pub mod users;

mod error;

pub use backend::{DocumentStore, Live, SnapshotSender, Subscription};
pub use blobs::{BlobStore, FsBlobStore};
pub use chats::{ChatStore, NewChat};
pub use database::Database;
pub use document::{DocRef, Document, FieldOp, Patch};
pub use error::{Result, StoreError};
pub use messages::{MessageStore, NewMessage};
pub use models::*;
pub use query::{Cursor, Direction, Filter, Query, Snapshot};
pub use users::ProfileStore;
