//! Optimistic message mutations.
//!
//! A mutation is applied to the local window at once and recorded in the
//! [`PendingLedger`] together with the message as it was before. Every
//! incoming snapshot of that message is then reconciled against the ledger:
//!
//! - the snapshot already reflects the mutation: the remote copy is used and
//!   the entry is retired once the write has also confirmed;
//! - the snapshot still shows the pre-mutation state (it predates the
//!   write): the mutation is re-applied on top so the view does not flicker;
//! - anything else is a conflicting remote change: the remote copy wins and
//!   a later failure of our write no longer rolls anything back.

use std::fmt;

use futures::future::BoxFuture;

use duet_shared::{MessageId, UserId};
use duet_store::Message;

/// Local identifier of one optimistic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriteId(u64);

impl fmt::Display for WriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Monotonic [`WriteId`] source.
#[derive(Debug, Default)]
pub struct WriteIds {
    next: u64,
}

impl WriteIds {
    pub fn next(&mut self) -> WriteId {
        self.next += 1;
        WriteId(self.next)
    }
}

/// An optimistic change whose backing write has not been awaited yet.
pub struct PendingWrite {
    pub id: WriteId,
    pub write: BoxFuture<'static, duet_store::Result<()>>,
}

impl fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWrite").field("id", &self.id).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageMutation {
    Edit { text: String },
    Delete,
    /// The acting user's reaction after the toggle (`None` = removed).
    React { uid: UserId, emoji: Option<String> },
}

impl MessageMutation {
    pub fn apply(&self, message: &mut Message) {
        match self {
            MessageMutation::Edit { text } => {
                message.text = text.clone();
                message.edited = true;
            }
            MessageMutation::Delete => message.tombstone(),
            MessageMutation::React { uid, emoji } => match emoji {
                Some(emoji) => {
                    message.reactions.insert(uid.clone(), emoji.clone());
                }
                None => {
                    message.reactions.remove(uid);
                }
            },
        }
    }

    /// Restore the fields this mutation touched.
    pub fn rollback(&self, message: &mut Message, before: &Message) {
        match self {
            MessageMutation::Edit { .. } => {
                message.text = before.text.clone();
                message.edited = before.edited;
            }
            MessageMutation::Delete => *message = before.clone(),
            MessageMutation::React { .. } => message.reactions = before.reactions.clone(),
        }
    }

    fn reflected_in(&self, message: &Message) -> bool {
        match self {
            MessageMutation::Edit { text } => {
                !message.is_deleted && message.edited && message.text == *text
            }
            MessageMutation::Delete => message.is_deleted,
            MessageMutation::React { uid, emoji } => {
                !message.is_deleted && message.reactions.get(uid) == emoji.as_ref()
            }
        }
    }

    fn unchanged_since(&self, message: &Message, before: &Message) -> bool {
        if message.is_deleted != before.is_deleted {
            return false;
        }
        match self {
            MessageMutation::Edit { .. } => {
                message.text == before.text && message.edited == before.edited
            }
            MessageMutation::Delete => true,
            MessageMutation::React { uid, .. } => message.reactions.get(uid) == before.reactions.get(uid),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            MessageMutation::Edit { .. } => "edit",
            MessageMutation::Delete => "delete",
            MessageMutation::React { .. } => "reaction",
        }
    }
}

#[derive(Debug, Clone)]
struct PendingOp {
    id: WriteId,
    message_id: MessageId,
    mutation: MessageMutation,
    before: Message,
    /// The write returned success.
    confirmed: bool,
    /// A snapshot already settled the outcome (reflected or conflicting).
    remote_settled: bool,
}

/// What to undo after a failed write.
#[derive(Debug, Clone)]
pub struct Rollback {
    pub message_id: MessageId,
    pub mutation: MessageMutation,
    pub before: Message,
}

impl Rollback {
    pub fn apply(&self, message: &mut Message) {
        self.mutation.rollback(message, &self.before);
    }
}

#[derive(Debug, Default)]
pub struct PendingLedger {
    ids: WriteIds,
    ops: Vec<PendingOp>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation already applied locally to a message that looked
    /// like `before`.
    pub fn begin(&mut self, mutation: MessageMutation, before: Message) -> WriteId {
        let id = self.ids.next();
        self.ops.push(PendingOp {
            id,
            message_id: before.id.clone(),
            mutation,
            before,
            confirmed: false,
            remote_settled: false,
        });
        id
    }

    pub fn is_pending(&self, id: WriteId) -> bool {
        self.ops.iter().any(|op| op.id == id)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Fold outstanding mutations into a fresh remote copy of a message.
    pub fn reconcile(&mut self, incoming: &mut Message) {
        for op in self.ops.iter_mut() {
            if op.message_id != incoming.id || op.remote_settled {
                continue;
            }
            if op.mutation.reflected_in(incoming) {
                op.remote_settled = true;
            } else if op.mutation.unchanged_since(incoming, &op.before) {
                op.mutation.apply(incoming);
            } else {
                tracing::debug!(
                    write = %op.id,
                    message = %op.message_id,
                    kind = op.mutation.describe(),
                    "remote change supersedes optimistic write"
                );
                op.remote_settled = true;
            }
        }
        self.ops.retain(|op| !(op.remote_settled && op.confirmed));
    }

    /// The write succeeded. The entry stays until a snapshot reflects it.
    pub fn confirm(&mut self, id: WriteId) {
        if let Some(op) = self.ops.iter_mut().find(|op| op.id == id) {
            op.confirmed = true;
        }
        self.ops.retain(|op| !(op.remote_settled && op.confirmed));
    }

    pub fn message_of(&self, id: WriteId) -> Option<&MessageId> {
        self.ops.iter().find(|op| op.id == id).map(|op| &op.message_id)
    }

    /// The write succeeded on a message no snapshot will cover again.
    pub fn retire(&mut self, id: WriteId) {
        self.ops.retain(|op| op.id != id);
    }

    /// Drop confirmed writes whose message `still_covered` rejects.
    pub fn retire_confirmed(&mut self, still_covered: impl Fn(&MessageId) -> bool) {
        self.ops.retain(|op| !op.confirmed || still_covered(&op.message_id));
    }

    /// The write failed. Returns what to undo, or `None` when a remote
    /// change already took precedence.
    pub fn fail(&mut self, id: WriteId) -> Option<Rollback> {
        let pos = self.ops.iter().position(|op| op.id == id)?;
        let op = self.ops.remove(pos);
        if op.remote_settled {
            return None;
        }
        Some(Rollback {
            message_id: op.message_id,
            mutation: op.mutation,
            before: op.before,
        })
    }
}
