//! One open conversation.
//!
//! A [`ChatSession`] owns exactly two live subscriptions (the chat summary
//! and the newest message page), the merged [`MessageWindow`], the ledger of
//! optimistic writes, the typing debouncer, the draft and the reply target.
//! Everything is dropped with the session; nothing here is global.

use std::sync::Arc;

use futures::FutureExt;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use duet_shared::constants::REPLY_PREVIEW_CHARS;
use duet_shared::moderation::Moderator;
use duet_shared::validation::{truncate_chars, validate_message_text};
use duet_shared::{ChatId, MessageId, UserId};
use duet_store::{Chat, ChatStore, Live, Message, MessageStore, NewMessage, ReplyTo};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::events::NoticeSink;
use crate::grouping;
use crate::optimistic::{MessageMutation, PendingLedger, PendingWrite, WriteId};
use crate::summary::{SummaryRepair, SummaryState, SummaryView};
use crate::typing::TypingDebouncer;
use crate::window::MessageWindow;

/// Everything a session needs from the outside, passed explicitly.
#[derive(Clone)]
pub struct SessionContext {
    pub me: UserId,
    pub chats: ChatStore,
    pub messages: MessageStore,
    pub moderator: Arc<dyn Moderator>,
    pub repair: Arc<dyn SummaryRepair>,
    pub notices: NoticeSink,
    pub config: SyncConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first message snapshot.
    Loading,
    Ready,
    Closed,
}

/// What changed as a result of [`ChatSession::next_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    Summary,
    Messages,
    /// A trailing typing emission went out.
    Typing(bool),
    /// A subscription reported an error; last-known state is kept.
    SubscriptionError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub message_id: MessageId,
    pub summary: SummaryState,
}

#[derive(Debug, Clone, Copy)]
enum Feed {
    Summary,
    Messages,
}

enum Incoming {
    Chat(Option<duet_store::Result<Option<Chat>>>),
    Messages(Option<duet_store::Result<Vec<Message>>>),
    TypingDue,
}

pub struct ChatSession {
    ctx: SessionContext,
    chat_id: ChatId,
    counterpart: UserId,
    state: SessionState,

    chat_live: Live<Option<Chat>>,
    messages_live: Live<Vec<Message>>,
    chat_open: bool,
    messages_open: bool,
    chat_failed: bool,
    messages_failed: bool,

    chat: Option<Chat>,
    window: MessageWindow,
    ledger: PendingLedger,
    typing: TypingDebouncer,
    draft: String,
    reply_target: Option<MessageId>,
}

impl ChatSession {
    /// Open both subscriptions. The session starts in `Loading`; queued
    /// snapshots are applied by [`ChatSession::sync_pending`] or
    /// [`ChatSession::next_event`].
    pub fn open(ctx: SessionContext, chat_id: ChatId) -> Result<Self> {
        let (a, b) = chat_id.participants().ok_or(SyncError::NotMember)?;
        let counterpart = if a == ctx.me {
            b
        } else if b == ctx.me {
            a
        } else {
            return Err(SyncError::NotMember);
        };

        let chat_live = ctx.chats.subscribe(&chat_id)?;
        let messages_live = ctx.messages.subscribe_latest(&chat_id, ctx.config.page_size)?;

        info!(chat = %chat_id, uid = %ctx.me, "chat session opened");

        Ok(Self {
            window: MessageWindow::new(ctx.config.page_size),
            typing: TypingDebouncer::new(ctx.config.typing_window),
            ctx,
            chat_id,
            counterpart,
            state: SessionState::Loading,
            chat_live,
            messages_live,
            chat_open: true,
            messages_open: true,
            chat_failed: false,
            messages_failed: false,
            chat: None,
            ledger: PendingLedger::new(),
            draft: String::new(),
            reply_target: None,
        })
    }

    // -- View -----------------------------------------------------------

    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    pub fn counterpart(&self) -> &UserId {
        &self.counterpart
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn chat(&self) -> Option<&Chat> {
        self.chat.as_ref()
    }

    pub fn summary(&self) -> Option<SummaryView> {
        self.chat.as_ref().map(|c| SummaryView::derive(c, &self.ctx.me))
    }

    /// Loaded messages, ascending.
    pub fn messages(&self) -> Vec<Message> {
        self.window.to_vec()
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.window.get(id)
    }

    pub fn has_more_older(&self) -> bool {
        self.window.has_more_older()
    }

    /// Per loaded message, whether it starts a new visual group.
    pub fn group_starts(&self) -> Vec<bool> {
        grouping::group_starts(&self.window.to_vec())
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn pending_writes(&self) -> usize {
        self.ledger.len()
    }

    // -- Snapshots ------------------------------------------------------

    /// Apply every snapshot already queued, without waiting. Returns how
    /// many were applied.
    pub async fn sync_pending(&mut self) -> usize {
        let mut applied = 0;
        let mut summary_changed = false;

        loop {
            let mut progressed = false;

            if self.chat_open {
                if let Some(result) = self.chat_live.try_next() {
                    summary_changed |= self.apply_chat(result) == SessionUpdate::Summary;
                    progressed = true;
                    applied += 1;
                }
            }
            if self.messages_open {
                if let Some(result) = self.messages_live.try_next() {
                    self.apply_messages(result);
                    progressed = true;
                    applied += 1;
                }
            }

            if !progressed {
                break;
            }
        }

        if summary_changed {
            self.track_read().await;
        }
        applied
    }

    /// Wait for the next snapshot or for a due typing emission.
    /// Returns `None` once the session is closed.
    pub async fn next_event(&mut self) -> Option<SessionUpdate> {
        loop {
            if self.state == SessionState::Closed {
                return None;
            }

            let deadline = self.typing.deadline();
            let incoming = tokio::select! {
                chat = self.chat_live.next(), if self.chat_open => Incoming::Chat(chat),
                page = self.messages_live.next(), if self.messages_open => Incoming::Messages(page),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Incoming::TypingDue,
                else => return None,
            };

            match incoming {
                Incoming::Chat(Some(result)) => {
                    let update = self.apply_chat(result);
                    if update == SessionUpdate::Summary {
                        self.track_read().await;
                    }
                    return Some(update);
                }
                Incoming::Chat(None) => self.chat_open = false,
                Incoming::Messages(Some(result)) => return Some(self.apply_messages(result)),
                Incoming::Messages(None) => self.messages_open = false,
                Incoming::TypingDue => {
                    if let Some(typing) = self.poll_typing().await {
                        return Some(SessionUpdate::Typing(typing));
                    }
                }
            }
        }
    }

    fn apply_chat(&mut self, result: duet_store::Result<Option<Chat>>) -> SessionUpdate {
        match result {
            Ok(chat) => {
                self.chat = chat;
                SessionUpdate::Summary
            }
            Err(e) => self.subscription_failed(Feed::Summary, e),
        }
    }

    fn apply_messages(&mut self, result: duet_store::Result<Vec<Message>>) -> SessionUpdate {
        match result {
            Ok(mut page) => {
                for message in page.iter_mut() {
                    self.ledger.reconcile(message);
                }
                self.window.apply_latest(page);
                let window = &self.window;
                self.ledger.retire_confirmed(|m| window.is_live(m));
                if self.state == SessionState::Loading {
                    self.state = SessionState::Ready;
                    debug!(chat = %self.chat_id, loaded = self.window.len(), "message view ready");
                }
                SessionUpdate::Messages
            }
            Err(e) => self.subscription_failed(Feed::Messages, e),
        }
    }

    fn subscription_failed(&mut self, feed: Feed, error: duet_store::StoreError) -> SessionUpdate {
        warn!(chat = %self.chat_id, ?feed, error = %error, "live subscription failed");
        let reported = match feed {
            Feed::Summary => &mut self.chat_failed,
            Feed::Messages => &mut self.messages_failed,
        };
        if !*reported {
            *reported = true;
            self.ctx
                .notices
                .persistent("Connection problem. Showing the last known messages.");
        }
        SessionUpdate::SubscriptionError
    }

    /// Read receipt and unread reset for the current user. Best-effort.
    async fn track_read(&self) {
        if self.state == SessionState::Closed {
            return;
        }
        let Some(chat) = &self.chat else {
            return;
        };
        let me = &self.ctx.me;
        let needs_receipt = chat
            .last_message
            .as_ref()
            .is_some_and(|m| !m.read_by.contains(me));
        let needs_reset = chat.unread_for(me) != 0;

        if needs_receipt {
            if let Err(e) = self.ctx.chats.mark_read(&self.chat_id, me).await {
                warn!(chat = %self.chat_id, error = %e, "failed to record read receipt");
            }
        }
        if needs_reset {
            if let Err(e) = self.ctx.chats.reset_unread(&self.chat_id, me).await {
                warn!(chat = %self.chat_id, error = %e, "failed to reset unread counter");
            }
        }
    }

    /// Fetch the page before the oldest loaded message. No-op when
    /// everything is loaded.
    pub async fn load_older(&mut self) -> Result<usize> {
        self.ensure_open()?;
        if !self.window.has_more_older() {
            return Ok(0);
        }
        let Some(oldest) = self.window.oldest().cloned() else {
            return Ok(0);
        };

        let mut page = self
            .ctx
            .messages
            .fetch_before(&self.chat_id, &oldest, self.window.page_size())
            .await?;
        for message in page.iter_mut() {
            self.ledger.reconcile(message);
        }
        let added = self.window.apply_older(page);
        debug!(chat = %self.chat_id, added, more = self.window.has_more_older(), "backfilled");
        Ok(added)
    }

    // -- Typing ---------------------------------------------------------

    /// Store the draft and drive the typing indicator.
    pub async fn set_draft(&mut self, text: impl Into<String>) -> Option<bool> {
        if self.state == SessionState::Closed {
            return None;
        }
        self.draft = text.into();
        let emit = self.typing.on_input(Instant::now());
        if let Some(typing) = emit {
            self.write_typing(typing).await;
        }
        emit
    }

    pub async fn focus(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let typing = self.typing.focus(Instant::now());
        self.write_typing(typing).await;
    }

    pub async fn blur(&mut self) {
        let typing = self.typing.stop();
        self.write_typing(typing).await;
    }

    /// Send the trailing typing emission if it is due.
    pub async fn poll_typing(&mut self) -> Option<bool> {
        let typing = self.typing.poll(Instant::now())?;
        self.write_typing(typing).await;
        Some(typing)
    }

    async fn write_typing(&self, typing: bool) {
        if let Err(e) = self
            .ctx
            .chats
            .set_typing(&self.chat_id, &self.ctx.me, typing)
            .await
        {
            warn!(chat = %self.chat_id, typing, error = %e, "failed to update typing flag");
        }
    }

    // -- Replies --------------------------------------------------------

    /// Select a loaded message as the reply target.
    pub fn set_reply_target(&mut self, id: &MessageId) -> bool {
        match self.window.get(id) {
            Some(message) if !message.is_deleted => {
                self.reply_target = Some(id.clone());
                true
            }
            _ => false,
        }
    }

    pub fn clear_reply_target(&mut self) {
        self.reply_target = None;
    }

    pub fn reply_target(&self) -> Option<&Message> {
        self.reply_target.as_ref().and_then(|id| self.window.get(id))
    }

    /// Index of a message in the loaded window, for reply navigation.
    /// `None` when it is not loaded.
    pub fn locate(&self, id: &MessageId) -> Option<usize> {
        self.window.position(id)
    }

    fn freeze_reply(&self) -> Option<ReplyTo> {
        let target = self.reply_target()?;
        let sender_display_name = if target.is_system() {
            "System".to_string()
        } else {
            self.chat
                .as_ref()
                .and_then(|c| c.display_name_of(&target.sender_id))
                .map(str::to_string)
                .unwrap_or_else(|| target.sender_id.to_string())
        };
        Some(ReplyTo {
            message_id: target.id.clone(),
            sender_id: target.sender_id.clone(),
            text_preview: truncate_chars(&target.text, REPLY_PREVIEW_CHARS),
            sender_display_name,
        })
    }

    // -- Send -----------------------------------------------------------

    /// Validate, moderate and send the draft.
    ///
    /// The append and the summary update are separate writes. If the
    /// append fails nothing was written: the draft and reply target are
    /// restored. If only the summary update fails the message is sent and
    /// the outcome reports [`SummaryState::Stale`].
    pub async fn send(&mut self) -> Result<SendOutcome> {
        self.ensure_open()?;
        let text = validate_message_text(&self.draft)?.to_string();
        self.moderate(&text).await?;

        let reply = self.freeze_reply();
        let draft = std::mem::take(&mut self.draft);
        let reply_target = self.reply_target.take();

        let message = NewMessage::user(self.ctx.me.clone(), text.as_str()).with_reply(reply);
        let message_id = match self.ctx.messages.append(&self.chat_id, &message).await {
            Ok(id) => id,
            Err(e) => {
                warn!(chat = %self.chat_id, error = %e, "message append failed");
                self.draft = draft;
                self.reply_target = reply_target;
                self.ctx.notices.transient("Message could not be sent.");
                return Err(SyncError::StoreWrite(e));
            }
        };

        let summary = match self
            .ctx
            .chats
            .record_last_message(&self.chat_id, &self.ctx.me, &self.counterpart, &text)
            .await
        {
            Ok(()) => SummaryState::Current,
            Err(e) => {
                self.ctx.repair.summary_stale(&self.chat_id, &message_id, &e);
                SummaryState::Stale
            }
        };

        let typing = self.typing.stop();
        self.write_typing(typing).await;

        debug!(chat = %self.chat_id, message = %message_id, ?summary, "message sent");
        Ok(SendOutcome {
            message_id,
            summary,
        })
    }

    async fn moderate(&self, text: &str) -> Result<()> {
        let verdict = match self.ctx.moderator.moderate(text).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(chat = %self.chat_id, error = %e, "moderation unavailable");
                self.ctx
                    .notices
                    .transient("Could not check the message right now. Try again.");
                return Err(e.into());
            }
        };
        if verdict.is_harmful {
            self.ctx.notices.dismissible(verdict.reason.clone());
            return Err(SyncError::Blocked {
                reason: verdict.reason,
            });
        }
        Ok(())
    }

    // -- Optimistic mutations -------------------------------------------

    fn mutable_message(&self, id: &MessageId) -> Result<&Message> {
        let message = self
            .window
            .get(id)
            .ok_or_else(|| SyncError::MessageNotFound(id.clone()))?;
        if message.is_system() {
            return Err(SyncError::SystemMessage);
        }
        Ok(message)
    }

    /// Re-read a loaded message that no snapshot keeps current.
    async fn refresh_if_stale(&mut self, id: &MessageId) -> Result<()> {
        if self.window.get(id).is_none() || self.window.is_live(id) {
            return Ok(());
        }
        let Some(mut fresh) = self.ctx.messages.get(&self.chat_id, id).await? else {
            return Err(SyncError::MessageNotFound(id.clone()));
        };
        self.ledger.reconcile(&mut fresh);
        debug!(chat = %self.chat_id, message = %id, "refreshed backfilled message");
        self.window.update(id, |m| *m = fresh);
        Ok(())
    }

    fn apply_optimistic(&mut self, before: Message, mutation: MessageMutation) -> WriteId {
        self.window.update(&before.id, |m| mutation.apply(m));
        let id = self.ledger.begin(mutation, before);
        debug!(chat = %self.chat_id, write = %id, "optimistic write started");
        id
    }

    /// Apply an edit locally. `None` when the text is unchanged (nothing
    /// to write).
    pub async fn begin_edit(&mut self, id: &MessageId, text: &str) -> Result<Option<PendingWrite>> {
        self.ensure_open()?;
        let text = validate_message_text(text)?.to_string();
        self.refresh_if_stale(id).await?;

        let current = self.mutable_message(id)?;
        if current.sender_id != self.ctx.me {
            return Err(SyncError::NotAuthor);
        }
        if current.is_deleted {
            return Err(SyncError::MessageDeleted);
        }
        if current.text == text {
            return Ok(None);
        }
        let before = current.clone();

        if self.ctx.config.moderate_edits {
            self.moderate(&text).await?;
        }

        let write_id = self.apply_optimistic(before, MessageMutation::Edit { text: text.clone() });
        let store = self.ctx.messages.clone();
        let chat = self.chat_id.clone();
        let message = id.clone();
        Ok(Some(PendingWrite {
            id: write_id,
            write: async move { store.update_text(&chat, &message, &text).await }.boxed(),
        }))
    }

    /// Tombstone locally. `None` when the message is already deleted.
    pub fn begin_delete(&mut self, id: &MessageId) -> Result<Option<PendingWrite>> {
        self.ensure_open()?;
        let current = self.mutable_message(id)?;
        if current.sender_id != self.ctx.me {
            return Err(SyncError::NotAuthor);
        }
        if current.is_deleted {
            return Ok(None);
        }
        let before = current.clone();

        let write_id = self.apply_optimistic(before, MessageMutation::Delete);
        let store = self.ctx.messages.clone();
        let chat = self.chat_id.clone();
        let message = id.clone();
        Ok(Some(PendingWrite {
            id: write_id,
            write: async move { store.soft_delete(&chat, &message).await }.boxed(),
        }))
    }

    /// Toggle the current user's reaction locally. Choosing the emoji
    /// already set removes it; any other emoji replaces it.
    pub async fn begin_react(&mut self, id: &MessageId, emoji: &str) -> Result<PendingWrite> {
        self.ensure_open()?;
        self.refresh_if_stale(id).await?;
        let current = self.mutable_message(id)?;
        if current.is_deleted {
            return Err(SyncError::MessageDeleted);
        }
        let me = self.ctx.me.clone();
        let next = match current.reactions.get(&me) {
            Some(existing) if existing == emoji => None,
            _ => Some(emoji.to_string()),
        };
        let before = current.clone();

        let write_id = self.apply_optimistic(
            before,
            MessageMutation::React {
                uid: me.clone(),
                emoji: next.clone(),
            },
        );
        let store = self.ctx.messages.clone();
        let chat = self.chat_id.clone();
        let message = id.clone();
        Ok(PendingWrite {
            id: write_id,
            write: async move { store.set_reaction(&chat, &message, &me, next.as_deref()).await }
                .boxed(),
        })
    }

    /// Resolve an optimistic write with the outcome of its store write.
    pub fn settle(&mut self, id: WriteId, result: duet_store::Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                // Only live messages see a reflecting snapshot.
                let live = self.ledger.message_of(id).is_some_and(|m| self.window.is_live(m));
                if live {
                    self.ledger.confirm(id);
                } else {
                    self.ledger.retire(id);
                }
                Ok(())
            }
            Err(e) => {
                warn!(chat = %self.chat_id, write = %id, error = %e, "optimistic write failed");
                if let Some(rollback) = self.ledger.fail(id) {
                    self.window.update(&rollback.message_id, |m| rollback.apply(m));
                    self.ctx.notices.transient(format!(
                        "Could not save your {}. It has been undone.",
                        rollback.mutation.describe()
                    ));
                }
                Err(SyncError::StoreWrite(e))
            }
        }
    }

    async fn finish(&mut self, pending: PendingWrite) -> Result<()> {
        let result = pending.write.await;
        self.settle(pending.id, result)
    }

    pub async fn edit(&mut self, id: &MessageId, text: &str) -> Result<()> {
        match self.begin_edit(id, text).await? {
            Some(pending) => self.finish(pending).await,
            None => Ok(()),
        }
    }

    pub async fn delete(&mut self, id: &MessageId) -> Result<()> {
        match self.begin_delete(id)? {
            Some(pending) => self.finish(pending).await,
            None => Ok(()),
        }
    }

    pub async fn react(&mut self, id: &MessageId, emoji: &str) -> Result<()> {
        let pending = self.begin_react(id, emoji).await?;
        self.finish(pending).await
    }

    // -- Lifecycle ------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(SyncError::SessionClosed);
        }
        Ok(())
    }

    /// Clear the typing flag and tear down both subscriptions.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let typing = self.typing.stop();
        self.write_typing(typing).await;

        self.chat_live.close();
        self.messages_live.close();
        self.chat_open = false;
        self.messages_open = false;
        self.state = SessionState::Closed;
        info!(chat = %self.chat_id, "chat session closed");
    }
}
