//! The signed-in user's conversation list.
//!
//! [`ChatListFeed`] subscribes to every chat the user is a member of and to
//! the user's own profile (for pin / mute / archive), and renders them into
//! a [`ChatListView`].

use std::cmp::Ordering;

use futures::FutureExt;
use tracing::{debug, warn};

use duet_shared::{ChatId, UserId};
use duet_store::{Chat, ChatStore, Live, Preference, ProfileStore, UserProfile};

use crate::error::{Result, SyncError};
use crate::events::NoticeSink;
use crate::optimistic::{PendingWrite, WriteId};
use crate::preferences::PreferenceOverlay;
use crate::summary::SummaryView;

/// One row of the list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatListItem {
    pub chat_id: ChatId,
    pub summary: SummaryView,
    pub pinned: bool,
    pub muted: bool,
    /// Unread and not muted.
    pub emphasized: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatListView {
    pub active: Vec<ChatListItem>,
    pub archived: Vec<ChatListItem>,
}

impl ChatListView {
    /// Order and partition `chats` for `me` under the given preferences.
    pub fn build(me: &UserId, chats: &[Chat], prefs: Option<&UserProfile>) -> Self {
        let has = |p: Preference, id: &ChatId| prefs.is_some_and(|u| u.has_preference(p, id));

        let mut view = ChatListView::default();
        for chat in chats {
            let archived = has(Preference::Archive, &chat.id);
            let muted = has(Preference::Mute, &chat.id);
            let summary = SummaryView::derive(chat, me);
            let item = ChatListItem {
                chat_id: chat.id.clone(),
                // Archived chats never render as pinned.
                pinned: !archived && has(Preference::Pin, &chat.id),
                muted,
                emphasized: !muted && summary.unread > 0,
                summary,
            };
            if archived {
                view.archived.push(item);
            } else {
                view.active.push(item);
            }
        }

        view.active.sort_by(compare_items);
        view.archived.sort_by(compare_items);
        view
    }

    pub fn find(&self, chat: &ChatId) -> Option<&ChatListItem> {
        self.active
            .iter()
            .chain(self.archived.iter())
            .find(|item| item.chat_id == *chat)
    }
}

fn compare_items(a: &ChatListItem, b: &ChatListItem) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then_with(|| b.summary.last_activity.cmp(&a.summary.last_activity))
        .then_with(|| a.chat_id.cmp(&b.chat_id))
}

pub struct ChatListFeed {
    me: UserId,
    profiles: ProfileStore,
    notices: NoticeSink,
    chats_live: Live<Vec<Chat>>,
    profile_live: Live<Option<UserProfile>>,
    chats_failed: bool,
    profile_failed: bool,
    chats: Vec<Chat>,
    profile: Option<UserProfile>,
    overlay: PreferenceOverlay,
}

impl ChatListFeed {
    pub fn open(me: UserId, chats: &ChatStore, profiles: ProfileStore, notices: NoticeSink) -> Result<Self> {
        let chats_live = chats.subscribe_for_user(&me)?;
        let profile_live = profiles.subscribe(&me)?;
        Ok(Self {
            me,
            profiles,
            notices,
            chats_live,
            profile_live,
            chats_failed: false,
            profile_failed: false,
            chats: Vec::new(),
            profile: None,
            overlay: PreferenceOverlay::new(),
        })
    }

    /// Apply every queued snapshot without waiting.
    pub fn sync_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(result) = self.chats_live.try_next() {
            self.apply_chats(result);
            applied += 1;
        }
        while let Some(result) = self.profile_live.try_next() {
            self.apply_profile(result);
            applied += 1;
        }
        applied
    }

    /// Wait for the next snapshot from either feed. `None` once both have
    /// ended.
    pub async fn next_update(&mut self) -> Option<()> {
        tokio::select! {
            Some(result) = self.chats_live.next() => self.apply_chats(result),
            Some(result) = self.profile_live.next() => self.apply_profile(result),
            else => return None,
        }
        Some(())
    }

    fn apply_chats(&mut self, result: duet_store::Result<Vec<Chat>>) {
        match result {
            Ok(chats) => self.chats = chats,
            Err(e) => {
                warn!(uid = %self.me, error = %e, "chat list subscription failed");
                if !self.chats_failed {
                    self.chats_failed = true;
                    self.notices.persistent("Connection problem. Chat list may be out of date.");
                }
            }
        }
    }

    fn apply_profile(&mut self, result: duet_store::Result<Option<UserProfile>>) {
        match result {
            Ok(profile) => {
                if let Some(p) = &profile {
                    self.overlay.reconcile(p);
                }
                self.profile = profile;
            }
            Err(e) => {
                warn!(uid = %self.me, error = %e, "profile subscription failed");
                if !self.profile_failed {
                    self.profile_failed = true;
                    self.notices.persistent("Connection problem. Chat list may be out of date.");
                }
            }
        }
    }

    /// The profile with pending preference flips applied.
    pub fn preferences(&self) -> Option<UserProfile> {
        self.profile.as_ref().map(|p| self.overlay.apply(p))
    }

    pub fn view(&self) -> ChatListView {
        let prefs = self.preferences();
        ChatListView::build(&self.me, &self.chats, prefs.as_ref())
    }

    fn is_member(&self, preference: Preference, chat: &ChatId) -> bool {
        self.preferences()
            .is_some_and(|p| p.has_preference(preference, chat))
    }

    /// Flip membership locally and return the write that persists it.
    pub fn begin_toggle(&mut self, preference: Preference, chat: &ChatId) -> PendingWrite {
        let member = !self.is_member(preference, chat);
        let id = self.overlay.begin(preference, chat.clone(), member);
        debug!(uid = %self.me, chat = %chat, ?preference, member, "preference flip");

        let profiles = self.profiles.clone();
        let me = self.me.clone();
        let chat = chat.clone();
        PendingWrite {
            id,
            write: async move {
                if member {
                    profiles.add_preference(&me, preference, &chat).await
                } else {
                    profiles.remove_preference(&me, preference, &chat).await
                }
            }
            .boxed(),
        }
    }

    pub fn settle(&mut self, id: WriteId, result: duet_store::Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.overlay.confirm(id);
                Ok(())
            }
            Err(e) => {
                warn!(uid = %self.me, write = %id, error = %e, "preference write failed");
                if self.overlay.fail(id) {
                    self.notices.transient("Could not update the chat. It has been undone.");
                }
                Err(SyncError::StoreWrite(e))
            }
        }
    }

    /// Toggle a preference and wait for the write. Returns the new
    /// membership.
    pub async fn toggle(&mut self, preference: Preference, chat: &ChatId) -> Result<bool> {
        let pending = self.begin_toggle(preference, chat);
        let result = pending.write.await;
        self.settle(pending.id, result)?;
        Ok(self.is_member(preference, chat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_store::Document;
    use serde_json::json;

    fn chat(id: &str, created: i64, last: Option<i64>, unread_me: i64) -> Chat {
        let (a, b) = id.split_once('_').unwrap();
        let last_message = last.map(|t| json!({"text": "x", "createdAt": t, "senderId": b, "readBy": [b]}));
        Chat::from_document(&Document::new(
            id,
            json!({
                "users": [a, b],
                "unreadCounts": {a: unread_me},
                "lastMessage": last_message,
                "createdAt": created,
            }),
        ))
        .unwrap()
    }

    fn prefs(pinned: &[&str], muted: &[&str], archived: &[&str]) -> UserProfile {
        UserProfile::from_document(&Document::new(
            "u1",
            json!({
                "uid": "u1",
                "displayName": "Ada",
                "pinnedChats": pinned,
                "mutedChats": muted,
                "archivedChats": archived,
            }),
        ))
        .unwrap()
    }

    fn ids(items: &[ChatListItem]) -> Vec<&str> {
        items.iter().map(|i| i.chat_id.as_str()).collect()
    }

    #[test]
    fn test_ordering_pinned_then_recency() {
        let me: UserId = "u1".into();
        let chats = vec![
            chat("u1_u2", 10, Some(50), 0),
            chat("u1_u3", 40, None, 0),
            chat("u1_u4", 5, Some(20), 0),
        ];
        let view = ChatListView::build(&me, &chats, Some(&prefs(&["u1_u4"], &[], &[])));
        assert_eq!(ids(&view.active), vec!["u1_u4", "u1_u2", "u1_u3"]);
        assert!(view.active[0].pinned);
    }

    #[test]
    fn test_mute_and_archive() {
        let me: UserId = "u1".into();
        let chats = vec![chat("u1_u2", 10, Some(50), 3), chat("u1_u3", 10, Some(60), 2)];
        let view = ChatListView::build(
            &me,
            &chats,
            Some(&prefs(&["u1_u3"], &["u1_u2"], &["u1_u3"])),
        );

        assert_eq!(ids(&view.active), vec!["u1_u2"]);
        let muted = &view.active[0];
        assert!(muted.muted);
        assert!(!muted.emphasized);
        assert_eq!(muted.summary.unread, 3);

        assert_eq!(ids(&view.archived), vec!["u1_u3"]);
        assert!(!view.archived[0].pinned);
        assert!(view.archived[0].emphasized);
    }
}
