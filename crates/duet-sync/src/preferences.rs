//! Optimistic pin / mute / archive flips.
//!
//! Preferences live only on the acting user's profile, so the remote profile
//! is the single source of truth and the overlay is just a list of pending
//! membership changes layered on top of it. Rolling back a flip means
//! dropping it from the overlay.

use duet_shared::ChatId;
use duet_store::{Preference, UserProfile};

use crate::optimistic::{WriteId, WriteIds};

#[derive(Debug, Clone)]
struct Flip {
    id: WriteId,
    preference: Preference,
    chat: ChatId,
    member: bool,
    confirmed: bool,
    reflected: bool,
}

#[derive(Debug, Default)]
pub struct PreferenceOverlay {
    ids: WriteIds,
    flips: Vec<Flip>,
}

impl PreferenceOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `chat` should be (`member`) or not be in a set.
    pub fn begin(&mut self, preference: Preference, chat: ChatId, member: bool) -> WriteId {
        let id = self.ids.next();
        self.flips.push(Flip {
            id,
            preference,
            chat,
            member,
            confirmed: false,
            reflected: false,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.flips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flips.is_empty()
    }

    /// The profile as the user should see it.
    pub fn apply(&self, profile: &UserProfile) -> UserProfile {
        let mut effective = profile.clone();
        for flip in &self.flips {
            let set = effective.preference_mut(flip.preference);
            if flip.member {
                set.insert(flip.chat.clone());
            } else {
                set.remove(&flip.chat);
            }
        }
        effective
    }

    /// A fresh remote profile arrived.
    pub fn reconcile(&mut self, profile: &UserProfile) {
        for flip in self.flips.iter_mut() {
            if profile.has_preference(flip.preference, &flip.chat) == flip.member {
                flip.reflected = true;
            }
        }
        self.flips.retain(|f| !(f.confirmed && f.reflected));
    }

    pub fn confirm(&mut self, id: WriteId) {
        if let Some(flip) = self.flips.iter_mut().find(|f| f.id == id) {
            flip.confirmed = true;
        }
        self.flips.retain(|f| !(f.confirmed && f.reflected));
    }

    /// Drop a failed flip. Returns `true` if the view changes as a result.
    pub fn fail(&mut self, id: WriteId) -> bool {
        match self.flips.iter().position(|f| f.id == id) {
            Some(pos) => !self.flips.remove(pos).reflected,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_store::Document;
    use serde_json::json;

    fn profile(pinned: &[&str]) -> UserProfile {
        UserProfile::from_document(&Document::new(
            "u1",
            json!({"uid": "u1", "displayName": "Ada", "pinnedChats": pinned}),
        ))
        .unwrap()
    }

    #[test]
    fn test_overlay_until_reflected_and_confirmed() {
        let chat = ChatId("u1_u2".into());
        let mut overlay = PreferenceOverlay::new();
        let id = overlay.begin(Preference::Pin, chat.clone(), true);

        let remote = profile(&[]);
        assert!(overlay.apply(&remote).pinned_chats.contains(&chat));

        overlay.reconcile(&remote);
        overlay.confirm(id);
        assert_eq!(overlay.len(), 1);

        overlay.reconcile(&profile(&["u1_u2"]));
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_failed_flip_is_dropped() {
        let chat = ChatId("u1_u2".into());
        let mut overlay = PreferenceOverlay::new();
        let id = overlay.begin(Preference::Pin, chat.clone(), false);

        let remote = profile(&["u1_u2"]);
        assert!(overlay.apply(&remote).pinned_chats.is_empty());
        assert!(overlay.fail(id));
        assert!(overlay.apply(&remote).pinned_chats.contains(&chat));
    }
}
