//! Ascending, monotonically growing view of one chat's messages.
//!
//! Two sources feed the window: the live page (the newest `page_size`
//! messages, replaced wholesale by every snapshot) and backfilled pages of
//! older messages. A message that falls out of the live page because newer
//! ones arrived stays in the window; it is simply no longer refreshed.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use duet_shared::MessageId;
use duet_store::Message;

type SortKey = (DateTime<Utc>, MessageId);

fn sort_key(message: &Message) -> SortKey {
    (message.created_at, message.id.clone())
}

#[derive(Debug, Clone)]
pub struct MessageWindow {
    page_size: usize,
    entries: BTreeMap<SortKey, Message>,
    index: HashMap<MessageId, SortKey>,
    live: HashSet<MessageId>,
    has_more_older: bool,
    seeded: bool,
}

impl MessageWindow {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            entries: BTreeMap::new(),
            index: HashMap::new(),
            live: HashSet::new(),
            has_more_older: true,
            seeded: false,
        }
    }

    /// Replace the live page. `page` is newest first, as delivered by the
    /// store.
    pub fn apply_latest(&mut self, page: Vec<Message>) {
        if !self.seeded {
            // A short first page means there is nothing older to fetch.
            self.has_more_older = page.len() >= self.page_size;
            self.seeded = true;
        }

        self.live = page.iter().map(|m| m.id.clone()).collect();
        for message in page.into_iter().rev() {
            self.upsert(message);
        }
    }

    /// Merge a backfilled page (newest first). Returns how many messages
    /// were new to the window.
    pub fn apply_older(&mut self, page: Vec<Message>) -> usize {
        if page.len() < self.page_size {
            self.has_more_older = false;
        }

        let mut added = 0;
        for message in page {
            // The live copy is always at least as fresh.
            if self.live.contains(&message.id) {
                continue;
            }
            if !self.index.contains_key(&message.id) {
                added += 1;
            }
            self.upsert(message);
        }
        added
    }

    fn upsert(&mut self, message: Message) {
        let key = sort_key(&message);
        if let Some(old) = self.index.insert(message.id.clone(), key.clone()) {
            if old != key {
                self.entries.remove(&old);
            }
        }
        self.entries.insert(key, message);
    }

    /// Whether the first live snapshot has been applied.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn has_more_older(&self) -> bool {
        self.has_more_older
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Messages in ascending `(createdAt, id)` order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.values()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.entries.values().cloned().collect()
    }

    pub fn oldest(&self) -> Option<&Message> {
        self.entries.values().next()
    }

    pub fn newest(&self) -> Option<&Message> {
        self.entries.values().next_back()
    }

    /// Whether `id` is in the current live page and so still receives
    /// snapshots.
    pub fn is_live(&self, id: &MessageId) -> bool {
        self.live.contains(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        let key = self.index.get(id)?;
        self.entries.get(key)
    }

    /// Mutate one message in place. The sort key must not change.
    pub fn update(&mut self, id: &MessageId, f: impl FnOnce(&mut Message)) -> bool {
        let Some(key) = self.index.get(id) else {
            return false;
        };
        match self.entries.get_mut(key) {
            Some(message) => {
                f(message);
                true
            }
            None => false,
        }
    }

    /// Position of a message in the ascending view.
    pub fn position(&self, id: &MessageId) -> Option<usize> {
        let key = self.index.get(id)?;
        Some(self.entries.range(..key).count())
    }
}
