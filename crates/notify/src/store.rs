//! Bounded notification feed
//!
//! Most-recent-first, deduplicated by id, capped at [`FEED_CAPACITY`].
//! The unread counter is tracked independently: once the server has pushed
//! a count it is authoritative, even though the cached records may only be
//! the newest slice of the user's notifications.

use std::collections::HashSet;

use quill_shared::{NotificationId, NotificationRecord};

/// Maximum records held client-side
pub const FEED_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct FeedStore {
    records: Vec<NotificationRecord>,
    capacity: usize,
    unread_count: u32,
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedStore {
    pub fn new() -> Self {
        Self::with_capacity(FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
            unread_count: 0,
        }
    }

    /// Prepend a record unless its id is already held. Evicts the oldest
    /// entry when over capacity. Never touches the unread counter.
    ///
    /// Returns true if the record was inserted.
    pub fn insert(&mut self, record: NotificationRecord) -> bool {
        if self.contains(&record.id) {
            return false;
        }

        self.records.insert(0, record);
        if self.records.len() > self.capacity {
            if let Some(evicted) = self.records.pop() {
                tracing::debug!(notification_id = %evicted.id, "Evicted oldest notification");
            }
        }
        true
    }

    /// Mark a held record as read. Absent ids (possibly evicted) are ignored.
    ///
    /// Returns true if a record went from unread to read.
    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        match self.records.iter_mut().find(|r| &r.id == id) {
            Some(record) if !record.is_read => {
                record.is_read = true;
                true
            }
            _ => false,
        }
    }

    /// Mark every held record as read, returning how many changed
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for record in self.records.iter_mut().filter(|r| !r.is_read) {
            record.is_read = true;
            changed += 1;
        }
        changed
    }

    /// Replace the feed with `records` in the given order, keeping the first
    /// occurrence of any repeated id and applying the capacity cap.
    pub fn replace_all<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = NotificationRecord>,
    {
        self.records.clear();
        let mut seen = HashSet::new();
        for record in records {
            if self.records.len() == self.capacity {
                break;
            }
            if seen.insert(record.id.clone()) {
                self.records.push(record);
            }
        }
    }

    /// Read-only ordered view, newest first
    pub fn snapshot(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn get(&self, id: &NotificationId) -> Option<&NotificationRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    pub fn set_unread_count(&mut self, count: u32) {
        self.unread_count = count;
    }

    /// Optimistic local decrement, floored at zero
    pub fn decrement_unread(&mut self) {
        self.unread_count = self.unread_count.saturating_sub(1);
    }

    /// Unread records among those currently held
    pub fn held_unread(&self) -> u32 {
        self.records.iter().filter(|r| !r.is_read).count() as u32
    }

    /// Drop every record and reset the counter
    pub fn clear(&mut self) {
        self.records.clear();
        self.unread_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_shared::NotificationKind;
    use time::macros::datetime;

    fn record(id: &str) -> NotificationRecord {
        NotificationRecord {
            id: NotificationId::from(id),
            kind: NotificationKind::CommentAdded,
            title: format!("title {}", id),
            message: format!("message {}", id),
            link: None,
            payload: serde_json::Value::Null,
            is_read: false,
            created_at: datetime!(2024-03-01 12:00 UTC),
        }
    }

    fn ids(store: &FeedStore) -> Vec<&str> {
        store.snapshot().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_insert_prepends() {
        let mut store = FeedStore::new();
        assert!(store.insert(record("a")));
        assert!(store.insert(record("b")));
        assert_eq!(ids(&store), vec!["b", "a"]);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut store = FeedStore::new();
        store.insert(record("a"));
        store.insert(record("b"));

        let mut redelivered = record("a");
        redelivered.title = "changed".to_string();
        assert!(!store.insert(redelivered));

        assert_eq!(ids(&store), vec!["b", "a"]);
        assert_eq!(store.get(&"a".into()).unwrap().title, "title a");
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut store = FeedStore::new();
        for i in 0..(FEED_CAPACITY * 3) {
            store.insert(record(&format!("n{}", i)));
            assert!(store.len() <= FEED_CAPACITY);
        }

        assert_eq!(store.len(), FEED_CAPACITY);
        // Oldest entries were evicted from the tail
        assert_eq!(store.snapshot()[0].id.as_str(), "n149");
        assert_eq!(store.snapshot()[FEED_CAPACITY - 1].id.as_str(), "n100");
        assert!(!store.contains(&"n99".into()));
    }

    #[test]
    fn test_insert_does_not_touch_unread() {
        let mut store = FeedStore::new();
        store.set_unread_count(7);
        store.insert(record("a"));
        assert_eq!(store.unread_count(), 7);
    }

    #[test]
    fn test_mark_read_absent_is_noop() {
        let mut store = FeedStore::new();
        store.insert(record("a"));

        assert!(!store.mark_read(&"missing".into()));
        assert!(!store.get(&"a".into()).unwrap().is_read);
    }

    #[test]
    fn test_mark_read() {
        let mut store = FeedStore::new();
        store.insert(record("a"));

        assert!(store.mark_read(&"a".into()));
        assert!(store.get(&"a".into()).unwrap().is_read);
        // Second call changes nothing
        assert!(!store.mark_read(&"a".into()));
    }

    #[test]
    fn test_mark_all_read() {
        let mut store = FeedStore::new();
        store.insert(record("a"));
        store.insert(record("b"));
        store.mark_read(&"a".into());

        assert_eq!(store.mark_all_read(), 1);
        assert_eq!(store.held_unread(), 0);
    }

    #[test]
    fn test_replace_all_keeps_order_and_caps() {
        let mut store = FeedStore::new();
        store.insert(record("old"));

        let incoming: Vec<_> = (0..60).map(|i| record(&format!("s{}", i))).collect();
        store.replace_all(incoming.clone());

        assert_eq!(store.len(), FEED_CAPACITY);
        assert_eq!(store.snapshot(), &incoming[..FEED_CAPACITY]);
        assert!(!store.contains(&"old".into()));
    }

    #[test]
    fn test_replace_all_drops_repeated_ids() {
        let mut store = FeedStore::new();
        store.replace_all(vec![record("a"), record("b"), record("a")]);
        assert_eq!(ids(&store), vec!["a", "b"]);
    }

    #[test]
    fn test_unread_floor() {
        let mut store = FeedStore::new();
        store.decrement_unread();
        assert_eq!(store.unread_count(), 0);

        store.set_unread_count(2);
        store.decrement_unread();
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_clear() {
        let mut store = FeedStore::new();
        store.insert(record("a"));
        store.set_unread_count(3);
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.unread_count(), 0);
    }
}
