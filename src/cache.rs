//! Time-windowed cache keyed by message id.
//!
//! Entries remember when they were inserted; [`TimeCache::garbage_collection`]
//! removes everything inserted before a cut-off and reports the removed ids so
//! peer federates can release their copies too.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::{MessageId, SimTime};

#[derive(Debug, Clone)]
struct Entry<V> {
    inserted_at: SimTime,
    value: V,
}

/// Cache of values with their insertion time.
#[derive(Debug, Clone)]
pub struct TimeCache<V> {
    entries: HashMap<MessageId, Entry<V>>,
    /// Insertion time to ids inserted at that time.
    by_time: BTreeMap<SimTime, Vec<MessageId>>,
}

impl<V> Default for TimeCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            by_time: BTreeMap::new(),
        }
    }
}

impl<V> TimeCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the value for `id`. Returns the replaced value.
    pub fn insert(&mut self, time: SimTime, id: MessageId, value: V) -> Option<V> {
        self.by_time.entry(time).or_default().push(id);
        self.entries
            .insert(id, Entry { inserted_at: time, value })
            .map(|old| old.value)
    }

    pub fn get(&self, id: MessageId) -> Option<&V> {
        self.entries.get(&id).map(|entry| &entry.value)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry inserted strictly before `before` and returns their ids.
    pub fn garbage_collection(&mut self, before: SimTime) -> BTreeSet<MessageId> {
        let kept = self.by_time.split_off(&before);
        let expired = std::mem::replace(&mut self.by_time, kept);

        let mut removed = BTreeSet::new();
        for (time, ids) in expired {
            for id in ids {
                // An id re-inserted later has a newer entry that must survive.
                if self.entries.get(&id).is_some_and(|entry| entry.inserted_at == time) {
                    self.entries.remove(&id);
                    removed.insert(id);
                }
            }
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_time.clear();
    }
}
