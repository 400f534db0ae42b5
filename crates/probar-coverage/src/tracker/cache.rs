//! Per-tracker resource cache.
//!
//! Records are keyed by resource id and kept in first-insertion order for
//! reporting. Every fetch carries the generation it was dispatched under;
//! a completion from an older generation (before a navigation reset, a
//! stop, or a restart) is refused.

use crate::resource::{ResourceId, ResourceRecord};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct ResourceCache {
    generation: u64,
    accepting: bool,
    records: Vec<ResourceRecord>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceCache {
    /// Wipe everything for a new session; stays closed until [`Self::open`].
    pub(crate) fn begin_session(&mut self) -> u64 {
        self.clear();
        self.accepting = false;
        self.advance()
    }

    pub(crate) fn open(&mut self) {
        self.accepting = true;
    }

    /// Stop accepting; records stay until taken.
    pub(crate) fn close(&mut self) {
        self.accepting = false;
        self.advance();
    }

    /// Navigation reset: drop records, keep accepting.
    ///
    /// Ignored once closed, so records held for a stop survive.
    pub(crate) fn reset(&mut self) -> bool {
        if !self.accepting {
            return false;
        }
        self.clear();
        self.advance();
        true
    }

    /// Generation to stamp on a new fetch, if inserts are accepted at all
    pub(crate) fn accepting_generation(&self) -> Option<u64> {
        self.accepting.then_some(self.generation)
    }

    /// Insert or replace a record fetched under `generation`.
    ///
    /// Replacing keeps the original position.
    pub(crate) fn insert(&mut self, generation: u64, record: ResourceRecord) -> bool {
        if !self.accepting || generation != self.generation {
            return false;
        }
        match self.index.get(&record.id) {
            Some(&slot) => self.records[slot] = record,
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
        true
    }

    pub(crate) fn take_records(&mut self) -> Vec<ResourceRecord> {
        self.index.clear();
        std::mem::take(&mut self.records)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }

    fn advance(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(id: &str, text: &str) -> ResourceRecord {
        ResourceRecord {
            id: ResourceId::from(id),
            url: format!("http://localhost/{id}.js"),
            source_text: text.to_string(),
        }
    }

    fn open_cache() -> (ResourceCache, u64) {
        let mut cache = ResourceCache::default();
        let generation = cache.begin_session();
        cache.open();
        (cache, generation)
    }

    #[test]
    fn test_closed_until_opened() {
        let mut cache = ResourceCache::default();
        let generation = cache.begin_session();
        assert!(cache.accepting_generation().is_none());
        assert!(!cache.insert(generation, record("1", "a")));
        cache.open();
        assert_eq!(cache.accepting_generation(), Some(generation));
        assert!(cache.insert(generation, record("1", "a")));
    }

    #[test]
    fn test_insertion_order_and_replacement() {
        let (mut cache, generation) = open_cache();
        cache.insert(generation, record("b", "1"));
        cache.insert(generation, record("a", "2"));
        cache.insert(generation, record("b", "3"));

        let records = cache.take_records();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(records[0].source_text, "3");
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_reset_refuses_stale_generation() {
        let (mut cache, stale) = open_cache();
        cache.insert(stale, record("1", "a"));
        cache.reset();
        assert_eq!(cache.len(), 0);
        assert!(!cache.insert(stale, record("2", "b")));

        let fresh = cache.accepting_generation().unwrap();
        assert!(cache.insert(fresh, record("3", "c")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_close_keeps_records_but_refuses_inserts() {
        let (mut cache, generation) = open_cache();
        cache.insert(generation, record("1", "a"));
        cache.close();
        assert!(!cache.insert(generation, record("2", "b")));
        assert_eq!(cache.take_records().len(), 1);
    }

    #[test]
    fn test_reset_after_close_keeps_records() {
        let (mut cache, generation) = open_cache();
        cache.insert(generation, record("1", "a"));
        cache.close();
        assert!(!cache.reset());
        assert_eq!(cache.take_records().len(), 1);
    }

    #[test]
    fn test_new_session_refuses_previous_generation() {
        let (mut cache, old) = open_cache();
        cache.close();
        let new = cache.begin_session();
        cache.open();
        assert_ne!(old, new);
        assert!(!cache.insert(old, record("late", "x")));
        assert_eq!(cache.len(), 0);
    }
}
