use ahash::RandomState;

use crate::log::Log;

/// Bucket count for the object hash table; a prime.
pub const BUCKETS: usize = 1019;

/// Open hash table of per-object [`Log`]s, keyed by a case-insensitive,
/// process-random hash. The key is sampled once at construction and never
/// persisted: it exists only to make bucket placement unpredictable to an
/// attacker who can choose object names, not to provide any on-disk
/// identity.
pub struct ObjectStore {
    buckets: Vec<Vec<Log>>,
    hasher: RandomState,
}

impl ObjectStore {
    pub fn new() -> Self {
        let seeds: [u64; 4] = rand::random();
        Self::with_seeds(seeds)
    }

    pub fn with_seeds(seeds: [u64; 4]) -> Self {
        Self {
            buckets: (0..BUCKETS).map(|_| Vec::new()).collect(),
            hasher: RandomState::with_seeds(seeds[0], seeds[1], seeds[2], seeds[3]),
        }
    }

    fn bucket_index(&self, name: &str) -> usize {
        use std::hash::{
            BuildHasher,
            Hasher,
        };
        let lowered = name.to_ascii_lowercase();
        let mut hasher = self.hasher.build_hasher();
        hasher.write(lowered.as_bytes());
        (hasher.finish() % BUCKETS as u64) as usize
    }

    pub fn find(&self, name: &str) -> Option<&Log> {
        let idx = self.bucket_index(name);
        self.buckets[idx]
            .iter()
            .find(|log| log.name.eq_ignore_ascii_case(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Log> {
        let idx = self.bucket_index(name);
        self.buckets[idx]
            .iter_mut()
            .find(|log| log.name.eq_ignore_ascii_case(name))
    }

    /// Inserts an empty, limitless `Log` if none exists for `name`, then
    /// returns it. An `add` against a freshly inserted log is an error
    /// condition the caller (`HistoryStore::add`) is responsible for
    /// handling (§4.1).
    pub fn find_or_insert(&mut self, name: &str) -> &mut Log {
        let idx = self.bucket_index(name);
        if let Some(pos) = self.buckets[idx]
            .iter()
            .position(|log| log.name.eq_ignore_ascii_case(name))
        {
            return &mut self.buckets[idx][pos];
        }
        self.buckets[idx].push(Log::new(name));
        self.buckets[idx].last_mut().expect("just pushed")
    }

    /// Removes and returns the log for `name`, if any. The caller is
    /// responsible for any on-disk cleanup before or after removal.
    pub fn remove(&mut self, name: &str) -> Option<Log> {
        let idx = self.bucket_index(name);
        let pos = self.buckets[idx]
            .iter()
            .position(|log| log.name.eq_ignore_ascii_case(name))?;
        Some(self.buckets[idx].swap_remove(pos))
    }

    pub fn bucket_mut(&mut self, i: usize) -> &mut Vec<Log> {
        &mut self.buckets[i % BUCKETS]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Log> {
        self.buckets.iter().flatten()
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_lookup() {
        let mut store = ObjectStore::new();
        store.find_or_insert("#FOO").set_limit(10, 3600, 0);
        assert!(store.find("#foo").is_some());
        assert!(store.find("#FOO").is_some());
        assert!(store.find("#bar").is_none());
    }

    #[test]
    fn find_or_insert_is_idempotent() {
        let mut store = ObjectStore::new();
        store.find_or_insert("#a").set_limit(5, 10, 0);
        store.find_or_insert("#a");
        assert_eq!(store.iter().count(), 1);
    }

    #[test]
    fn remove_drops_the_log() {
        let mut store = ObjectStore::new();
        store.find_or_insert("#a");
        assert!(store.remove("#a").is_some());
        assert!(store.find("#a").is_none());
        assert!(store.remove("#a").is_none());
    }
}
