use crate::store::{
    ObjectStore,
    BUCKETS,
};

/// How many disjoint ticks it takes to sweep the whole table once. Higher
/// spreads more, lower catches up faster.
pub const SPREAD: usize = 60;

/// Worst-case staleness, in seconds, for age-based expiry: a log can live
/// this long past `max_time` before a sweep notices.
pub const MAX_OFF_SECS: i64 = 300;

/// Buckets visited per tick, rounded up so the table is fully covered in
/// at most `SPREAD` ticks even when `BUCKETS` doesn't divide evenly.
pub const CLEAN_PER_LOOP: usize = BUCKETS.div_ceil(SPREAD);

/// Seconds between ticks the host should schedule, derived from the same
/// two constants above.
pub const TIMER_EVERY_SECS: i64 = MAX_OFF_SECS / SPREAD as i64;

/// Tracks where the next tick should resume sweeping. A field on the
/// context, not a process-wide static, so multiple `HistoryStore`s (e.g. in
/// tests) don't share a cursor.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExpiryCursor {
    next_bucket: usize,
}

impl ExpiryCursor {
    /// Visits up to `CLEAN_PER_LOOP` buckets starting from wherever the
    /// last call left off, calling `per_log` on every `Log` found. Wraps
    /// modulo `BUCKETS`. Guarantees full coverage in at most `SPREAD` calls
    /// (the cursor-coverage property, §8 property 7).
    pub fn sweep(&mut self, store: &mut ObjectStore, mut per_log: impl FnMut(&mut crate::log::Log)) {
        for _ in 0..CLEAN_PER_LOOP {
            for log in store.bucket_mut(self.next_bucket) {
                per_log(log);
            }
            self.next_bucket = (self.next_bucket + 1) % BUCKETS;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Log;

    #[test]
    fn cursor_covers_every_bucket_within_spread_ticks() {
        let mut store = ObjectStore::new();
        for i in 0..200 {
            store.find_or_insert(&format!("obj{i}")).set_limit(10, 3600, 0);
        }

        let mut cursor = ExpiryCursor::default();
        let mut visited = std::collections::HashSet::new();
        for _ in 0..SPREAD {
            let mut touched_this_tick = Vec::new();
            cursor.sweep(&mut store, |log: &mut Log| touched_this_tick.push(log.name.clone()));
            visited.extend(touched_this_tick);
        }
        assert_eq!(visited.len(), 200);
    }

    #[test]
    fn sweep_cleans_up_each_visited_log() {
        let mut store = ObjectStore::new();
        store.find_or_insert("a").set_limit(100, 10, 1000);
        store.find_or_insert("a").add(vec![], "x1", 1000);

        let mut cursor = ExpiryCursor::default();
        for _ in 0..SPREAD {
            cursor.sweep(&mut store, |log: &mut Log| log.cleanup(1020));
        }
        assert_eq!(store.find("a").unwrap().num_lines, 0);
    }
}
