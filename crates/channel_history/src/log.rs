use std::collections::VecDeque;

use tracing::warn;

use crate::{
    clock::{
        format_rfc3339_millis,
        parse_rfc3339_to_unix_secs,
    },
    entry::Entry,
    tags::{
        find_tag,
        MessageTag,
    },
};

/// Release-mode fallback limits applied when `add` is called before
/// `set_limit` (§4.2's "contract for invalid state").
pub const DEFAULT_MAX_LINES: u32 = 50;
pub const DEFAULT_MAX_TIME: i64 = 86_400;

/// One object's history: a bounded, doubly-ended sequence of [`Entry`]
/// plus the cached accounting (`num_lines`, `oldest_t`) that makes
/// `cleanup` amortized O(n) instead of O(n^2) over repeated ticks.
///
/// A `VecDeque` gives O(1) push-front/pop-back access without hand-rolled
/// intrusive linkage.
#[derive(Debug)]
pub struct Log {
    pub name: String,
    entries: VecDeque<Entry>,
    pub num_lines: u32,
    /// Earliest `t` among `entries`, or 0 when empty/unknown (§3 invariant 2).
    pub oldest_t: i64,
    pub max_lines: u32,
    pub max_time: i64,
    pub dirty: bool,
}

impl Log {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: VecDeque::new(),
            num_lines: 0,
            oldest_t: 0,
            max_lines: 0,
            max_time: 0,
            dirty: false,
        }
    }

    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deep-copies `mtags`, synthesizes a `time` tag if none is present,
    /// appends the resulting entry, and evicts the head entry if the log is
    /// now over its line limit. Limits of zero degrade to defaults in
    /// release builds and are a contract violation the caller should catch
    /// with `set_limit` first.
    pub fn add(&mut self, mut mtags: Vec<MessageTag>, line: impl Into<String>, now: i64) {
        if self.max_lines == 0 {
            debug_assert!(
                false,
                "add() on history object {:?} with no limit set",
                self.name
            );
            warn!(object = %self.name, "add() with no limit set, defaulting to {DEFAULT_MAX_LINES} lines / {DEFAULT_MAX_TIME}s");
            self.max_lines = DEFAULT_MAX_LINES;
            self.max_time = DEFAULT_MAX_TIME;
        }

        let t = match find_tag(&mtags, "time") {
            Some(tag) => tag
                .value
                .as_deref()
                .and_then(parse_rfc3339_to_unix_secs)
                .unwrap_or(now),
            None => {
                let synthesized = format_rfc3339_millis(now);
                mtags.push(MessageTag::new("time", Some(synthesized)));
                now
            },
        };

        self.entries.push_back(Entry::new(t, line, mtags));
        self.num_lines += 1;
        if self.oldest_t == 0 || t < self.oldest_t {
            self.oldest_t = t;
        }
        self.dirty = true;

        if self.num_lines > self.max_lines {
            self.entries.pop_front();
            self.num_lines -= 1;
            // oldest_t is stale until the next cleanup() pass; acceptable
            // per §3 invariant 2's "transiently invalidated" allowance.
        }
    }

    /// Two-pass expiry: age first, then count, each independent so a log
    /// that's only over-aged doesn't pay the scan for count enforcement.
    pub fn cleanup(&mut self, now: i64) {
        let redline = now - self.max_time;

        if self.oldest_t != 0 && self.oldest_t < redline {
            self.oldest_t = 0;
            let before = self.entries.len();
            self.entries.retain(|e| e.t >= redline);
            if self.entries.len() != before {
                self.dirty = true;
            }
            self.num_lines = self.entries.len() as u32;
            self.recompute_oldest_t();
        }

        if self.num_lines > self.max_lines {
            self.oldest_t = 0;
            let excess = (self.num_lines - self.max_lines) as usize;
            for _ in 0..excess {
                self.entries.pop_front();
            }
            self.num_lines = self.entries.len() as u32;
            self.recompute_oldest_t();
            self.dirty = true;
        }
    }

    fn recompute_oldest_t(&mut self) {
        self.oldest_t = self.entries.iter().map(|e| e.t).min().unwrap_or(0);
    }

    /// Overwrites the limits and immediately enforces them.
    pub fn set_limit(&mut self, max_lines: u32, max_time: i64, now: i64) {
        self.max_lines = max_lines;
        self.max_time = max_time;
        self.dirty = true;
        self.cleanup(now);
    }
}
