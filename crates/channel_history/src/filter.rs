use crate::{
    entry::Entry,
    log::Log,
};

/// Constraints a caller can apply to tighten a replay request beyond the
/// log's own limits. A filter can only tighten, never loosen: `last_seconds`
/// and `last_lines` compose with `Log::max_time`/`max_lines` via `min`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub last_seconds: Option<i64>,
    pub last_lines: Option<u32>,
}

/// The result of a [`Log::request`](crate::log::Log)-style replay: a
/// deep-copied, oldest-first slice the caller owns outright.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryResult {
    pub object: String,
    pub entries: Vec<Entry>,
}

impl Log {
    /// Two-pass filtered replay (§4.3). The first pass counts how many
    /// entries satisfy the age bound; the second emits the suffix of those
    /// that also satisfies `last_lines`. Collapsing to one pass would
    /// either require buffering the whole candidate set or skip the wrong
    /// entries when `last_lines` is tighter than the age window.
    pub fn request(&self, filter: HistoryFilter, now: i64) -> HistoryResult {
        let age_bound = filter.last_seconds.unwrap_or(i64::MAX).min(self.max_time);
        let redline = now.saturating_sub(age_bound);

        let lines_sendable = self.entries().filter(|e| e.t >= redline).count();
        let lines_to_skip = match filter.last_lines {
            Some(last_lines) => lines_sendable.saturating_sub(last_lines as usize),
            None => 0,
        };

        let entries = self
            .entries()
            .filter(|e| e.t >= redline)
            .skip(lines_to_skip)
            .cloned()
            .collect();

        HistoryResult {
            object: self.name.clone(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::MessageTag;

    fn add_at(log: &mut Log, t: i64, line: &str) {
        log.add(
            vec![MessageTag::new("time", Some(crate::clock::format_rfc3339_millis(t)))],
            line,
            t,
        );
    }

    #[test]
    fn filter_tighter_than_log() {
        let mut log = Log::new("a");
        log.set_limit(100, 3600, 0);
        let now = 1000;
        for i in 0..20 {
            add_at(&mut log, now - 10 + i, &format!("x{i}"));
        }
        let result = log.request(
            HistoryFilter {
                last_seconds: Some(5),
                last_lines: Some(3),
            },
            now,
        );
        assert_eq!(result.entries.len(), 3);
        for e in &result.entries {
            assert!(e.t >= now - 5);
        }
    }

    #[test]
    fn no_filter_returns_everything() {
        let mut log = Log::new("a");
        log.set_limit(10, 3600, 0);
        for i in 0..5 {
            add_at(&mut log, 100 + i, &format!("x{i}"));
        }
        let result = log.request(HistoryFilter::default(), 200);
        assert_eq!(result.entries.len(), 5);
        assert_eq!(result.entries.first().unwrap().line, "x0");
        assert_eq!(result.entries.last().unwrap().line, "x4");
    }

    #[test]
    fn empty_log_after_expiry_returns_nothing() {
        let mut log = Log::new("a");
        log.set_limit(100, 10, 1000);
        add_at(&mut log, 1000, "x1");
        add_at(&mut log, 1005, "x2");
        log.cleanup(1020);
        let result = log.request(HistoryFilter::default(), 1020);
        assert!(result.entries.is_empty());
    }
}
