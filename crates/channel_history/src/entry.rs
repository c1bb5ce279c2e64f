use crate::tags::MessageTag;

/// One stored message. Owned by exactly one [`crate::log::Log`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Seconds since the Unix epoch, taken from the `time` message tag.
    pub t: i64,
    pub line: String,
    pub mtags: Vec<MessageTag>,
}

impl Entry {
    pub fn new(t: i64, line: impl Into<String>, mtags: Vec<MessageTag>) -> Self {
        Self {
            t,
            line: line.into(),
            mtags,
        }
    }
}
