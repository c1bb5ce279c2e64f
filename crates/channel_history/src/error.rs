use std::path::PathBuf;

/// Crate-wide error type. Only [`HistoryError::ConfigInvalid`] is fatal; every
/// other variant is recovered locally by the caller (see module docs on
/// [`crate::persistence`]).
#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    /// Inconsistent configuration, an unreadable directory, a `db_secret`
    /// that can't open an existing master file, or an unsupported master
    /// file version. Fatal at `init`/`reload_config`.
    #[error("invalid history configuration: {msg}")]
    ConfigInvalid {
        /// ScreamingCamelCase tag, stable for tests and log filtering.
        short_msg: &'static str,
        msg: String,
    },

    /// `add` against an object whose limits were never set.
    #[error("history object {object:?} has no limit set")]
    NoLimit { object: String },

    /// Failure opening, writing, renaming, or deleting a file.
    #[error("history disk I/O error on {path}: {source}")]
    DiskIO {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Magic number or structural mismatch while reading a file.
    #[error("corrupt history file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl HistoryError {
    pub fn config_invalid(short_msg: &'static str, msg: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            short_msg,
            msg: msg.into(),
        }
    }

    pub fn no_limit(object: impl Into<String>) -> Self {
        Self::NoLimit {
            object: object.into(),
        }
    }

    pub fn disk_io(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        Self::DiskIO {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for the handful of kinds that are recovered locally rather than
    /// propagated to the caller (§7: DiskIO and Corrupt).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DiskIO { .. } | Self::Corrupt { .. })
    }
}

pub type Result<T> = std::result::Result<T, HistoryError>;
