use std::{
    fmt,
    path::PathBuf,
};

use sodium_secretbox::Key;

use crate::error::{
    HistoryError,
    Result,
};

/// A `db-secret` credential: a fixed-size symmetric key, hex-encoded in
/// configuration the same way the host's `keybroker::Secret` is.
#[derive(Clone)]
pub struct DbSecret(Key);

impl DbSecret {
    pub fn key(&self) -> &Key {
        &self.0
    }

    pub fn random() -> Self {
        let bytes: [u8; sodium_secretbox::KEYBYTES] = rand::random();
        Self(Key::from_slice(&bytes).expect("KEYBYTES-sized array always parses"))
    }
}

impl fmt::Debug for DbSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DbSecret(..)")
    }
}

impl TryFrom<&str> for DbSecret {
    type Error = HistoryError;

    fn try_from(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| {
            HistoryError::config_invalid("DbSecretNotHex", format!("db-secret: {e}"))
        })?;
        let key = Key::from_slice(&bytes).ok_or_else(|| {
            HistoryError::config_invalid(
                "DbSecretWrongLength",
                format!(
                    "db-secret must decode to {} bytes, got {}",
                    sodium_secretbox::KEYBYTES,
                    bytes.len()
                ),
            )
        })?;
        Ok(Self(key))
    }
}

/// Resolved configuration (§6). The host's config-file parsing is out of
/// scope; this is what's left after resolution.
#[derive(Clone, Debug)]
pub struct Config {
    pub persist: bool,
    pub directory: PathBuf,
    pub db_secret: Option<DbSecret>,
}

impl Config {
    pub fn disabled() -> Self {
        Self {
            persist: false,
            directory: PathBuf::new(),
            db_secret: None,
        }
    }

    /// §2a/§6: rejects `db-secret` without `persist`, `persist` without
    /// `db-secret`, and a directory path that isn't absolute. Whether the
    /// `db-secret` can actually open an existing master file is checked by
    /// `PersistenceController::boot`, since that requires disk access this
    /// function deliberately avoids so it stays a pure validation step.
    pub fn validate(&self) -> Result<()> {
        match (self.persist, &self.db_secret) {
            (true, None) => {
                return Err(HistoryError::config_invalid(
                    "DbSecretMissing",
                    "persist is enabled but db-secret is not set",
                ));
            },
            (false, Some(_)) => {
                return Err(HistoryError::config_invalid(
                    "DbSecretWithoutPersist",
                    "db-secret is set but persist is disabled",
                ));
            },
            _ => {},
        }
        if self.persist && !self.directory.is_absolute() {
            return Err(HistoryError::config_invalid(
                "DirectoryNotAbsolute",
                format!("history directory {:?} must be absolute", self.directory),
            ));
        }
        Ok(())
    }

    /// `"memory"` or `"memory,disk=encrypted"` (§6).
    pub fn describe_capability(&self) -> &'static str {
        if self.persist {
            "memory,disk=encrypted"
        } else {
            "memory"
        }
    }
}
