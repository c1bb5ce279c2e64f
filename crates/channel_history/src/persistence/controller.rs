//! Master-file lifecycle, per-object file naming, directory scan on boot,
//! and the atomic per-object write/delete paths (§4.5).

use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use sha2::{
    Digest,
    Sha256,
};
use sodium_secretbox::Key;
use tracing::{
    info,
    warn,
};

use super::db::{
    OpenError,
    SecretDbReader,
    SecretDbWriter,
};
use crate::{
    error::{
        HistoryError,
        Result,
    },
    host::HostObjects,
    log::Log,
    persistence::codec::{
        read_master,
        read_object_file,
        write_master,
        write_object_file,
    },
    store::ObjectStore,
};

const MASTER_FILENAME: &str = "master.db";
const QUARANTINE_DIR: &str = "bad";
const PREHASH_POSTHASH_LEN: usize = 128;

/// The two salts that, together with a lowercased object name, derive an
/// on-disk filename decoupled from the object namespace (§4.5).
#[derive(Clone, Debug)]
pub struct Salts {
    pub prehash: String,
    pub posthash: String,
}

fn gen_random_alnum(len: usize) -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

fn master_path(directory: &Path) -> PathBuf {
    directory.join(MASTER_FILENAME)
}

/// `SHA-256(prehash || " " || lowercase(name) || " " || posthash)`,
/// hex-encoded, suffixed `.db`.
pub fn object_filename(directory: &Path, salts: &Salts, name: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(salts.prehash.as_bytes());
    hasher.update(b" ");
    hasher.update(name.to_ascii_lowercase().as_bytes());
    hasher.update(b" ");
    hasher.update(salts.posthash.as_bytes());
    let hex = hex::encode(hasher.finalize());
    directory.join(format!("{hex}.db"))
}

/// Opens (or creates) `master.db`, returning the salts to use for the life
/// of this directory. Only `ConfigInvalid` can occur here; disk hiccups
/// while creating a brand-new master are also fatal since there's no
/// sensible in-memory-only degradation once persistence was requested.
pub fn boot_master(directory: &Path, secret: &Key) -> Result<Salts> {
    fs::create_dir_all(directory).map_err(|e| {
        HistoryError::config_invalid(
            "DirectoryNotCreatable",
            format!("could not create {directory:?}: {e}"),
        )
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = fs::metadata(directory) {
            let mut perms = meta.permissions();
            perms.set_mode(0o700);
            let _ = fs::set_permissions(directory, perms);
        }
    }

    let path = master_path(directory);
    match SecretDbReader::open(&path, secret) {
        Ok(mut reader) => {
            let master = read_master(&mut reader, &path)?;
            info!(version = master.version, "loaded existing history master.db");
            Ok(Salts {
                prehash: master.prehash,
                posthash: master.posthash,
            })
        },
        Err(OpenError::NotFound) => {
            info!(path = %path.display(), "no history master.db present, starting a new one");
            let salts = Salts {
                prehash: gen_random_alnum(PREHASH_POSTHASH_LEN),
                posthash: gen_random_alnum(PREHASH_POSTHASH_LEN),
            };
            let mut writer = SecretDbWriter::create(&path, secret);
            write_master(&mut writer, &salts.prehash, &salts.posthash);
            writer.close().map_err(|e| {
                HistoryError::config_invalid(
                    "MasterNotWritable",
                    format!("could not write {path:?}: {e}"),
                )
            })?;
            Ok(salts)
        },
        Err(OpenError::Other(e)) => Err(HistoryError::config_invalid(
            "MasterNotReadable",
            format!("could not open {path:?} (wrong db-secret?): {e}"),
        )),
    }
}

/// Scans `directory` for `*.db` files other than `master.db`, loading each
/// into `store` via [`Log::add`]. Per-file corruption quarantines just that
/// file; it never aborts the scan.
pub fn scan_and_load(
    directory: &Path,
    secret: &Key,
    salts: &Salts,
    host: &dyn HostObjects,
    store: &mut ObjectStore,
    now: i64,
) -> Result<()> {
    let read_dir = match fs::read_dir(directory) {
        Ok(rd) => rd,
        Err(e) => {
            return Err(HistoryError::disk_io(directory, e));
        },
    };

    for entry in read_dir {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let Some(fname) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        if fname == MASTER_FILENAME || !fname.ends_with(".db") {
            continue;
        }
        if let Err(e) = load_one(&path, secret, salts, host, store, now) {
            warn!(path = %path.display(), error = %e, "quarantining corrupt history file");
            quarantine(directory, &path);
        }
    }
    Ok(())
}

fn load_one(
    path: &Path,
    secret: &Key,
    salts: &Salts,
    host: &dyn HostObjects,
    store: &mut ObjectStore,
    now: i64,
) -> Result<()> {
    let mut reader = match SecretDbReader::open(path, secret) {
        Ok(r) => r,
        Err(OpenError::NotFound) => return Ok(()),
        Err(OpenError::Other(e)) => return Err(HistoryError::corrupt(path, e.to_string())),
    };
    let parsed = read_object_file(&mut reader, path)?;

    if parsed.prehash != salts.prehash || parsed.posthash != salts.posthash {
        warn!(
            path = %path.display(),
            "history file belongs to a different master.db generation, skipping"
        );
        return Ok(());
    }

    if !host.object_exists(&parsed.object_name) {
        warn!(object = %parsed.object_name, "object no longer exists, deleting history file");
        let _ = fs::remove_file(path);
        return Ok(());
    }

    // Live limits win over whatever was on disk (open question in §9).
    let log = store.find_or_insert(&parsed.object_name);
    if log.max_lines == 0 {
        log.set_limit(parsed.max_lines as u32, parsed.max_time as i64, now);
    }
    for entry in parsed.entries {
        log.add(entry.mtags, entry.line, entry.t);
    }
    log.dirty = false;
    Ok(())
}

fn quarantine(directory: &Path, path: &Path) {
    let bad_dir = directory.join(QUARANTINE_DIR);
    if fs::create_dir_all(&bad_dir).is_err() {
        return;
    }
    if let Some(fname) = path.file_name() {
        let dest = bad_dir.join(fname);
        let _ = fs::remove_file(&dest);
        let _ = fs::rename(path, &dest);
    }
}

/// Writes `log` to its per-object file atomically: write to `.tmp`, then
/// rename over the real file. Skips quietly if the host says the object is
/// gone or no longer persistable.
pub fn write_log(
    directory: &Path,
    secret: &Key,
    salts: &Salts,
    host: &dyn HostObjects,
    log: &mut Log,
) {
    if !host.object_exists(&log.name) || !host.object_has_history_persist_mode(&log.name) {
        return;
    }

    let real_path = object_filename(directory, salts, &log.name);
    let tmp_path = real_path.with_extension("db.tmp");

    let mut writer = SecretDbWriter::create(&tmp_path, secret);
    write_object_file(&mut writer, &salts.prehash, &salts.posthash, log);
    if let Err(e) = writer.close() {
        warn!(path = %tmp_path.display(), error = %e, "error writing history database (database not saved)");
        return;
    }

    if let Err(e) = fs::rename(&tmp_path, &real_path) {
        warn!(from = %tmp_path.display(), to = %real_path.display(), error = %e, "error renaming history database (history not saved)");
        return;
    }

    log.dirty = false;
}

/// Unlinks the per-object file immediately (§4.5 "Delete" / mode-change
/// hook). Safe to call even if the file never existed.
pub fn delete_log(directory: &Path, salts: &Salts, name: &str) {
    let path = object_filename(directory, salts, name);
    let _ = fs::remove_file(path);
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::host::AlwaysPresent;

    fn test_key() -> Key {
        Key::from_slice(&[5u8; sodium_secretbox::KEYBYTES]).unwrap()
    }

    #[test]
    fn boot_creates_master_on_first_run() {
        let dir = TempDir::new().unwrap();
        let key = test_key();
        let salts = boot_master(dir.path(), &key).unwrap();
        assert_eq!(salts.prehash.len(), PREHASH_POSTHASH_LEN);
        assert_eq!(salts.posthash.len(), PREHASH_POSTHASH_LEN);

        let reopened = boot_master(dir.path(), &key).unwrap();
        assert_eq!(reopened.prehash, salts.prehash);
        assert_eq!(reopened.posthash, salts.posthash);
    }

    #[test]
    fn boot_with_wrong_secret_is_config_invalid() {
        let dir = TempDir::new().unwrap();
        let key = test_key();
        boot_master(dir.path(), &key).unwrap();

        let wrong_key = Key::from_slice(&[6u8; sodium_secretbox::KEYBYTES]).unwrap();
        assert!(matches!(
            boot_master(dir.path(), &wrong_key),
            Err(HistoryError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn write_then_scan_round_trips() {
        let dir = TempDir::new().unwrap();
        let key = test_key();
        let salts = boot_master(dir.path(), &key).unwrap();

        let mut log = Log::new("#c");
        log.set_limit(10, 3600, 0);
        log.add(vec![], "hi", 1_700_000_000);
        log.add(vec![], "there", 1_700_000_001);

        write_log(dir.path(), &key, &salts, &AlwaysPresent, &mut log);
        assert!(!log.dirty);

        let mut store = ObjectStore::new();
        scan_and_load(dir.path(), &key, &salts, &AlwaysPresent, &mut store, 1_700_000_010).unwrap();
        let loaded = store.find("#c").unwrap();
        assert_eq!(loaded.num_lines, 2);
        assert_eq!(
            loaded.entries().map(|e| e.line.clone()).collect::<Vec<_>>(),
            vec!["hi", "there"]
        );
    }

    #[test]
    fn corrupt_file_is_quarantined_and_others_still_load() {
        let dir = TempDir::new().unwrap();
        let key = test_key();
        let salts = boot_master(dir.path(), &key).unwrap();

        let mut good = Log::new("#good");
        good.set_limit(10, 3600, 0);
        good.add(vec![], "fine", 1_700_000_000);
        write_log(dir.path(), &key, &salts, &AlwaysPresent, &mut good);

        let bad_path = object_filename(dir.path(), &salts, "#bad");
        fs::write(&bad_path, b"not a valid container at all, too short").unwrap();

        let mut store = ObjectStore::new();
        scan_and_load(dir.path(), &key, &salts, &AlwaysPresent, &mut store, 1_700_000_010).unwrap();

        assert!(store.find("#good").is_some());
        assert!(store.find("#bad").is_none());
        assert!(!bad_path.exists());
        assert!(dir.path().join(QUARANTINE_DIR).join(bad_path.file_name().unwrap()).exists());
    }

    #[test]
    fn object_not_on_host_is_deleted_during_scan() {
        struct NoneExist;
        impl HostObjects for NoneExist {
            fn object_exists(&self, _name: &str) -> bool {
                false
            }

            fn object_has_history_persist_mode(&self, _name: &str) -> bool {
                false
            }
        }

        let dir = TempDir::new().unwrap();
        let key = test_key();
        let salts = boot_master(dir.path(), &key).unwrap();

        let mut log = Log::new("#gone");
        log.set_limit(10, 3600, 0);
        log.add(vec![], "x", 1_700_000_000);
        write_log(dir.path(), &key, &salts, &AlwaysPresent, &mut log);
        let path = object_filename(dir.path(), &salts, "#gone");
        assert!(path.exists());

        let mut store = ObjectStore::new();
        scan_and_load(dir.path(), &key, &salts, &NoneExist, &mut store, 0).unwrap();
        assert!(store.find("#gone").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn delete_log_unlinks_file() {
        let dir = TempDir::new().unwrap();
        let key = test_key();
        let salts = boot_master(dir.path(), &key).unwrap();

        let mut log = Log::new("#c");
        log.set_limit(10, 3600, 0);
        log.add(vec![], "hi", 0);
        write_log(dir.path(), &key, &salts, &AlwaysPresent, &mut log);
        let path = object_filename(dir.path(), &salts, "#c");
        assert!(path.exists());

        delete_log(dir.path(), &salts, "#c");
        assert!(!path.exists());
    }
}
