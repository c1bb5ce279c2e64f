//! A channel message history backend: a keyed set of per-object bounded
//! logs with line-count and age retention, an incremental expiry scheduler,
//! and an optional encrypted on-disk persistence layer.
//!
//! See `SPEC_FULL.md` at the workspace root for the full design.

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod host;
pub mod log;
pub mod persistence;
pub mod scheduler;
pub mod store;
pub mod tags;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{
    info,
    warn,
};

pub use crate::{
    config::Config,
    error::{
        HistoryError,
        Result,
    },
    filter::{
        HistoryFilter,
        HistoryResult,
    },
    host::{
        AlwaysPresent,
        HostObjects,
    },
    tags::MessageTag,
};
use crate::{
    clock::{
        Clock,
        SystemClock,
    },
    persistence::{
        controller,
        Salts,
    },
    scheduler::ExpiryCursor,
    store::ObjectStore,
};

struct PersistState {
    salts: Salts,
}

struct Inner {
    config: Config,
    /// Staged by `reload_config`: the new config paired with the
    /// `PersistState` it implies, applied to both `config` and `persist`
    /// atomically on the next `tick` so the two never drift apart.
    pending_config: Option<(Config, Option<PersistState>)>,
    store: ObjectStore,
    cursor: ExpiryCursor,
    persist: Option<PersistState>,
    bootstrapped: bool,
}

/// The public entry point (§4.6). One `HistoryStore` owns the hash table,
/// the expiry cursor, and the configuration record — all the "global
/// mutable state" §9 calls out — behind a single `parking_lot::Mutex` so
/// the type is `Sync` even though every method still runs to completion
/// without internal suspension (§5).
pub struct HistoryStore {
    inner: Mutex<Inner>,
    host: Arc<dyn HostObjects>,
    clock: Arc<dyn Clock>,
}

impl HistoryStore {
    /// Validates `config` and, if `persist` is on, opens or creates
    /// `master.db` (§4.5 steps 1-4) — the only disk work that can reject
    /// the boot attempt. The per-object directory scan is deferred to the
    /// first `tick()` (§4.4).
    pub fn init(config: Config, host: Arc<dyn HostObjects>) -> Result<Self> {
        Self::init_with_clock(config, host, Arc::new(SystemClock))
    }

    pub fn init_with_clock(
        config: Config,
        host: Arc<dyn HostObjects>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let persist = if config.persist {
            let secret = config
                .db_secret
                .as_ref()
                .expect("validate() rejects persist without db_secret");
            let salts = controller::boot_master(&config.directory, secret.key())?;
            Some(PersistState { salts })
        } else {
            None
        };

        Ok(Self {
            inner: Mutex::new(Inner {
                config,
                pending_config: None,
                store: ObjectStore::new(),
                cursor: ExpiryCursor::default(),
                persist,
                bootstrapped: false,
            }),
            host,
            clock,
        })
    }

    /// Stages `config` to take effect on the next `tick()` (§2a); never
    /// applied mid-sweep. Validation (and, if newly enabling persistence,
    /// the master-file open-or-create) happens now so a bad reload is
    /// rejected immediately rather than silently skipped at the next tick.
    /// The `Salts` `boot_master` returns are staged alongside the config so
    /// `tick` can swap `persist` in lockstep instead of leaving it salted
    /// against whatever directory was active before the reload.
    pub fn reload_config(&self, config: Config) -> Result<()> {
        config.validate()?;
        let persist = if config.persist {
            let secret = config
                .db_secret
                .as_ref()
                .expect("validate() rejects persist without db_secret");
            let salts = controller::boot_master(&config.directory, secret.key())?;
            Some(PersistState { salts })
        } else {
            None
        };
        self.inner.lock().pending_config = Some((config, persist));
        Ok(())
    }

    pub fn shutdown(&self) {
        info!("channel history store shutting down");
    }

    /// §4.6 `add`. Only `NoLimit` can be returned, and only if the caller
    /// never called `set_limit` first; `Log::add` already applies the
    /// release-mode default-limits degradation described in §4.2, so a
    /// `NoLimit` error here is purely informational for callers that want
    /// to log it.
    pub fn add(&self, name: &str, mtags: Vec<MessageTag>, line: impl Into<String>) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let had_limit = inner.store.find(name).is_some_and(|l| l.max_lines != 0);
        inner.store.find_or_insert(name).add(mtags, line, now);
        if !had_limit {
            return Err(HistoryError::no_limit(name));
        }
        Ok(())
    }

    /// §4.6 `request` / §4.3 filtered replay. `None` if the object has no
    /// log at all.
    pub fn request(&self, name: &str, filter: HistoryFilter) -> Option<HistoryResult> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner.store.find(name).map(|log| log.request(filter, now))
    }

    /// §4.6 `set_limit`. Creates the log if absent, then enforces the new
    /// limits immediately via `cleanup`.
    pub fn set_limit(&self, name: &str, max_lines: u32, max_time: i64) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.store.find_or_insert(name).set_limit(max_lines, max_time, now);
    }

    /// §4.6 `destroy`. Returns whether the object existed. For a persistent
    /// object, the on-disk file is unlinked immediately (§3 invariant 6).
    pub fn destroy(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(_removed) = inner.store.remove(name) else {
            return false;
        };
        if let Some(PersistState { salts }) = &inner.persist {
            controller::delete_log(&inner.config.directory, salts, name);
        }
        true
    }

    /// §4.6 `on_mode_lost(name, flag)`: the host's mode-change hook (§4.5
    /// "Mode-change hook"), called on both transitions. `flag = false`
    /// (mode lost) unlinks the on-disk file immediately but leaves the
    /// in-memory log marked dirty, so a later `flag = true` (mode restored)
    /// plus the next tick rewrites it in full. `flag = true` itself needs no
    /// immediate action: the dirty flag left over from the loss (or from
    /// any `add` since) already makes the next sweep rewrite the file.
    pub fn on_mode_lost(&self, name: &str, flag: bool) {
        if flag {
            return;
        }
        let mut inner = self.inner.lock();
        let Some(PersistState { salts }) = &inner.persist else {
            return;
        };
        let directory = inner.config.directory.clone();
        controller::delete_log(&directory, salts, name);
        if let Some(log) = inner.store.find_mut(name) {
            log.dirty = true;
        }
    }

    /// §4.4. Applies any staged config, runs the one-shot bootstrap load on
    /// the very first call, then sweeps `CLEAN_PER_LOOP` buckets: each
    /// visited log is cleaned up, and flushed to disk if dirty and
    /// persistence is on.
    pub fn tick(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if let Some((pending, persist)) = inner.pending_config.take() {
            let location_changed = pending.persist != inner.config.persist
                || pending.directory != inner.config.directory;
            inner.config = pending;
            inner.persist = persist;
            // A newly-enabled (or redirected) persistence needs its own
            // bootstrap scan; re-run it below as if this were the first tick.
            if location_changed {
                inner.bootstrapped = false;
            }
        }

        if !inner.bootstrapped {
            inner.bootstrapped = true;
            if let (true, Some(PersistState { salts })) = (inner.config.persist, &inner.persist) {
                let secret = inner
                    .config
                    .db_secret
                    .clone()
                    .expect("persist implies db_secret");
                let directory = inner.config.directory.clone();
                let salts = salts.clone();
                let host = Arc::clone(&self.host);
                if let Err(e) = controller::scan_and_load(
                    &directory,
                    secret.key(),
                    &salts,
                    host.as_ref(),
                    &mut inner.store,
                    now,
                ) {
                    warn!(error = %e, "error scanning history directory on boot");
                }
            }
        }

        let Inner {
            store,
            cursor,
            persist,
            config,
            ..
        } = &mut *inner;

        let persist_ctx = persist.as_ref().map(|p| (config.clone(), p.salts.clone()));
        let host = Arc::clone(&self.host);

        cursor.sweep(store, |log| {
            log.cleanup(now);
            if log.dirty {
                if let Some((config, salts)) = &persist_ctx {
                    if config.persist {
                        let secret = config
                            .db_secret
                            .as_ref()
                            .expect("persist implies db_secret");
                        controller::write_log(&config.directory, secret.key(), salts, host.as_ref(), log);
                    }
                }
            }
        });
    }

    pub fn describe_capability(&self) -> &'static str {
        self.inner.lock().config.describe_capability()
    }
}
