//! [`ConcurrencyManager`]: the entry point for the prefix transaction
//! manager (spec §4.3) — opens/closes prefixes by name, and hands out
//! [`AtomicSession`], [`LockedSession`] and [`Snapshot`] handles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dbzero_core::{DbZeroError, DbZeroResult, Limits};
use parking_lot::Mutex;

use crate::autocommit::AutocommitTicker;
use crate::prefix::PrefixHandle;
use crate::session::{AtomicSession, LockedSession, Snapshot};
use crate::state::Lifecycle;

/// Coordinates every open prefix under one data directory.
///
/// One `ConcurrencyManager` per `dbzero-engine::Engine` instance (spec's
/// "no global state" directive, see `dbzero-engine`'s `init`/`close`
/// lifecycle): nothing here is a process-wide singleton.
pub struct ConcurrencyManager {
    dir: PathBuf,
    limits: Limits,
    prefixes: DashMap<String, Arc<PrefixHandle>>,
    /// Guards `begin_locked`: only one locked session may be under
    /// construction at a time, closing the window where two callers both
    /// see "no conflicting lock yet" and both proceed.
    locked_gate: Mutex<()>,
    autocommit: Mutex<Option<AutocommitTicker>>,
}

impl ConcurrencyManager {
    /// A manager rooted at `dir`, using `limits` for any prefix it has to
    /// create from scratch.
    pub fn new(dir: impl Into<PathBuf>, limits: Limits) -> Self {
        Self {
            dir: dir.into(),
            limits,
            prefixes: DashMap::new(),
            locked_gate: Mutex::new(()),
            autocommit: Mutex::new(None),
        }
    }

    fn prefix_dir(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Open `name` for reading or writing, creating its on-disk store on
    /// first use and recovering it from the metaio log on subsequent
    /// opens.
    pub fn open(&self, name: &str, writable: bool) -> DbZeroResult<Arc<PrefixHandle>> {
        let handle = match self.prefixes.get(name) {
            Some(existing) => Arc::clone(&existing),
            None => {
                let dir = self.prefix_dir(name);
                let handle = if dir.join("base.dat").exists() {
                    Arc::new(PrefixHandle::recover(&dir, name)?)
                } else {
                    Arc::new(PrefixHandle::create(&dir, name, &self.limits)?)
                };
                self.prefixes.insert(name.to_string(), Arc::clone(&handle));
                handle
            }
        };
        handle.open(writable)?;
        Ok(handle)
    }

    /// Close `name`. The handle remains registered (so a subsequent
    /// `open` reuses it) but its lifecycle returns to `closed`.
    pub fn close(&self, name: &str) -> DbZeroResult<()> {
        self.lookup(name)?.close()
    }

    fn lookup(&self, name: &str) -> DbZeroResult<Arc<PrefixHandle>> {
        self.prefixes
            .get(name)
            .map(|e| Arc::clone(&e))
            .ok_or_else(|| DbZeroError::InvalidState {
                reason: format!("prefix '{name}' is not open"),
            })
    }

    /// Begin an atomic section over one prefix (spec §4.3).
    pub fn begin_atomic(&self, name: &str) -> DbZeroResult<AtomicSession> {
        AtomicSession::begin(self.lookup(name)?)
    }

    /// Begin a locked session over every currently open writable prefix
    /// (spec §4.3: `begin_locked` "acquires a per-process exclusive lock
    /// over all currently open writable prefixes").
    pub fn begin_locked(&self) -> DbZeroResult<LockedSession> {
        let _gate = self.locked_gate.lock();
        let writable: Vec<Arc<PrefixHandle>> = self
            .prefixes
            .iter()
            .map(|e| Arc::clone(e.value()))
            .filter(|p| p.lifecycle() == Lifecycle::OpenRw)
            .collect();
        LockedSession::begin(writable)
    }

    /// Create a snapshot. `pins` overrides the state a named prefix is
    /// pinned to; any open prefix not named in `pins` is pinned at its
    /// current finalized state (spec §4.3 default).
    pub fn snapshot(&self, pins: Option<HashMap<String, u64>>) -> DbZeroResult<Snapshot> {
        let mut resolved = HashMap::new();
        for entry in self.prefixes.iter() {
            let name = entry.key().clone();
            let handle = Arc::clone(entry.value());
            if handle.lifecycle() == Lifecycle::Closed {
                continue;
            }
            let state = match &pins {
                Some(overrides) => match overrides.get(&name) {
                    Some(s) => *s,
                    None => handle.pin_snapshot(),
                },
                None => handle.pin_snapshot(),
            };
            resolved.insert(name, (handle, state));
        }
        if let Some(overrides) = &pins {
            for name in overrides.keys() {
                if !resolved.contains_key(name) {
                    return Err(DbZeroError::InvalidState {
                        reason: format!("cannot snapshot '{name}': prefix is not open"),
                    });
                }
            }
        }
        Ok(Snapshot::new(resolved))
    }

    /// Block until `name` reaches `target`'s finalized state number, or
    /// `timeout` elapses.
    pub fn await_prefix_state(&self, name: &str, target: u64, timeout: Duration) -> DbZeroResult<bool> {
        self.lookup(name)?.await_state(target, timeout)
    }

    /// Start the autocommit ticker at the given interval, ticking over
    /// every currently-registered prefix. Replaces any previously running
    /// ticker.
    pub fn start_autocommit(&self, interval: Duration) {
        let prefixes = self.prefixes.clone();
        let ticker = AutocommitTicker::start(interval, move || {
            prefixes.iter().map(|e| Arc::clone(e.value())).collect()
        });
        *self.autocommit.lock() = Some(ticker);
    }

    /// Stop the autocommit ticker, if running.
    pub fn stop_autocommit(&self) {
        if let Some(ticker) = self.autocommit.lock().take() {
            ticker.stop();
        }
    }

    /// Names of every currently registered prefix (open or closed).
    pub fn known_prefixes(&self) -> Vec<String> {
        self.prefixes.iter().map(|e| e.key().clone()).collect()
    }

    /// The data directory this manager is rooted at.
    pub fn root_dir(&self) -> &Path {
        &self.dir
    }
}
