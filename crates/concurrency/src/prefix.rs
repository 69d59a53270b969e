//! Per-prefix runtime state (spec §4.3, §5): the lifecycle, the dirty
//! cache, the commit path, and the waiter registry backing
//! `await_prefix_state`.
//!
//! Grounded on the teacher's `TransactionManager` (atomic version counter
//! plus a per-branch commit lock to close the TOCTOU window between
//! validation and apply); here there is no separate validation phase
//! (DBZero has a single writer per prefix), so the commit lock simply
//! serializes the drain-and-apply sequence against concurrent commit
//! attempts (e.g. an explicit commit racing the autocommit ticker).

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dbzero_core::{DbZeroError, DbZeroResult, Limits, PageStore, PrefixUuid};
use dbzero_durability::PageFile;
use dbzero_storage::{CommitSink, DirtyCache};
use parking_lot::{Condvar, Mutex};

use crate::state::Lifecycle;

/// Runtime for one open prefix: lifecycle, dirty cache, durable store and
/// the waiter registry that backs `await_prefix_state`.
pub struct PrefixHandle {
    name: String,
    store: Arc<PageFile>,
    dirty: DirtyCache,
    lifecycle: Mutex<Lifecycle>,
    commit_lock: Mutex<()>,
    atomic_depth: AtomicU32,
    locked: AtomicBool,
    snapshot_holds: AtomicU64,
    state_changed: Mutex<()>,
    waiters: Condvar,
}

impl PrefixHandle {
    /// Open (or create) the on-disk store for `name` under `dir` and wrap
    /// it in a fresh, closed runtime handle.
    pub fn create(dir: &Path, name: impl Into<String>, limits: &Limits) -> DbZeroResult<Self> {
        let name = name.into();
        let prefix = PrefixUuid::from_name(&name);
        Self::from_store(name, Arc::new(PageFile::create(dir, prefix, limits)?))
    }

    /// Recover an existing on-disk store under `dir`.
    pub fn recover(dir: &Path, name: impl Into<String>) -> DbZeroResult<Self> {
        Self::from_store(name.into(), Arc::new(PageFile::recover(dir)?))
    }

    fn from_store(name: String, store: Arc<PageFile>) -> DbZeroResult<Self> {
        Ok(Self {
            name,
            store,
            dirty: DirtyCache::new(),
            lifecycle: Mutex::new(Lifecycle::Closed),
            commit_lock: Mutex::new(()),
            atomic_depth: AtomicU32::new(0),
            locked: AtomicBool::new(false),
            snapshot_holds: AtomicU64::new(0),
            state_changed: Mutex::new(()),
            waiters: Condvar::new(),
        })
    }

    /// The prefix's name, as given to `open`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The prefix's durable identity.
    pub fn uuid(&self) -> PrefixUuid {
        self.store.prefix()
    }

    /// Current base lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    /// Transition `closed -> open-read | open-rw`.
    pub fn open(&self, writable: bool) -> DbZeroResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        *lifecycle = lifecycle.validate_open(writable)?;
        Ok(())
    }

    /// Close the prefix. Rejected while an atomic section, locked
    /// session, or snapshot hold is outstanding.
    pub fn close(&self) -> DbZeroResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.validate_close()?;
        if self.atomic_depth.load(Ordering::SeqCst) > 0 {
            return Err(DbZeroError::InvalidState {
                reason: "cannot close prefix with an open atomic section".to_string(),
            });
        }
        if self.locked.load(Ordering::SeqCst) {
            return Err(DbZeroError::InvalidState {
                reason: "cannot close prefix while a locked session holds it".to_string(),
            });
        }
        if self.snapshot_holds.load(Ordering::SeqCst) > 0 {
            return Err(DbZeroError::InvalidState {
                reason: "cannot close prefix with outstanding snapshot holds".to_string(),
            });
        }
        *lifecycle = Lifecycle::Closed;
        Ok(())
    }

    /// Current finalized state number, visible to new readers.
    pub fn state_num(&self) -> u64 {
        self.store.current_state_num()
    }

    /// The state number a commit right now would produce.
    pub fn pending_state_num(&self) -> u64 {
        self.state_num() + 1
    }

    fn require_writable(&self) -> DbZeroResult<()> {
        if !self.lifecycle().allows_write() {
            return Err(DbZeroError::InvalidState {
                reason: format!("prefix {} is not open for writing", self.name),
            });
        }
        Ok(())
    }

    /// Enter an atomic section. Nestable: depth is tracked so the
    /// innermost `close`/`cancel` only affects its own scope is NOT
    /// supported here (spec §4.3: cancel reverts the whole dirty cache),
    /// but nested `begin_atomic` calls are still counted so `close` can
    /// refuse to leave the prefix mid-section.
    pub fn begin_atomic(&self) -> DbZeroResult<()> {
        self.require_writable()?;
        self.atomic_depth.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Roll back every dirty page to its pre-transaction image and leave
    /// the atomic section (spec §4.3: "including reverting newly observed
    /// classes, so that type creation is also undone" — callers layered
    /// on top of the dirty cache, e.g. `dbzero-objects`, must route class
    /// registration through the same dirty-page mechanism for this to
    /// hold).
    pub fn cancel_atomic(&self) {
        self.dirty.rollback_all();
        self.atomic_depth.fetch_sub(1, Ordering::SeqCst);
    }

    /// Read a page, preferring the in-flight dirty image if this prefix
    /// has an open write transaction touching it.
    pub fn read_dp(&self, dp_id: u64) -> DbZeroResult<Option<Vec<u8>>> {
        if let Some(bytes) = self.dirty.read(dp_id) {
            return Ok(Some(bytes));
        }
        self.store.read_page(dp_id)
    }

    /// Read a page as of a specific finalized state (snapshot-bound read,
    /// bypassing the dirty cache entirely).
    pub fn read_dp_at(&self, dp_id: u64, state_num: u64) -> DbZeroResult<Option<Vec<u8>>> {
        self.store.read_page_at(dp_id, state_num)
    }

    /// Stage a write. `base` is the page's current durable bytes, used to
    /// seed the dirty entry the first time this DP is touched.
    pub fn write_dp(&self, dp_id: u64, base: Vec<u8>, bytes: Vec<u8>) -> DbZeroResult<()> {
        self.require_writable()?;
        self.dirty.touch(dp_id, base);
        self.dirty.write(dp_id, bytes)
    }

    /// Number of pages currently dirty (spec §4.3: autocommit only fires
    /// "if the dirty cache is non-empty").
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Flush the dirty cache to the durable store and advance the
    /// finalized state number. A no-op (returns the current state number
    /// unchanged) if nothing is dirty.
    pub fn commit(&self) -> DbZeroResult<u64> {
        let _guard = self.commit_lock.lock();
        if self.dirty.is_empty() {
            return Ok(self.state_num());
        }
        let new_state = self.state_num() + 1;
        for (dp_id, action) in self.dirty.drain_for_commit() {
            self.store.commit_dp(dp_id, new_state, action)?;
        }
        if self.atomic_depth.load(Ordering::SeqCst) > 0 {
            self.atomic_depth.fetch_sub(1, Ordering::SeqCst);
        }
        let _notify = self.state_changed.lock();
        self.waiters.notify_all();
        tracing::debug!(prefix = %self.name, state_num = new_state, "prefix committed");
        Ok(new_state)
    }

    /// Mark this prefix as held by a locked session. Rejected if it is
    /// already locked (one locked session at a time per prefix).
    pub fn mark_locked(&self) -> DbZeroResult<()> {
        if self.locked.swap(true, Ordering::SeqCst) {
            return Err(DbZeroError::InvalidState {
                reason: format!("prefix {} is already held by a locked session", self.name),
            });
        }
        Ok(())
    }

    /// Release the locked-session hold.
    pub fn unmark_locked(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    /// Whether a locked session currently holds this prefix.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Whether this prefix is free to autocommit: writable, not inside an
    /// atomic section, and not held by a locked session (spec §4.3:
    /// "suppressed while any atomic, locked, or mutation session is
    /// active").
    pub fn autocommit_eligible(&self) -> bool {
        self.lifecycle().allows_write()
            && self.atomic_depth.load(Ordering::SeqCst) == 0
            && !self.locked.load(Ordering::SeqCst)
    }

    /// Pin a snapshot hold at the current finalized state, returning that
    /// state number.
    pub fn pin_snapshot(&self) -> u64 {
        self.snapshot_holds.fetch_add(1, Ordering::SeqCst);
        self.state_num()
    }

    /// Release a snapshot hold taken via [`Self::pin_snapshot`].
    pub fn unpin_snapshot(&self) {
        self.snapshot_holds.fetch_sub(1, Ordering::SeqCst);
    }

    /// Block the calling thread until `target` is reached, or `timeout`
    /// elapses. Returns `Ok(true)` if reached, `Ok(false)` on timeout.
    pub fn await_state(&self, target: u64, timeout: Duration) -> DbZeroResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state_changed.lock();
        while self.state_num() < target {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let remaining = deadline - now;
            let result = self.waiters.wait_for(&mut guard, remaining);
            if result.timed_out() && self.state_num() < target {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Direct access to the durable store, for callers (e.g. the engine's
    /// recovery path, or tooling) that need the `PageStore` seam.
    pub fn store(&self) -> &Arc<PageFile> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    fn limits() -> Limits {
        Limits::new(1 << 20, 64, 4096).unwrap()
    }

    #[test]
    fn open_then_write_then_commit_advances_state() {
        let dir = tempdir().unwrap();
        let handle = PrefixHandle::create(dir.path(), "p", &limits()).unwrap();
        handle.open(true).unwrap();
        handle.write_dp(0, vec![0u8; 64], vec![1u8; 64]).unwrap();
        assert_eq!(handle.commit().unwrap(), 1);
        assert_eq!(handle.state_num(), 1);
    }

    #[test]
    fn commit_with_nothing_dirty_is_a_no_op() {
        let dir = tempdir().unwrap();
        let handle = PrefixHandle::create(dir.path(), "p", &limits()).unwrap();
        handle.open(true).unwrap();
        assert_eq!(handle.commit().unwrap(), 0);
    }

    #[test]
    fn write_on_read_only_prefix_is_rejected() {
        let dir = tempdir().unwrap();
        let handle = PrefixHandle::create(dir.path(), "p", &limits()).unwrap();
        handle.open(false).unwrap();
        assert!(handle.write_dp(0, vec![], vec![1]).is_err());
    }

    #[test]
    fn cancel_atomic_discards_dirty_writes() {
        let dir = tempdir().unwrap();
        let handle = PrefixHandle::create(dir.path(), "p", &limits()).unwrap();
        handle.open(true).unwrap();
        handle.begin_atomic().unwrap();
        handle.write_dp(0, vec![0u8; 64], vec![9u8; 64]).unwrap();
        handle.cancel_atomic();
        assert_eq!(handle.dirty_len(), 0);
        assert_eq!(handle.commit().unwrap(), 0);
    }

    #[test]
    fn close_rejects_while_atomic_section_open() {
        let dir = tempdir().unwrap();
        let handle = PrefixHandle::create(dir.path(), "p", &limits()).unwrap();
        handle.open(true).unwrap();
        handle.begin_atomic().unwrap();
        assert!(handle.close().is_err());
    }

    #[test]
    fn mark_locked_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let handle = PrefixHandle::create(dir.path(), "p", &limits()).unwrap();
        handle.mark_locked().unwrap();
        assert!(handle.mark_locked().is_err());
        handle.unmark_locked();
        handle.mark_locked().unwrap();
    }

    #[test]
    fn autocommit_is_suppressed_during_atomic_or_locked() {
        let dir = tempdir().unwrap();
        let handle = PrefixHandle::create(dir.path(), "p", &limits()).unwrap();
        handle.open(true).unwrap();
        assert!(handle.autocommit_eligible());
        handle.begin_atomic().unwrap();
        assert!(!handle.autocommit_eligible());
        handle.cancel_atomic();
        handle.mark_locked().unwrap();
        assert!(!handle.autocommit_eligible());
    }

    #[test]
    fn await_state_wakes_on_commit_from_another_thread() {
        let dir = tempdir().unwrap();
        let handle = Arc::new(PrefixHandle::create(dir.path(), "p", &limits()).unwrap());
        handle.open(true).unwrap();

        let writer = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                handle.write_dp(0, vec![0u8; 64], vec![1u8; 64]).unwrap();
                handle.commit().unwrap();
            })
        };

        let reached = handle.await_state(1, Duration::from_secs(2)).unwrap();
        writer.join().unwrap();
        assert!(reached);
    }

    #[test]
    fn await_state_times_out_if_never_reached() {
        let dir = tempdir().unwrap();
        let handle = PrefixHandle::create(dir.path(), "p", &limits()).unwrap();
        handle.open(true).unwrap();
        assert_eq!(handle.await_state(5, Duration::from_millis(30)).unwrap(), false);
    }

    proptest::proptest! {
        #[test]
        fn commits_advance_state_num_by_exactly_one_per_dirty_commit(
            writes in proptest::collection::vec(proptest::collection::vec(0u8..=255, 64), 1..8)
        ) {
            let dir = tempdir().unwrap();
            let handle = PrefixHandle::create(dir.path(), "p", &limits()).unwrap();
            handle.open(true).unwrap();
            let mut expected = 0u64;
            for bytes in writes {
                handle.write_dp(0, vec![0u8; 64], bytes).unwrap();
                let before = handle.state_num();
                let after = handle.commit().unwrap();
                prop_assert_eq!(after, before + 1);
                expected += 1;
                prop_assert_eq!(handle.state_num(), expected);
            }
        }
    }
}
