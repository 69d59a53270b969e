//! RAII session types layered on [`crate::prefix::PrefixHandle`] (spec
//! §4.3): atomic sections, locked sessions, and snapshots.
//!
//! Grounded on the RAII close/cancel shape used by the original
//! `dbzero_ce.atomic` and `dbzero.locked` context managers: a session is
//! opened, mutated against, and then either `close()`d (commit) or
//! `cancel()`ed (rollback) exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use dbzero_core::{DbZeroError, DbZeroResult, PrefixUuid};

use crate::mutation_log::MutationLog;
use crate::prefix::PrefixHandle;

/// A scoped atomic section over one prefix (spec §4.3: `begin_atomic()` /
/// `ctx.close()` / `ctx.cancel()`).
///
/// Must be consumed via [`Self::close`] or [`Self::cancel`]; dropping it
/// without calling either is treated as an implicit cancel, so a panic
/// mid-section cannot leave the dirty cache half-written.
pub struct AtomicSession {
    prefix: Arc<PrefixHandle>,
    finished: bool,
}

impl AtomicSession {
    pub(crate) fn begin(prefix: Arc<PrefixHandle>) -> DbZeroResult<Self> {
        prefix.begin_atomic()?;
        Ok(Self {
            prefix,
            finished: false,
        })
    }

    /// Commit the section's writes.
    pub fn close(mut self) -> DbZeroResult<u64> {
        self.finished = true;
        self.prefix.commit()
    }

    /// Roll back the section's writes, including any newly observed
    /// classes staged alongside the dirty pages (spec §4.3).
    pub fn cancel(mut self) {
        self.finished = true;
        self.prefix.cancel_atomic();
    }
}

impl Drop for AtomicSession {
    fn drop(&mut self) {
        if !self.finished {
            self.prefix.cancel_atomic();
        }
    }
}

/// A locked session spanning every currently open writable prefix (spec
/// §4.3: `begin_locked()` / `ctx.close()` / `ctx.get_mutation_log()`).
/// Atomic sections may nest inside one; on close, the accumulated
/// mutation log is returned.
pub struct LockedSession {
    prefixes: Vec<Arc<PrefixHandle>>,
    log: MutationLog,
    finished: bool,
}

impl LockedSession {
    pub(crate) fn begin(prefixes: Vec<Arc<PrefixHandle>>) -> DbZeroResult<Self> {
        let mut locked: Vec<&Arc<PrefixHandle>> = Vec::with_capacity(prefixes.len());
        for prefix in &prefixes {
            if let Err(e) = prefix.mark_locked() {
                for done in &locked {
                    done.unmark_locked();
                }
                return Err(e);
            }
            locked.push(prefix);
        }
        Ok(Self {
            prefixes,
            log: MutationLog::new(),
            finished: false,
        })
    }

    /// Commit every prefix's pending writes, in the order they were
    /// registered, recording each advance in the mutation log.
    pub fn close(mut self) -> DbZeroResult<MutationLog> {
        self.finished = true;
        for prefix in &self.prefixes {
            let before = prefix.state_num();
            let after = prefix.commit()?;
            if after != before {
                self.log.push(prefix.name(), after);
            }
        }
        for prefix in &self.prefixes {
            prefix.unmark_locked();
        }
        Ok(std::mem::take(&mut self.log))
    }

    /// The mutation log accumulated so far, without closing the session.
    pub fn mutation_log(&self) -> &MutationLog {
        &self.log
    }
}

impl Drop for LockedSession {
    fn drop(&mut self) {
        if !self.finished {
            for prefix in &self.prefixes {
                prefix.unmark_locked();
            }
        }
    }
}

/// A pinned, multi-prefix read view (spec §3, "Snapshot"). Holds each
/// named prefix to the finalized state number it had when the snapshot
/// was taken; closing (dropping) it releases those holds.
///
/// `fetch`/`find`/`deserialize` are intentionally not implemented here:
/// they interpret object bytes, which is `dbzero-objects`'/`dbzero-query`'s
/// job. This type is their storage-level foundation — `get_state_num` and
/// `read` are the primitives those layers bind against.
pub struct Snapshot {
    pins: HashMap<String, (Arc<PrefixHandle>, u64)>,
}

impl Snapshot {
    pub(crate) fn new(pins: HashMap<String, (Arc<PrefixHandle>, u64)>) -> Self {
        Self { pins }
    }

    /// The finalized state number this snapshot pinned `prefix_name` to.
    pub fn get_state_num(&self, prefix_name: &str) -> DbZeroResult<u64> {
        self.pins
            .get(prefix_name)
            .map(|(_, state)| *state)
            .ok_or_else(|| DbZeroError::InvalidState {
                reason: format!("snapshot does not pin prefix '{prefix_name}'"),
            })
    }

    /// The prefix uuid this snapshot pinned, if `prefix_name` is held.
    pub fn prefix_uuid(&self, prefix_name: &str) -> Option<PrefixUuid> {
        self.pins.get(prefix_name).map(|(handle, _)| handle.uuid())
    }

    /// Read a page as it existed at this snapshot's pinned state for
    /// `prefix_name`.
    pub fn read(&self, prefix_name: &str, dp_id: u64) -> DbZeroResult<Option<Vec<u8>>> {
        let (handle, state) = self.pins.get(prefix_name).ok_or_else(|| DbZeroError::InvalidState {
            reason: format!("snapshot does not pin prefix '{prefix_name}'"),
        })?;
        handle.read_dp_at(dp_id, *state)
    }

    /// Every prefix name this snapshot pins.
    pub fn prefix_names(&self) -> impl Iterator<Item = &str> {
        self.pins.keys().map(String::as_str)
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        for (_, (handle, _)) in self.pins.drain() {
            handle.unpin_snapshot();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbzero_core::Limits;
    use tempfile::tempdir;

    fn limits() -> Limits {
        Limits::new(1 << 20, 64, 4096).unwrap()
    }

    fn handle(dir: &std::path::Path, name: &str) -> Arc<PrefixHandle> {
        let h = Arc::new(PrefixHandle::create(dir, name, &limits()).unwrap());
        h.open(true).unwrap();
        h
    }

    #[test]
    fn atomic_close_commits_writes() {
        let dir = tempdir().unwrap();
        let h = handle(dir.path(), "p");
        let session = AtomicSession::begin(Arc::clone(&h)).unwrap();
        h.write_dp(0, vec![0u8; 64], vec![1u8; 64]).unwrap();
        assert_eq!(session.close().unwrap(), 1);
    }

    #[test]
    fn atomic_cancel_leaves_no_dirty_state() {
        let dir = tempdir().unwrap();
        let h = handle(dir.path(), "p");
        let session = AtomicSession::begin(Arc::clone(&h)).unwrap();
        h.write_dp(0, vec![0u8; 64], vec![1u8; 64]).unwrap();
        session.cancel();
        assert_eq!(h.dirty_len(), 0);
    }

    #[test]
    fn atomic_drop_without_close_implicitly_cancels() {
        let dir = tempdir().unwrap();
        let h = handle(dir.path(), "p");
        {
            let _session = AtomicSession::begin(Arc::clone(&h)).unwrap();
            h.write_dp(0, vec![0u8; 64], vec![1u8; 64]).unwrap();
        }
        assert_eq!(h.dirty_len(), 0);
    }

    #[test]
    fn locked_session_rejects_second_lock_on_same_prefix() {
        let dir = tempdir().unwrap();
        let h = handle(dir.path(), "p");
        let _session = LockedSession::begin(vec![Arc::clone(&h)]).unwrap();
        assert!(LockedSession::begin(vec![Arc::clone(&h)]).is_err());
    }

    #[test]
    fn locked_session_close_returns_mutation_log_in_order() {
        let dir = tempdir().unwrap();
        let a = handle(dir.path(), "a");
        let b = handle(dir.path(), "b");
        let session = LockedSession::begin(vec![Arc::clone(&a), Arc::clone(&b)]).unwrap();
        a.write_dp(0, vec![0u8; 64], vec![1u8; 64]).unwrap();
        b.write_dp(0, vec![0u8; 64], vec![2u8; 64]).unwrap();
        let log = session.close().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].prefix_name, "a");
        assert_eq!(log.entries()[1].prefix_name, "b");
        assert!(!a.is_locked());
    }

    #[test]
    fn snapshot_read_is_pinned_to_its_state() {
        let dir = tempdir().unwrap();
        let h = handle(dir.path(), "p");
        h.write_dp(0, vec![0u8; 64], vec![1u8; 64]).unwrap();
        h.commit().unwrap();

        let mut pins = HashMap::new();
        pins.insert("p".to_string(), (Arc::clone(&h), h.state_num()));
        let snap = Snapshot::new(pins);

        h.write_dp(0, vec![1u8; 64], vec![9u8; 64]).unwrap();
        h.commit().unwrap();

        let via_snapshot = snap.read("p", 0).unwrap().unwrap();
        assert_eq!(via_snapshot[0], 1);
        let live = h.read_dp(0).unwrap().unwrap();
        assert_eq!(live[0], 9);
    }
}
