//! The per-prefix GC0 reference-counting registry (spec §4.5).
//!
//! Grounded on the insert/remove-when-empty idiom from the teacher's
//! `crates/storage/src/index.rs`, applied here to a three-counter record
//! instead of a posting set: an object is reclaimable exactly when
//! `strong_refs + snapshot_holds + external_holds == 0`.

use dashmap::DashMap;
use dbzero_core::ObjectUuid;

/// The three independent reasons an object stays reachable (spec §4.5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefCounts {
    /// In-prefix field references and tag retentions.
    pub strong_refs: u32,
    /// Open snapshots that can observe this object.
    pub snapshot_holds: u32,
    /// Host-language cache references.
    pub external_holds: u32,
}

impl RefCounts {
    /// Whether every counter is zero.
    pub fn is_zero(&self) -> bool {
        self.strong_refs == 0 && self.snapshot_holds == 0 && self.external_holds == 0
    }
}

/// Which counter an increment/decrement targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldKind {
    /// See [`RefCounts::strong_refs`].
    Strong,
    /// See [`RefCounts::snapshot_holds`].
    Snapshot,
    /// See [`RefCounts::external_holds`].
    External,
}

/// Per-prefix uuid -> refcount table. An absent entry is equivalent to an
/// all-zero [`RefCounts`] (the object is unreachable / never registered).
#[derive(Default)]
pub struct Gc0Registry {
    counts: DashMap<ObjectUuid, RefCounts>,
}

impl Gc0Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the given counter for `uuid`, creating an entry if
    /// needed.
    pub fn retain(&self, uuid: ObjectUuid, kind: HoldKind) {
        let mut entry = self.counts.entry(uuid).or_default();
        match kind {
            HoldKind::Strong => entry.strong_refs += 1,
            HoldKind::Snapshot => entry.snapshot_holds += 1,
            HoldKind::External => entry.external_holds += 1,
        }
    }

    /// Decrement the given counter for `uuid`. If every counter reaches
    /// zero, the entry is removed and `true` is returned (the object is
    /// now reclaimable). Decrementing an absent or already-zero counter
    /// is a no-op.
    pub fn release(&self, uuid: ObjectUuid, kind: HoldKind) -> bool {
        let Some(mut entry) = self.counts.get_mut(&uuid) else {
            return false;
        };
        match kind {
            HoldKind::Strong => entry.strong_refs = entry.strong_refs.saturating_sub(1),
            HoldKind::Snapshot => entry.snapshot_holds = entry.snapshot_holds.saturating_sub(1),
            HoldKind::External => entry.external_holds = entry.external_holds.saturating_sub(1),
        }
        let zero = entry.is_zero();
        drop(entry);
        if zero {
            self.counts.remove(&uuid);
        }
        zero
    }

    /// Current counters for `uuid`, or all-zero if never registered.
    pub fn counts(&self, uuid: ObjectUuid) -> RefCounts {
        self.counts.get(&uuid).map(|e| *e).unwrap_or_default()
    }

    /// Unconditionally drop any tracked counts for `uuid`, regardless of
    /// whether they were already zero. Used when a record is force-removed
    /// by explicit deletion rather than reclaimed via refcount (the
    /// record's own counters stop mattering the instant it's gone).
    pub fn forget(&self, uuid: ObjectUuid) {
        self.counts.remove(&uuid);
    }

    /// Whether `uuid` is reclaimable (spec §4.5: "An object is reclaimable
    /// iff all three counters are zero").
    pub fn is_reclaimable(&self, uuid: ObjectUuid) -> bool {
        !self.counts.contains_key(&uuid)
    }

    /// Every currently-tracked (non-zero-counted) uuid.
    pub fn tracked(&self) -> Vec<ObjectUuid> {
        self.counts.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_object_is_reclaimable() {
        let gc = Gc0Registry::new();
        assert!(gc.is_reclaimable(ObjectUuid::new()));
    }

    #[test]
    fn strong_ref_keeps_object_alive_until_released() {
        let gc = Gc0Registry::new();
        let id = ObjectUuid::new();
        gc.retain(id, HoldKind::Strong);
        assert!(!gc.is_reclaimable(id));
        let became_reclaimable = gc.release(id, HoldKind::Strong);
        assert!(became_reclaimable);
        assert!(gc.is_reclaimable(id));
    }

    #[test]
    fn object_stays_alive_while_any_counter_is_nonzero() {
        let gc = Gc0Registry::new();
        let id = ObjectUuid::new();
        gc.retain(id, HoldKind::Strong);
        gc.retain(id, HoldKind::Snapshot);
        gc.release(id, HoldKind::Strong);
        assert!(!gc.is_reclaimable(id));
        gc.release(id, HoldKind::Snapshot);
        assert!(gc.is_reclaimable(id));
    }

    #[test]
    fn releasing_an_untracked_object_is_a_harmless_no_op() {
        let gc = Gc0Registry::new();
        assert!(!gc.release(ObjectUuid::new(), HoldKind::External));
    }

    #[test]
    fn forget_drops_counts_even_while_held() {
        let gc = Gc0Registry::new();
        let id = ObjectUuid::new();
        gc.retain(id, HoldKind::Strong);
        gc.retain(id, HoldKind::Snapshot);
        gc.forget(id);
        assert!(gc.is_reclaimable(id));
    }
}
