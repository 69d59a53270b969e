//! `FastQueryCache`, grounded on `fast_query.py`'s `FastQueryCache`:
//! results keyed by query signature, then by content uuid within that
//! signature bucket, each entry carrying the state number it was
//! computed at and the composed query tree it was computed against (in
//! place of the original's serialized `bytes` — see the module docs on
//! why this crate keeps the live tree instead).

use dashmap::DashMap;
use std::collections::HashMap;

use dbzero_query::{compare, ContentUuid, QueryNode, QuerySource, Signature};

use crate::bucket::GroupByBucket;
use crate::key::GroupKey;

/// Jaccard-distance cutoff below which a near-signature cached result is
/// still considered usable as a delta-evaluation starting point (spec
/// §4.8, taken from the original's `0.33`).
pub const COMPARE_CUTOFF: f64 = 0.33;

/// One cached group-by result.
#[derive(Clone)]
pub struct CacheEntry {
    /// Finalized prefix state number this result was computed at.
    pub state_num: u64,
    /// The (split-applied) query tree this result was computed against.
    pub query: QueryNode,
    /// Per-group-key aggregate state.
    pub result: HashMap<GroupKey, GroupByBucket>,
}

/// Singleton cache of group-by results, meant to live on a dedicated
/// fast-query prefix (spec §4.8: "the FQ cache itself is a singleton
/// living on a configurable FQ prefix"). This type only holds the
/// in-memory lookup structure; persisting it onto that prefix is
/// `dbzero-engine`'s job, the same way `dbzero-durability` owns
/// `dbzero-concurrency`'s committed state.
#[derive(Default)]
pub struct FastQueryCache {
    entries: DashMap<Signature, HashMap<ContentUuid, CacheEntry>>,
}

impl FastQueryCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the best cached result for `query` (already split-applied),
    /// evaluated against `source`. An exact content-uuid hit is returned
    /// immediately; otherwise the nearest same-signature entry under
    /// [`COMPARE_CUTOFF`] is returned. Both `query`'s own state and a
    /// stale cached entry may come back here — callers check
    /// `entry.state_num` against the state they actually need.
    pub fn find_result(&self, signature: Signature, uuid: ContentUuid, query: &QueryNode, source: &dyn QuerySource) -> Option<CacheEntry> {
        let by_uuid = self.entries.get(&signature)?;
        if let Some(exact) = by_uuid.get(&uuid) {
            return Some(exact.clone());
        }

        let mut best: Option<(f64, &CacheEntry)> = None;
        for entry in by_uuid.values() {
            let diff = compare(query, &entry.query, source);
            let better = match &best {
                Some((d, _)) => diff < *d,
                None => true,
            };
            if better {
                best = Some((diff, entry));
            }
        }
        match best {
            Some((diff, entry)) if diff < COMPARE_CUTOFF => Some(entry.clone()),
            _ => None,
        }
    }

    /// Record a freshly computed result. `state_num` must be a finalized
    /// state number.
    pub fn update(&self, signature: Signature, uuid: ContentUuid, entry: CacheEntry) {
        self.entries.entry(signature).or_default().insert(uuid, entry);
    }
}
