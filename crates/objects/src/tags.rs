//! The tag store: ordered posting lists keyed by tag (spec §4.6).
//!
//! Grounded on the teacher's `TypeIndex`/`RunIndex` insert/remove/
//! cleanup-when-empty idiom (`crates/storage/src/index.rs`), generalized
//! from a `HashSet` posting (unordered) to a `BTreeSet` posting (spec:
//! "an ordered posting list of object ids" — query evaluation merges
//! postings as sorted sequences).
//!
//! Type-tag inheritance ("a find(BaseClass, tag) also returns subclass
//! instances") is the caller's responsibility: whoever creates an object
//! adds a `TagKey::Class` posting for every ancestor in the class's
//! chain, not just its direct class. This module only stores and
//! retrieves postings; it has no notion of a class hierarchy.

use std::collections::BTreeSet;

use dashmap::DashMap;
use dbzero_core::{ObjectUuid, TagKey};

use crate::string_pool::StringPool;

/// Ordered posting lists, one per tag key.
#[derive(Default)]
pub struct TagStore {
    postings: DashMap<TagKey, BTreeSet<ObjectUuid>>,
}

impl TagStore {
    /// An empty tag store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `uuid` to `key`'s posting list. If `key` is a string tag, the
    /// caller is expected to have already interned it via
    /// [`StringPool::intern`]; this only maintains the posting set.
    pub fn add(&self, key: TagKey, uuid: ObjectUuid) {
        self.postings.entry(key).or_default().insert(uuid);
    }

    /// Remove `uuid` from `key`'s posting list, cleaning up the entry
    /// when it becomes empty. For a string tag, releases the
    /// corresponding string-pool retention when the last posting is
    /// removed (spec §4.6: "Removing the last posting for a string tag
    /// releases its string-pool retention").
    pub fn remove(&self, key: &TagKey, uuid: ObjectUuid, pool: &StringPool) {
        let mut emptied = false;
        if let Some(mut postings) = self.postings.get_mut(key) {
            postings.remove(&uuid);
            emptied = postings.is_empty();
        }
        if emptied {
            self.postings.remove(key);
            if let TagKey::String(s) = key {
                pool.release(s);
            }
        }
    }

    /// The posting list for `key`, oldest-inserted-first is not
    /// guaranteed, but uuid order is (it's a `BTreeSet`).
    pub fn postings(&self, key: &TagKey) -> BTreeSet<ObjectUuid> {
        self.postings.get(key).map(|p| p.clone()).unwrap_or_default()
    }

    /// Number of objects tagged with `key`.
    pub fn len(&self, key: &TagKey) -> usize {
        self.postings.get(key).map(|p| p.len()).unwrap_or(0)
    }

    /// Whether `uuid` has `key`.
    pub fn contains(&self, key: &TagKey, uuid: ObjectUuid) -> bool {
        self.postings.get(key).map(|p| p.contains(&uuid)).unwrap_or(false)
    }

    /// Every tag key currently carrying at least one posting.
    pub fn known_keys(&self) -> Vec<TagKey> {
        self.postings.iter().map(|e| e.key().clone()).collect()
    }
}
