//! The per-transaction dirty-page cache (spec §4.2).
//!
//! Every DP touched by a write transaction gets a `DirtyEntry` holding
//! three images:
//! - `base_image`: the page contents as of the snapshot the transaction
//!   started from (used to compute a diff record at commit)
//! - `current_image`: the live, mutable bytes the transaction is writing
//! - `cow_image`: a copy-on-write fallback captured the first time a page
//!   is touched, restored on rollback
//!
//! Commit walks the dirty set once, deciding per page whether to write a
//! full page or a diff record (spec §4.2: "chooses between a full page
//! write and a diff record based on the fraction of bytes changed").

use dashmap::DashMap;
use dbzero_core::DbZeroResult;

/// Threshold (fraction of bytes changed) above which commit writes a full
/// page instead of a diff record.
pub const FULL_PAGE_THRESHOLD: f64 = 0.5;

/// The three images tracked for one dirty DP.
#[derive(Debug, Clone)]
pub struct DirtyEntry {
    /// Bytes as they existed at the transaction's starting snapshot.
    pub base_image: Vec<u8>,
    /// Current, possibly-mutated bytes.
    pub current_image: Vec<u8>,
    /// Copy captured on first touch; restored by `rollback`.
    pub cow_image: Vec<u8>,
}

impl DirtyEntry {
    fn new(base: Vec<u8>) -> Self {
        Self {
            base_image: base.clone(),
            current_image: base.clone(),
            cow_image: base,
        }
    }

    /// Number of bytes that differ between `base_image` and
    /// `current_image`. Pages of differing length count every byte past
    /// the shorter length as changed.
    pub fn changed_bytes(&self) -> usize {
        let common = self.base_image.len().min(self.current_image.len());
        let mut changed = self.base_image.len().abs_diff(self.current_image.len());
        for i in 0..common {
            if self.base_image[i] != self.current_image[i] {
                changed += 1;
            }
        }
        changed
    }

    /// Whether commit should write a full page rather than a diff,
    /// per [`FULL_PAGE_THRESHOLD`].
    pub fn prefers_full_page(&self) -> bool {
        if self.base_image.is_empty() {
            return true;
        }
        let fraction = self.changed_bytes() as f64 / self.base_image.len().max(1) as f64;
        fraction > FULL_PAGE_THRESHOLD
    }
}

/// What a page's final write should look like at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitAction {
    /// Write the full `current_image`.
    FullPage(Vec<u8>),
    /// Write a byte-level diff against `base_image`.
    Diff { base_len: usize, ranges: Vec<(usize, Vec<u8>)> },
}

/// Per-transaction dirty-page tracking, keyed by flat DP id.
pub struct DirtyCache {
    entries: DashMap<u64, DirtyEntry>,
}

impl DirtyCache {
    /// Create an empty dirty cache for a new transaction.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of dirty pages currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no pages are dirty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the first touch of a page, seeding all three images from
    /// `base`. No-op if the page is already tracked.
    pub fn touch(&self, dp_id: u64, base: Vec<u8>) {
        self.entries.entry(dp_id).or_insert_with(|| DirtyEntry::new(base));
    }

    /// Overwrite a dirty page's `current_image`. The page must already be
    /// tracked via [`Self::touch`].
    pub fn write(&self, dp_id: u64, bytes: Vec<u8>) -> DbZeroResult<()> {
        let mut entry = self
            .entries
            .get_mut(&dp_id)
            .ok_or(dbzero_core::DbZeroError::InvalidAddress { dp_id, offset: 0 })?;
        entry.current_image = bytes;
        Ok(())
    }

    /// Read the current bytes of a dirty page, if tracked.
    pub fn read(&self, dp_id: u64) -> Option<Vec<u8>> {
        self.entries.get(&dp_id).map(|e| e.current_image.clone())
    }

    /// Roll a single page back to its `cow_image`.
    pub fn rollback_page(&self, dp_id: u64) {
        if let Some(mut entry) = self.entries.get_mut(&dp_id) {
            entry.current_image = entry.cow_image.clone();
        }
    }

    /// Discard all dirty state (full transaction rollback).
    pub fn rollback_all(&self) {
        self.entries.clear();
    }

    /// Drain the dirty set, producing the commit action for each page in
    /// ascending DP-id order (deterministic write ordering).
    pub fn drain_for_commit(&self) -> Vec<(u64, CommitAction)> {
        let mut ids: Vec<u64> = self.entries.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        let mut actions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, entry)) = self.entries.remove(&id) {
                actions.push((id, Self::commit_action_for(&entry)));
            }
        }
        actions
    }

    fn commit_action_for(entry: &DirtyEntry) -> CommitAction {
        if entry.prefers_full_page() {
            return CommitAction::FullPage(entry.current_image.clone());
        }
        let common = entry.base_image.len().min(entry.current_image.len());
        let mut ranges = Vec::new();
        let mut run_start: Option<usize> = None;
        let mut run_bytes: Vec<u8> = Vec::new();
        for i in 0..common {
            if entry.base_image[i] != entry.current_image[i] {
                if run_start.is_none() {
                    run_start = Some(i);
                }
                run_bytes.push(entry.current_image[i]);
            } else if let Some(start) = run_start.take() {
                ranges.push((start, std::mem::take(&mut run_bytes)));
            }
        }
        if let Some(start) = run_start {
            ranges.push((start, run_bytes));
        }
        if entry.current_image.len() > common {
            ranges.push((common, entry.current_image[common..].to_vec()));
        }
        CommitAction::Diff {
            base_len: entry.base_image.len(),
            ranges,
        }
    }
}

impl Default for DirtyCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_seeds_all_three_images_identically() {
        let cache = DirtyCache::new();
        cache.touch(1, vec![1, 2, 3]);
        assert_eq!(cache.read(1), Some(vec![1, 2, 3]));
    }

    #[test]
    fn write_updates_current_image_only() {
        let cache = DirtyCache::new();
        cache.touch(1, vec![1, 2, 3]);
        cache.write(1, vec![9, 2, 3]).unwrap();
        assert_eq!(cache.read(1), Some(vec![9, 2, 3]));
    }

    #[test]
    fn rollback_page_restores_cow_image() {
        let cache = DirtyCache::new();
        cache.touch(1, vec![1, 2, 3]);
        cache.write(1, vec![9, 9, 9]).unwrap();
        cache.rollback_page(1);
        assert_eq!(cache.read(1), Some(vec![1, 2, 3]));
    }

    #[test]
    fn write_to_untouched_page_is_rejected() {
        let cache = DirtyCache::new();
        assert!(cache.write(1, vec![1]).is_err());
    }

    #[test]
    fn small_change_produces_diff_not_full_page() {
        let cache = DirtyCache::new();
        let base = vec![0u8; 100];
        cache.touch(1, base);
        let mut changed = vec![0u8; 100];
        changed[50] = 7;
        cache.write(1, changed).unwrap();
        let actions = cache.drain_for_commit();
        assert_eq!(actions.len(), 1);
        match &actions[0].1 {
            CommitAction::Diff { ranges, .. } => {
                assert_eq!(ranges.len(), 1);
                assert_eq!(ranges[0], (50, vec![7]));
            }
            CommitAction::FullPage(_) => panic!("expected diff for a single-byte change"),
        }
    }

    #[test]
    fn large_change_produces_full_page() {
        let cache = DirtyCache::new();
        cache.touch(1, vec![0u8; 10]);
        cache.write(1, vec![1u8; 10]).unwrap();
        let actions = cache.drain_for_commit();
        assert!(matches!(actions[0].1, CommitAction::FullPage(_)));
    }

    #[test]
    fn drain_for_commit_empties_the_cache_in_ascending_order() {
        let cache = DirtyCache::new();
        cache.touch(5, vec![0]);
        cache.touch(1, vec![0]);
        let actions = cache.drain_for_commit();
        assert_eq!(actions.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 5]);
        assert!(cache.is_empty());
    }
}
