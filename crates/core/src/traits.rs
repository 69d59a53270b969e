//! Core seam traits
//!
//! These traits let the allocator/object layer be generic over storage and
//! snapshot implementations without binding to `dbzero-durability`
//! directly (mirrors the teacher's `Storage`/`SnapshotView` split, which
//! exists so the in-memory MVP and the disk-backed store share one
//! contract).

use crate::error::DbZeroResult;
use crate::types::PrefixUuid;

/// Abstraction over raw page storage for one prefix.
///
/// Implementations must be safe to share across the writer thread and any
/// number of concurrent readers (spec §5: "multiple readers concurrent
/// with the writer via MVCC").
pub trait PageStore: Send + Sync {
    /// Read the current bytes of a data page. Returns `None` if the page
    /// has never been allocated.
    fn read_page(&self, dp_id: u64) -> DbZeroResult<Option<Vec<u8>>>;

    /// Read a data page as of a specific finalized state number, for
    /// snapshot-bound reads.
    fn read_page_at(&self, dp_id: u64, state_num: u64) -> DbZeroResult<Option<Vec<u8>>>;

    /// The prefix this store backs.
    fn prefix(&self) -> PrefixUuid;

    /// Latest finalized state number visible to new readers.
    fn current_state_num(&self) -> u64;
}

/// A pinned, version-bounded read view (spec §3, "Snapshot").
///
/// Reads through a `SnapshotView` are unaffected by writes committed after
/// the snapshot was taken (spec §8, "Snapshot isolation").
pub trait SnapshotView: Send + Sync {
    /// Read a page as it existed at this snapshot's state number.
    fn get(&self, dp_id: u64) -> DbZeroResult<Option<Vec<u8>>>;

    /// The prefix this view is bound to.
    fn prefix(&self) -> PrefixUuid;

    /// The finalized state number this view is pinned to.
    fn state_num(&self) -> u64;
}
