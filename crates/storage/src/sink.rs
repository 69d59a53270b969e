//! Seam between the dirty cache and a durable page store.
//!
//! [`CommitSink`] lets the concurrency layer drive a commit without
//! depending on `dbzero-durability` directly: the dirty cache produces
//! [`CommitAction`]s, and anything implementing `CommitSink` (in
//! practice, `dbzero_durability::PageFile`) knows how to make them
//! durable.

use dbzero_core::{DbZeroResult, PageStore};

use crate::dirty::CommitAction;

/// A [`PageStore`] that can also accept committed writes.
pub trait CommitSink: PageStore {
    /// Durably apply one page's commit action at `state_num`.
    fn commit_dp(&self, dp_id: u64, state_num: u64, action: CommitAction) -> DbZeroResult<()>;
}
