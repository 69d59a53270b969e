//! Slab allocation and the in-memory dirty-page cache for DBZero.
//!
//! - [`bitset`] / [`slab`] / [`address`] / [`allocator`]: the slab
//!   allocator (spec §4.1) — bitset-based DP allocation within a slab,
//!   wide locks for contiguous multi-DP allocations, reserved regions for
//!   the string pool and class records.
//! - [`dirty`]: the per-transaction dirty cache (spec §4.2) — tracks
//!   `{base, current, cow}` images per touched DP and decides full-page
//!   vs diff writes at commit.
//! - [`sink`]: [`sink::CommitSink`], the seam a durable page store
//!   implements so the dirty cache's commit actions can be applied
//!   without this crate depending on `dbzero-durability`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod allocator;
pub mod bitset;
pub mod dirty;
pub mod sink;
pub mod slab;

pub use address::DpAddress;
pub use allocator::{ReservedRegion, SlabAllocator};
pub use bitset::DpBitset;
pub use dirty::{CommitAction, DirtyCache, DirtyEntry, FULL_PAGE_THRESHOLD};
pub use sink::CommitSink;
pub use slab::Slab;
