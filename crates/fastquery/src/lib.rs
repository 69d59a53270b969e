//! Incremental group-by cache with delta evaluation (spec §4.8).
//!
//! Builds on `dbzero-query`'s lazy tree, fingerprints and delta
//! selectors: [`group_by`] evaluates a query's population split into
//! groups, maintaining each group's aggregate state incrementally by
//! diffing against the nearest cached result instead of rescanning from
//! scratch on every call.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bucket;
pub mod cache;
pub mod group;
pub mod key;
pub mod ops;

pub use bucket::GroupByBucket;
pub use cache::{CacheEntry, FastQueryCache, COMPARE_CUTOFF};
pub use group::{group_by, GroupDef};
pub use key::GroupKey;
pub use ops::{count_op, make_sum, AggregateOp};
