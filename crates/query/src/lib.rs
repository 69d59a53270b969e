//! The lazy query tree: composition, content-addressable fingerprints,
//! comparison, runnable serialization and delta selection (spec §4.7).
//!
//! This crate evaluates only against the [`QuerySource`] seam — it
//! never touches `dbzero-objects`' `TagStore`/`RangeIndex` directly, the
//! same separation `dbzero-concurrency` keeps from `dbzero-durability`
//! via `CommitSink`. `dbzero-engine` is what binds a `QuerySource` to one
//! snapshot's object store.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod fingerprint;
pub mod node;
pub mod runnable;
pub mod select;
pub mod source;

pub use fingerprint::{compare, content_uuid_of, signature_of, ContentUuid, Signature};
pub use node::QueryNode;
pub use runnable::{as_runnable, deserialize};
pub use select::{select_deleted, select_modified, select_new};
pub use source::QuerySource;
