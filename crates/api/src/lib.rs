//! Host-language facade over [`dbzero_engine::Engine`].
//!
//! ## One layer, not two
//!
//! The facade is a single [`Session`] type rather than the split
//! "friendly facade over an explicit substrate" shape some embedded
//! stores use: DBZero's domain is classes/objects/tags/indexes, not a
//! key-value store with a canonical `get(key)` shorthand worth layering
//! convenience on top of. Every `Session` method still desugars to
//! exactly one `Engine` call — the architectural invariant carries over,
//! there is just nothing left to build a second, simpler layer out of.
//!
//! ## Module structure
//!
//! - [`session`]: `Session`, the per-prefix handle a host binding drives
//!   directly — class registration, object mutation, commit, atomic/
//!   locked sections, snapshots.
//! - [`query`]: `Query`, composing `dbzero_query::QueryNode` trees and
//!   evaluating/group-by-ing them against a session's current state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod query;
pub mod session;

pub use query::Query;
pub use session::Session;

pub use dbzero_objects::{ClassDescriptor, ClassDescriptorBuilder};
pub use dbzero_query::QueryNode;
