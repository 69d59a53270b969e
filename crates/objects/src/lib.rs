//! Class descriptors, object layout, GC0 refcounting, string interning,
//! tag postings and the range index that sit underneath DBZero's query
//! and engine layers (spec §4.4, §4.5, §4.6, §4.9).
//!
//! This crate is a pure in-memory model: it owns no file handles and
//! knows nothing about durability, concurrency sessions, or the wire
//! format those layers persist it through. `dbzero-engine` is what wires
//! an [`ObjectStore`] per open prefix to the storage/concurrency stack.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod gc0;
pub mod layout;
pub mod range_index;
pub mod record;
pub mod store;
pub mod string_pool;
pub mod tags;

pub use gc0::{Gc0Registry, HoldKind, RefCounts};
pub use layout::{AttributeDescriptor, ClassDescriptor, ClassDescriptorBuilder, ClassRegistry, FieldShape};
pub use range_index::RangeIndex;
pub use record::{KvKey, ObjectRecord};
pub use store::ObjectStore;
pub use string_pool::{InternedString, StringPool};
pub use tags::TagStore;
