//! The seam a query tree evaluates against. `dbzero-query` never touches
//! a `TagStore`/`RangeIndex`/`ClassRegistry` directly — it only knows
//! this trait, the way `dbzero-concurrency` only knows `CommitSink`
//! rather than reaching into `dbzero-durability`'s internals. An engine
//! binds one [`QuerySource`] impl per snapshot, backed by that
//! snapshot's `dbzero-objects::ObjectStore`.

use std::collections::BTreeSet;

use dbzero_core::{ClassUuid, ObjectUuid, TagKey, Value};

/// Read-only access to one snapshot's posting lists and range indexes.
pub trait QuerySource {
    /// Every object tagged with `class` or one of its subclasses (type
    /// tags are added transitively at creation time, so this is a plain
    /// posting lookup, not a live ancestry walk).
    fn type_tag_postings(&self, class: ClassUuid) -> BTreeSet<ObjectUuid>;

    /// The posting list for an arbitrary tag key.
    fn tag_postings(&self, key: &TagKey) -> BTreeSet<ObjectUuid>;

    /// Every object id known to this snapshot, used as the implicit
    /// universe for `NOT` evaluation.
    fn universe(&self) -> BTreeSet<ObjectUuid>;

    /// Inclusive range lookup against a named range index.
    fn range(&self, index_name: &str, lo: Option<&Value>, hi: Option<&Value>, null_first: bool) -> Vec<(Value, ObjectUuid)>;

    /// Stable order projection of `items` by a named range index's key
    /// order.
    fn sort(&self, index_name: &str, items: Vec<ObjectUuid>, desc: bool, null_first: bool) -> Vec<ObjectUuid>;
}
