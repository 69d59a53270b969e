//! Binds a `dbzero_query::QuerySource` to one prefix's live `ObjectStore`
//! plus its engine-owned named range indexes (`dbzero-objects::ObjectStore`
//! has no range-index slots of its own; wiring attribute writes into a
//! named `RangeIndex` is the routing `dbzero-objects`' module docs leave
//! to the engine).

use std::collections::BTreeSet;
use std::sync::Arc;

use dbzero_core::{ClassUuid, ObjectUuid, TagKey, Value};
use dbzero_objects::ObjectStore;
use dbzero_query::QuerySource;

use crate::indexes::PrefixIndexes;

/// `QuerySource` over one prefix's current in-memory state. Cheap to
/// construct: it borrows the store and index table via `Arc` clones, one
/// per query evaluation (a query tree never holds this across a commit).
pub struct PrefixQuerySource {
    store: Arc<ObjectStore>,
    indexes: Arc<PrefixIndexes>,
}

impl PrefixQuerySource {
    /// Bind to `store`'s current state and `indexes`' current content.
    pub fn new(store: Arc<ObjectStore>, indexes: Arc<PrefixIndexes>) -> Self {
        Self { store, indexes }
    }
}

impl QuerySource for PrefixQuerySource {
    fn type_tag_postings(&self, class: ClassUuid) -> BTreeSet<ObjectUuid> {
        self.store.tags().postings(&TagKey::Class(class))
    }

    fn tag_postings(&self, key: &TagKey) -> BTreeSet<ObjectUuid> {
        self.store.tags().postings(key)
    }

    fn universe(&self) -> BTreeSet<ObjectUuid> {
        self.store.all_objects().into_keys().collect()
    }

    fn range(&self, index_name: &str, lo: Option<&Value>, hi: Option<&Value>, null_first: bool) -> Vec<(Value, ObjectUuid)> {
        self.indexes.range(index_name, lo, hi, null_first)
    }

    fn sort(&self, index_name: &str, items: Vec<ObjectUuid>, desc: bool, null_first: bool) -> Vec<ObjectUuid> {
        self.indexes.sort(index_name, items, desc, null_first)
    }
}
