//! Named range indexes for one prefix.
//!
//! `dbzero-objects::ObjectStore` carries no range index of its own (spec
//! §4.6 names the range index as a "named" index data structure without
//! binding it to the store); here the host declares which attribute name
//! backs a named index via [`PrefixIndexes::declare`], and every engine
//! `set_attr` call re-keys the index for that attribute after the write
//! goes through (old key removed using the pre-write value the engine
//! already fetched for reference-count bookkeeping, new key added from
//! the value just written).

use dashmap::DashMap;
use parking_lot::Mutex;

use dbzero_core::{ObjectUuid, Value};
use dbzero_objects::RangeIndex;

/// One declared range index: which attribute it tracks, and its content.
struct Declared {
    attr_name: String,
    index: Mutex<RangeIndex>,
}

/// Every range index declared for one prefix, keyed by index name.
#[derive(Default)]
pub struct PrefixIndexes {
    by_name: DashMap<String, Declared>,
}

impl PrefixIndexes {
    /// An empty index table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `index_name` as tracking attribute `attr_name`. Replaces
    /// any prior declaration of the same name with an empty index.
    pub fn declare(&self, index_name: impl Into<String>, attr_name: impl Into<String>) {
        self.by_name.insert(
            index_name.into(),
            Declared { attr_name: attr_name.into(), index: Mutex::new(RangeIndex::new()) },
        );
    }

    /// Update every index tracking `attr_name` after `obj`'s value
    /// changed from `previous` (if any) to `new_value`.
    pub fn on_set_attr(&self, attr_name: &str, obj: ObjectUuid, previous: Option<&Value>, new_value: &Value) {
        for entry in self.by_name.iter().filter(|e| e.value().attr_name == attr_name) {
            let mut index = entry.value().index.lock();
            if let Some(old) = previous {
                index.remove(old, obj);
            }
            index.add(new_value.clone(), obj);
        }
    }

    /// Drop `obj` from every index it might appear in for `attr_name`,
    /// given its last known value (used on delete).
    pub fn on_delete(&self, attr_name: &str, obj: ObjectUuid, last_value: &Value) {
        for entry in self.by_name.iter().filter(|e| e.value().attr_name == attr_name) {
            entry.value().index.lock().remove(last_value, obj);
        }
    }

    /// Inclusive range lookup against `index_name`. Empty if undeclared.
    pub fn range(&self, index_name: &str, lo: Option<&Value>, hi: Option<&Value>, null_first: bool) -> Vec<(Value, ObjectUuid)> {
        match self.by_name.get(index_name) {
            Some(entry) => entry.value().index.lock().range(lo, hi, null_first),
            None => Vec::new(),
        }
    }

    /// Stable projection of `items` into `index_name`'s key order.
    /// Returns `items` unchanged if undeclared.
    pub fn sort(&self, index_name: &str, items: Vec<ObjectUuid>, desc: bool, null_first: bool) -> Vec<ObjectUuid> {
        match self.by_name.get(index_name) {
            Some(entry) => entry.value().index.lock().sort(items, desc, null_first),
            None => items,
        }
    }
}
