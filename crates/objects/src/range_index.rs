//! Ordered range index over `Value` keys (spec §4.6, "Range index"):
//! starts as a NULL-only index and transparently upgrades to mixed
//! storage on the first non-null insert, since a `BTreeMap<Value, _>`
//! already orders `Null` consistently alongside every other key.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;
use dbzero_core::{ObjectUuid, Value};

/// An ordered `Value -> {ObjectUuid}` index with explicit null placement
/// on range and sort (spec §4.6).
#[derive(Default)]
pub struct RangeIndex {
    entries: BTreeMap<Value, BTreeSet<ObjectUuid>>,
    /// Reverse lookup used by [`Self::sort`] to project an arbitrary
    /// object iterator into this index's key order.
    current_key: DashMap<ObjectUuid, Value>,
}

impl RangeIndex {
    /// An empty range index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `(key, uuid)`.
    pub fn add(&mut self, key: Value, uuid: ObjectUuid) {
        self.entries.entry(key.clone()).or_default().insert(uuid);
        self.current_key.insert(uuid, key);
    }

    /// Remove `(key, uuid)`, cleaning up the bucket when it empties.
    pub fn remove(&mut self, key: &Value, uuid: ObjectUuid) {
        let mut emptied = false;
        if let Some(bucket) = self.entries.get_mut(key) {
            bucket.remove(&uuid);
            emptied = bucket.is_empty();
        }
        if emptied {
            self.entries.remove(key);
        }
        if self.current_key.get(&uuid).map(|k| &*k == key).unwrap_or(false) {
            self.current_key.remove(&uuid);
        }
    }

    /// Number of distinct keys currently populated.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Inclusive range over non-null keys in `[lo, hi]` (unbounded on a
    /// side when `None`), with null entries placed per `null_first`.
    pub fn range(&self, lo: Option<&Value>, hi: Option<&Value>, null_first: bool) -> Vec<(Value, ObjectUuid)> {
        let nulls: Vec<(Value, ObjectUuid)> = self
            .entries
            .get(&Value::Null)
            .map(|ids| ids.iter().map(|id| (Value::Null, *id)).collect())
            .unwrap_or_default();

        let mut non_null: Vec<(Value, ObjectUuid)> = Vec::new();
        for (key, ids) in self.entries.iter() {
            if matches!(key, Value::Null) {
                continue;
            }
            if let Some(lo) = lo {
                if key < lo {
                    continue;
                }
            }
            if let Some(hi) = hi {
                if key > hi {
                    continue;
                }
            }
            for id in ids {
                non_null.push((key.clone(), *id));
            }
        }

        if null_first {
            let mut out = nulls;
            out.extend(non_null);
            out
        } else {
            let mut out = non_null;
            out.extend(nulls);
            out
        }
    }

    /// Stable projection of `items` into this index's key order. Objects
    /// with no key in this index are treated as `Null`.
    pub fn sort(&self, items: impl IntoIterator<Item = ObjectUuid>, desc: bool, null_first: bool) -> Vec<ObjectUuid> {
        let mut keyed: Vec<(ObjectUuid, Value)> = items
            .into_iter()
            .map(|id| {
                let key = self.current_key.get(&id).map(|k| k.clone()).unwrap_or(Value::Null);
                (id, key)
            })
            .collect();
        keyed.sort_by(|(_, a), (_, b)| cmp_key(a, b, desc, null_first));
        keyed.into_iter().map(|(id, _)| id).collect()
    }
}

fn cmp_key(a: &Value, b: &Value, desc: bool, null_first: bool) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if null_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if null_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => {
            let base = a.cmp(b);
            if desc {
                base.reverse()
            } else {
                base
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_inclusive_and_respects_bounds() {
        let mut idx = RangeIndex::new();
        let ids: Vec<ObjectUuid> = (0..5).map(|_| ObjectUuid::new()).collect();
        for (i, id) in ids.iter().enumerate() {
            idx.add(Value::Int(i as i64), *id);
        }
        let result = idx.range(Some(&Value::Int(1)), Some(&Value::Int(3)), false);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].0, Value::Int(1));
        assert_eq!(result[2].0, Value::Int(3));
    }

    #[test]
    fn range_places_nulls_per_flag() {
        let mut idx = RangeIndex::new();
        let null_obj = ObjectUuid::new();
        let some_obj = ObjectUuid::new();
        idx.add(Value::Null, null_obj);
        idx.add(Value::Int(5), some_obj);

        let first = idx.range(None, None, true);
        assert_eq!(first[0].1, null_obj);

        let last = idx.range(None, None, false);
        assert_eq!(last.last().unwrap().1, null_obj);
    }

    #[test]
    fn remove_cleans_up_empty_buckets() {
        let mut idx = RangeIndex::new();
        let id = ObjectUuid::new();
        idx.add(Value::Str("a".into()), id);
        idx.remove(&Value::Str("a".into()), id);
        assert_eq!(idx.key_count(), 0);
    }

    #[test]
    fn sort_is_stable_and_honors_desc() {
        let mut idx = RangeIndex::new();
        let a = ObjectUuid::from_bytes([1; 16]);
        let b = ObjectUuid::from_bytes([2; 16]);
        idx.add(Value::Int(10), a);
        idx.add(Value::Int(20), b);

        let asc = idx.sort(vec![b, a], false, false);
        assert_eq!(asc, vec![a, b]);

        let desc = idx.sort(vec![a, b], true, false);
        assert_eq!(desc, vec![b, a]);
    }

    #[test]
    fn sort_treats_unindexed_objects_as_null() {
        let mut idx = RangeIndex::new();
        let keyed = ObjectUuid::from_bytes([1; 16]);
        let unkeyed = ObjectUuid::from_bytes([2; 16]);
        idx.add(Value::Int(1), keyed);

        let result = idx.sort(vec![keyed, unkeyed], false, true);
        assert_eq!(result[0], unkeyed);
    }
}
