//! Hashable projection of a [`Value`] used as a group-by key.
//!
//! `Value` carries a hand-written `Eq`/`Ord` (it holds an `f64`) but no
//! `Hash`, so group keys need their own hashing the same way
//! `dbzero-objects::record::KvKey` gives `kv_index` a hashable key —
//! except group keys are free to be `Tuple`/`List`, which `KvKey` rejects,
//! so this is its own small type rather than a reuse of that one.

use std::hash::{Hash, Hasher};

use dbzero_core::Value;

/// Wraps a [`Value`] with a structural `Hash` consistent with its `Eq`.
#[derive(Debug, Clone)]
pub struct GroupKey(pub Value);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Int(i) => {
            2u8.hash(state);
            i.hash(state);
        }
        Value::Float(f) => {
            3u8.hash(state);
            f.to_bits().hash(state);
        }
        Value::Str(s) => {
            4u8.hash(state);
            s.hash(state);
        }
        Value::Bytes(b) => {
            5u8.hash(state);
            b.hash(state);
        }
        Value::Ref(r) => {
            6u8.hash(state);
            r.hash(state);
        }
        Value::Weak(w) => {
            7u8.hash(state);
            w.hash(state);
        }
        Value::List(items) => {
            8u8.hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Tuple(items) => {
            9u8.hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        GroupKey(v.clone()).hash(&mut h);
        h.finish()
    }

    #[test]
    fn equal_values_hash_equal() {
        let a = Value::Tuple(vec![Value::Str("x".into()), Value::Int(1)]);
        let b = Value::Tuple(vec![Value::Str("x".into()), Value::Int(1)]);
        assert_eq!(GroupKey(a.clone()), GroupKey(b.clone()));
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn different_values_are_unequal() {
        assert_ne!(GroupKey(Value::Int(1)), GroupKey(Value::Int(2)));
    }
}
