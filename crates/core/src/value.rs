//! Unified field value type
//!
//! `Value` is the runtime representation of anything a memo object field,
//! range-index key, or kv_index entry can hold. Schema is inferred from the
//! values actually written (spec §1, Non-goals: "schemas enforced at write
//! time"), so this enum has to cover every shape that shows up in the field
//! layout engine, range index, and query engine.

use crate::types::ObjectUuid;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A weak, cross-prefix pointer (spec §3, "Weak proxy"). Does not
/// contribute to the target's refcount; remembers the target uuid so that
/// `uuid_of` remains valid after the target has been reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeakProxy {
    /// Prefix the target object lives in.
    pub prefix: crate::types::PrefixUuid,
    /// Uuid of the target object, valid even after expiration.
    pub target: ObjectUuid,
}

/// Unified value type for field storage, range-index keys, and query
/// leaves. `Null` is a distinguished value (spec §3, "Range index":
/// "including a distinguished NULL").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent / None.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// IEEE-754 double.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Strong reference to a memo object in the same prefix.
    Ref(ObjectUuid),
    /// Weak, cross-prefix reference.
    Weak(WeakProxy),
    /// Homogeneous-ish ordered list (dynamic attribute bags permit mixed
    /// contents; pos_vt/index_vt fields typically hold uniform lists).
    List(Vec<Value>),
    /// Ordered tuple — distinct from `List` because tuples are eligible
    /// for weak-container auto-hardening only when empty (spec §4.9).
    Tuple(Vec<Value>),
}

impl Value {
    /// True for the sentinel absent value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Strong reference target, if this value is one.
    pub fn as_ref_target(&self) -> Option<ObjectUuid> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// True if this value is an empty weak container eligible for
    /// auto-hardening when assigned into a scoped (prefix-pinned)
    /// instance (spec §4.4, §4.9).
    pub fn is_empty_weak_container(&self) -> bool {
        matches!(self, Value::List(v) | Value::Tuple(v) if v.is_empty())
    }

    /// A coarse type-tag discriminant, used by the field layout engine to
    /// decide value-type tags on an attribute descriptor (spec §3, "Field
    /// layout").
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Ref(_) => ValueKind::Ref,
            Value::Weak(_) => ValueKind::Weak,
            Value::List(_) => ValueKind::List,
            Value::Tuple(_) => ValueKind::Tuple,
        }
    }
}

/// Discriminant for `Value`, without payload. Stored in attribute
/// descriptors as the declared value type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// See `Value::Null`.
    Null,
    /// See `Value::Bool`.
    Bool,
    /// See `Value::Int`.
    Int,
    /// See `Value::Float`.
    Float,
    /// See `Value::Str`.
    Str,
    /// See `Value::Bytes`.
    Bytes,
    /// See `Value::Ref`.
    Ref,
    /// See `Value::Weak`.
    Weak,
    /// See `Value::List`.
    List,
    /// See `Value::Tuple`.
    Tuple,
}

/// Policy for ordering `Null` against non-null keys in a range index
/// (spec §4.6, "Range index").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// Null entries sort before all non-null entries.
    NullFirst,
    /// Null entries sort after all non-null entries (default).
    NullLast,
}

impl Default for NullPolicy {
    fn default() -> Self {
        NullPolicy::NullLast
    }
}

/// Total order over `Value` for use as a range-index key. Comparing
/// across incompatible variants falls back to a stable kind ordering so
/// that a `BTreeMap<Value, _>` never panics; this mirrors the upgrade
/// from a NULL-only index to mixed storage (spec §4.6).
impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
            (Str(a), Str(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Ref(a), Ref(b)) => a.cmp(b),
            (List(a), List(b)) | (Tuple(a), Tuple(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

impl Value {
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::Bytes(_) => 4,
            Value::Ref(_) => 5,
            Value::Weak(_) => 6,
            Value::List(_) => 7,
            Value::Tuple(_) => 8,
        }
    }
}
