//! Per-object field storage: `pos_vt` / `index_vt` / `kv_index` (spec
//! §4.4, "Object layout engine").

use std::collections::HashMap;

use dbzero_core::{ClassUuid, DbZeroError, DbZeroResult, ObjectUuid, Value, WeakProxy};
use smallvec::SmallVec;

use crate::layout::{ClassDescriptor, FieldShape};

/// Hashable projection of a [`Value`], used as a `kv_index` key. Lists and
/// tuples carry no total hash (their elements may themselves be
/// unhashable), so they're rejected with [`DbZeroError::Unhashable`]
/// rather than admitted into a dynamic key-value bag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KvKey {
    /// See `Value::Null`.
    Null,
    /// See `Value::Bool`.
    Bool(bool),
    /// See `Value::Int`.
    Int(i64),
    /// See `Value::Float`, compared bitwise so `NaN` keys are still
    /// well-defined map keys.
    FloatBits(u64),
    /// See `Value::Str`.
    Str(String),
    /// See `Value::Bytes`.
    Bytes(Vec<u8>),
    /// See `Value::Ref`.
    Ref(ObjectUuid),
    /// See `Value::Weak`.
    Weak(WeakProxy),
}

impl KvKey {
    /// Project `value` into a hashable key, or `Unhashable` for
    /// `List`/`Tuple`.
    pub fn from_value(value: &Value) -> DbZeroResult<Self> {
        Ok(match value {
            Value::Null => KvKey::Null,
            Value::Bool(b) => KvKey::Bool(*b),
            Value::Int(i) => KvKey::Int(*i),
            Value::Float(f) => KvKey::FloatBits(f.to_bits()),
            Value::Str(s) => KvKey::Str(s.clone()),
            Value::Bytes(b) => KvKey::Bytes(b.clone()),
            Value::Ref(r) => KvKey::Ref(*r),
            Value::Weak(w) => KvKey::Weak(*w),
            Value::List(_) | Value::Tuple(_) => {
                return Err(DbZeroError::Unhashable {
                    detail: format!("{:?} is not a valid kv_index key", value.kind()),
                })
            }
        })
    }
}

/// One object's field storage, shaped per its class's [`ClassDescriptor`].
pub struct ObjectRecord {
    uuid: ObjectUuid,
    class: ClassUuid,
    pos_vt: SmallVec<[Value; 8]>,
    index_vt: HashMap<String, Value>,
    kv_index: HashMap<KvKey, Value>,
}

impl ObjectRecord {
    /// A fresh record with `pos_vt_len` positional slots, all `Null`.
    pub fn new(uuid: ObjectUuid, class: ClassUuid, pos_vt_len: usize) -> Self {
        Self {
            uuid,
            class,
            pos_vt: smallvec::smallvec![Value::Null; pos_vt_len],
            index_vt: HashMap::new(),
            kv_index: HashMap::new(),
        }
    }

    /// This record's object uuid.
    pub fn uuid(&self) -> ObjectUuid {
        self.uuid
    }

    /// The class this record was created under.
    pub fn class(&self) -> ClassUuid {
        self.class
    }

    /// Read attribute `name`, dispatching on `descriptor`'s declared
    /// shape. An attribute the descriptor doesn't know about is looked up
    /// in `index_vt` directly (a dynamically-added sparse field).
    pub fn get_attr(&self, descriptor: &ClassDescriptor, name: &str) -> Option<&Value> {
        match descriptor.attribute(name).map(|a| a.shape) {
            Some(FieldShape::PosVt(slot)) => self.pos_vt.get(slot),
            Some(FieldShape::IndexVt) => self.index_vt.get(name),
            None => self.index_vt.get(name),
        }
    }

    /// Write attribute `name`, dispatching on `descriptor`'s declared
    /// shape. Attributes the descriptor doesn't declare land in
    /// `index_vt` (spec: attributes "appear only rarely or only on some
    /// instances").
    pub fn set_attr(&mut self, descriptor: &ClassDescriptor, name: &str, value: Value) {
        match descriptor.attribute(name).map(|a| a.shape) {
            Some(FieldShape::PosVt(slot)) => {
                if slot >= self.pos_vt.len() {
                    self.pos_vt.resize(slot + 1, Value::Null);
                }
                self.pos_vt[slot] = value;
            }
            Some(FieldShape::IndexVt) | None => {
                self.index_vt.insert(name.to_string(), value);
            }
        }
    }

    /// Remove a sparse `index_vt` attribute. `pos_vt` slots cannot be
    /// removed, only reset to `Null` via [`Self::set_attr`].
    pub fn remove_index_attr(&mut self, name: &str) -> Option<Value> {
        self.index_vt.remove(name)
    }

    /// Read a `kv_index` entry.
    pub fn get_kv(&self, key: &Value) -> DbZeroResult<Option<&Value>> {
        let key = KvKey::from_value(key)?;
        Ok(self.kv_index.get(&key))
    }

    /// Write a `kv_index` entry, rejecting non-hashable keys.
    pub fn set_kv(&mut self, key: Value, value: Value) -> DbZeroResult<()> {
        let key = KvKey::from_value(&key)?;
        self.kv_index.insert(key, value);
        Ok(())
    }

    /// Remove a `kv_index` entry.
    pub fn remove_kv(&mut self, key: &Value) -> DbZeroResult<Option<Value>> {
        let key = KvKey::from_value(key)?;
        Ok(self.kv_index.remove(&key))
    }

    /// Every currently-populated `pos_vt` slot value.
    pub fn pos_vt(&self) -> &[Value] {
        &self.pos_vt
    }

    /// Every currently-populated `index_vt` entry.
    pub fn index_vt(&self) -> &HashMap<String, Value> {
        &self.index_vt
    }

    /// Every currently-populated `kv_index` entry's value, by original
    /// (non-hashed) order is not preserved; callers needing key identity
    /// should track it separately.
    pub fn kv_values(&self) -> impl Iterator<Item = &Value> {
        self.kv_index.values()
    }
}
