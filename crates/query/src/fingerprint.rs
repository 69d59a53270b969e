//! Query signature, content uuid and comparison (spec §4.7).
//!
//! **Signature** is a content-addressable fingerprint of the
//! canonicalized shape plus leaf-key identities only — it never touches
//! a [`QuerySource`], so it's stable across transactions regardless of
//! posting-list contents. **Content uuid** additionally folds in a
//! cheap summary (count + XOR of member uuids) of each leaf's current
//! postings, so equal results at different states still yield equal
//! uuids while different results almost never collide.

use std::hash::{Hash, Hasher};

use dbzero_core::{ObjectUuid, TagKey, Value};
use rustc_hash::FxHasher;

use crate::node::QueryNode;
use crate::source::QuerySource;

/// Shape + leaf-identity fingerprint. Two queries with the same
/// signature have the same tree shape and the same leaf keys, but may
/// currently evaluate to different result sets (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub u64);

/// Signature plus a content summary of current posting lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentUuid(pub u64);

/// Compute `query`'s signature.
pub fn signature_of(query: &QueryNode) -> Signature {
    let mut buf = Vec::new();
    write_shape(query, &mut buf);
    Signature(hash_bytes(&buf))
}

/// Compute `query`'s content uuid against `source`.
pub fn content_uuid_of(query: &QueryNode, source: &dyn QuerySource) -> ContentUuid {
    let mut buf = Vec::new();
    write_content(query, source, &mut buf);
    ContentUuid(hash_bytes(&buf))
}

/// Jaccard-style distance estimate: `|symmetric difference| / |union|`,
/// in `[0, 1]`. Two empty result sets compare as identical (`0.0`).
pub fn compare(a: &QueryNode, b: &QueryNode, source: &dyn QuerySource) -> f64 {
    let set_a = a.eval_set(source);
    let set_b = b.eval_set(source);
    let union: std::collections::BTreeSet<ObjectUuid> = set_a.union(&set_b).copied().collect();
    if union.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let sym_diff = union.len() - intersection;
    sym_diff as f64 / union.len() as f64
}

fn hash_bytes(buf: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    buf.hash(&mut hasher);
    hasher.finish()
}

fn write_str(s: &str, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn write_tag_key(key: &TagKey, buf: &mut Vec<u8>) {
    match key {
        TagKey::String(s) => {
            buf.push(0);
            write_str(s, buf);
        }
        TagKey::Enum(class, ord) => {
            buf.push(1);
            buf.extend_from_slice(class.as_bytes());
            buf.extend_from_slice(&ord.to_le_bytes());
        }
        TagKey::Class(class) => {
            buf.push(2);
            buf.extend_from_slice(class.as_bytes());
        }
        TagKey::Object(obj) => {
            buf.push(3);
            buf.extend_from_slice(obj.as_bytes());
        }
    }
}

fn write_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null => buf.push(0),
        Value::Bool(b) => {
            buf.push(1);
            buf.push(*b as u8);
        }
        Value::Int(i) => {
            buf.push(2);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            buf.push(3);
            buf.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::Str(s) => {
            buf.push(4);
            write_str(s, buf);
        }
        Value::Bytes(b) => {
            buf.push(5);
            buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
            buf.extend_from_slice(b);
        }
        Value::Ref(r) => {
            buf.push(6);
            buf.extend_from_slice(r.as_bytes());
        }
        Value::Weak(w) => {
            buf.push(7);
            buf.extend_from_slice(w.prefix.as_bytes());
            buf.extend_from_slice(w.target.as_bytes());
        }
        Value::List(items) => {
            buf.push(8);
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                write_value(item, buf);
            }
        }
        Value::Tuple(items) => {
            buf.push(9);
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                write_value(item, buf);
            }
        }
    }
}

fn write_opt_value(value: &Option<Value>, buf: &mut Vec<u8>) {
    match value {
        Some(v) => {
            buf.push(1);
            write_value(v, buf);
        }
        None => buf.push(0),
    }
}

fn write_shape(node: &QueryNode, buf: &mut Vec<u8>) {
    match node {
        QueryNode::TypeFilter(class) => {
            buf.push(0);
            buf.extend_from_slice(class.as_bytes());
        }
        QueryNode::Tag(key) => {
            buf.push(1);
            write_tag_key(key, buf);
        }
        QueryNode::NotTag(key) => {
            buf.push(2);
            write_tag_key(key, buf);
        }
        QueryNode::NotQuery(inner) => {
            buf.push(3);
            write_shape(inner, buf);
        }
        QueryNode::And(children) => {
            buf.push(4);
            buf.extend_from_slice(&(children.len() as u32).to_le_bytes());
            for child in children {
                write_shape(child, buf);
            }
        }
        QueryNode::Or(children) => {
            buf.push(5);
            buf.extend_from_slice(&(children.len() as u32).to_le_bytes());
            for child in children {
                write_shape(child, buf);
            }
        }
        QueryNode::RangeFilter { index, lo, hi, null_first } => {
            buf.push(6);
            write_str(index, buf);
            write_opt_value(lo, buf);
            write_opt_value(hi, buf);
            buf.push(*null_first as u8);
        }
        QueryNode::Sort { index, query, desc, null_first } => {
            buf.push(7);
            write_str(index, buf);
            write_shape(query, buf);
            buf.push(*desc as u8);
            buf.push(*null_first as u8);
        }
        QueryNode::Filter { label, query, .. } => {
            buf.push(8);
            write_str(label, buf);
            write_shape(query, buf);
        }
        QueryNode::SplitBy { keys, query } => {
            buf.push(9);
            buf.extend_from_slice(&(keys.len() as u32).to_le_bytes());
            for key in keys {
                write_tag_key(key, buf);
            }
            write_shape(query, buf);
        }
    }
}

fn write_posting_summary(ids: &std::collections::BTreeSet<ObjectUuid>, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(ids.len() as u64).to_le_bytes());
    let mut fold = [0u8; 16];
    for id in ids {
        for (f, b) in fold.iter_mut().zip(id.as_bytes().iter()) {
            *f ^= b;
        }
    }
    buf.extend_from_slice(&fold);
}

fn write_content(node: &QueryNode, source: &dyn QuerySource, buf: &mut Vec<u8>) {
    write_shape(node, buf);
    match node {
        QueryNode::TypeFilter(class) => write_posting_summary(&source.type_tag_postings(*class), buf),
        QueryNode::Tag(key) | QueryNode::NotTag(key) => write_posting_summary(&source.tag_postings(key), buf),
        QueryNode::RangeFilter { index, lo, hi, null_first } => {
            let ids: std::collections::BTreeSet<ObjectUuid> =
                source.range(index, lo.as_ref(), hi.as_ref(), *null_first).into_iter().map(|(_, id)| id).collect();
            write_posting_summary(&ids, buf);
        }
        QueryNode::NotQuery(inner) => write_content(inner, source, buf),
        QueryNode::And(children) | QueryNode::Or(children) => {
            for child in children {
                write_content(child, source, buf);
            }
        }
        QueryNode::Sort { query, .. } | QueryNode::Filter { query, .. } | QueryNode::SplitBy { query, .. } => {
            write_content(query, source, buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::QuerySource;
    use dbzero_core::ClassUuid;
    use std::collections::{BTreeSet, HashMap};

    #[derive(Default)]
    struct FakeSource {
        by_class: HashMap<ClassUuid, BTreeSet<ObjectUuid>>,
    }

    impl QuerySource for FakeSource {
        fn type_tag_postings(&self, class: ClassUuid) -> BTreeSet<ObjectUuid> {
            self.by_class.get(&class).cloned().unwrap_or_default()
        }
        fn tag_postings(&self, _key: &TagKey) -> BTreeSet<ObjectUuid> {
            BTreeSet::new()
        }
        fn universe(&self) -> BTreeSet<ObjectUuid> {
            BTreeSet::new()
        }
        fn range(&self, _i: &str, _lo: Option<&Value>, _hi: Option<&Value>, _nf: bool) -> Vec<(Value, ObjectUuid)> {
            Vec::new()
        }
        fn sort(&self, _i: &str, items: Vec<ObjectUuid>, _d: bool, _nf: bool) -> Vec<ObjectUuid> {
            items
        }
    }

    #[test]
    fn signature_is_stable_regardless_of_postings() {
        let class = ClassUuid::from_qualified_name("app.Widget");
        let query = QueryNode::TypeFilter(class);
        let mut src = FakeSource::default();
        let sig_before = signature_of(&query);
        src.by_class.insert(class, [ObjectUuid::new()].into_iter().collect());
        let sig_after = signature_of(&query);
        assert_eq!(sig_before, sig_after);
    }

    #[test]
    fn content_uuid_changes_when_postings_change() {
        let class = ClassUuid::from_qualified_name("app.Widget");
        let query = QueryNode::TypeFilter(class);
        let mut src = FakeSource::default();
        let uuid_before = content_uuid_of(&query, &src);
        src.by_class.insert(class, [ObjectUuid::new()].into_iter().collect());
        let uuid_after = content_uuid_of(&query, &src);
        assert_ne!(uuid_before, uuid_after);
    }

    #[test]
    fn compare_of_identical_queries_is_zero() {
        let class = ClassUuid::from_qualified_name("app.Widget");
        let mut src = FakeSource::default();
        src.by_class.insert(class, [ObjectUuid::new(), ObjectUuid::new()].into_iter().collect());
        let query = QueryNode::TypeFilter(class);
        assert_eq!(compare(&query, &query, &src), 0.0);
    }

    #[test]
    fn compare_of_disjoint_queries_is_one() {
        let a = ClassUuid::from_qualified_name("app.A");
        let b = ClassUuid::from_qualified_name("app.B");
        let mut src = FakeSource::default();
        src.by_class.insert(a, [ObjectUuid::from_bytes([1; 16])].into_iter().collect());
        src.by_class.insert(b, [ObjectUuid::from_bytes([2; 16])].into_iter().collect());
        assert_eq!(compare(&QueryNode::TypeFilter(a), &QueryNode::TypeFilter(b), &src), 1.0);
    }
}
