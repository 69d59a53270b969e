//! The lazy query tree (spec §4.7).
//!
//! Composition rules: positional arguments to a query builder combine
//! under [`QueryNode::And`]; a nested list/tuple combines under
//! [`QueryNode::Or`]; type arguments intersect with the class tag
//! posting list ([`QueryNode::TypeFilter`]).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dbzero_core::{ClassUuid, ObjectUuid, TagKey, Value};

use crate::source::QuerySource;

/// A node in the lazy query tree.
#[derive(Clone)]
pub enum QueryNode {
    /// Every object tagged with `class` (or a subclass).
    TypeFilter(ClassUuid),
    /// Every object carrying `key`.
    Tag(TagKey),
    /// Every object in the universe NOT carrying `key`.
    NotTag(TagKey),
    /// Every object in the universe not matched by the wrapped query.
    NotQuery(Box<QueryNode>),
    /// Set intersection of every child.
    And(Vec<QueryNode>),
    /// Set union of every child.
    Or(Vec<QueryNode>),
    /// Objects whose key in a named range index falls in `[lo, hi]`
    /// (unbounded on a side when `None`).
    RangeFilter {
        /// Range index name.
        index: String,
        /// Inclusive lower bound, or unbounded.
        lo: Option<Value>,
        /// Inclusive upper bound, or unbounded.
        hi: Option<Value>,
        /// Whether null keys sort before non-null ones.
        null_first: bool,
    },
    /// Presentation node: orders the wrapped query's result set by a
    /// named range index's key order. Membership is unchanged from the
    /// wrapped query; only [`QueryNode::ordered`] observes the order.
    Sort {
        /// Range index supplying key order.
        index: String,
        /// Wrapped query.
        query: Box<QueryNode>,
        /// Descending order.
        desc: bool,
        /// Null placement.
        null_first: bool,
    },
    /// A host-supplied predicate applied to the wrapped query's result
    /// set. `label` is the predicate's content-addressable identity for
    /// fingerprinting purposes (the closure itself has none); two
    /// `Filter` nodes with the same label are assumed, not proven, to
    /// apply the same predicate.
    Filter {
        /// Fingerprinting identity of the predicate.
        label: String,
        /// The predicate itself.
        predicate: Arc<dyn Fn(ObjectUuid) -> bool + Send + Sync>,
        /// Wrapped query.
        query: Box<QueryNode>,
    },
    /// Emits `(object, key)` pairs: every object in the wrapped query's
    /// result set that carries one of `keys`, once per matching key.
    SplitBy {
        /// Candidate split keys, checked in order.
        keys: Vec<TagKey>,
        /// Wrapped query.
        query: Box<QueryNode>,
    },
}

impl fmt::Debug for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::TypeFilter(c) => f.debug_tuple("TypeFilter").field(c).finish(),
            QueryNode::Tag(k) => f.debug_tuple("Tag").field(k).finish(),
            QueryNode::NotTag(k) => f.debug_tuple("NotTag").field(k).finish(),
            QueryNode::NotQuery(q) => f.debug_tuple("NotQuery").field(q).finish(),
            QueryNode::And(qs) => f.debug_tuple("And").field(qs).finish(),
            QueryNode::Or(qs) => f.debug_tuple("Or").field(qs).finish(),
            QueryNode::RangeFilter { index, lo, hi, null_first } => f
                .debug_struct("RangeFilter")
                .field("index", index)
                .field("lo", lo)
                .field("hi", hi)
                .field("null_first", null_first)
                .finish(),
            QueryNode::Sort { index, query, desc, null_first } => f
                .debug_struct("Sort")
                .field("index", index)
                .field("query", query)
                .field("desc", desc)
                .field("null_first", null_first)
                .finish(),
            QueryNode::Filter { label, query, .. } => {
                f.debug_struct("Filter").field("label", label).field("query", query).finish()
            }
            QueryNode::SplitBy { keys, query } => {
                f.debug_struct("SplitBy").field("keys", keys).field("query", query).finish()
            }
        }
    }
}

impl QueryNode {
    /// Combine `nodes` under AND (positional-argument composition rule).
    pub fn and(nodes: Vec<QueryNode>) -> QueryNode {
        QueryNode::And(nodes)
    }

    /// Combine `nodes` under OR (nested list/tuple composition rule).
    pub fn or(nodes: Vec<QueryNode>) -> QueryNode {
        QueryNode::Or(nodes)
    }

    /// Evaluate this node to its (unordered) result set.
    pub fn eval_set(&self, source: &dyn QuerySource) -> BTreeSet<ObjectUuid> {
        match self {
            QueryNode::TypeFilter(class) => source.type_tag_postings(*class),
            QueryNode::Tag(key) => source.tag_postings(key),
            QueryNode::NotTag(key) => {
                let excluded = source.tag_postings(key);
                source.universe().difference(&excluded).copied().collect()
            }
            QueryNode::NotQuery(inner) => {
                let excluded = inner.eval_set(source);
                source.universe().difference(&excluded).copied().collect()
            }
            QueryNode::And(children) => {
                let mut iter = children.iter();
                let Some(first) = iter.next() else {
                    return BTreeSet::new();
                };
                let mut acc = first.eval_set(source);
                for child in iter {
                    let next = child.eval_set(source);
                    acc = acc.intersection(&next).copied().collect();
                    if acc.is_empty() {
                        break;
                    }
                }
                acc
            }
            QueryNode::Or(children) => {
                let mut acc = BTreeSet::new();
                for child in children {
                    acc.extend(child.eval_set(source));
                }
                acc
            }
            QueryNode::RangeFilter { index, lo, hi, null_first } => source
                .range(index, lo.as_ref(), hi.as_ref(), *null_first)
                .into_iter()
                .map(|(_, id)| id)
                .collect(),
            QueryNode::Sort { query, .. } => query.eval_set(source),
            QueryNode::Filter { predicate, query, .. } => {
                query.eval_set(source).into_iter().filter(|id| predicate(*id)).collect()
            }
            QueryNode::SplitBy { query, .. } => query.eval_set(source),
        }
    }

    /// Evaluate to an ordered result, honoring a [`QueryNode::Sort`] at
    /// this node; any other node's set is returned in its natural
    /// (uuid) order, which is already the query engine's stable
    /// tie-break (spec §4.7: "stable by object uuid").
    pub fn ordered(&self, source: &dyn QuerySource) -> Vec<ObjectUuid> {
        match self {
            QueryNode::Sort { index, query, desc, null_first } => {
                let items: Vec<ObjectUuid> = query.eval_set(source).into_iter().collect();
                source.sort(index, items, *desc, *null_first)
            }
            other => other.eval_set(source).into_iter().collect(),
        }
    }

    /// Evaluate a [`QueryNode::SplitBy`] to `(object, key)` pairs. Any
    /// other node is treated as `SplitBy` with no keys (empty output).
    pub fn grouped(&self, source: &dyn QuerySource) -> Vec<(ObjectUuid, TagKey)> {
        let QueryNode::SplitBy { keys, query } = self else {
            return Vec::new();
        };
        let base = query.eval_set(source);
        let mut out = Vec::new();
        for key in keys {
            let postings = source.tag_postings(key);
            for id in base.intersection(&postings) {
                out.push((*id, key.clone()));
            }
        }
        out
    }
}
