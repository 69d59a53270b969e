//! Runnable (shape + leaf-key) serialization (spec §4.7: "`as_runnable()`
//! serializes the shape and the leaf keys (not contents) into a byte
//! string; `deserialize(bytes)` rebinds to the current snapshot so the
//! same runnable may execute across states").
//!
//! A [`QueryNode::Filter`] predicate has no serializable identity, so
//! the wire form only carries its `label`; [`deserialize`] takes a
//! resolver to rebind each label back to a predicate on the target
//! process.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use dbzero_core::{ClassUuid, DbZeroError, DbZeroResult, ObjectUuid, TagKey, Value};

use crate::node::QueryNode;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum RunnableNode {
    TypeFilter(ClassUuid),
    Tag(TagKey),
    NotTag(TagKey),
    NotQuery(Box<RunnableNode>),
    And(Vec<RunnableNode>),
    Or(Vec<RunnableNode>),
    RangeFilter {
        index: String,
        lo: Option<Value>,
        hi: Option<Value>,
        null_first: bool,
    },
    Sort {
        index: String,
        query: Box<RunnableNode>,
        desc: bool,
        null_first: bool,
    },
    Filter {
        label: String,
        query: Box<RunnableNode>,
    },
    SplitBy {
        keys: Vec<TagKey>,
        query: Box<RunnableNode>,
    },
}

fn to_runnable(node: &QueryNode) -> RunnableNode {
    match node {
        QueryNode::TypeFilter(c) => RunnableNode::TypeFilter(*c),
        QueryNode::Tag(k) => RunnableNode::Tag(k.clone()),
        QueryNode::NotTag(k) => RunnableNode::NotTag(k.clone()),
        QueryNode::NotQuery(inner) => RunnableNode::NotQuery(Box::new(to_runnable(inner))),
        QueryNode::And(children) => RunnableNode::And(children.iter().map(to_runnable).collect()),
        QueryNode::Or(children) => RunnableNode::Or(children.iter().map(to_runnable).collect()),
        QueryNode::RangeFilter { index, lo, hi, null_first } => RunnableNode::RangeFilter {
            index: index.clone(),
            lo: lo.clone(),
            hi: hi.clone(),
            null_first: *null_first,
        },
        QueryNode::Sort { index, query, desc, null_first } => RunnableNode::Sort {
            index: index.clone(),
            query: Box::new(to_runnable(query)),
            desc: *desc,
            null_first: *null_first,
        },
        QueryNode::Filter { label, query, .. } => RunnableNode::Filter {
            label: label.clone(),
            query: Box::new(to_runnable(query)),
        },
        QueryNode::SplitBy { keys, query } => RunnableNode::SplitBy {
            keys: keys.clone(),
            query: Box::new(to_runnable(query)),
        },
    }
}

fn from_runnable(node: RunnableNode, resolve: &dyn Fn(&str) -> DbZeroResult<Arc<dyn Fn(ObjectUuid) -> bool + Send + Sync>>) -> DbZeroResult<QueryNode> {
    Ok(match node {
        RunnableNode::TypeFilter(c) => QueryNode::TypeFilter(c),
        RunnableNode::Tag(k) => QueryNode::Tag(k),
        RunnableNode::NotTag(k) => QueryNode::NotTag(k),
        RunnableNode::NotQuery(inner) => QueryNode::NotQuery(Box::new(from_runnable(*inner, resolve)?)),
        RunnableNode::And(children) => {
            QueryNode::And(children.into_iter().map(|c| from_runnable(c, resolve)).collect::<DbZeroResult<_>>()?)
        }
        RunnableNode::Or(children) => {
            QueryNode::Or(children.into_iter().map(|c| from_runnable(c, resolve)).collect::<DbZeroResult<_>>()?)
        }
        RunnableNode::RangeFilter { index, lo, hi, null_first } => QueryNode::RangeFilter { index, lo, hi, null_first },
        RunnableNode::Sort { index, query, desc, null_first } => QueryNode::Sort {
            index,
            query: Box::new(from_runnable(*query, resolve)?),
            desc,
            null_first,
        },
        RunnableNode::Filter { label, query } => {
            let predicate = resolve(&label)?;
            QueryNode::Filter {
                label,
                predicate,
                query: Box::new(from_runnable(*query, resolve)?),
            }
        }
        RunnableNode::SplitBy { keys, query } => QueryNode::SplitBy {
            keys,
            query: Box::new(from_runnable(*query, resolve)?),
        },
    })
}

/// Serialize `query`'s shape and leaf keys (never posting contents).
pub fn as_runnable(query: &QueryNode) -> DbZeroResult<Vec<u8>> {
    rmp_serde::to_vec(&to_runnable(query)).map_err(|e| DbZeroError::Serialization(e.to_string()))
}

/// Rebind a runnable byte string to an executable [`QueryNode`]. `resolve`
/// is consulted once per [`QueryNode::Filter`] label encountered; pass a
/// resolver that errors (e.g. `DbZeroError::InvalidState`) if the tree is
/// known to carry no `Filter` nodes.
pub fn deserialize(
    bytes: &[u8],
    resolve: &dyn Fn(&str) -> DbZeroResult<Arc<dyn Fn(ObjectUuid) -> bool + Send + Sync>>,
) -> DbZeroResult<QueryNode> {
    let runnable: RunnableNode = rmp_serde::from_slice(bytes).map_err(|e| DbZeroError::Serialization(e.to_string()))?;
    from_runnable(runnable, resolve)
}
