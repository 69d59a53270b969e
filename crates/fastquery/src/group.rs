//! `GroupDef`, `GroupByEval` and the top-level `group_by` entry point,
//! grounded on `fast_query.py`'s `GroupDef`/`GroupByEval`/`group_by`.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dbzero_core::{DbZeroError, DbZeroResult, ObjectUuid, TagKey, Value};
use dbzero_query::{content_uuid_of, signature_of, select_deleted, select_new, ContentUuid, QueryNode, QuerySource, Signature};
use rustc_hash::FxHasher;

use crate::bucket::GroupByBucket;
use crate::cache::{CacheEntry, FastQueryCache};
use crate::key::GroupKey;
use crate::ops::AggregateOp;

/// One dimension of a group-by. Mirrors the original's two group-def
/// shapes: a host key-extracting function, or an ordered list of
/// tag/enum split keys evaluated via [`QueryNode::SplitBy`].
#[derive(Clone)]
pub enum GroupDef {
    /// `row -> Value` extractor. `label` is its fingerprinting identity,
    /// the same role `QueryNode::Filter`'s label plays.
    KeyFn {
        /// Fingerprinting identity of the function.
        label: String,
        /// The extractor itself.
        f: Arc<dyn Fn(ObjectUuid) -> Value + Send + Sync>,
    },
    /// Split the query by these tag/enum keys; the matched key becomes
    /// this dimension's value.
    Groups(Vec<TagKey>),
}

impl std::fmt::Debug for GroupDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupDef::KeyFn { label, .. } => f.debug_tuple("KeyFn").field(label).finish(),
            GroupDef::Groups(keys) => f.debug_tuple("Groups").field(keys).finish(),
        }
    }
}

/// A query result row: a bare object, or an `(object, key)` pair when a
/// split is in effect.
#[derive(Debug, Clone, Copy)]
enum Row {
    Plain(ObjectUuid),
    Split(ObjectUuid, TagKey),
}

impl Row {
    fn object(&self) -> ObjectUuid {
        match self {
            Row::Plain(id) => *id,
            Row::Split(id, _) => *id,
        }
    }
}

/// Wrap `query` in a [`QueryNode::SplitBy`] for every [`GroupDef::Groups`]
/// dimension. At most one is supported — composing two independent
/// splits would need paired multi-level grouping that `QueryNode::grouped`
/// doesn't express, so a second one is rejected rather than silently
/// mis-evaluated.
fn apply_splits(query: &QueryNode, group_defs: &[GroupDef]) -> DbZeroResult<(QueryNode, bool)> {
    let mut composed = query.clone();
    let mut has_split = false;
    for group_def in group_defs {
        if let GroupDef::Groups(keys) = group_def {
            if has_split {
                return Err(DbZeroError::InvalidState {
                    reason: "group_by supports at most one tag/enum split dimension".into(),
                });
            }
            composed = QueryNode::SplitBy { keys: keys.clone(), query: Box::new(composed) };
            has_split = true;
        }
    }
    Ok((composed, has_split))
}

fn tag_key_to_value(key: &TagKey) -> Value {
    match key {
        TagKey::String(s) => Value::Str(s.clone()),
        TagKey::Enum(class, ord) => Value::Tuple(vec![Value::Bytes(class.as_bytes().to_vec()), Value::Int(*ord as i64)]),
        TagKey::Class(class) => Value::Bytes(class.as_bytes().to_vec()),
        TagKey::Object(obj) => Value::Ref(*obj),
    }
}

fn group_key(row: &Row, group_defs: &[GroupDef]) -> Value {
    let mut parts = Vec::with_capacity(group_defs.len());
    for group_def in group_defs {
        match group_def {
            GroupDef::KeyFn { f, .. } => parts.push(f(row.object())),
            GroupDef::Groups(_) => match row {
                Row::Split(_, key) => parts.push(tag_key_to_value(key)),
                Row::Plain(_) => unreachable!("a Groups dimension always evaluates through SplitBy rows"),
            },
        }
    }
    if parts.len() == 1 {
        parts.into_iter().next().unwrap()
    } else {
        Value::Tuple(parts)
    }
}

/// Rows for exactly `objects`, read at `source`. Narrower than a full
/// `composed.grouped(source)`/`eval_set(source)` scan because delta
/// evaluation only needs the changed ids, not the whole result set.
fn rows_for_objects(composed: &QueryNode, has_split: bool, source: &dyn QuerySource, objects: &[ObjectUuid]) -> Vec<Row> {
    if !has_split {
        return objects.iter().map(|&id| Row::Plain(id)).collect();
    }
    let wanted: std::collections::BTreeSet<ObjectUuid> = objects.iter().copied().collect();
    composed.grouped(source).into_iter().filter(|(id, _)| wanted.contains(id)).map(|(id, key)| Row::Split(id, key)).collect()
}

fn group_defs_fingerprint(group_defs: &[GroupDef]) -> u64 {
    let mut buf = Vec::new();
    for group_def in group_defs {
        match group_def {
            GroupDef::KeyFn { label, .. } => {
                buf.push(0u8);
                buf.extend_from_slice(&(label.len() as u32).to_le_bytes());
                buf.extend_from_slice(label.as_bytes());
            }
            GroupDef::Groups(keys) => {
                buf.push(1u8);
                buf.extend_from_slice(&(keys.len() as u32).to_le_bytes());
                for key in keys {
                    write_tag_key(key, &mut buf);
                }
            }
        }
    }
    let mut hasher = FxHasher::default();
    buf.hash(&mut hasher);
    hasher.finish()
}

fn write_tag_key(key: &TagKey, buf: &mut Vec<u8>) {
    match key {
        TagKey::String(s) => {
            buf.push(0);
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
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

fn combine(a: u64, b: u64) -> u64 {
    let mut hasher = FxHasher::default();
    a.hash(&mut hasher);
    b.hash(&mut hasher);
    hasher.finish()
}

/// Accumulates per-group-key [`GroupByBucket`]s from row deltas. Carries
/// forward the bucket map a cache hit seeded it with.
struct GroupByEval {
    data: HashMap<GroupKey, GroupByBucket>,
}

impl GroupByEval {
    fn new(seed: HashMap<GroupKey, GroupByBucket>) -> Self {
        Self { data: seed }
    }

    fn update(&mut self, group_defs: &[GroupDef], removed: &[Row], added: &[Row], ops: &[AggregateOp]) {
        let mut by_key: HashMap<GroupKey, (Vec<ObjectUuid>, Vec<ObjectUuid>)> = HashMap::new();
        for row in removed {
            by_key.entry(GroupKey(group_key(row, group_defs))).or_default().0.push(row.object());
        }
        for row in added {
            by_key.entry(GroupKey(group_key(row, group_defs))).or_default().1.push(row.object());
        }
        for (key, (removed_ids, added_ids)) in by_key {
            let bucket = self.data.entry(key).or_insert_with(|| GroupByBucket::new(ops));
            bucket.update(&removed_ids, &added_ids, ops);
        }
    }

    fn release(self) -> HashMap<GroupKey, GroupByBucket> {
        self.data
    }
}

fn format_result(result: &HashMap<GroupKey, GroupByBucket>) -> HashMap<Value, Value> {
    result.iter().map(|(key, bucket)| (key.0.clone(), bucket.result())).collect()
}

/// Group `query`'s results by `group_defs`, maintaining `ops`'
/// incremental state in `cache` across calls.
///
/// `current` must be bound to the prefix's finalized state `state_num`.
/// `previous` is the prior finalized state a cache entry might be resting
/// on — callers that can't supply one (e.g. no snapshot retained that far
/// back) will force a full re-evaluation on every cache miss.
#[allow(clippy::too_many_arguments)]
pub fn group_by(
    cache: &FastQueryCache,
    group_defs: &[GroupDef],
    query: &QueryNode,
    ops: &[AggregateOp],
    state_num: u64,
    current: &dyn QuerySource,
    previous: Option<(u64, &dyn QuerySource)>,
    max_scan: Option<u64>,
) -> DbZeroResult<HashMap<Value, Value>> {
    let (composed, has_split) = apply_splits(query, group_defs)?;
    let signature = Signature(combine(signature_of(&composed).0, group_defs_fingerprint(group_defs)));
    let uuid: ContentUuid = content_uuid_of(&composed, current);

    let cached = cache.find_result(signature, uuid, &composed, current);
    if let Some(entry) = &cached {
        if entry.state_num == state_num {
            return Ok(format_result(&entry.result));
        }
    }

    let (seed, removed_rows, added_rows) = match &cached {
        Some(entry) => {
            let Some((prev_state_num, prev_source)) = previous else {
                return Err(DbZeroError::InvalidState {
                    reason: "a cached fast-query result exists at an earlier state but no previous snapshot was supplied to delta against".into(),
                });
            };
            if prev_state_num != entry.state_num {
                return Err(DbZeroError::InvalidState {
                    reason: format!("previous snapshot is at state {prev_state_num}, cached result is at state {}", entry.state_num),
                });
            }
            let removed = select_deleted(&composed, Some(prev_source), current);
            let added = select_new(&composed, Some(prev_source), current);
            let removed_rows = rows_for_objects(&composed, has_split, prev_source, &removed.into_iter().collect::<Vec<_>>());
            let added_rows = rows_for_objects(&composed, has_split, current, &added.into_iter().collect::<Vec<_>>());
            (entry.result.clone(), removed_rows, added_rows)
        }
        None => {
            let all: Vec<ObjectUuid> = composed.eval_set(current).into_iter().collect();
            if let Some(budget) = max_scan {
                if all.len() as u64 > budget {
                    return Err(DbZeroError::MaxScanExceeded { max_scan: budget });
                }
            }
            let added_rows = rows_for_objects(&composed, has_split, current, &all);
            (HashMap::new(), Vec::new(), added_rows)
        }
    };

    let mut eval = GroupByEval::new(seed);
    eval.update(group_defs, &removed_rows, &added_rows, ops);
    let result = eval.release();

    cache.update(signature, uuid, CacheEntry { state_num, query: composed, result: result.clone() });
    Ok(format_result(&result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::count_op;
    use dbzero_core::ClassUuid;
    use std::collections::{BTreeSet, HashMap as Map};
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct FakeSource {
        by_class: Map<ClassUuid, BTreeSet<ObjectUuid>>,
        by_tag: Map<TagKey, BTreeSet<ObjectUuid>>,
        all: BTreeSet<ObjectUuid>,
    }

    impl QuerySource for FakeSource {
        fn type_tag_postings(&self, class: ClassUuid) -> BTreeSet<ObjectUuid> {
            self.by_class.get(&class).cloned().unwrap_or_default()
        }
        fn tag_postings(&self, key: &TagKey) -> BTreeSet<ObjectUuid> {
            self.by_tag.get(key).cloned().unwrap_or_default()
        }
        fn universe(&self) -> BTreeSet<ObjectUuid> {
            self.all.clone()
        }
        fn range(&self, _i: &str, _lo: Option<&Value>, _hi: Option<&Value>, _nf: bool) -> Vec<(Value, ObjectUuid)> {
            Vec::new()
        }
        fn sort(&self, _i: &str, items: Vec<ObjectUuid>, _d: bool, _nf: bool) -> Vec<ObjectUuid> {
            items
        }
    }

    fn uid(b: u8) -> ObjectUuid {
        ObjectUuid::from_bytes([b; 16])
    }

    #[test]
    fn full_scan_then_delta_tracks_a_changing_population() {
        let class = ClassUuid::from_qualified_name("app.Order");
        let red = TagKey::String("red".into());
        let blue = TagKey::String("blue".into());

        let mut state0 = FakeSource::default();
        state0.all = [uid(1), uid(2)].into_iter().collect();
        state0.by_class.insert(class, state0.all.clone());
        state0.by_tag.insert(red.clone(), [uid(1)].into_iter().collect());
        state0.by_tag.insert(blue.clone(), [uid(2)].into_iter().collect());

        let cache = FastQueryCache::new();
        let query = QueryNode::TypeFilter(class);
        let group_defs = vec![GroupDef::Groups(vec![red.clone(), blue.clone()])];
        let ops: Vec<AggregateOp> = vec![count_op()];

        let result0 = group_by(&cache, &group_defs, &query, &ops, 0, &state0, None, None).unwrap();
        assert_eq!(result0.get(&Value::Str("red".into())), Some(&Value::Int(1)));
        assert_eq!(result0.get(&Value::Str("blue".into())), Some(&Value::Int(1)));

        let mut state1 = state0.clone();
        state1.all.insert(uid(3));
        state1.by_class.get_mut(&class).unwrap().insert(uid(3));
        state1.by_tag.get_mut(&red).unwrap().insert(uid(3));

        let result1 = group_by(&cache, &group_defs, &query, &ops, 1, &state1, Some((0, &state0)), None).unwrap();
        assert_eq!(result1.get(&Value::Str("red".into())), Some(&Value::Int(2)));
        assert_eq!(result1.get(&Value::Str("blue".into())), Some(&Value::Int(1)));
    }

    #[test]
    fn repeat_call_at_the_same_state_reuses_the_cache_without_a_previous_source() {
        let class = ClassUuid::from_qualified_name("app.Order");
        let mut state0 = FakeSource::default();
        state0.all = [uid(1)].into_iter().collect();
        state0.by_class.insert(class, state0.all.clone());

        let cache = FastQueryCache::new();
        let query = QueryNode::TypeFilter(class);
        let group_defs = vec![GroupDef::KeyFn { label: "const".into(), f: Arc::new(|_| Value::Int(0)) }];
        let ops: Vec<AggregateOp> = vec![count_op()];

        let first = group_by(&cache, &group_defs, &query, &ops, 5, &state0, None, None).unwrap();
        let second = group_by(&cache, &group_defs, &query, &ops, 5, &state0, None, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.get(&Value::Int(0)), Some(&Value::Int(1)));
    }

    #[test]
    fn full_scan_past_max_scan_budget_is_rejected() {
        let class = ClassUuid::from_qualified_name("app.Order");
        let mut state0 = FakeSource::default();
        state0.all = [uid(1), uid(2)].into_iter().collect();
        state0.by_class.insert(class, state0.all.clone());

        let cache = FastQueryCache::new();
        let query = QueryNode::TypeFilter(class);
        let group_defs = vec![GroupDef::KeyFn { label: "const".into(), f: Arc::new(|_| Value::Int(0)) }];
        let ops: Vec<AggregateOp> = vec![count_op()];

        let err = group_by(&cache, &group_defs, &query, &ops, 0, &state0, None, Some(1)).unwrap_err();
        assert!(matches!(err, DbZeroError::MaxScanExceeded { max_scan: 1 }));
    }
}
