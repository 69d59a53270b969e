//! Delta selection combinators: `select_new` / `select_deleted` /
//! `select_modified`, grounded directly on
//! `original_source/dbzero_ce/dbzero_ce/select.py`.
//!
//! The original expresses these via `find(q, no(q'))` against a pair of
//! snapshots; here `pre`/`post` are two [`QuerySource`] bindings of the
//! *same* runnable query (the caller rebases it onto each snapshot
//! before calling in, mirroring `pre_snapshot.deserialize(query_data)` /
//! `last_snapshot.deserialize(query_data)`).

use std::collections::BTreeSet;

use dbzero_core::ObjectUuid;

use crate::node::QueryNode;
use crate::source::QuerySource;

/// Objects matching `query` in `post` but not in `pre` (or everything,
/// if there is no `pre` state — "there's no initial state, therefore
/// all results will be new").
pub fn select_new(query: &QueryNode, pre: Option<&dyn QuerySource>, post: &dyn QuerySource) -> BTreeSet<ObjectUuid> {
    let post_set = query.eval_set(post);
    match pre {
        None => post_set,
        Some(pre_source) => {
            let pre_set = query.eval_set(pre_source);
            post_set.difference(&pre_set).copied().collect()
        }
    }
}

/// Objects matching `query` in `pre` but no longer in `post`. Empty if
/// there is no `pre` state.
pub fn select_deleted(query: &QueryNode, pre: Option<&dyn QuerySource>, post: &dyn QuerySource) -> BTreeSet<ObjectUuid> {
    let Some(pre_source) = pre else {
        return BTreeSet::new();
    };
    let pre_set = query.eval_set(pre_source);
    let post_set = query.eval_set(post);
    pre_set.difference(&post_set).copied().collect()
}

/// Objects matching `query` in both `pre` and `post` that were written
/// to in between. `touched_since` stands in for the original's
/// `_select_mod_candidates` state-number-range scan: it answers "was
/// this object's last write state number within `(pre_state, post_state]`",
/// which only an engine tracking per-object last-write state numbers can
/// answer. Created objects are never reported, matching the original's
/// "only the ones existing in the pre-snapshot" note.
pub fn select_modified(
    query: &QueryNode,
    pre: Option<&dyn QuerySource>,
    post: &dyn QuerySource,
    touched_since: &dyn Fn(ObjectUuid) -> bool,
) -> BTreeSet<ObjectUuid> {
    let Some(pre_source) = pre else {
        return BTreeSet::new();
    };
    let pre_set = query.eval_set(pre_source);
    let post_set = query.eval_set(post);
    pre_set.intersection(&post_set).copied().filter(|id| touched_since(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbzero_core::{ClassUuid, TagKey, Value};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeSource {
        by_tag: HashMap<TagKey, BTreeSet<ObjectUuid>>,
    }

    impl QuerySource for FakeSource {
        fn type_tag_postings(&self, _class: ClassUuid) -> BTreeSet<ObjectUuid> {
            BTreeSet::new()
        }
        fn tag_postings(&self, key: &TagKey) -> BTreeSet<ObjectUuid> {
            self.by_tag.get(key).cloned().unwrap_or_default()
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

    fn uid(b: u8) -> ObjectUuid {
        ObjectUuid::from_bytes([b; 16])
    }

    #[test]
    fn no_pre_state_means_everything_is_new_and_nothing_is_deleted() {
        let tag = TagKey::String("red".into());
        let mut post = FakeSource::default();
        post.by_tag.insert(tag.clone(), [uid(1), uid(2)].into_iter().collect());
        let query = QueryNode::Tag(tag);

        assert_eq!(select_new(&query, None, &post), [uid(1), uid(2)].into_iter().collect());
        assert!(select_deleted(&query, None, &post).is_empty());
    }

    #[test]
    fn new_and_deleted_are_symmetric_set_differences() {
        let tag = TagKey::String("red".into());
        let mut pre = FakeSource::default();
        pre.by_tag.insert(tag.clone(), [uid(1), uid(2)].into_iter().collect());
        let mut post = FakeSource::default();
        post.by_tag.insert(tag.clone(), [uid(2), uid(3)].into_iter().collect());
        let query = QueryNode::Tag(tag);

        assert_eq!(select_new(&query, Some(&pre), &post), [uid(3)].into_iter().collect());
        assert_eq!(select_deleted(&query, Some(&pre), &post), [uid(1)].into_iter().collect());
    }

    #[test]
    fn modified_requires_presence_in_both_and_the_touched_predicate() {
        let tag = TagKey::String("red".into());
        let mut pre = FakeSource::default();
        pre.by_tag.insert(tag.clone(), [uid(1), uid(2)].into_iter().collect());
        let mut post = FakeSource::default();
        post.by_tag.insert(tag.clone(), [uid(1), uid(2)].into_iter().collect());
        let query = QueryNode::Tag(tag);

        let touched = |id: ObjectUuid| id == uid(2);
        assert_eq!(select_modified(&query, Some(&pre), &post, &touched), [uid(2)].into_iter().collect());
    }
}
