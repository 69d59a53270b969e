//! [`Query`]: composing and evaluating a `dbzero_query::QueryNode` tree
//! against one session's prefix.

use std::collections::HashMap;
use std::sync::Arc;

use dbzero_core::{ClassUuid, DbZeroResult, ObjectUuid, TagKey, Value};
use dbzero_engine::Engine;
use dbzero_fastquery::{group_by, AggregateOp, GroupDef};
use dbzero_query::{QueryNode, QuerySource};

/// A composed query bound to one prefix, evaluated on demand against its
/// current state (never cached across calls — `dbzero_fastquery`'s cache
/// is what `group_by` uses internally for incremental re-evaluation).
pub struct Query {
    engine: Arc<Engine>,
    prefix: String,
    node: QueryNode,
}

impl Query {
    /// An empty query (matches nothing until `with` narrows it).
    pub(crate) fn new(engine: Arc<Engine>, prefix: String) -> Self {
        Self { engine, prefix, node: QueryNode::Or(Vec::new()) }
    }

    /// Replace this query's tree.
    pub fn with(mut self, node: QueryNode) -> Self {
        self.node = node;
        self
    }

    /// Every object tagged with `class` (or a subclass).
    pub fn of_class(class: ClassUuid) -> QueryNode {
        QueryNode::TypeFilter(class)
    }

    /// Every object carrying `key`.
    pub fn tagged(key: TagKey) -> QueryNode {
        QueryNode::Tag(key)
    }

    /// This query's matches as a set (spec §4.7 `find`).
    pub fn run(&self) -> DbZeroResult<Vec<ObjectUuid>> {
        let source = self.engine.query_source(&self.prefix)?;
        Ok(self.node.eval_set(source.as_ref()).into_iter().collect())
    }

    /// This query's matches ordered by a declared range index or tag
    /// grouping (spec §4.7 `ordered`).
    pub fn ordered(&self) -> DbZeroResult<Vec<ObjectUuid>> {
        let source = self.engine.query_source(&self.prefix)?;
        Ok(self.node.ordered(source.as_ref()))
    }

    /// Incremental group-by over this query's results (spec §4.8),
    /// against the prefix's current state. `state_num` identifies that
    /// state for the cache's own staleness check (callers that want
    /// delta evaluation against a retained prior snapshot should call
    /// `dbzero_fastquery::group_by` directly with that snapshot's
    /// `QuerySource`; this facade only covers the common from-scratch
    /// or always-current case).
    pub fn group_by(&self, group_defs: &[GroupDef], ops: &[AggregateOp], state_num: u64, max_scan: Option<u64>) -> DbZeroResult<HashMap<Value, Value>> {
        let source = self.engine.query_source(&self.prefix)?;
        group_by(self.engine.fastquery(), group_defs, &self.node, ops, state_num, source.as_ref(), None, max_scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbzero_engine::DbZeroConfig;
    use dbzero_objects::ClassDescriptorBuilder;
    use tempfile::tempdir;

    #[test]
    fn run_finds_objects_by_type_tag() {
        let dir = tempdir().unwrap();
        let mut config = DbZeroConfig::default();
        config.autocommit = false;
        let engine = Engine::open_with_config(dir.path(), config).unwrap();
        let class = ClassDescriptorBuilder::new("app.Thing").build();
        let class_uuid = class.uuid();
        engine
            .open_prefix("p", true, |registry| {
                registry.register(class.clone());
            })
            .unwrap();
        let obj = engine.create_object("p", &class).unwrap();

        let query = Query::new(Arc::clone(&engine), "p".to_string()).with(Query::of_class(class_uuid));
        assert_eq!(query.run().unwrap(), vec![obj]);
    }
}
