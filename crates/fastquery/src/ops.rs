//! Stock aggregate operators, grounded directly on `fast_query.py`'s
//! `count_op`/`make_sum`.
//!
//! An op is called as `op(state, removed_rows, added_rows)`: `state` is
//! `None` to request the initial value, otherwise the previous state to
//! fold a delta into. This is exactly the incremental-maintenance shape
//! a `GroupByBucket` drives its ops with.

use std::sync::Arc;

use dbzero_core::{ObjectUuid, Value};

/// `op(state, removed, added) -> new_state`.
pub type AggregateOp = Arc<dyn Fn(Option<&Value>, &[ObjectUuid], &[ObjectUuid]) -> Value + Send + Sync>;

/// Row count, maintained incrementally (`state - removed.len() + added.len()`).
pub fn count_op() -> AggregateOp {
    Arc::new(|state, removed, added| {
        let current = match state {
            None => 0i64,
            Some(Value::Int(n)) => *n,
            Some(_) => 0,
        };
        Value::Int(current - removed.len() as i64 + added.len() as i64)
    })
}

/// Builds a sum op over `value_of(row)`, maintained incrementally.
pub fn make_sum(value_of: Arc<dyn Fn(ObjectUuid) -> f64 + Send + Sync>) -> AggregateOp {
    Arc::new(move |state, removed, added| {
        let mut total = match state {
            None => 0.0,
            Some(Value::Float(f)) => *f,
            Some(Value::Int(n)) => *n as f64,
            Some(_) => 0.0,
        };
        for &id in removed {
            total -= value_of(id);
        }
        for &id in added {
            total += value_of(id);
        }
        Value::Float(total)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(b: u8) -> ObjectUuid {
        ObjectUuid::from_bytes([b; 16])
    }

    #[test]
    fn count_op_initializes_at_zero_and_tracks_deltas() {
        let op = count_op();
        let state = op(None, &[], &[]);
        assert_eq!(state, Value::Int(0));
        let state = op(Some(&state), &[], &[uid(1), uid(2)]);
        assert_eq!(state, Value::Int(2));
        let state = op(Some(&state), &[uid(1)], &[]);
        assert_eq!(state, Value::Int(1));
    }

    #[test]
    fn sum_op_folds_value_function_over_added_and_removed() {
        let op = make_sum(Arc::new(|id: ObjectUuid| id.as_bytes()[0] as f64));
        let state = op(None, &[], &[uid(3), uid(4)]);
        assert_eq!(state, Value::Float(7.0));
        let state = op(Some(&state), &[uid(3)], &[]);
        assert_eq!(state, Value::Float(4.0));
    }
}
