//! Per-evaluation state tracking.

use std::collections::HashMap;
use std::sync::Mutex;

use super::value::Value;

/// A sidecar recording intermediate values by AST node id.
///
/// Only written when the track-state or exhaustive decorators are
/// installed. One `EvalState` is owned by one eval call at a time; it is
/// not safe for concurrent mutation.
#[derive(Debug, Default)]
pub struct EvalState {
    values: Mutex<HashMap<i64, Value>>,
}

impl EvalState {
    /// Create a new, empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the value produced by a node.
    pub fn set(&self, id: i64, value: Value) {
        self.values.lock().expect("eval state poisoned").insert(id, value);
    }

    /// Fetch the recorded value for a node, if any.
    pub fn value(&self, id: i64) -> Option<Value> {
        self.values
            .lock()
            .expect("eval state poisoned")
            .get(&id)
            .cloned()
    }

    /// The node ids with recorded values, in ascending order.
    pub fn ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .values
            .lock()
            .expect("eval state poisoned")
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Clear all recorded values.
    pub fn reset(&self) {
        self.values.lock().expect("eval state poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_value_reset() {
        let state = EvalState::new();
        state.set(3, Value::Int(1));
        state.set(1, Value::Bool(true));

        assert_eq!(state.value(3), Some(Value::Int(1)));
        assert_eq!(state.value(2), None);
        assert_eq!(state.ids(), vec![1, 3]);

        state.reset();
        assert_eq!(state.value(3), None);
        assert!(state.ids().is_empty());
    }

    #[test]
    fn test_overwrite() {
        let state = EvalState::new();
        state.set(1, Value::Int(1));
        state.set(1, Value::Int(2));
        assert_eq!(state.value(1), Some(Value::Int(2)));
    }
}
