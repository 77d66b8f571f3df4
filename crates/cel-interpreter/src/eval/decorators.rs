//! Plan-time tree rewrites.
//!
//! Decorators are applied bottom-up to every node as the planner
//! constructs it, in caller order. The exhaustive decorator must precede
//! the track-state decorator so recorded values reflect the exhaustive
//! arms.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::activation::EmptyActivation;
use super::interpretable::{EvalContext, Interpretable};
use super::planner::PlanError;
use super::state::EvalState;
use super::value::{MapKey, Value};

/// A plan-time rewrite applied to each interpretable as it is planned.
pub type Decorator =
    Arc<dyn Fn(Interpretable) -> Result<Interpretable, PlanError> + Send + Sync>;

/// Constant folding and call specialization.
///
/// Subtrees whose inputs are all constants are evaluated once at plan
/// time and replaced with constants; a fold that produces an error keeps
/// the error as the constant so evaluation reproduces the identical
/// message. Membership tests against constant lists become set lookups.
pub fn optimize() -> Decorator {
    Arc::new(|node| Ok(fold_node(node)))
}

fn fold_node(node: Interpretable) -> Interpretable {
    match node {
        Interpretable::CallResolved { .. }
        | Interpretable::CallDispatch { .. }
        | Interpretable::TypeOf { .. }
        | Interpretable::CreateList { .. }
        | Interpretable::CreateMap { .. }
        | Interpretable::CreateStruct { .. } => {
            if all_inputs_constant(&node) {
                let id = node.id();
                let vars = EmptyActivation;
                let value = node.eval(&EvalContext::new(&vars));
                debug!(id, %value, "constant-folded subtree");
                return Interpretable::Const { id, value };
            }
            specialize_in_set(node)
        }
        other => other,
    }
}

fn all_inputs_constant(node: &Interpretable) -> bool {
    match node {
        Interpretable::CallResolved { args, .. } | Interpretable::CallDispatch { args, .. } => {
            args.iter().all(|a| a.as_constant().is_some())
        }
        Interpretable::TypeOf { arg, .. } => arg.as_constant().is_some(),
        Interpretable::CreateList { elements, .. } => {
            elements.iter().all(|e| e.as_constant().is_some())
        }
        Interpretable::CreateMap { entries, .. } => entries
            .iter()
            .all(|(k, v)| k.as_constant().is_some() && v.as_constant().is_some()),
        Interpretable::CreateStruct { fields, .. } => {
            fields.iter().all(|(_, v)| v.as_constant().is_some())
        }
        _ => false,
    }
}

// Rewrite `x in [c1, c2, ...]` over an all-constant list of valid map
// keys into a set membership test.
fn specialize_in_set(node: Interpretable) -> Interpretable {
    let (id, function, args) = match &node {
        Interpretable::CallResolved {
            id,
            function,
            args,
            ..
        } => (*id, function.as_str(), args),
        Interpretable::CallDispatch {
            id,
            function,
            args,
            ..
        } => (*id, function.name.as_str(), args),
        _ => return node,
    };
    if !matches!(function, "_in_" | "@in") || args.len() != 2 {
        return node;
    }
    let Some(Value::List(items)) = args[1].as_constant() else {
        return node;
    };
    let mut set = BTreeSet::new();
    for item in items.iter() {
        match MapKey::from_value(item) {
            Some(key) => {
                set.insert(key);
            }
            None => return node,
        }
    }
    debug!(id, size = set.len(), "specialized constant in-list to set");
    let arg = match node {
        Interpretable::CallResolved { mut args, .. }
        | Interpretable::CallDispatch { mut args, .. } => args.swap_remove(0),
        _ => unreachable!(),
    };
    Interpretable::InSet {
        id,
        arg: Box::new(arg),
        set,
    }
}

/// Suppress short-circuiting: `&&`, `||`, and `?:` evaluate every
/// operand, and each node's value is recorded into `state`.
pub fn exhaustive_eval(state: Arc<EvalState>) -> Decorator {
    Arc::new(move |node| {
        let rewritten = match node {
            Interpretable::And { id, lhs, rhs } => Interpretable::ExhaustiveAnd { id, lhs, rhs },
            Interpretable::Or { id, lhs, rhs } => Interpretable::ExhaustiveOr { id, lhs, rhs },
            Interpretable::Conditional {
                id,
                guard,
                truthy,
                falsy,
            } => Interpretable::ExhaustiveConditional {
                id,
                guard,
                truthy,
                falsy,
            },
            other => other,
        };
        Ok(observe(rewritten, &state))
    })
}

/// Record every node's value into `state`, keyed by AST id.
///
/// Idempotent when composed with `exhaustive_eval` over the same state.
pub fn track_state(state: Arc<EvalState>) -> Decorator {
    Arc::new(move |node| Ok(observe(node, &state)))
}

fn observe(node: Interpretable, state: &Arc<EvalState>) -> Interpretable {
    if let Interpretable::Observed {
        state: existing, ..
    } = &node
    {
        if Arc::ptr_eq(existing, state) {
            return node;
        }
    }
    Interpretable::Observed {
        inner: Box::new(node),
        state: state.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::dispatcher::Function;
    use crate::eval::standard;
    use crate::eval::EmptyActivation;

    fn konst(id: i64, value: Value) -> Interpretable {
        Interpretable::Const { id, value }
    }

    fn add_call(id: i64, lhs: Interpretable, rhs: Interpretable) -> Interpretable {
        let d = standard::standard();
        Interpretable::CallDispatch {
            id,
            function: d.function("_+_").unwrap().clone(),
            args: vec![lhs, rhs],
            member: false,
        }
    }

    #[test]
    fn test_constant_call_folds() {
        let node = add_call(1, konst(2, Value::Int(1)), konst(3, Value::Int(2)));
        let folded = optimize()(node).unwrap();
        assert_eq!(folded.as_constant(), Some(&Value::Int(3)));
        assert_eq!(folded.cost(), crate::eval::Cost::new(0, 0));
    }

    #[test]
    fn test_fold_keeps_errors_as_constants() {
        let d = standard::standard();
        let node = Interpretable::CallDispatch {
            id: 1,
            function: d.function("uint").unwrap().clone(),
            args: vec![konst(2, Value::Int(-1))],
            member: false,
        };
        let folded = optimize()(node).unwrap();
        let value = folded.as_constant().unwrap();
        assert!(value.is_error());
    }

    #[test]
    fn test_dynamic_call_not_folded() {
        let dynamic = Interpretable::Attr(crate::eval::attributes::Attribute::maybe(
            2,
            vec!["x".to_string()],
        ));
        let node = add_call(1, dynamic, konst(3, Value::Int(2)));
        let kept = optimize()(node).unwrap();
        assert!(kept.as_constant().is_none());
    }

    #[test]
    fn test_in_set_specialization() {
        let dynamic = Interpretable::Attr(crate::eval::attributes::Attribute::maybe(
            2,
            vec!["ip".to_string()],
        ));
        let list = konst(3, Value::list(["10.0.1.4", "10.0.1.5"]));
        let d = standard::standard();
        let node = Interpretable::CallDispatch {
            id: 1,
            function: d.function("_in_").unwrap().clone(),
            args: vec![dynamic, list],
            member: false,
        };
        let specialized = optimize()(node).unwrap();
        assert!(matches!(specialized, Interpretable::InSet { .. }));
    }

    #[test]
    fn test_unsupported_set_elements_left_alone() {
        let dynamic = Interpretable::Attr(crate::eval::attributes::Attribute::maybe(
            2,
            vec!["x".to_string()],
        ));
        let list = konst(3, Value::list([Value::Double(1.5)]));
        let node = Interpretable::CallDispatch {
            id: 1,
            function: Function::new("_in_"),
            args: vec![dynamic, list],
            member: false,
        };
        let kept = optimize()(node).unwrap();
        assert!(matches!(kept, Interpretable::CallDispatch { .. }));
    }

    #[test]
    fn test_exhaustive_rewrites_and_observes() {
        let state = Arc::new(EvalState::new());
        let node = Interpretable::And {
            id: 1,
            lhs: Box::new(konst(2, Value::Bool(false))),
            rhs: Box::new(konst(3, Value::Bool(true))),
        };
        let rewritten = exhaustive_eval(state.clone())(node).unwrap();
        let vars = EmptyActivation;
        assert_eq!(
            rewritten.eval(&EvalContext::new(&vars)),
            Value::Bool(false)
        );
        assert_eq!(state.value(1), Some(Value::Bool(false)));
    }

    #[test]
    fn test_track_state_idempotent_with_exhaustive() {
        let state = Arc::new(EvalState::new());
        let node = konst(1, Value::Int(5));
        let once = exhaustive_eval(state.clone())(node).unwrap();
        let twice = track_state(state.clone())(once).unwrap();
        // Still a single observer layer.
        match &twice {
            Interpretable::Observed { inner, .. } => {
                assert!(matches!(inner.as_ref(), Interpretable::Const { .. }))
            }
            other => panic!("expected observed node, got {:?}", other),
        }
    }
}
