//! Planned, directly evaluable expression nodes.
//!
//! The planner lowers AST nodes into this closed set of interpretable
//! forms. A planned tree is immutable and safe to share across threads;
//! each evaluation supplies its own `EvalContext` (activation plus an
//! optional interrupt token).

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::activation::{Activation, HierarchicalActivation};
use super::adapter::TypeRegistry;
use super::attributes::{test_field, Attribute, LiteralEntries};
use super::dispatcher::{Function, Overload};
use super::error::EvalError;
use super::state::EvalState;
use super::value::{strict_propagate, MapKey, UnknownSet, Value};

/// A `(min, max)` estimate of how many evaluation steps a node may take.
///
/// Estimates are informational; they never affect results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cost {
    pub min: i64,
    pub max: i64,
}

impl Cost {
    /// A cost with the given bounds.
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// The zero cost.
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// One evaluation step.
    pub fn one() -> Self {
        Self::new(1, 1)
    }

    /// Component-wise saturating sum.
    pub fn add(&self, other: &Cost) -> Cost {
        Cost::new(
            self.min.saturating_add(other.min),
            self.max.saturating_add(other.max),
        )
    }

    /// Component-wise saturating multiple.
    pub fn times(&self, n: i64) -> Cost {
        Cost::new(self.min.saturating_mul(n), self.max.saturating_mul(n))
    }
}

/// Per-evaluation context: the activation plus an optional interrupt
/// token checked by comprehension loops.
pub struct EvalContext<'a> {
    /// Variable bindings for this evaluation.
    pub vars: &'a dyn Activation,
    /// Interrupt token; when set, comprehensions stop with an
    /// `interrupted` error before their next iteration.
    pub interrupt: Option<&'a AtomicBool>,
}

impl<'a> EvalContext<'a> {
    /// A context over an activation with no interrupt token.
    pub fn new(vars: &'a dyn Activation) -> Self {
        Self {
            vars,
            interrupt: None,
        }
    }

    /// A context with an interrupt token.
    pub fn with_interrupt(vars: &'a dyn Activation, interrupt: &'a AtomicBool) -> Self {
        Self {
            vars,
            interrupt: Some(interrupt),
        }
    }

    /// A child context over a nested activation frame.
    pub fn child<'b>(&self, vars: &'b dyn Activation) -> EvalContext<'b>
    where
        'a: 'b,
    {
        EvalContext {
            vars,
            interrupt: self.interrupt,
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// A planned, directly evaluable node.
#[derive(Debug)]
pub enum Interpretable {
    /// A constant value.
    Const { id: i64, value: Value },
    /// An attribute reference (identifier plus qualifier chain).
    Attr(Attribute),
    /// Short-circuit logical and: a literal `false` on either side wins
    /// over errors and unknowns on the other.
    And {
        id: i64,
        lhs: Box<Interpretable>,
        rhs: Box<Interpretable>,
    },
    /// Short-circuit logical or, symmetric to `And` with `true`.
    Or {
        id: i64,
        lhs: Box<Interpretable>,
        rhs: Box<Interpretable>,
    },
    /// Logical and that always evaluates both operands; errors surface
    /// even when the other side is false.
    ExhaustiveAnd {
        id: i64,
        lhs: Box<Interpretable>,
        rhs: Box<Interpretable>,
    },
    /// Logical or that always evaluates both operands.
    ExhaustiveOr {
        id: i64,
        lhs: Box<Interpretable>,
        rhs: Box<Interpretable>,
    },
    /// Ternary selection evaluating only the chosen arm.
    Conditional {
        id: i64,
        guard: Box<Interpretable>,
        truthy: Box<Interpretable>,
        falsy: Box<Interpretable>,
    },
    /// Ternary selection evaluating both arms.
    ExhaustiveConditional {
        id: i64,
        guard: Box<Interpretable>,
        truthy: Box<Interpretable>,
        falsy: Box<Interpretable>,
    },
    /// The non-strict fold guard: anything but a literal `false` is true.
    NotStrictlyFalse { id: i64, arg: Box<Interpretable> },
    /// `type(x)`.
    TypeOf { id: i64, arg: Box<Interpretable> },
    /// A call bound to a single overload at plan time.
    CallResolved {
        id: i64,
        function: String,
        overload: Overload,
        args: Vec<Interpretable>,
        member: bool,
    },
    /// A call dispatched at runtime over the function's overloads.
    CallDispatch {
        id: i64,
        function: Function,
        args: Vec<Interpretable>,
        member: bool,
    },
    /// Specialized membership test against a constant set.
    InSet {
        id: i64,
        arg: Box<Interpretable>,
        set: BTreeSet<MapKey>,
    },
    /// A list literal.
    CreateList {
        id: i64,
        elements: Vec<Interpretable>,
    },
    /// A map literal; entries evaluate in source order.
    CreateMap {
        id: i64,
        entries: Vec<(Interpretable, Interpretable)>,
    },
    /// A message literal built through the type registry.
    CreateStruct {
        id: i64,
        type_name: String,
        fields: Vec<(String, Interpretable)>,
        registry: Arc<TypeRegistry>,
    },
    /// The generic fold all list/map macros lower to.
    Fold {
        id: i64,
        accu_var: String,
        iter_var: String,
        iter_range: Box<Interpretable>,
        accu_init: Box<Interpretable>,
        loop_condition: Box<Interpretable>,
        loop_step: Box<Interpretable>,
        result: Box<Interpretable>,
    },
    /// Field-presence test, `has(operand.field)`.
    TestField {
        id: i64,
        operand: Box<Interpretable>,
        field: String,
    },
    /// State-tracking wrapper recording the inner node's value by id.
    Observed {
        inner: Box<Interpretable>,
        state: Arc<EvalState>,
    },
}

impl Interpretable {
    /// The AST node id this interpretable was planned from.
    pub fn id(&self) -> i64 {
        match self {
            Interpretable::Const { id, .. }
            | Interpretable::And { id, .. }
            | Interpretable::Or { id, .. }
            | Interpretable::ExhaustiveAnd { id, .. }
            | Interpretable::ExhaustiveOr { id, .. }
            | Interpretable::Conditional { id, .. }
            | Interpretable::ExhaustiveConditional { id, .. }
            | Interpretable::NotStrictlyFalse { id, .. }
            | Interpretable::TypeOf { id, .. }
            | Interpretable::CallResolved { id, .. }
            | Interpretable::CallDispatch { id, .. }
            | Interpretable::InSet { id, .. }
            | Interpretable::CreateList { id, .. }
            | Interpretable::CreateMap { id, .. }
            | Interpretable::CreateStruct { id, .. }
            | Interpretable::Fold { id, .. }
            | Interpretable::TestField { id, .. } => *id,
            Interpretable::Attr(attr) => attr.id(),
            Interpretable::Observed { inner, .. } => inner.id(),
        }
    }

    /// The constant this node evaluates to, if it is a constant.
    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Interpretable::Const { value, .. } => Some(value),
            Interpretable::Observed { inner, .. } => inner.as_constant(),
            _ => None,
        }
    }

    /// Evaluate the node to a single value.
    pub fn eval(&self, ctx: &EvalContext<'_>) -> Value {
        match self {
            Interpretable::Const { value, .. } => value.clone(),
            Interpretable::Attr(attr) => attr.resolve(ctx),
            Interpretable::And { id, lhs, rhs } => eval_and(*id, lhs, rhs, ctx),
            Interpretable::Or { id, lhs, rhs } => eval_or(*id, lhs, rhs, ctx),
            Interpretable::ExhaustiveAnd { id, lhs, rhs } => {
                let lv = lhs.eval(ctx);
                let rv = rhs.eval(ctx);
                eval_logic_exhaustive(*id, lv, rv, false)
            }
            Interpretable::ExhaustiveOr { id, lhs, rhs } => {
                let lv = lhs.eval(ctx);
                let rv = rhs.eval(ctx);
                eval_logic_exhaustive(*id, lv, rv, true)
            }
            Interpretable::Conditional {
                id,
                guard,
                truthy,
                falsy,
            } => match guard.eval(ctx) {
                Value::Bool(true) => truthy.eval(ctx),
                Value::Bool(false) => falsy.eval(ctx),
                other @ (Value::Error(_) | Value::Unknown(_)) => other,
                _ => Value::error(EvalError::no_such_overload("_?_:_").at(*id)),
            },
            Interpretable::ExhaustiveConditional {
                id,
                guard,
                truthy,
                falsy,
            } => {
                let guard_val = guard.eval(ctx);
                let truthy_val = truthy.eval(ctx);
                let falsy_val = falsy.eval(ctx);
                match guard_val {
                    Value::Bool(true) => truthy_val,
                    Value::Bool(false) => falsy_val,
                    other @ (Value::Error(_) | Value::Unknown(_)) => other,
                    _ => Value::error(EvalError::no_such_overload("_?_:_").at(*id)),
                }
            }
            Interpretable::NotStrictlyFalse { arg, .. } => match arg.eval(ctx) {
                Value::Bool(b) => Value::Bool(b),
                _ => Value::Bool(true),
            },
            Interpretable::TypeOf { arg, .. } => {
                let value = arg.eval(ctx);
                if let Some(v) = strict_propagate(std::slice::from_ref(&value)) {
                    return v;
                }
                Value::Type(value.type_value())
            }
            Interpretable::CallResolved {
                id,
                overload,
                args,
                ..
            } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.eval(ctx));
                }
                if let Some(v) = strict_propagate(&values) {
                    return v;
                }
                attach_id(overload.call(&values), *id)
            }
            Interpretable::CallDispatch {
                id,
                function,
                args,
                member,
            } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.eval(ctx));
                }
                if let Some(v) = strict_propagate(&values) {
                    return v;
                }
                match function.find_matching(&values, *member) {
                    Some(overload) => attach_id(overload.call(&values), *id),
                    None if function.overloads.is_empty() => Value::error(
                        EvalError::new(
                            super::error::EvalErrorKind::NoSuchOverload,
                            format!("unknown function: {}", function.name),
                        )
                        .at(*id),
                    ),
                    None => Value::error(EvalError::no_such_overload(&function.name).at(*id)),
                }
            }
            Interpretable::InSet { arg, set, .. } => {
                let value = arg.eval(ctx);
                if let Some(v) = strict_propagate(std::slice::from_ref(&value)) {
                    return v;
                }
                match MapKey::from_value(&value) {
                    Some(key) => Value::Bool(set.contains(&key)),
                    None => Value::Bool(false),
                }
            }
            Interpretable::CreateList { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                let mut unknown: Option<UnknownSet> = None;
                for elem in elements {
                    let value = elem.eval(ctx);
                    match value {
                        Value::Error(_) => return value,
                        Value::Unknown(u) => {
                            unknown = Some(match unknown {
                                Some(acc) => acc.union(&u),
                                None => u,
                            });
                        }
                        _ => values.push(value),
                    }
                }
                match unknown {
                    Some(u) => Value::Unknown(u),
                    None => Value::List(Arc::from(values)),
                }
            }
            Interpretable::CreateMap { id, entries } => {
                let mut literal = LiteralEntries::new();
                let mut unknown: Option<UnknownSet> = None;
                for (key_node, value_node) in entries {
                    let key = key_node.eval(ctx);
                    if key.is_error() {
                        return key;
                    }
                    let value = value_node.eval(ctx);
                    if value.is_error() {
                        return value;
                    }
                    match (&key, &value) {
                        (Value::Unknown(u), _) | (_, Value::Unknown(u)) => {
                            unknown = Some(match unknown {
                                Some(acc) => acc.union(u),
                                None => u.clone(),
                            });
                            continue;
                        }
                        _ => {}
                    }
                    let Some(map_key) = MapKey::from_value(&key) else {
                        return Value::error(
                            EvalError::no_such_overload(&format!(
                                "unsupported map key type '{}'",
                                key.kind_name()
                            ))
                            .at(*id),
                        );
                    };
                    if let Err(e) = literal.insert(map_key, value) {
                        return Value::error(e.at(*id));
                    }
                }
                match unknown {
                    Some(u) => Value::Unknown(u),
                    None => literal.into_value(),
                }
            }
            Interpretable::CreateStruct {
                id,
                type_name,
                fields,
                registry,
            } => {
                let mut entries = Vec::with_capacity(fields.len());
                let mut unknown: Option<UnknownSet> = None;
                for (name, node) in fields {
                    let value = node.eval(ctx);
                    match value {
                        Value::Error(_) => return value,
                        Value::Unknown(u) => {
                            unknown = Some(match unknown {
                                Some(acc) => acc.union(&u),
                                None => u,
                            });
                        }
                        _ => entries.push((name.clone(), value)),
                    }
                }
                if let Some(u) = unknown {
                    return Value::Unknown(u);
                }
                attach_id(registry.new_message(type_name, entries), *id)
            }
            Interpretable::Fold {
                id,
                accu_var,
                iter_var,
                iter_range,
                accu_init,
                loop_condition,
                loop_step,
                result,
            } => {
                let range = iter_range.eval(ctx);
                if let Some(v) = strict_propagate(std::slice::from_ref(&range)) {
                    return v;
                }
                let mut accu = accu_init.eval(ctx);
                if accu.is_error() {
                    return accu;
                }

                let items: Vec<Value> = match &range {
                    Value::List(list) => list.to_vec(),
                    Value::Map(map) => map.keys().map(MapKey::to_value).collect(),
                    _ => {
                        return Value::error(
                            EvalError::no_such_overload(&format!(
                                "type '{}' is not iterable",
                                range.kind_name()
                            ))
                            .at(*id),
                        )
                    }
                };

                for item in items {
                    if ctx.interrupted() {
                        return Value::error(EvalError::interrupted().at(*id));
                    }
                    let mut frame = HierarchicalActivation::new(ctx.vars)
                        .with_binding(accu_var.as_str(), accu.clone());
                    if !iter_var.is_empty() {
                        frame.insert(iter_var.as_str(), item);
                    }
                    let iter_ctx = ctx.child(&frame);

                    match loop_condition.eval(&iter_ctx) {
                        Value::Bool(true) => {}
                        Value::Bool(false) => break,
                        other @ (Value::Error(_) | Value::Unknown(_)) => return other,
                        _ => {
                            return Value::error(
                                EvalError::no_such_overload("<loop condition>").at(*id),
                            )
                        }
                    }
                    // Errors flowing into the accumulator are not fatal
                    // here: short-circuit logic in the step expression may
                    // still absorb them.
                    accu = loop_step.eval(&iter_ctx);
                }

                let frame =
                    HierarchicalActivation::new(ctx.vars).with_binding(accu_var.as_str(), accu);
                let result_ctx = ctx.child(&frame);
                result.eval(&result_ctx)
            }
            Interpretable::TestField { id, operand, field } => {
                let value = operand.eval(ctx);
                test_field(&value, field, *id)
            }
            Interpretable::Observed { inner, state } => {
                let value = inner.eval(ctx);
                state.set(inner.id(), value.clone());
                value
            }
        }
    }

    /// The `(min, max)` evaluation cost estimate for this node.
    pub fn cost(&self) -> Cost {
        match self {
            Interpretable::Const { .. } => Cost::none(),
            Interpretable::Attr(attr) => attr.cost(),
            Interpretable::And { lhs, rhs, .. } | Interpretable::Or { lhs, rhs, .. } => {
                let l = lhs.cost();
                let r = rhs.cost();
                Cost::new(
                    l.min.min(r.min),
                    l.max.saturating_add(r.max).saturating_add(1),
                )
            }
            Interpretable::ExhaustiveAnd { lhs, rhs, .. }
            | Interpretable::ExhaustiveOr { lhs, rhs, .. } => {
                lhs.cost().add(&rhs.cost()).add(&Cost::one())
            }
            Interpretable::Conditional {
                guard,
                truthy,
                falsy,
                ..
            } => {
                let t = truthy.cost();
                let f = falsy.cost();
                guard.cost().add(&Cost::new(t.min.min(f.min), t.max.max(f.max)))
            }
            Interpretable::ExhaustiveConditional {
                guard,
                truthy,
                falsy,
                ..
            } => guard.cost().add(&truthy.cost()).add(&falsy.cost()),
            Interpretable::NotStrictlyFalse { arg, .. } => arg.cost(),
            Interpretable::TypeOf { arg, .. } => arg.cost().add(&Cost::one()),
            Interpretable::CallResolved { args, .. }
            | Interpretable::CallDispatch { args, .. } => args
                .iter()
                .fold(Cost::one(), |acc, a| acc.add(&a.cost())),
            Interpretable::InSet { arg, .. } => arg.cost().add(&Cost::one()),
            Interpretable::CreateList { elements, .. } => elements
                .iter()
                .fold(Cost::none(), |acc, e| acc.add(&e.cost())),
            Interpretable::CreateMap { entries, .. } => {
                entries.iter().fold(Cost::none(), |acc, (k, v)| {
                    acc.add(&k.cost()).add(&v.cost())
                })
            }
            Interpretable::CreateStruct { fields, .. } => fields
                .iter()
                .fold(Cost::none(), |acc, (_, v)| acc.add(&v.cost())),
            Interpretable::Fold {
                iter_range,
                accu_init,
                loop_condition,
                loop_step,
                result,
                ..
            } => {
                let body = loop_condition.cost().add(&loop_step.cost());
                let tail = iter_range
                    .cost()
                    .add(&accu_init.cost())
                    .add(&result.cost());
                match static_range_len(iter_range) {
                    Some(n) => body.times(n).add(&tail),
                    None => Cost::new(tail.min, i64::MAX),
                }
            }
            Interpretable::TestField { operand, .. } => operand.cost().add(&Cost::one()),
            Interpretable::Observed { inner, .. } => inner.cost(),
        }
    }
}

// Carry the call-site id on errors produced by implementations.
fn attach_id(value: Value, id: i64) -> Value {
    match value {
        Value::Error(err) if err.id.is_none() => {
            let mut err = (*err).clone();
            err.id = Some(id);
            Value::error(err)
        }
        other => other,
    }
}

// The element count of a statically known iteration range.
fn static_range_len(node: &Interpretable) -> Option<i64> {
    if let Some(Value::List(items)) = node.as_constant() {
        return Some(items.len() as i64);
    }
    match node {
        Interpretable::CreateList { elements, .. } => Some(elements.len() as i64),
        Interpretable::Observed { inner, .. } => static_range_len(inner),
        _ => None,
    }
}

fn eval_and(
    id: i64,
    lhs: &Interpretable,
    rhs: &Interpretable,
    ctx: &EvalContext<'_>,
) -> Value {
    let lv = lhs.eval(ctx);
    if matches!(lv, Value::Bool(false)) {
        return Value::Bool(false);
    }
    let rv = rhs.eval(ctx);
    if matches!(rv, Value::Bool(false)) {
        return Value::Bool(false);
    }
    eval_logic_tail(id, lv, rv, false)
}

fn eval_or(id: i64, lhs: &Interpretable, rhs: &Interpretable, ctx: &EvalContext<'_>) -> Value {
    let lv = lhs.eval(ctx);
    if matches!(lv, Value::Bool(true)) {
        return Value::Bool(true);
    }
    let rv = rhs.eval(ctx);
    if matches!(rv, Value::Bool(true)) {
        return Value::Bool(true);
    }
    eval_logic_tail(id, lv, rv, true)
}

// Short-circuit did not resolve the result: neither operand is the
// dominating literal. Errors win over unknowns; unknowns aggregate.
fn eval_logic_tail(id: i64, lv: Value, rv: Value, is_or: bool) -> Value {
    if lv.is_error() {
        return lv;
    }
    if rv.is_error() {
        return rv;
    }
    match (&lv, &rv) {
        (Value::Unknown(a), Value::Unknown(b)) => Value::Unknown(a.union(b)),
        (Value::Unknown(_), Value::Bool(_)) => lv,
        (Value::Bool(_), Value::Unknown(_)) => rv,
        (Value::Bool(a), Value::Bool(b)) => Value::Bool(if is_or { *a || *b } else { *a && *b }),
        _ => Value::error(
            EvalError::no_such_overload(if is_or { "_||_" } else { "_&&_" }).at(id),
        ),
    }
}

// Exhaustive logic: both sides already evaluated; errors dominate even a
// literal false/true on the other side.
fn eval_logic_exhaustive(id: i64, lv: Value, rv: Value, is_or: bool) -> Value {
    if lv.is_error() {
        return lv;
    }
    if rv.is_error() {
        return rv;
    }
    match (&lv, &rv) {
        (Value::Unknown(a), Value::Unknown(b)) => Value::Unknown(a.union(b)),
        (Value::Unknown(_), _) => lv,
        (_, Value::Unknown(_)) => rv,
        (Value::Bool(a), Value::Bool(b)) => Value::Bool(if is_or { *a || *b } else { *a && *b }),
        _ => Value::error(
            EvalError::no_such_overload(if is_or { "_||_" } else { "_&&_" }).at(id),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EmptyActivation;

    fn konst(id: i64, value: Value) -> Box<Interpretable> {
        Box::new(Interpretable::Const { id, value })
    }

    fn eval(node: &Interpretable) -> Value {
        let vars = EmptyActivation;
        node.eval(&EvalContext::new(&vars))
    }

    #[test]
    fn test_and_short_circuit_false_wins() {
        let err = Value::error(EvalError::divide_by_zero());
        let node = Interpretable::And {
            id: 1,
            lhs: konst(2, err.clone()),
            rhs: konst(3, Value::Bool(false)),
        };
        assert_eq!(eval(&node), Value::Bool(false));

        let node = Interpretable::And {
            id: 1,
            lhs: konst(2, err.clone()),
            rhs: konst(3, Value::Bool(true)),
        };
        assert!(eval(&node).is_error());
    }

    #[test]
    fn test_exhaustive_and_error_dominates() {
        let err = Value::error(EvalError::divide_by_zero());
        let node = Interpretable::ExhaustiveAnd {
            id: 1,
            lhs: konst(2, err),
            rhs: konst(3, Value::Bool(false)),
        };
        assert!(eval(&node).is_error());
    }

    #[test]
    fn test_or_short_circuit_true_wins() {
        let err = Value::error(EvalError::divide_by_zero());
        let node = Interpretable::Or {
            id: 1,
            lhs: konst(2, err),
            rhs: konst(3, Value::Bool(true)),
        };
        assert_eq!(eval(&node), Value::Bool(true));
    }

    #[test]
    fn test_logic_unknown_aggregation() {
        let node = Interpretable::And {
            id: 1,
            lhs: konst(2, Value::unknown(7)),
            rhs: konst(3, Value::unknown(9)),
        };
        match eval(&node) {
            Value::Unknown(u) => assert_eq!(u.ids(), &[7, 9]),
            other => panic!("expected unknown, got {}", other),
        }
    }

    #[test]
    fn test_logic_error_beats_unknown() {
        let err = Value::error(EvalError::divide_by_zero());
        let node = Interpretable::And {
            id: 1,
            lhs: konst(2, Value::unknown(7)),
            rhs: konst(3, err),
        };
        assert!(eval(&node).is_error());
    }

    #[test]
    fn test_conditional_propagates_guard() {
        let node = Interpretable::Conditional {
            id: 1,
            guard: konst(2, Value::unknown(5)),
            truthy: konst(3, Value::Int(1)),
            falsy: konst(4, Value::Int(2)),
        };
        assert!(eval(&node).is_unknown());
    }

    #[test]
    fn test_not_strictly_false() {
        let err = Value::error(EvalError::divide_by_zero());
        let node = Interpretable::NotStrictlyFalse {
            id: 1,
            arg: konst(2, err),
        };
        assert_eq!(eval(&node), Value::Bool(true));

        let node = Interpretable::NotStrictlyFalse {
            id: 1,
            arg: konst(2, Value::Bool(false)),
        };
        assert_eq!(eval(&node), Value::Bool(false));
    }

    #[test]
    fn test_create_map_duplicate_key() {
        let node = Interpretable::CreateMap {
            id: 1,
            entries: vec![
                (
                    Interpretable::Const {
                        id: 2,
                        value: "a".into(),
                    },
                    Interpretable::Const {
                        id: 3,
                        value: Value::Int(1),
                    },
                ),
                (
                    Interpretable::Const {
                        id: 4,
                        value: "a".into(),
                    },
                    Interpretable::Const {
                        id: 5,
                        value: Value::Int(2),
                    },
                ),
            ],
        };
        let got = eval(&node);
        let err: &EvalError = (&got).try_into().unwrap();
        assert_eq!(err.message, "duplicate key: \"a\"");
    }

    #[test]
    fn test_create_list_aggregates_unknowns() {
        let node = Interpretable::CreateList {
            id: 1,
            elements: vec![
                Interpretable::Const {
                    id: 2,
                    value: Value::unknown(8),
                },
                Interpretable::Const {
                    id: 3,
                    value: Value::unknown(6),
                },
            ],
        };
        match eval(&node) {
            Value::Unknown(u) => assert_eq!(u.ids(), &[6, 8]),
            other => panic!("expected unknown, got {}", other),
        }
    }

    #[test]
    fn test_short_circuit_cost() {
        let node = Interpretable::And {
            id: 1,
            lhs: konst(2, Value::Bool(false)),
            rhs: konst(3, Value::Bool(true)),
        };
        assert_eq!(node.cost(), Cost::new(0, 1));

        let node = Interpretable::ExhaustiveAnd {
            id: 1,
            lhs: konst(2, Value::Bool(false)),
            rhs: konst(3, Value::Bool(true)),
        };
        assert_eq!(node.cost(), Cost::new(1, 1));
    }

    #[test]
    fn test_dynamic_fold_cost_saturates() {
        let node = Interpretable::Fold {
            id: 1,
            accu_var: "__result__".to_string(),
            iter_var: "x".to_string(),
            iter_range: Box::new(Interpretable::Attr(
                crate::eval::attributes::Attribute::maybe(2, vec!["elems".to_string()]),
            )),
            accu_init: konst(3, Value::Bool(false)),
            loop_condition: konst(4, Value::Bool(true)),
            loop_step: konst(5, Value::Bool(true)),
            result: konst(6, Value::Bool(true)),
        };
        assert_eq!(node.cost().max, i64::MAX);
    }

    #[test]
    fn test_interrupt_stops_fold() {
        let flag = AtomicBool::new(true);
        let vars = EmptyActivation;
        let ctx = EvalContext::with_interrupt(&vars, &flag);
        let node = Interpretable::Fold {
            id: 1,
            accu_var: "__result__".to_string(),
            iter_var: "x".to_string(),
            iter_range: konst(2, Value::list([1i64, 2, 3])),
            accu_init: konst(3, Value::Bool(true)),
            loop_condition: konst(4, Value::Bool(true)),
            loop_step: konst(5, Value::Bool(true)),
            result: konst(6, Value::Bool(true)),
        };
        let got = node.eval(&ctx);
        let err: &EvalError = (&got).try_into().unwrap();
        assert_eq!(err.message, "evaluation interrupted");
    }
}
