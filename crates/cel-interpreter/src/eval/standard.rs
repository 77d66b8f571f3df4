//! The standard function and operator library.
//!
//! Operators are registered under their symbolic names (`_+_`, `_<_`,
//! ...) with trait-guarded overloads that delegate to the value algebra.
//! The short-circuit operators, ternary, `has()`, and `type()` never go
//! through the dispatcher; the planner lowers them to dedicated nodes.

use std::sync::Arc;

use super::dispatcher::{Dispatcher, Function, Overload};
use super::error::EvalError;
use super::time::{self, TimestampComponent};
use super::value::{Trait, Value};

fn binary_op(
    name: &str,
    id: &str,
    guard: Trait,
    f: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
) -> Function {
    Function::new(name).with_overload(
        Overload::function(id, 2, Arc::new(move |args: &[Value]| f(&args[0], &args[1])))
            .with_operand_trait(guard),
    )
}

fn comparison(name: &'static str, id: &str, accept: fn(i64) -> bool) -> Function {
    Function::new(name).with_overload(
        Overload::function(id, 2, Arc::new(move |args: &[Value]| {
            match args[0].compare(&args[1]) {
                Value::Int(ord) => Value::Bool(accept(ord)),
                _ => Value::error(EvalError::no_such_overload(name)),
            }
        }))
        .with_operand_trait(Trait::Comparer),
    )
}

fn conversion(name: &str, f: fn(&Value) -> Value) -> Function {
    Function::new(name).with_overload(Overload::function(
        name,
        1,
        Arc::new(move |args: &[Value]| f(&args[0])),
    ))
}

/// Build the dispatcher with the standard library registered.
pub fn standard() -> Dispatcher {
    let mut d = Dispatcher::new();

    // Arithmetic operators.
    d.register(binary_op("_+_", "add", Trait::Adder, |l, r| l.add(r)));
    d.register(binary_op("_-_", "subtract", Trait::Subtractor, |l, r| {
        l.subtract(r)
    }));
    d.register(binary_op("_*_", "multiply", Trait::Multiplier, |l, r| {
        l.multiply(r)
    }));
    d.register(binary_op("_/_", "divide", Trait::Divider, |l, r| l.divide(r)));
    d.register(binary_op("_%_", "modulo", Trait::Modder, |l, r| l.modulo(r)));

    // Unary negations. The shared Negater trait spans both, so the
    // implementations pick their own operand shapes.
    d.register(
        Function::new("-_").with_overload(
            Overload::function("negate", 1, Arc::new(|args: &[Value]| match &args[0] {
                Value::Int(_) | Value::Double(_) | Value::Duration(_) => args[0].negate(),
                _ => Value::error(EvalError::no_such_overload("-_")),
            }))
            .with_operand_trait(Trait::Negater),
        ),
    );
    d.register(
        Function::new("!_").with_overload(
            Overload::function("logical_not", 1, Arc::new(|args: &[Value]| match &args[0] {
                Value::Bool(b) => Value::Bool(!b),
                _ => Value::error(EvalError::no_such_overload("!_")),
            }))
            .with_operand_trait(Trait::Negater),
        ),
    );

    // Equality is defined for every value pairing.
    d.register(Function::new("_==_").with_overload(Overload::function(
        "equals",
        2,
        Arc::new(|args: &[Value]| args[0].equal(&args[1])),
    )));
    d.register(Function::new("_!=_").with_overload(Overload::function(
        "not_equals",
        2,
        Arc::new(|args: &[Value]| match args[0].equal(&args[1]) {
            Value::Bool(b) => Value::Bool(!b),
            other => other,
        }),
    )));

    // Ordering operators.
    d.register(comparison("_<_", "less", |ord| ord < 0));
    d.register(comparison("_<=_", "less_equals", |ord| ord <= 0));
    d.register(comparison("_>_", "greater", |ord| ord > 0));
    d.register(comparison("_>=_", "greater_equals", |ord| ord >= 0));

    // Membership; the container is the second argument.
    let in_impl: Arc<dyn Fn(&[Value]) -> Value + Send + Sync> =
        Arc::new(|args: &[Value]| args[1].contains(&args[0]));
    d.register(
        Function::new("_in_")
            .with_overload(Overload::function("in_list", 2, in_impl.clone())),
    );
    d.register(Function::new("@in").with_overload(Overload::function("in", 2, in_impl)));

    // size() as both a global and a member function.
    d.register(
        Function::new("size")
            .with_overload(
                Overload::function("size", 1, Arc::new(|args: &[Value]| args[0].size_of()))
                    .with_operand_trait(Trait::Sizer),
            )
            .with_overload(
                Overload::member("size_member", 1, Arc::new(|args: &[Value]| {
                    args[0].size_of()
                }))
                .with_operand_trait(Trait::Sizer),
            ),
    );

    // String member functions.
    d.register(
        Function::new("contains").with_overload(
            Overload::member("contains_string", 2, Arc::new(|args: &[Value]| {
                match (&args[0], &args[1]) {
                    (Value::String(s), Value::String(sub)) => {
                        Value::Bool(s.contains(sub.as_ref()))
                    }
                    _ => Value::error(EvalError::no_such_overload("contains")),
                }
            }))
            .with_operand_trait(Trait::Receiver),
        ),
    );
    d.register(
        Function::new("startsWith").with_overload(
            Overload::member("starts_with_string", 2, Arc::new(|args: &[Value]| {
                match (&args[0], &args[1]) {
                    (Value::String(s), Value::String(prefix)) => {
                        Value::Bool(s.starts_with(prefix.as_ref()))
                    }
                    _ => Value::error(EvalError::no_such_overload("startsWith")),
                }
            }))
            .with_operand_trait(Trait::Receiver),
        ),
    );
    d.register(
        Function::new("endsWith").with_overload(
            Overload::member("ends_with_string", 2, Arc::new(|args: &[Value]| {
                match (&args[0], &args[1]) {
                    (Value::String(s), Value::String(suffix)) => {
                        Value::Bool(s.ends_with(suffix.as_ref()))
                    }
                    _ => Value::error(EvalError::no_such_overload("endsWith")),
                }
            }))
            .with_operand_trait(Trait::Receiver),
        ),
    );

    // matches() as both a member and a global function.
    let matches_impl: Arc<dyn Fn(&[Value]) -> Value + Send + Sync> =
        Arc::new(|args: &[Value]| match (&args[0], &args[1]) {
            (Value::String(s), Value::String(pattern)) => {
                match regex::Regex::new(pattern.as_ref()) {
                    Ok(re) => Value::Bool(re.is_match(s.as_ref())),
                    Err(e) => {
                        Value::error(EvalError::invalid_argument(format!("invalid regex: {}", e)))
                    }
                }
            }
            _ => Value::error(EvalError::no_such_overload("matches")),
        });
    d.register(
        Function::new("matches")
            .with_overload(
                Overload::member("matches_string", 2, matches_impl.clone())
                    .with_operand_trait(Trait::Matcher),
            )
            .with_overload(
                Overload::function("matches", 2, matches_impl).with_operand_trait(Trait::Matcher),
            ),
    );

    // Type conversions; identity on the value's own type.
    d.register(conversion("int", Value::convert_to_int));
    d.register(conversion("uint", Value::convert_to_uint));
    d.register(conversion("double", Value::convert_to_double));
    d.register(conversion("string", Value::convert_to_string));
    d.register(conversion("bytes", Value::convert_to_bytes));
    d.register(conversion("bool", Value::convert_to_bool));
    d.register(conversion("timestamp", Value::convert_to_timestamp));
    d.register(conversion("duration", Value::convert_to_duration));
    d.register(Function::new("dyn").with_overload(Overload::function(
        "dyn",
        1,
        Arc::new(|args: &[Value]| args[0].clone()),
    )));

    // Timestamp calendar accessors (UTC and explicit-timezone forms).
    for component in [
        TimestampComponent::FullYear,
        TimestampComponent::Month,
        TimestampComponent::Date,
        TimestampComponent::DayOfMonth,
        TimestampComponent::DayOfWeek,
        TimestampComponent::DayOfYear,
        TimestampComponent::Hours,
        TimestampComponent::Minutes,
        TimestampComponent::Seconds,
        TimestampComponent::Milliseconds,
    ] {
        d.register(accessor_function(component));
    }

    d
}

fn accessor_function(component: TimestampComponent) -> Function {
    let name = component.function_name();
    Function::new(name)
        .with_overload(
            Overload::member(
                format!("{}_1", name),
                1,
                Arc::new(move |args: &[Value]| accessor(&args[0], None, component)),
            )
            .with_operand_trait(Trait::Receiver),
        )
        .with_overload(
            Overload::member(
                format!("{}_2", name),
                2,
                Arc::new(move |args: &[Value]| accessor(&args[0], Some(&args[1]), component)),
            )
            .with_operand_trait(Trait::Receiver),
        )
}

fn accessor(receiver: &Value, tz: Option<&Value>, component: TimestampComponent) -> Value {
    match (receiver, tz) {
        (Value::Timestamp(ts), None) => match ts.to_datetime_utc() {
            Some(dt) => Value::Int(component.extract(&dt)),
            None => Value::error(EvalError::range("invalid timestamp")),
        },
        (Value::Timestamp(ts), Some(Value::String(tz_str))) => {
            match time::parse_timezone(tz_str) {
                Ok(tz_info) => match tz_info.datetime_from_timestamp(ts) {
                    Some(dt) => Value::Int(component.extract(&dt)),
                    None => Value::error(EvalError::range("invalid timestamp")),
                },
                Err(e) => Value::error(EvalError::invalid_argument(e)),
            }
        }
        (Value::Duration(d), None) => match component {
            TimestampComponent::Hours => Value::Int(d.hours()),
            TimestampComponent::Minutes => Value::Int(d.minutes()),
            TimestampComponent::Seconds => Value::Int(d.total_seconds()),
            TimestampComponent::Milliseconds => Value::Int(d.milliseconds()),
            _ => Value::error(EvalError::no_such_overload(component.function_name())),
        },
        _ => Value::error(EvalError::no_such_overload(component.function_name())),
    }
}
