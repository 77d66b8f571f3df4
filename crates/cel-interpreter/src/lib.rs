//! Evaluator core for the Common Expression Language (CEL).
//!
//! CEL is a side-effect-free expression language for evaluating
//! predicates, policies, and projections supplied as untrusted text
//! against host-provided data. This crate implements the evaluation
//! half: given a parsed (and optionally type-checked) AST plus a binding
//! environment, it produces a typed result value — or a typed error or
//! unknown, which are first-class values here — in one deterministic
//! pass.
//!
//! The lexer/parser, type checker, and macro expander are external
//! collaborators: callers hand this crate the macro-expanded [`ast`]
//! directly.
//!
//! # Architecture
//!
//! - [`eval::value`] — the typed value algebra with polymorphic
//!   operators, conversions, and error/unknown propagation
//! - [`eval::activation`] / [`eval::attributes`] — name resolution:
//!   namespaced identifiers, qualifier chains, field-path subsumption,
//!   and partial-input unknowns
//! - [`eval::dispatcher`] / [`eval::standard`] — the overload table and
//!   the standard function library
//! - [`eval::planner`] / [`eval::interpretable`] — lowering the AST into
//!   a reusable, thread-shareable evaluation tree with cost estimates
//! - [`eval::decorators`] — plan-time rewrites: constant folding,
//!   exhaustive evaluation, and state tracking
//!
//! # Quick start
//!
//! ```
//! use cel_interpreter::ast::{Constant, Expr, ExprKind};
//! use cel_interpreter::{Interpreter, MapActivation, Value};
//!
//! // size("hello") == 5
//! let expr = Expr::new(1, ExprKind::Call {
//!     function: "_==_".to_string(),
//!     target: None,
//!     args: vec![
//!         Expr::new(2, ExprKind::Call {
//!             function: "size".to_string(),
//!             target: None,
//!             args: vec![Expr::new(3, ExprKind::Const(Constant::String("hello".into())))],
//!         }),
//!         Expr::new(4, ExprKind::Const(Constant::Int(5))),
//!     ],
//! });
//!
//! let program = Interpreter::standard().plan_unchecked(&expr, &[]).unwrap();
//! assert_eq!(program.eval(&MapActivation::new()), Value::Bool(true));
//! ```

pub mod ast;
pub mod eval;

pub use ast::{CheckedInfo, Constant, Expr, ExprKind, Reference};
pub use eval::{
    exhaustive_eval, optimize, track_state, Activation, AttributePattern, Container, Cost,
    Decorator, Dispatcher, EmptyActivation, EvalError, EvalErrorKind, EvalState, Function,
    Interpretable, Interpreter, MapActivation, MapKey, Overload, PartialActivation, PlanError,
    Program, Trait, TypeRegistry, UnknownSet, Value, ValueError, ValueMap,
};
