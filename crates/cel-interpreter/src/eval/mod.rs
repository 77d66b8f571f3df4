//! The CEL evaluation engine.
//!
//! The pieces fit together as a pipeline: an AST is lowered by the
//! [`planner`] (with optional type-check annotations and a decorator
//! chain) into an [`Interpretable`] tree, which evaluates against an
//! [`Activation`] to produce exactly one [`Value`]. Errors and unknowns
//! are values and flow through operators rather than unwinding.
//!
//! # Example
//!
//! ```
//! use cel_interpreter::ast::{Constant, Expr, ExprKind};
//! use cel_interpreter::eval::{Interpreter, MapActivation, Value};
//!
//! // x + 1, as a parser would hand it to the planner.
//! let expr = Expr::new(1, ExprKind::Call {
//!     function: "_+_".to_string(),
//!     target: None,
//!     args: vec![
//!         Expr::new(2, ExprKind::Ident("x".to_string())),
//!         Expr::new(3, ExprKind::Const(Constant::Int(1))),
//!     ],
//! });
//!
//! let interpreter = Interpreter::standard();
//! let program = interpreter.plan_unchecked(&expr, &[]).unwrap();
//!
//! let mut vars = MapActivation::new();
//! vars.insert("x", 41i64);
//! assert_eq!(program.eval(&vars), Value::Int(42));
//! ```

pub mod activation;
pub mod adapter;
pub mod attributes;
pub mod decorators;
pub mod dispatcher;
pub mod error;
pub mod interpretable;
pub mod planner;
pub mod program;
pub mod standard;
pub mod state;
pub mod time;
pub mod value;

pub use activation::{
    Activation, EmptyActivation, HierarchicalActivation, MapActivation, PartialActivation,
};
pub use adapter::{
    DefaultAdapter, FieldKind, FieldType, MessageType, MessageValue, Syntax, TypeAdapter,
    TypeRegistry,
};
pub use attributes::{Attribute, AttributePattern, Container, PatternQualifier, Qualifier};
pub use decorators::{exhaustive_eval, optimize, track_state, Decorator};
pub use dispatcher::{Dispatcher, Function, FunctionImpl, Overload};
pub use error::{EvalError, EvalErrorKind};
pub use interpretable::{Cost, EvalContext, Interpretable};
pub use planner::{PlanError, Planner};
pub use program::{Interpreter, Program};
pub use standard::standard;
pub use state::EvalState;
pub use value::{
    strict_propagate, Duration, MapKey, Timestamp, Trait, TypeValue, UnknownSet, Value, ValueError,
    ValueMap,
};
