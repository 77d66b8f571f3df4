//! Interpreter facade and compiled programs.
//!
//! An `Interpreter` bundles a dispatcher, type registry, and container,
//! and plans checked or unchecked ASTs into reusable `Program`s. A
//! program may be evaluated any number of times, concurrently, as long
//! as each evaluation supplies its own activation.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::ast::{CheckedInfo, Expr};

use super::activation::Activation;
use super::adapter::TypeRegistry;
use super::attributes::Container;
use super::decorators::Decorator;
use super::dispatcher::{Dispatcher, Function};
use super::interpretable::{Cost, EvalContext, Interpretable};
use super::planner::{PlanError, Planner};
use super::standard;

/// Plans expressions into programs.
pub struct Interpreter {
    dispatcher: Dispatcher,
    registry: Arc<TypeRegistry>,
    container: Container,
}

impl Interpreter {
    /// An interpreter with the standard library, an empty registry, and
    /// the root container.
    pub fn standard() -> Self {
        Self {
            dispatcher: standard::standard(),
            registry: Arc::new(TypeRegistry::new()),
            container: Container::root(),
        }
    }

    /// An interpreter over explicit components.
    pub fn new(dispatcher: Dispatcher, registry: Arc<TypeRegistry>, container: Container) -> Self {
        Self {
            dispatcher,
            registry,
            container,
        }
    }

    /// Replace the type registry.
    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the container namespace.
    pub fn with_container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    /// Register an additional function with the dispatcher.
    pub fn register_function(&mut self, function: Function) {
        self.dispatcher.register(function);
    }

    /// Plan an unchecked AST.
    pub fn plan_unchecked(
        &self,
        expr: &Expr,
        decorators: &[Decorator],
    ) -> Result<Program, PlanError> {
        let planner = Planner::new(
            &self.dispatcher,
            self.registry.clone(),
            &self.container,
            None,
            decorators,
        );
        Ok(Program {
            interpretable: planner.plan(expr)?,
        })
    }

    /// Plan a checked AST with its type-check annotations.
    pub fn plan_checked(
        &self,
        expr: &Expr,
        checked: &CheckedInfo,
        decorators: &[Decorator],
    ) -> Result<Program, PlanError> {
        let planner = Planner::new(
            &self.dispatcher,
            self.registry.clone(),
            &self.container,
            Some(checked),
            decorators,
        );
        Ok(Program {
            interpretable: planner.plan(expr)?,
        })
    }
}

/// A planned expression, ready for repeated evaluation.
#[derive(Debug)]
pub struct Program {
    interpretable: Interpretable,
}

impl Program {
    /// The planned tree.
    pub fn interpretable(&self) -> &Interpretable {
        &self.interpretable
    }

    /// Evaluate against an activation.
    pub fn eval(&self, vars: &dyn Activation) -> super::Value {
        self.interpretable.eval(&EvalContext::new(vars))
    }

    /// Evaluate with an interrupt token; comprehensions stop with an
    /// `interrupted` error once the token is set.
    pub fn eval_interruptible(&self, vars: &dyn Activation, interrupt: &AtomicBool) -> super::Value {
        self.interpretable
            .eval(&EvalContext::with_interrupt(vars, interrupt))
    }

    /// The program's cost estimate.
    pub fn cost(&self) -> Cost {
        self.interpretable.cost()
    }
}
