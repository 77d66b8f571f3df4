//! Function dispatch for evaluation.
//!
//! Functions are registered with overloads identified by a stable
//! overload id and grouped under a function name. A call site planned
//! from a checked AST carries a resolved overload id; unchecked calls
//! dispatch at runtime by function name, arity, receiver-ness, and the
//! first argument's capability traits.

use std::collections::HashMap;
use std::sync::Arc;

use super::value::{Trait, Value};

/// A function implementation over already-evaluated arguments.
///
/// Member functions receive the receiver as the first argument.
pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// One concrete overload of a function.
#[derive(Clone)]
pub struct Overload {
    /// The stable overload id (e.g. "add_int64").
    pub id: String,
    /// Whether this is a member function (receiver.method(args)).
    pub member: bool,
    /// The number of parameters, including the receiver for member
    /// functions. `None` accepts any arity.
    pub arity: Option<usize>,
    /// A capability trait the first argument must support, if any.
    pub operand_trait: Option<Trait>,
    /// The implementation.
    pub implementation: FunctionImpl,
}

impl Overload {
    /// A global function overload with fixed arity.
    pub fn function(
        id: impl Into<String>,
        arity: usize,
        implementation: FunctionImpl,
    ) -> Self {
        Self {
            id: id.into(),
            member: false,
            arity: Some(arity),
            operand_trait: None,
            implementation,
        }
    }

    /// A global overload accepting any number of arguments.
    pub fn variadic(id: impl Into<String>, implementation: FunctionImpl) -> Self {
        Self {
            id: id.into(),
            member: false,
            arity: None,
            operand_trait: None,
            implementation,
        }
    }

    /// A member function overload with fixed arity (receiver included).
    pub fn member(id: impl Into<String>, arity: usize, implementation: FunctionImpl) -> Self {
        Self {
            id: id.into(),
            member: true,
            arity: Some(arity),
            operand_trait: None,
            implementation,
        }
    }

    /// Guard this overload on a capability trait of the first argument.
    pub fn with_operand_trait(mut self, t: Trait) -> Self {
        self.operand_trait = Some(t);
        self
    }

    /// Whether this overload accepts a call shape.
    fn accepts(&self, args: &[Value], member: bool) -> bool {
        if self.member != member {
            return false;
        }
        if let Some(arity) = self.arity {
            if args.len() != arity {
                return false;
            }
        }
        match self.operand_trait {
            Some(t) => args.first().map(|a| a.supports(t)).unwrap_or(false),
            None => true,
        }
    }

    /// Invoke the implementation.
    pub fn call(&self, args: &[Value]) -> Value {
        (self.implementation)(args)
    }
}

impl std::fmt::Debug for Overload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overload")
            .field("id", &self.id)
            .field("member", &self.member)
            .field("arity", &self.arity)
            .field("operand_trait", &self.operand_trait)
            .finish()
    }
}

/// A function name with its overloads.
#[derive(Debug, Clone, Default)]
pub struct Function {
    /// The function name (operators use their symbolic names, e.g. "_+_").
    pub name: String,
    /// All overloads, tried in registration order.
    pub overloads: Vec<Overload>,
}

impl Function {
    /// Create a function with no overloads.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
        }
    }

    /// Append an overload.
    pub fn with_overload(mut self, overload: Overload) -> Self {
        self.overloads.push(overload);
        self
    }

    /// Find an overload by id.
    pub fn find_overload(&self, id: &str) -> Option<&Overload> {
        self.overloads.iter().find(|o| o.id == id)
    }

    /// The first overload accepting the given call shape.
    pub fn find_matching(&self, args: &[Value], member: bool) -> Option<&Overload> {
        self.overloads.iter().find(|o| o.accepts(args, member))
    }
}

/// The function-name + overload-id to implementation table.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    functions: HashMap<String, Function>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function; overloads merge when the name exists.
    pub fn register(&mut self, function: Function) {
        match self.functions.get_mut(&function.name) {
            Some(existing) => existing.overloads.extend(function.overloads),
            None => {
                self.functions.insert(function.name.clone(), function);
            }
        }
    }

    /// Get a function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Check if a function name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Find an overload by id, searching every function.
    pub fn find_overload(&self, overload_id: &str) -> Option<&Overload> {
        self.functions
            .values()
            .find_map(|f| f.find_overload(overload_id))
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if the dispatcher is empty.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
