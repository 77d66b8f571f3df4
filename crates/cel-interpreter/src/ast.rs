//! Input expression tree for the evaluator.
//!
//! The evaluator consumes a macro-expanded AST produced by a parser (and
//! optionally annotated by a type checker). Every node carries a stable
//! 64-bit id which the planner threads through to errors, unknowns, and
//! tracked evaluation state.

use std::collections::HashMap;

/// A single AST node: a stable id plus the node kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Stable node id, unique within one expression tree.
    pub id: i64,
    /// The node kind and its children.
    pub kind: ExprKind,
}

impl Expr {
    /// Create a new node.
    pub fn new(id: i64, kind: ExprKind) -> Self {
        Self { id, kind }
    }
}

/// The kinds of AST nodes the planner understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A literal constant.
    Const(Constant),
    /// A (possibly dotted, possibly leading-dot) identifier reference.
    Ident(String),
    /// Field selection `operand.field`; `test_only` encodes `has(operand.field)`.
    Select {
        operand: Box<Expr>,
        field: String,
        test_only: bool,
    },
    /// A function or method call. Member calls carry the receiver as `target`.
    Call {
        function: String,
        target: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    /// A list literal.
    CreateList { elements: Vec<Expr> },
    /// A map literal with entries in source order.
    CreateMap { entries: Vec<MapEntryExpr> },
    /// A message literal `TypeName{field: value, ...}`.
    CreateStruct {
        type_name: String,
        fields: Vec<FieldEntryExpr>,
    },
    /// The generic fold all list/map macros lower to.
    Comprehension {
        iter_var: String,
        iter_range: Box<Expr>,
        accu_var: String,
        accu_init: Box<Expr>,
        loop_condition: Box<Expr>,
        loop_step: Box<Expr>,
        result: Box<Expr>,
    },
}

/// A literal constant payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// One `key: value` entry of a map literal.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntryExpr {
    pub id: i64,
    pub key: Expr,
    pub value: Expr,
}

/// One `field: value` entry of a message literal.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntryExpr {
    pub id: i64,
    pub field: String,
    pub value: Expr,
}

/// Type-check annotations for a checked expression.
///
/// The checker resolves identifiers to absolute names, call sites to
/// overload ids, enum references to constant values, and struct literals
/// to fully qualified type names. All maps are keyed by AST node id.
#[derive(Debug, Clone, Default)]
pub struct CheckedInfo {
    /// Resolved references by node id.
    pub references: HashMap<i64, Reference>,
    /// Resolved type names for `CreateStruct` nodes.
    pub struct_types: HashMap<i64, String>,
}

impl CheckedInfo {
    /// Create an empty annotation set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identifier resolved to an absolute name.
    pub fn with_ident(mut self, id: i64, name: impl Into<String>) -> Self {
        self.references.insert(id, Reference::ident(name));
        self
    }

    /// Record a call resolved to one or more overload ids.
    pub fn with_overloads<I, S>(mut self, id: i64, overload_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references.insert(id, Reference::overloads(overload_ids));
        self
    }

    /// Record a struct literal resolved to a qualified type name.
    pub fn with_struct_type(mut self, id: i64, type_name: impl Into<String>) -> Self {
        self.struct_types.insert(id, type_name.into());
        self
    }

    /// Look up a reference by node id.
    pub fn reference(&self, id: i64) -> Option<&Reference> {
        self.references.get(&id)
    }
}

/// A single resolved reference from the checker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reference {
    /// Absolute identifier name, when the reference is to a variable.
    pub name: Option<String>,
    /// Candidate overload ids, when the reference is to a function call.
    pub overload_ids: Vec<String>,
    /// Constant payload, when the reference is to an enum constant.
    pub value: Option<Constant>,
}

impl Reference {
    /// A reference to a variable with an absolute name.
    pub fn ident(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// A reference to a function with resolved overload ids.
    pub fn overloads<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            overload_ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A reference to an enum constant.
    pub fn constant(name: impl Into<String>, value: Constant) -> Self {
        Self {
            name: Some(name.into()),
            overload_ids: Vec::new(),
            value: Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_info_builders() {
        let info = CheckedInfo::new()
            .with_ident(1, "a.b.c")
            .with_overloads(2, ["add_int64"])
            .with_struct_type(3, "test.TestMessage");

        assert_eq!(info.reference(1).unwrap().name.as_deref(), Some("a.b.c"));
        assert_eq!(info.reference(2).unwrap().overload_ids, vec!["add_int64"]);
        assert_eq!(info.struct_types.get(&3).unwrap(), "test.TestMessage");
        assert!(info.reference(99).is_none());
    }

    #[test]
    fn test_enum_reference() {
        let r = Reference::constant("test.Enum.BAR", Constant::Int(2));
        assert_eq!(r.value, Some(Constant::Int(2)));
    }
}
