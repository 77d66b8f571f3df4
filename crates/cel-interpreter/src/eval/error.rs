//! Evaluation error values.
//!
//! Errors produced during evaluation are values, not exceptions: they flow
//! through operators according to the propagation rules of the value
//! algebra. Each error carries a closed kind, a human-readable message, and
//! the originating AST node id when one is available.

use std::fmt;

/// An error produced while evaluating a CEL expression.
#[derive(Debug, Clone)]
pub struct EvalError {
    /// The kind of error.
    pub kind: EvalErrorKind,
    /// The error message.
    pub message: String,
    /// The AST node id the error originated at, when known.
    pub id: Option<i64>,
}

/// The kind of evaluation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// No overload of the operator or function matches the operands.
    NoSuchOverload,
    /// Field or key not present on a message, map, or list.
    NoSuchField,
    /// Identifier reference that no activation binding satisfies.
    NoSuchAttribute,
    /// Integer division or remainder by zero.
    DivideByZero,
    /// Checked integer arithmetic overflowed.
    Overflow,
    /// A value fell outside the representable range of the target type.
    Range,
    /// Unsupported type conversion.
    TypeConversion,
    /// Duplicate key in a map literal.
    DuplicateKey,
    /// Malformed argument to a built-in function.
    InvalidArgument,
    /// The caller-supplied interrupt token was set.
    Interrupted,
    /// Unexpected internal state.
    Internal,
}

impl EvalError {
    /// Create a new error with the given kind and message.
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            id: None,
        }
    }

    /// Attach the originating AST node id.
    pub fn at(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// No overload of `function` matches the operands.
    pub fn no_such_overload(function: &str) -> Self {
        Self::new(
            EvalErrorKind::NoSuchOverload,
            format!("no such overload: {}", function),
        )
    }

    /// Field not found on a message.
    pub fn no_such_field(field: &str) -> Self {
        Self::new(
            EvalErrorKind::NoSuchField,
            format!("no such field: {}", field),
        )
    }

    /// Key not found in a map.
    pub fn no_such_key(key: impl fmt::Display) -> Self {
        Self::new(EvalErrorKind::NoSuchField, format!("no such key: {}", key))
    }

    /// No activation binding satisfies the attribute reference.
    pub fn no_such_attribute(name: &str) -> Self {
        Self::new(
            EvalErrorKind::NoSuchAttribute,
            format!("no such attribute: {}", name),
        )
    }

    /// Integer division by zero.
    pub fn divide_by_zero() -> Self {
        Self::new(EvalErrorKind::DivideByZero, "divide by zero")
    }

    /// Integer remainder by zero.
    pub fn modulus_by_zero() -> Self {
        Self::new(EvalErrorKind::DivideByZero, "modulus by zero")
    }

    /// Checked integer arithmetic overflowed.
    pub fn overflow(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Overflow, message)
    }

    /// Value outside the representable range of the target type.
    pub fn range(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Range, message)
    }

    /// Unsupported type conversion.
    pub fn type_conversion(from: &str, to: &str) -> Self {
        Self::new(
            EvalErrorKind::TypeConversion,
            format!("type conversion error from '{}' to '{}'", from, to),
        )
    }

    /// Duplicate key in a map literal.
    pub fn duplicate_key(key: impl fmt::Display) -> Self {
        Self::new(
            EvalErrorKind::DuplicateKey,
            format!("duplicate key: {}", key),
        )
    }

    /// Malformed argument to a built-in function.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::InvalidArgument, message)
    }

    /// The caller-supplied interrupt token was set.
    pub fn interrupted() -> Self {
        Self::new(EvalErrorKind::Interrupted, "evaluation interrupted")
    }

    /// Unexpected internal state.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Internal, message)
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

impl PartialEq for EvalError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(EvalError::divide_by_zero().to_string(), "divide by zero");
        assert_eq!(EvalError::modulus_by_zero().to_string(), "modulus by zero");
        assert_eq!(
            EvalError::no_such_key("foo").to_string(),
            "no such key: foo"
        );
        assert_eq!(
            EvalError::type_conversion("bytes", "string").to_string(),
            "type conversion error from 'bytes' to 'string'"
        );
    }

    #[test]
    fn test_error_node_id() {
        let err = EvalError::no_such_attribute("a.b").at(7);
        assert_eq!(err.id, Some(7));
        assert_eq!(err.kind, EvalErrorKind::NoSuchAttribute);
    }

    #[test]
    fn test_error_equality_ignores_id() {
        let a = EvalError::divide_by_zero().at(1);
        let b = EvalError::divide_by_zero().at(2);
        assert_eq!(a, b);
    }
}
