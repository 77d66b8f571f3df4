//! Common test utilities: AST construction for the evaluator tests.
//!
//! The parser is an external collaborator, so tests hand-build the
//! macro-expanded AST the planner consumes. `AstBuilder` assigns stable,
//! monotonically increasing node ids the way a parser would.

use std::cell::Cell;

use cel_interpreter::ast::{Constant, Expr, ExprKind, FieldEntryExpr, MapEntryExpr};

/// The accumulator variable name macro expansion uses.
#[allow(dead_code)]
pub const ACCU_VAR: &str = "__result__";

/// Builds AST nodes with fresh ids.
#[derive(Default)]
pub struct AstBuilder {
    next: Cell<i64>,
}

#[allow(dead_code)]
impl AstBuilder {
    pub fn new() -> Self {
        Self { next: Cell::new(0) }
    }

    fn next_id(&self) -> i64 {
        let id = self.next.get() + 1;
        self.next.set(id);
        id
    }

    pub fn null(&self) -> Expr {
        Expr::new(self.next_id(), ExprKind::Const(Constant::Null))
    }

    pub fn boolean(&self, v: bool) -> Expr {
        Expr::new(self.next_id(), ExprKind::Const(Constant::Bool(v)))
    }

    pub fn int(&self, v: i64) -> Expr {
        Expr::new(self.next_id(), ExprKind::Const(Constant::Int(v)))
    }

    pub fn uint(&self, v: u64) -> Expr {
        Expr::new(self.next_id(), ExprKind::Const(Constant::UInt(v)))
    }

    pub fn double(&self, v: f64) -> Expr {
        Expr::new(self.next_id(), ExprKind::Const(Constant::Double(v)))
    }

    pub fn string(&self, v: &str) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Const(Constant::String(v.to_string())),
        )
    }

    pub fn bytes(&self, v: &[u8]) -> Expr {
        Expr::new(self.next_id(), ExprKind::Const(Constant::Bytes(v.to_vec())))
    }

    pub fn ident(&self, name: &str) -> Expr {
        Expr::new(self.next_id(), ExprKind::Ident(name.to_string()))
    }

    pub fn select(&self, operand: Expr, field: &str) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Select {
                operand: Box::new(operand),
                field: field.to_string(),
                test_only: false,
            },
        )
    }

    /// `has(operand.field)`.
    pub fn has(&self, operand: Expr, field: &str) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Select {
                operand: Box::new(operand),
                field: field.to_string(),
                test_only: true,
            },
        )
    }

    pub fn call(&self, function: &str, args: Vec<Expr>) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Call {
                function: function.to_string(),
                target: None,
                args,
            },
        )
    }

    pub fn method(&self, target: Expr, function: &str, args: Vec<Expr>) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Call {
                function: function.to_string(),
                target: Some(Box::new(target)),
                args,
            },
        )
    }

    pub fn index(&self, operand: Expr, key: Expr) -> Expr {
        self.call("_[_]", vec![operand, key])
    }

    pub fn and(&self, lhs: Expr, rhs: Expr) -> Expr {
        self.call("_&&_", vec![lhs, rhs])
    }

    pub fn or(&self, lhs: Expr, rhs: Expr) -> Expr {
        self.call("_||_", vec![lhs, rhs])
    }

    pub fn not(&self, arg: Expr) -> Expr {
        self.call("!_", vec![arg])
    }

    pub fn eq(&self, lhs: Expr, rhs: Expr) -> Expr {
        self.call("_==_", vec![lhs, rhs])
    }

    pub fn ne(&self, lhs: Expr, rhs: Expr) -> Expr {
        self.call("_!=_", vec![lhs, rhs])
    }

    pub fn ternary(&self, guard: Expr, truthy: Expr, falsy: Expr) -> Expr {
        self.call("_?_:_", vec![guard, truthy, falsy])
    }

    pub fn in_op(&self, item: Expr, container: Expr) -> Expr {
        self.call("_in_", vec![item, container])
    }

    pub fn list(&self, elements: Vec<Expr>) -> Expr {
        Expr::new(self.next_id(), ExprKind::CreateList { elements })
    }

    pub fn map(&self, entries: Vec<(Expr, Expr)>) -> Expr {
        let entries = entries
            .into_iter()
            .map(|(key, value)| MapEntryExpr {
                id: self.next_id(),
                key,
                value,
            })
            .collect();
        Expr::new(self.next_id(), ExprKind::CreateMap { entries })
    }

    pub fn message(&self, type_name: &str, fields: Vec<(&str, Expr)>) -> Expr {
        let fields = fields
            .into_iter()
            .map(|(field, value)| FieldEntryExpr {
                id: self.next_id(),
                field: field.to_string(),
                value,
            })
            .collect();
        Expr::new(
            self.next_id(),
            ExprKind::CreateStruct {
                type_name: type_name.to_string(),
                fields,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn fold(
        &self,
        iter_var: &str,
        iter_range: Expr,
        accu_init: Expr,
        loop_condition: Expr,
        loop_step: Expr,
        result: Expr,
    ) -> Expr {
        Expr::new(
            self.next_id(),
            ExprKind::Comprehension {
                iter_var: iter_var.to_string(),
                iter_range: Box::new(iter_range),
                accu_var: ACCU_VAR.to_string(),
                accu_init: Box::new(accu_init),
                loop_condition: Box::new(loop_condition),
                loop_step: Box::new(loop_step),
                result: Box::new(result),
            },
        )
    }

    // ------------------------------------------------------------------
    // Macro shapes, as the parser's macro expansion emits them.
    // ------------------------------------------------------------------

    fn accu(&self) -> Expr {
        self.ident(ACCU_VAR)
    }

    /// `range.all(var, predicate)`.
    pub fn all_macro(&self, iter_var: &str, iter_range: Expr, predicate: Expr) -> Expr {
        let cond = self.call("@not_strictly_false", vec![self.accu()]);
        let step = self.and(self.accu(), predicate);
        self.fold(iter_var, iter_range, self.boolean(true), cond, step, self.accu())
    }

    /// `range.exists(var, predicate)`.
    pub fn exists_macro(&self, iter_var: &str, iter_range: Expr, predicate: Expr) -> Expr {
        let cond = self.call("@not_strictly_false", vec![self.not(self.accu())]);
        let step = self.or(self.accu(), predicate);
        self.fold(iter_var, iter_range, self.boolean(false), cond, step, self.accu())
    }

    /// `range.exists_one(var, predicate)`.
    pub fn exists_one_macro(&self, iter_var: &str, iter_range: Expr, predicate: Expr) -> Expr {
        let step = self.ternary(
            predicate,
            self.call("_+_", vec![self.accu(), self.int(1)]),
            self.accu(),
        );
        let result = self.eq(self.accu(), self.int(1));
        self.fold(
            iter_var,
            iter_range,
            self.int(0),
            self.boolean(true),
            step,
            result,
        )
    }

    /// `range.map(var, transform)`.
    pub fn map_macro(&self, iter_var: &str, iter_range: Expr, transform: Expr) -> Expr {
        let step = self.call("_+_", vec![self.accu(), self.list(vec![transform])]);
        self.fold(
            iter_var,
            iter_range,
            self.list(vec![]),
            self.boolean(true),
            step,
            self.accu(),
        )
    }

    /// `range.filter(var, predicate)`.
    pub fn filter_macro(&self, iter_var: &str, iter_range: Expr, predicate: Expr) -> Expr {
        let keep = self.call("_+_", vec![self.accu(), self.list(vec![self.ident(iter_var)])]);
        let step = self.ternary(predicate, keep, self.accu());
        self.fold(
            iter_var,
            iter_range,
            self.list(vec![]),
            self.boolean(true),
            step,
            self.accu(),
        )
    }
}
