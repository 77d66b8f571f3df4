//! Lowers AST nodes into directly evaluable interpretables.
//!
//! Planning resolves identifier candidate names against the container,
//! collapses enum constants and type names to constants, merges select
//! chains into attributes, binds checked call sites to overloads, and
//! applies the decorator chain to every node bottom-up.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::ast::{CheckedInfo, Constant, Expr, ExprKind};

use super::adapter::TypeRegistry;
use super::attributes::{Attribute, Container, Qualifier};
use super::decorators::Decorator;
use super::dispatcher::{Dispatcher, Function};
use super::interpretable::Interpretable;
use super::value::{TypeValue, Value};

/// An error reported synchronously at plan time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A struct literal names a type the registry does not know.
    #[error("unknown type: {0}")]
    UnknownType(String),
    /// A checked call site references an overload id that is not
    /// registered with the dispatcher.
    #[error("unknown overload id: {0}")]
    UnknownOverload(String),
    /// A special form was called with the wrong shape.
    #[error("invalid call to {function}: expected {expected} argument(s)")]
    InvalidCallShape {
        function: String,
        expected: usize,
    },
}

/// Plans AST expressions against a dispatcher, registry, and container.
pub struct Planner<'a> {
    dispatcher: &'a Dispatcher,
    registry: Arc<TypeRegistry>,
    container: &'a Container,
    checked: Option<&'a CheckedInfo>,
    decorators: &'a [Decorator],
}

impl<'a> Planner<'a> {
    /// Create a planner.
    pub fn new(
        dispatcher: &'a Dispatcher,
        registry: Arc<TypeRegistry>,
        container: &'a Container,
        checked: Option<&'a CheckedInfo>,
        decorators: &'a [Decorator],
    ) -> Self {
        Self {
            dispatcher,
            registry,
            container,
            checked,
            decorators,
        }
    }

    /// Plan an expression into an interpretable tree.
    pub fn plan(&self, expr: &Expr) -> Result<Interpretable, PlanError> {
        let node = match &expr.kind {
            ExprKind::Const(c) => Interpretable::Const {
                id: expr.id,
                value: constant_value(c),
            },
            ExprKind::Ident(name) => self.plan_ident(expr.id, name)?,
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => self.plan_select(expr.id, operand, field, *test_only)?,
            ExprKind::Call {
                function,
                target,
                args,
            } => self.plan_call(expr.id, function, target.as_deref(), args)?,
            ExprKind::CreateList { elements } => Interpretable::CreateList {
                id: expr.id,
                elements: self.plan_all(elements)?,
            },
            ExprKind::CreateMap { entries } => {
                let mut planned = Vec::with_capacity(entries.len());
                for entry in entries {
                    planned.push((self.plan(&entry.key)?, self.plan(&entry.value)?));
                }
                Interpretable::CreateMap {
                    id: expr.id,
                    entries: planned,
                }
            }
            ExprKind::CreateStruct { type_name, fields } => {
                let resolved = self.resolve_struct_type(expr.id, type_name)?;
                let mut planned = Vec::with_capacity(fields.len());
                for field in fields {
                    planned.push((field.field.clone(), self.plan(&field.value)?));
                }
                Interpretable::CreateStruct {
                    id: expr.id,
                    type_name: resolved,
                    fields: planned,
                    registry: self.registry.clone(),
                }
            }
            ExprKind::Comprehension {
                iter_var,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            } => Interpretable::Fold {
                id: expr.id,
                accu_var: accu_var.clone(),
                iter_var: iter_var.clone(),
                iter_range: Box::new(self.plan(iter_range)?),
                accu_init: Box::new(self.plan(accu_init)?),
                loop_condition: Box::new(self.plan(loop_condition)?),
                loop_step: Box::new(self.plan(loop_step)?),
                result: Box::new(self.plan(result)?),
            },
        };
        self.decorate(node)
    }

    fn plan_all(&self, exprs: &[Expr]) -> Result<Vec<Interpretable>, PlanError> {
        exprs.iter().map(|e| self.plan(e)).collect()
    }

    fn decorate(&self, mut node: Interpretable) -> Result<Interpretable, PlanError> {
        for decorator in self.decorators {
            node = decorator(node)?;
        }
        Ok(node)
    }

    fn plan_ident(&self, id: i64, name: &str) -> Result<Interpretable, PlanError> {
        // A checked reference pins the identifier to an absolute name or
        // an enum constant.
        if let Some(reference) = self.checked.and_then(|c| c.reference(id)) {
            if let Some(value) = &reference.value {
                return Ok(Interpretable::Const {
                    id,
                    value: constant_value(value),
                });
            }
            if let Some(resolved) = &reference.name {
                return Ok(Interpretable::Attr(Attribute::absolute(
                    id,
                    vec![resolved.clone()],
                )));
            }
        }

        let candidates = self.container.resolve_candidate_names(name);
        // Registered enum constants and type names collapse to constants.
        for candidate in &candidates {
            if let Some(value) = self.registry.enum_value(candidate) {
                return Ok(Interpretable::Const {
                    id,
                    value: Value::Int(value),
                });
            }
            if let Some(ty) = self.registry.resolve_type(candidate) {
                return Ok(Interpretable::Const {
                    id,
                    value: Value::Type(ty),
                });
            }
        }
        if let Some(ty) = builtin_type_name(name) {
            return Ok(Interpretable::Const {
                id,
                value: Value::Type(ty),
            });
        }
        Ok(Interpretable::Attr(Attribute::maybe(id, candidates)))
    }

    fn plan_select(
        &self,
        id: i64,
        operand: &Expr,
        field: &str,
        test_only: bool,
    ) -> Result<Interpretable, PlanError> {
        if let Some(reference) = self.checked.and_then(|c| c.reference(id)) {
            if let Some(value) = &reference.value {
                return Ok(Interpretable::Const {
                    id,
                    value: constant_value(value),
                });
            }
            if let Some(resolved) = &reference.name {
                return Ok(Interpretable::Attr(Attribute::absolute(
                    id,
                    vec![resolved.clone()],
                )));
            }
        }

        let operand_node = self.plan(operand)?;
        if test_only {
            return Ok(Interpretable::TestField {
                id,
                operand: Box::new(operand_node),
                field: field.to_string(),
            });
        }

        // Merge the field into the operand's attribute so the qualifier
        // chain stays a single namespaced attribute.
        let mut attr = into_attribute(operand_node, id);
        attr.add_qualifier(Qualifier::Field {
            id,
            name: field.to_string(),
        });
        // A fully dotted path may actually name an enum constant or a
        // registered type rather than a variable.
        if let Some(constant) = self.constant_for_attribute(id, &attr) {
            return Ok(constant);
        }
        Ok(Interpretable::Attr(attr))
    }

    // Check the freshly augmented candidate names of an unchecked
    // attribute against the registry.
    fn constant_for_attribute(&self, id: i64, attr: &Attribute) -> Option<Interpretable> {
        let Attribute::Maybe { attrs, .. } = attr else {
            return None;
        };
        let first = attrs.first()?;
        if !first.qualifiers().is_empty() {
            return None;
        }
        for name in first.candidate_names() {
            if let Some(value) = self.registry.enum_value(name) {
                return Some(Interpretable::Const {
                    id,
                    value: Value::Int(value),
                });
            }
            if let Some(ty) = self.registry.resolve_type(name) {
                return Some(Interpretable::Const {
                    id,
                    value: Value::Type(ty),
                });
            }
        }
        None
    }

    fn plan_index(&self, id: i64, operand: &Expr, index: &Expr) -> Result<Interpretable, PlanError> {
        let operand_node = self.plan(operand)?;
        let mut attr = into_attribute(operand_node, id);
        if let ExprKind::Const(c) = &index.kind {
            attr.add_qualifier(Qualifier::Const {
                id: index.id,
                key: constant_value(c),
            });
        } else {
            let index_node = self.plan(index)?;
            if !attr.supports_dynamic_qualifiers() {
                attr = Attribute::relative(id, Box::new(Interpretable::Attr(attr)));
            }
            attr.add_qualifier(Qualifier::Expr {
                id: index.id,
                node: Box::new(index_node),
            });
        }
        Ok(Interpretable::Attr(attr))
    }

    fn plan_call(
        &self,
        id: i64,
        function: &str,
        target: Option<&Expr>,
        args: &[Expr],
    ) -> Result<Interpretable, PlanError> {
        // Non-strict operators and type inspection are built-in nodes,
        // never dispatched.
        match function {
            "_&&_" if target.is_none() => {
                let (lhs, rhs) = self.two_args(function, args)?;
                return Ok(Interpretable::And {
                    id,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                });
            }
            "_||_" if target.is_none() => {
                let (lhs, rhs) = self.two_args(function, args)?;
                return Ok(Interpretable::Or {
                    id,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                });
            }
            "_?_:_" if target.is_none() => {
                if args.len() != 3 {
                    return Err(PlanError::InvalidCallShape {
                        function: function.to_string(),
                        expected: 3,
                    });
                }
                return Ok(Interpretable::Conditional {
                    id,
                    guard: Box::new(self.plan(&args[0])?),
                    truthy: Box::new(self.plan(&args[1])?),
                    falsy: Box::new(self.plan(&args[2])?),
                });
            }
            "_[_]" if target.is_none() => {
                if args.len() != 2 {
                    return Err(PlanError::InvalidCallShape {
                        function: function.to_string(),
                        expected: 2,
                    });
                }
                return self.plan_index(id, &args[0], &args[1]);
            }
            "type" if target.is_none() && args.len() == 1 => {
                return Ok(Interpretable::TypeOf {
                    id,
                    arg: Box::new(self.plan(&args[0])?),
                });
            }
            "@not_strictly_false" | "__not_strictly_false__" if target.is_none() => {
                if args.len() != 1 {
                    return Err(PlanError::InvalidCallShape {
                        function: function.to_string(),
                        expected: 1,
                    });
                }
                return Ok(Interpretable::NotStrictlyFalse {
                    id,
                    arg: Box::new(self.plan(&args[0])?),
                });
            }
            _ => {}
        }

        let member = target.is_some();
        let mut planned = Vec::with_capacity(args.len() + usize::from(member));
        if let Some(receiver) = target {
            planned.push(self.plan(receiver)?);
        }
        for arg in args {
            planned.push(self.plan(arg)?);
        }

        // A checked call site binds directly to its overload.
        if let Some(reference) = self.checked.and_then(|c| c.reference(id)) {
            if !reference.overload_ids.is_empty() {
                for overload_id in &reference.overload_ids {
                    if let Some(overload) = self.dispatcher.find_overload(overload_id) {
                        debug!(id, overload = %overload_id, "bound call to checked overload");
                        return Ok(Interpretable::CallResolved {
                            id,
                            function: function.to_string(),
                            overload: overload.clone(),
                            args: planned,
                            member,
                        });
                    }
                }
                return Err(PlanError::UnknownOverload(
                    reference.overload_ids[0].clone(),
                ));
            }
        }

        // Unchecked calls resolve the function name through the
        // container, then dispatch over overloads at runtime.
        let resolved = if member {
            self.dispatcher.function(function)
        } else {
            self.container
                .resolve_candidate_names(function)
                .iter()
                .find_map(|candidate| self.dispatcher.function(candidate))
        };
        let function = match resolved {
            Some(f) => f.clone(),
            // Unknown functions defer to evaluation, which reports them.
            None => Function::new(function),
        };
        Ok(Interpretable::CallDispatch {
            id,
            function,
            args: planned,
            member,
        })
    }

    fn two_args(
        &self,
        function: &str,
        args: &[Expr],
    ) -> Result<(Interpretable, Interpretable), PlanError> {
        if args.len() != 2 {
            return Err(PlanError::InvalidCallShape {
                function: function.to_string(),
                expected: 2,
            });
        }
        Ok((self.plan(&args[0])?, self.plan(&args[1])?))
    }

    fn resolve_struct_type(&self, id: i64, type_name: &str) -> Result<String, PlanError> {
        if let Some(resolved) = self
            .checked
            .and_then(|c| c.struct_types.get(&id))
        {
            if self.registry.message_type(resolved).is_none() {
                return Err(PlanError::UnknownType(resolved.clone()));
            }
            return Ok(resolved.clone());
        }
        for candidate in self.container.resolve_candidate_names(type_name) {
            if self.registry.message_type(&candidate).is_some() {
                return Ok(candidate);
            }
        }
        Err(PlanError::UnknownType(type_name.to_string()))
    }
}

// Unwrap an operand into an attribute for qualifier merging, looking
// through any observer installed by a decorator.
fn into_attribute(node: Interpretable, id: i64) -> Attribute {
    match node {
        Interpretable::Attr(attr) => attr,
        Interpretable::Observed { inner, state } => match *inner {
            Interpretable::Attr(attr) => attr,
            other => Attribute::relative(
                id,
                Box::new(Interpretable::Observed {
                    inner: Box::new(other),
                    state,
                }),
            ),
        },
        other => Attribute::relative(id, Box::new(other)),
    }
}

fn constant_value(c: &Constant) -> Value {
    match c {
        Constant::Null => Value::Null,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::Int(*i),
        Constant::UInt(u) => Value::UInt(*u),
        Constant::Double(d) => Value::Double(*d),
        Constant::String(s) => Value::from(s.as_str()),
        Constant::Bytes(b) => Value::from(b.as_slice()),
    }
}

fn builtin_type_name(name: &str) -> Option<TypeValue> {
    match name {
        "null_type" => Some(TypeValue::null_type()),
        "bool" => Some(TypeValue::bool_type()),
        "int" => Some(TypeValue::int_type()),
        "uint" => Some(TypeValue::uint_type()),
        "double" => Some(TypeValue::double_type()),
        "string" => Some(TypeValue::string_type()),
        "bytes" => Some(TypeValue::bytes_type()),
        "list" => Some(TypeValue::list_type()),
        "map" => Some(TypeValue::map_type()),
        "type" => Some(TypeValue::type_type()),
        _ => None,
    }
}
