//! Attribute resolution: namespaced identifiers, qualifier chains, and
//! partial-input unknowns.
//!
//! An attribute is a base identifier plus an ordered chain of qualifiers.
//! Unchecked identifiers resolve against a prioritized list of candidate
//! names derived from the container namespace; string qualifiers extend
//! that list so the longest bound dotted name wins (field-path
//! subsumption). Partial activations contribute attribute patterns that
//! turn matching paths into unknown values.

use std::collections::BTreeMap;

use super::activation::collect_patterns;
use super::error::EvalError;
use super::interpretable::{Cost, EvalContext, Interpretable};
use super::value::{MapKey, Value};

/// A namespace container for identifier and type resolution.
///
/// For container `a.b.c` and name `x.y`, candidate names are
/// `a.b.c.x.y`, `a.b.x.y`, `a.x.y`, `x.y` in that order. A leading dot
/// pins the name to the root.
#[derive(Debug, Clone, Default)]
pub struct Container {
    name: String,
}

impl Container {
    /// The root container.
    pub fn root() -> Self {
        Self::default()
    }

    /// A named container.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The container name; empty for the root container.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidate names for `name` within this container, longest prefix
    /// first. Computed once at plan time and frozen.
    pub fn resolve_candidate_names(&self, name: &str) -> Vec<String> {
        if let Some(rooted) = name.strip_prefix('.') {
            return vec![rooted.to_string()];
        }
        if self.name.is_empty() {
            return vec![name.to_string()];
        }
        let mut candidates = Vec::new();
        let mut prefix = self.name.as_str();
        loop {
            candidates.push(format!("{}.{}", prefix, name));
            match prefix.rfind('.') {
                Some(i) => prefix = &prefix[..i],
                None => break,
            }
        }
        candidates.push(name.to_string());
        candidates
    }
}

/// A single step in an attribute's qualifier chain.
#[derive(Debug)]
pub enum Qualifier {
    /// A field name (messages, maps with string keys).
    Field { id: i64, name: String },
    /// A constant key (maps, lists).
    Const { id: i64, key: Value },
    /// A dynamic key computed by a sub-expression.
    Expr { id: i64, node: Box<Interpretable> },
}

impl Qualifier {
    /// The AST id of this qualifier step.
    pub fn id(&self) -> i64 {
        match self {
            Qualifier::Field { id, .. } | Qualifier::Const { id, .. } | Qualifier::Expr { id, .. } => {
                *id
            }
        }
    }

    fn cost(&self) -> Cost {
        match self {
            Qualifier::Expr { node, .. } => node.cost(),
            _ => Cost::new(0, 0),
        }
    }

    // The concrete key for this step, evaluating dynamic qualifiers.
    fn key(&self, ctx: &EvalContext<'_>) -> Value {
        match self {
            Qualifier::Field { name, .. } => Value::from(name.as_str()),
            Qualifier::Const { key, .. } => key.clone(),
            Qualifier::Expr { node, .. } => node.eval(ctx),
        }
    }
}

/// One step of an unknown-attribute pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternQualifier {
    /// Matches one exact key.
    Exact(MapKey),
    /// Matches any key at this position.
    Wildcard,
}

impl PatternQualifier {
    fn matches(&self, key: &Value) -> bool {
        match self {
            PatternQualifier::Wildcard => true,
            PatternQualifier::Exact(want) => match MapKey::from_value(key) {
                Some(got) => *want == got,
                None => false,
            },
        }
    }
}

/// A pattern marking part of a partial activation's input as unknown.
///
/// The pattern names a base variable and a qualifier sequence, possibly
/// with wildcards. During the qualifier walk an attribute path matches
/// when the shorter of the two sequences is a prefix of the other.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePattern {
    variable: String,
    quals: Vec<PatternQualifier>,
}

impl AttributePattern {
    /// A pattern rooted at the given (possibly dotted) variable name.
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            quals: Vec::new(),
        }
    }

    /// Append an exact field-name step.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.quals.push(PatternQualifier::Exact(MapKey::String(
            name.into().into(),
        )));
        self
    }

    /// Append an exact key step.
    pub fn key(mut self, key: impl Into<MapKey>) -> Self {
        self.quals.push(PatternQualifier::Exact(key.into()));
        self
    }

    /// Append a wildcard step.
    pub fn wildcard(mut self) -> Self {
        self.quals.push(PatternQualifier::Wildcard);
        self
    }

    /// The base variable name.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// The qualifier steps.
    pub fn qualifiers(&self) -> &[PatternQualifier] {
        &self.quals
    }

    // Two-way prefix match against a concrete key path. Returns the
    // number of path steps consumed when the pattern matches.
    fn match_path(&self, keys: &[Value]) -> Option<usize> {
        let n = self.quals.len().min(keys.len());
        for i in 0..n {
            if !self.quals[i].matches(&keys[i]) {
                return None;
            }
        }
        Some(n)
    }
}

/// An attribute with known candidate names.
#[derive(Debug)]
pub struct NamespacedAttribute {
    id: i64,
    names: Vec<String>,
    quals: Vec<Qualifier>,
}

impl NamespacedAttribute {
    /// The candidate variable names, longest first.
    pub fn candidate_names(&self) -> &[String] {
        &self.names
    }

    /// The qualifier chain.
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.quals
    }
}

/// A base reference plus qualifier chain, resolvable against an
/// activation.
#[derive(Debug)]
pub enum Attribute {
    /// An attribute whose candidate names are fully known (checked
    /// identifiers, or unchecked ones once container candidates are
    /// computed).
    Absolute(NamespacedAttribute),
    /// An unchecked attribute: a prioritized list of absolute candidates,
    /// grown as string qualifiers are merged in.
    Maybe {
        id: i64,
        attrs: Vec<NamespacedAttribute>,
    },
    /// A qualifier chain over a computed operand.
    Relative {
        id: i64,
        operand: Box<Interpretable>,
        quals: Vec<Qualifier>,
    },
}

impl Attribute {
    /// An attribute with a fixed candidate name list.
    pub fn absolute(id: i64, names: Vec<String>) -> Self {
        Attribute::Absolute(NamespacedAttribute {
            id,
            names,
            quals: Vec::new(),
        })
    }

    /// An unchecked attribute over container candidate names.
    pub fn maybe(id: i64, names: Vec<String>) -> Self {
        Attribute::Maybe {
            id,
            attrs: vec![NamespacedAttribute {
                id,
                names,
                quals: Vec::new(),
            }],
        }
    }

    /// An attribute over a computed operand.
    pub fn relative(id: i64, operand: Box<Interpretable>) -> Self {
        Attribute::Relative {
            id,
            operand,
            quals: Vec::new(),
        }
    }

    /// The AST id of the attribute's base node.
    pub fn id(&self) -> i64 {
        match self {
            Attribute::Absolute(attr) => attr.id,
            Attribute::Maybe { id, .. } | Attribute::Relative { id, .. } => *id,
        }
    }

    /// Append a qualifier step.
    ///
    /// For unchecked attributes a field qualifier also extends the
    /// candidate name list, so `a.b.c` prefers a binding named `a.b.c`
    /// over qualifier access into `a.b`.
    pub fn add_qualifier(&mut self, qual: Qualifier) {
        match self {
            Attribute::Absolute(attr) => attr.quals.push(qual),
            Attribute::Relative { quals, .. } => quals.push(qual),
            Attribute::Maybe { id, attrs } => {
                let mut augmented = Vec::new();
                if let Qualifier::Field { name, .. } = &qual {
                    if attrs[0].quals.is_empty() {
                        augmented = attrs[0]
                            .names
                            .iter()
                            .map(|n| format!("{}.{}", n, name))
                            .collect();
                    }
                }
                for attr in attrs.iter_mut() {
                    attr.quals.push(match &qual {
                        Qualifier::Field { id, name } => Qualifier::Field {
                            id: *id,
                            name: name.clone(),
                        },
                        Qualifier::Const { id, key } => Qualifier::Const {
                            id: *id,
                            key: key.clone(),
                        },
                        // Dynamic qualifiers cannot be cloned; they only
                        // occur after the attribute has left the maybe
                        // state (index planning wraps in a relative
                        // attribute instead).
                        Qualifier::Expr { .. } => unreachable!("dynamic qualifier on maybe attribute"),
                    });
                }
                if !augmented.is_empty() {
                    attrs.insert(
                        0,
                        NamespacedAttribute {
                            id: *id,
                            names: augmented,
                            quals: Vec::new(),
                        },
                    );
                }
            }
        }
    }

    /// Whether a dynamic qualifier can be appended directly.
    pub fn supports_dynamic_qualifiers(&self) -> bool {
        !matches!(self, Attribute::Maybe { .. })
    }

    /// Evaluation cost: one resolution step plus any dynamic qualifier
    /// costs.
    pub fn cost(&self) -> Cost {
        let mut cost = Cost::new(1, 1);
        let quals = match self {
            Attribute::Absolute(attr) => &attr.quals,
            Attribute::Relative { operand, quals, .. } => {
                cost = cost.add(&operand.cost());
                quals
            }
            Attribute::Maybe { attrs, .. } => &attrs[0].quals,
        };
        for q in quals {
            cost = cost.add(&q.cost());
        }
        cost
    }

    /// Resolve the attribute against the context's activation.
    pub fn resolve(&self, ctx: &EvalContext<'_>) -> Value {
        match self {
            Attribute::Absolute(attr) => match try_resolve(attr, ctx) {
                Some(value) => value,
                None => missing(attr),
            },
            Attribute::Maybe { attrs, .. } => {
                for attr in attrs {
                    if let Some(value) = try_resolve(attr, ctx) {
                        return value;
                    }
                }
                missing(&attrs[0])
            }
            Attribute::Relative { operand, quals, .. } => {
                let obj = operand.eval(ctx);
                if obj.is_error() || obj.is_unknown() {
                    return obj;
                }
                apply_qualifiers(obj, quals, ctx)
            }
        }
    }
}

fn missing(attr: &NamespacedAttribute) -> Value {
    let name = attr
        .names
        .last()
        .map(String::as_str)
        .unwrap_or("<unnamed>");
    Value::error(EvalError::no_such_attribute(name).at(attr.id))
}

// Attempt resolution of one candidate attribute. `None` means no binding
// and no pattern applied, so the caller may try the next candidate.
fn try_resolve(attr: &NamespacedAttribute, ctx: &EvalContext<'_>) -> Option<Value> {
    let patterns = collect_patterns(ctx.vars);
    for name in &attr.names {
        let matching: Vec<_> = patterns
            .iter()
            .filter(|p| p.variable() == name.as_str())
            .copied()
            .collect();
        let bound = ctx.vars.resolve(name);
        if bound.is_none() && matching.is_empty() {
            continue;
        }

        if !matching.is_empty() {
            // Evaluate the concrete key path once for pattern matching.
            let mut keys = Vec::with_capacity(attr.quals.len());
            for qual in &attr.quals {
                let key = qual.key(ctx);
                if key.is_error() || key.is_unknown() {
                    return Some(key);
                }
                keys.push(key);
            }
            for pattern in &matching {
                if let Some(consumed) = pattern.match_path(&keys) {
                    let id = if consumed == 0 {
                        attr.id
                    } else {
                        attr.quals[consumed - 1].id()
                    };
                    return Some(Value::unknown(id));
                }
            }
        }

        if let Some(obj) = bound {
            return Some(apply_qualifiers(obj, &attr.quals, ctx));
        }
    }
    None
}

// Apply a qualifier chain to a resolved object, one step at a time.
fn apply_qualifiers(mut obj: Value, quals: &[Qualifier], ctx: &EvalContext<'_>) -> Value {
    for qual in quals {
        if obj.is_error() || obj.is_unknown() {
            return obj;
        }
        let key = qual.key(ctx);
        if key.is_error() || key.is_unknown() {
            return key;
        }
        obj = qualify(obj, &key, qual.id());
    }
    obj
}

// One qualifier application step.
fn qualify(obj: Value, key: &Value, id: i64) -> Value {
    match &obj {
        Value::Map(map) => match MapKey::from_value(key) {
            Some(map_key) => match map.get(&map_key) {
                Some(v) => v.clone(),
                None => Value::error(EvalError::no_such_key(key).at(id)),
            },
            None => Value::error(
                EvalError::no_such_overload(&format!("{}[{}]", obj.kind_name(), key.kind_name()))
                    .at(id),
            ),
        },
        Value::List(list) => {
            let idx = match key {
                Value::Int(i) => *i,
                Value::UInt(u) if *u <= i64::MAX as u64 => *u as i64,
                _ => {
                    return Value::error(
                        EvalError::no_such_overload(&format!(
                            "{}[{}]",
                            obj.kind_name(),
                            key.kind_name()
                        ))
                        .at(id),
                    )
                }
            };
            if idx < 0 || idx as usize >= list.len() {
                Value::error(
                    EvalError::invalid_argument(format!(
                        "index {} out of range for list of size {}",
                        idx,
                        list.len()
                    ))
                    .at(id),
                )
            } else {
                list[idx as usize].clone()
            }
        }
        Value::Message(msg) => match key {
            Value::String(field) => msg.get(field),
            _ => Value::error(
                EvalError::no_such_overload(&format!(
                    "{}[{}]",
                    obj.kind_name(),
                    key.kind_name()
                ))
                .at(id),
            ),
        },
        _ => Value::error(
            EvalError::no_such_overload(&format!(
                "type '{}' does not support field selection",
                obj.kind_name()
            ))
            .at(id),
        ),
    }
}

/// Field-presence test used by `has()` on an already-resolved operand.
pub fn test_field(obj: &Value, field: &str, id: i64) -> Value {
    match obj {
        Value::Error(_) | Value::Unknown(_) => obj.clone(),
        Value::Map(map) => {
            let key = MapKey::String(field.into());
            Value::Bool(map.contains_key(&key))
        }
        Value::Message(msg) => match msg.has(field) {
            Ok(present) => Value::Bool(present),
            Err(e) => Value::error(e.at(id)),
        },
        _ => Value::error(
            EvalError::no_such_overload(&format!(
                "type '{}' does not support field presence",
                obj.kind_name()
            ))
            .at(id),
        ),
    }
}

/// Ordered map used while building map and struct literals; rejects
/// duplicate keys.
pub(crate) struct LiteralEntries {
    entries: BTreeMap<MapKey, Value>,
}

impl LiteralEntries {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: MapKey, value: Value) -> Result<(), EvalError> {
        if self.entries.contains_key(&key) {
            return Err(EvalError::duplicate_key(key.to_value()));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    pub(crate) fn into_value(self) -> Value {
        Value::map(self.entries)
    }
}
