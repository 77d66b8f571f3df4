//! Variable bindings for evaluation.
//!
//! An `Activation` resolves identifier names to values for one eval call.
//! Activations are read-only during evaluation; comprehension iterations
//! layer `HierarchicalActivation` frames on top, and partial inputs are
//! expressed with `PartialActivation` plus attribute patterns.

use std::collections::HashMap;

use super::attributes::AttributePattern;
use super::value::Value;

/// Trait for resolving variable bindings during evaluation.
pub trait Activation: Send + Sync {
    /// Resolve a (possibly dotted) name to its value.
    ///
    /// Returns `None` if the name is not bound in this activation or any
    /// of its parents.
    fn resolve(&self, name: &str) -> Option<Value>;

    /// The parent activation, if any.
    fn parent(&self) -> Option<&dyn Activation> {
        None
    }

    /// Unknown-attribute patterns declared directly on this activation.
    ///
    /// Patterns of parent activations are found by walking `parent()`.
    fn unknown_patterns(&self) -> &[AttributePattern] {
        &[]
    }
}

/// An activation with no bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyActivation;

impl EmptyActivation {
    /// Create a new empty activation.
    pub fn new() -> Self {
        Self
    }
}

impl Activation for EmptyActivation {
    fn resolve(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// A simple activation backed by a HashMap.
///
/// Dotted names are ordinary keys here, which is what enables callers to
/// present either flat (`"a.b.c"`) or nested (`"a"` holding maps) shapes.
#[derive(Debug, Clone, Default)]
pub struct MapActivation {
    bindings: HashMap<String, Value>,
}

impl MapActivation {
    /// Create a new empty activation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an activation from an iterator of bindings.
    pub fn from_iter(bindings: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            bindings: bindings.into_iter().collect(),
        }
    }

    /// Insert a binding.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Activation for MapActivation {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }
}

/// A child activation that shadows a parent.
///
/// Comprehensions allocate one of these per iteration for the loop and
/// accumulator variables.
pub struct HierarchicalActivation<'a> {
    parent: &'a dyn Activation,
    local: HashMap<String, Value>,
}

impl<'a> HierarchicalActivation<'a> {
    /// Create a new child activation over `parent`.
    pub fn new(parent: &'a dyn Activation) -> Self {
        Self {
            parent,
            local: HashMap::new(),
        }
    }

    /// Add a local binding that shadows the parent.
    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.local.insert(name.into(), value.into());
        self
    }

    /// Insert a local binding.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.local.insert(name.into(), value.into());
    }
}

impl Activation for HierarchicalActivation<'_> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.local
            .get(name)
            .cloned()
            .or_else(|| self.parent.resolve(name))
    }

    fn parent(&self) -> Option<&dyn Activation> {
        Some(self.parent)
    }
}

/// An activation over partial input.
///
/// Wraps another activation with the attribute patterns that mark parts
/// of the input as unknown; attribute resolution consults the patterns
/// before bindings.
pub struct PartialActivation<A> {
    inner: A,
    patterns: Vec<AttributePattern>,
}

impl<A: Activation> PartialActivation<A> {
    /// Wrap an activation with unknown-attribute patterns.
    pub fn new(inner: A, patterns: Vec<AttributePattern>) -> Self {
        Self { inner, patterns }
    }
}

impl<A: Activation> Activation for PartialActivation<A> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.inner.resolve(name)
    }

    fn parent(&self) -> Option<&dyn Activation> {
        self.inner.parent()
    }

    fn unknown_patterns(&self) -> &[AttributePattern] {
        &self.patterns
    }
}

impl<T: Activation + ?Sized> Activation for &T {
    fn resolve(&self, name: &str) -> Option<Value> {
        (**self).resolve(name)
    }

    fn parent(&self) -> Option<&dyn Activation> {
        (**self).parent()
    }

    fn unknown_patterns(&self) -> &[AttributePattern] {
        (**self).unknown_patterns()
    }
}

/// Collect the unknown patterns visible from an activation, walking the
/// parent chain.
pub(crate) fn collect_patterns<'a>(activation: &'a dyn Activation) -> Vec<&'a AttributePattern> {
    let mut patterns = Vec::new();
    let mut current: Option<&dyn Activation> = Some(activation);
    while let Some(act) = current {
        patterns.extend(act.unknown_patterns().iter());
        current = act.parent();
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_activation() {
        let mut activation = MapActivation::new();
        activation.insert("x", 42i64);
        activation.insert("name", "hello");

        assert_eq!(activation.resolve("x"), Some(Value::Int(42)));
        assert_eq!(activation.resolve("name"), Some(Value::from("hello")));
        assert_eq!(activation.resolve("unknown"), None);
    }

    #[test]
    fn test_dotted_names_are_plain_keys() {
        let mut activation = MapActivation::new();
        activation.insert("a.b.c", 10i64);
        assert_eq!(activation.resolve("a.b.c"), Some(Value::Int(10)));
        assert_eq!(activation.resolve("a.b"), None);
    }

    #[test]
    fn test_hierarchical_shadowing() {
        let parent = MapActivation::from_iter([
            ("x".to_string(), Value::Int(1)),
            ("y".to_string(), Value::Int(2)),
        ]);

        let child = HierarchicalActivation::new(&parent).with_binding("x", 10i64);

        assert_eq!(child.resolve("x"), Some(Value::Int(10)));
        assert_eq!(child.resolve("y"), Some(Value::Int(2)));
        assert_eq!(child.resolve("z"), None);
    }

    #[test]
    fn test_empty_activation() {
        let activation = EmptyActivation::new();
        assert_eq!(activation.resolve("anything"), None);
    }

    #[test]
    fn test_partial_patterns_visible_through_frames() {
        let base = PartialActivation::new(
            MapActivation::new(),
            vec![AttributePattern::new("a.b")],
        );
        let child = HierarchicalActivation::new(&base).with_binding("x", 1i64);
        let patterns = collect_patterns(&child);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].variable(), "a.b");
    }
}
