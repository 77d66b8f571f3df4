//! Host data adaptation and the named-type registry.
//!
//! The adapter converts host-native Rust data into values on demand; the
//! conversions bottom out in the `Into<Value>` implementations of the
//! value module. The registry resolves qualified message type names and
//! enum constants, constructs messages from literal field entries, and
//! backs field reads with proto2/proto3 presence semantics.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::error::{EvalError, EvalErrorKind};
use super::value::{MapKey, TypeValue, Value};

/// Converts host-native data into values on demand.
///
/// The default adapter relies on the `Into<Value>` conversions; embedders
/// with bespoke host types implement this trait to adapt them lazily.
pub trait TypeAdapter: Send + Sync {
    /// Adapt an already-converted value; the default is the identity.
    fn adapt(&self, value: Value) -> Value {
        value
    }
}

/// The default adapter over native Rust shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAdapter;

impl TypeAdapter for DefaultAdapter {}

impl DefaultAdapter {
    /// Adapt a single native value.
    pub fn value<T: Into<Value>>(v: T) -> Value {
        v.into()
    }

    /// Adapt an optional native value; `None` becomes null.
    pub fn optional<T: Into<Value>>(v: Option<T>) -> Value {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }

    /// Adapt a native sequence, recursively.
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Value {
        Value::list(items)
    }

    /// Adapt a native map, recursively.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Value
    where
        K: Into<MapKey>,
        V: Into<Value>,
    {
        Value::map(entries)
    }
}

/// Message descriptor syntax, which decides primitive-field presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
}

/// The declared kind of a message field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Bool,
    Int,
    UInt,
    Double,
    String,
    Bytes,
    Timestamp,
    Duration,
    /// A nested message, by qualified type name.
    Message(String),
    /// An enum, by qualified type name; read as int.
    Enum(String),
    /// A repeated field.
    List(Box<FieldKind>),
    /// A map field.
    Map(Box<FieldKind>, Box<FieldKind>),
}

impl FieldKind {
    /// The zero value a proto3 primitive reads as when unset.
    fn default_value(&self) -> Value {
        match self {
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Int | FieldKind::Enum(_) => Value::Int(0),
            FieldKind::UInt => Value::UInt(0),
            FieldKind::Double => Value::Double(0.0),
            FieldKind::String => Value::from(""),
            FieldKind::Bytes => Value::Bytes(Arc::from(Vec::<u8>::new())),
            FieldKind::List(_) => Value::List(Arc::from(Vec::<Value>::new())),
            FieldKind::Map(_, _) => Value::map(Vec::<(MapKey, Value)>::new()),
            // Unset message and time fields read as null.
            FieldKind::Message(_) | FieldKind::Timestamp | FieldKind::Duration => Value::Null,
        }
    }

    fn is_zero(&self, value: &Value) -> bool {
        value == &self.default_value()
    }

    fn type_name(&self) -> String {
        match self {
            FieldKind::Bool => "bool".into(),
            FieldKind::Int => "int".into(),
            FieldKind::UInt => "uint".into(),
            FieldKind::Double => "double".into(),
            FieldKind::String => "string".into(),
            FieldKind::Bytes => "bytes".into(),
            FieldKind::Timestamp => "google.protobuf.Timestamp".into(),
            FieldKind::Duration => "google.protobuf.Duration".into(),
            FieldKind::Message(name) | FieldKind::Enum(name) => name.clone(),
            FieldKind::List(elem) => format!("list({})", elem.type_name()),
            FieldKind::Map(k, v) => format!("map({}, {})", k.type_name(), v.type_name()),
        }
    }

    /// Coerce a literal value to this field kind.
    fn coerce(&self, value: Value) -> Result<Value, EvalError> {
        match (self, &value) {
            (FieldKind::Bool, Value::Bool(_))
            | (FieldKind::Int, Value::Int(_))
            | (FieldKind::UInt, Value::UInt(_))
            | (FieldKind::Double, Value::Double(_))
            | (FieldKind::String, Value::String(_))
            | (FieldKind::Bytes, Value::Bytes(_))
            | (FieldKind::Timestamp, Value::Timestamp(_))
            | (FieldKind::Duration, Value::Duration(_))
            | (FieldKind::Enum(_), Value::Int(_)) => Ok(value),
            // Lossless numeric widening for double fields.
            (FieldKind::Double, Value::Int(i)) => Ok(Value::Double(*i as f64)),
            (FieldKind::Double, Value::UInt(u)) => Ok(Value::Double(*u as f64)),
            (FieldKind::Message(want), Value::Message(m)) if m.type_name() == want.as_str() => {
                Ok(value)
            }
            (FieldKind::List(elem), Value::List(items)) => {
                let mut coerced = Vec::with_capacity(items.len());
                for item in items.iter() {
                    coerced.push(elem.coerce(item.clone())?);
                }
                Ok(Value::List(Arc::from(coerced)))
            }
            (FieldKind::Map(_, val_kind), Value::Map(entries)) => {
                let mut coerced = Vec::with_capacity(entries.len());
                for (k, v) in entries.iter() {
                    coerced.push((k.clone(), val_kind.coerce(v.clone())?));
                }
                Ok(Value::map(coerced))
            }
            _ => Err(EvalError::type_conversion(
                value.kind_name(),
                &self.type_name(),
            )),
        }
    }
}

/// A declared message field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldType {
    /// Field name.
    pub name: String,
    /// Declared kind.
    pub kind: FieldKind,
    /// Whether the field is a well-known wrapper (nullable primitive).
    pub wrapper: bool,
}

impl FieldType {
    /// Declare a plain field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            wrapper: false,
        }
    }

    /// Declare a wrapper field: present reads yield the primitive, unset
    /// reads yield null.
    pub fn wrapper(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            wrapper: true,
        }
    }
}

/// A named message type: ordered fields plus the descriptor syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageType {
    name: String,
    syntax: Syntax,
    fields: Vec<FieldType>,
}

impl MessageType {
    /// Declare a new message type.
    pub fn new(name: impl Into<String>, syntax: Syntax) -> Self {
        Self {
            name: name.into(),
            syntax,
            fields: Vec::new(),
        }
    }

    /// Append a field declaration.
    pub fn with_field(mut self, field: FieldType) -> Self {
        self.fields.push(field);
        self
    }

    /// The fully qualified type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The descriptor syntax.
    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> &[FieldType] {
        &self.fields
    }

    /// Look up a field declaration by name.
    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A message object value.
///
/// Only explicitly set fields are stored; unset fields read according to
/// the descriptor syntax (type defaults for primitives, null for wrappers
/// and nested messages).
#[derive(Debug, Clone)]
pub struct MessageValue {
    ty: Arc<MessageType>,
    values: BTreeMap<String, Value>,
}

impl MessageValue {
    fn new(ty: Arc<MessageType>, values: BTreeMap<String, Value>) -> Self {
        Self { ty, values }
    }

    /// The fully qualified type name.
    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    /// Read a field, applying unset-field semantics.
    pub fn get(&self, field: &str) -> Value {
        let Some(decl) = self.ty.field(field) else {
            return Value::error(EvalError::no_such_field(field));
        };
        if let Some(v) = self.values.get(field) {
            return v.clone();
        }
        if decl.wrapper {
            Value::Null
        } else {
            decl.kind.default_value()
        }
    }

    /// Field presence, per the descriptor syntax.
    ///
    /// proto2 primitives report explicit presence; proto3 primitives
    /// report a non-zero value; wrapper, message, repeated, and map fields
    /// report populated-ness.
    pub fn has(&self, field: &str) -> Result<bool, EvalError> {
        let Some(decl) = self.ty.field(field) else {
            return Err(EvalError::no_such_field(field));
        };
        let set = self.values.get(field);
        if decl.wrapper {
            return Ok(set.is_some());
        }
        match &decl.kind {
            FieldKind::Message(_) | FieldKind::Timestamp | FieldKind::Duration => {
                Ok(set.is_some())
            }
            FieldKind::List(_) | FieldKind::Map(_, _) => Ok(match set {
                Some(v) => !decl.kind.is_zero(v),
                None => false,
            }),
            _ => match self.ty.syntax() {
                Syntax::Proto2 => Ok(set.is_some()),
                Syntax::Proto3 => Ok(match set {
                    Some(v) => !decl.kind.is_zero(v),
                    None => false,
                }),
            },
        }
    }
}

impl PartialEq for MessageValue {
    fn eq(&self, other: &Self) -> bool {
        if self.type_name() != other.type_name() {
            return false;
        }
        // Compare effective field values so explicit zeros equal unset
        // fields.
        self.ty
            .fields()
            .iter()
            .all(|f| self.get(&f.name) == other.get(&f.name))
    }
}

/// Registry of named message types and enum constants.
///
/// Registration is confined to setup; the registry is read-only during
/// evaluation and shareable across threads.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    messages: HashMap<String, Arc<MessageType>>,
    enums: HashMap<String, i64>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message type under its qualified name.
    pub fn register_message(&mut self, ty: MessageType) {
        self.messages.insert(ty.name().to_string(), Arc::new(ty));
    }

    /// Register an enum constant under its qualified name.
    pub fn register_enum(&mut self, name: impl Into<String>, value: i64) {
        self.enums.insert(name.into(), value);
    }

    /// Look up a message type by qualified name.
    pub fn message_type(&self, name: &str) -> Option<&Arc<MessageType>> {
        self.messages.get(name)
    }

    /// Resolve a qualified name to a type value, if registered.
    pub fn resolve_type(&self, name: &str) -> Option<TypeValue> {
        self.messages.get(name).map(|t| TypeValue::new(t.name()))
    }

    /// Resolve a qualified enum constant.
    pub fn enum_value(&self, name: &str) -> Option<i64> {
        self.enums.get(name).copied()
    }

    /// Construct a message from literal field entries.
    ///
    /// Each entry name must match a declared field; each value is coerced
    /// to the declared kind.
    pub fn new_message(
        &self,
        type_name: &str,
        entries: impl IntoIterator<Item = (String, Value)>,
    ) -> Value {
        let Some(ty) = self.messages.get(type_name) else {
            return Value::error(EvalError::new(
                EvalErrorKind::TypeConversion,
                format!("unknown type: {}", type_name),
            ));
        };
        let mut values = BTreeMap::new();
        for (name, value) in entries {
            let Some(decl) = ty.field(&name) else {
                return Value::error(EvalError::no_such_field(&name));
            };
            match decl.kind.coerce(value) {
                Ok(v) => {
                    values.insert(name, v);
                }
                Err(e) => return Value::error(e),
            }
        }
        Value::Message(MessageValue::new(ty.clone(), values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register_message(
            MessageType::new("test.Pb2Types", Syntax::Proto2)
                .with_field(FieldType::new("single_int64", FieldKind::Int))
                .with_field(FieldType::new("single_string", FieldKind::String))
                .with_field(FieldType::new(
                    "repeated_bool",
                    FieldKind::List(Box::new(FieldKind::Bool)),
                )),
        );
        registry.register_message(
            MessageType::new("test.Pb3Types", Syntax::Proto3)
                .with_field(FieldType::new("single_int64", FieldKind::Int))
                .with_field(FieldType::new("standalone_enum", FieldKind::Enum("test.Enum".into())))
                .with_field(FieldType::wrapper("single_int64_wrapper", FieldKind::Int))
                .with_field(FieldType::new(
                    "single_nested",
                    FieldKind::Message("test.Pb2Types".into()),
                )),
        );
        registry.register_enum("test.Enum.FOO", 0);
        registry.register_enum("test.Enum.BAR", 1);
        registry
    }

    #[test]
    fn test_enum_resolution() {
        let registry = test_registry();
        assert_eq!(registry.enum_value("test.Enum.BAR"), Some(1));
        assert_eq!(registry.enum_value("test.Enum.MISSING"), None);
    }

    #[test]
    fn test_new_message_coercion() {
        let registry = test_registry();
        let msg = registry.new_message(
            "test.Pb3Types",
            [("single_int64".to_string(), Value::Int(7))],
        );
        match &msg {
            Value::Message(m) => assert_eq!(m.get("single_int64"), Value::Int(7)),
            other => panic!("expected message, got {}", other),
        }

        let err = registry.new_message(
            "test.Pb3Types",
            [("single_int64".to_string(), Value::from("seven"))],
        );
        assert!(err.is_error());

        let err = registry.new_message(
            "test.Pb3Types",
            [("no_such".to_string(), Value::Int(7))],
        );
        assert!(err.is_error());
    }

    #[test]
    fn test_unknown_type() {
        let registry = test_registry();
        assert!(registry.new_message("test.Missing", []).is_error());
    }

    #[test]
    fn test_proto2_presence() {
        let registry = test_registry();
        // Explicitly set to the zero value: proto2 reports presence.
        let msg = registry.new_message(
            "test.Pb2Types",
            [("single_int64".to_string(), Value::Int(0))],
        );
        let Value::Message(m) = msg else { panic!() };
        assert!(m.has("single_int64").unwrap());
        assert!(!m.has("single_string").unwrap());
        // Unset primitive reads as the declared default.
        assert_eq!(m.get("single_string"), Value::from(""));
    }

    #[test]
    fn test_proto3_presence() {
        let registry = test_registry();
        // Explicit zero is indistinguishable from unset in proto3.
        let msg = registry.new_message(
            "test.Pb3Types",
            [
                ("single_int64".to_string(), Value::Int(0)),
                ("standalone_enum".to_string(), Value::Int(1)),
            ],
        );
        let Value::Message(m) = msg else { panic!() };
        assert!(!m.has("single_int64").unwrap());
        assert!(m.has("standalone_enum").unwrap());
    }

    #[test]
    fn test_wrapper_presence_and_read() {
        let registry = test_registry();
        let unset = registry.new_message("test.Pb3Types", []);
        let Value::Message(m) = unset else { panic!() };
        assert!(!m.has("single_int64_wrapper").unwrap());
        assert_eq!(m.get("single_int64_wrapper"), Value::Null);

        // A wrapper set to zero is present.
        let set = registry.new_message(
            "test.Pb3Types",
            [("single_int64_wrapper".to_string(), Value::Int(0))],
        );
        let Value::Message(m) = set else { panic!() };
        assert!(m.has("single_int64_wrapper").unwrap());
        assert_eq!(m.get("single_int64_wrapper"), Value::Int(0));
    }

    #[test]
    fn test_repeated_presence() {
        let registry = test_registry();
        let msg = registry.new_message(
            "test.Pb2Types",
            [("repeated_bool".to_string(), Value::list([false]))],
        );
        let Value::Message(m) = msg else { panic!() };
        assert!(m.has("repeated_bool").unwrap());

        let empty = registry.new_message("test.Pb2Types", []);
        let Value::Message(m) = empty else { panic!() };
        assert!(!m.has("repeated_bool").unwrap());
        assert_eq!(
            m.get("repeated_bool"),
            Value::List(Arc::from(Vec::<Value>::new()))
        );
    }

    #[test]
    fn test_message_equality_with_defaults() {
        let registry = test_registry();
        let a = registry.new_message(
            "test.Pb3Types",
            [("single_int64".to_string(), Value::Int(0))],
        );
        let b = registry.new_message("test.Pb3Types", []);
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_such_field_read() {
        let registry = test_registry();
        let msg = registry.new_message("test.Pb2Types", []);
        let Value::Message(m) = msg else { panic!() };
        assert!(m.get("nonexistent").is_error());
        assert!(m.has("nonexistent").is_err());
    }

    #[test]
    fn test_default_adapter() {
        assert_eq!(DefaultAdapter::value(5i64), Value::Int(5));
        assert_eq!(DefaultAdapter::optional(None::<i64>), Value::Null);
        assert_eq!(
            DefaultAdapter::list([1i64, 2]),
            Value::list([1i64, 2])
        );
    }
}
