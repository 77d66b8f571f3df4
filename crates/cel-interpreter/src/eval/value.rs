//! Runtime values and the operator algebra over them.
//!
//! `Value` represents every CEL value at runtime, including primitive
//! types, collections, timestamps, durations, message objects, and the two
//! sentinel variants that propagate through operators: errors and
//! unknowns.
//!
//! Operators are exposed as methods (`add`, `compare`, `equal`, ...) that
//! return `Value` rather than `Result`: an unsupported operand combination
//! produces a `no_such_overload` error value, and errors/unknowns flow
//! through subsequent operators unchanged.
//!
//! # Creating values
//!
//! Use Rust's standard `Into` trait to create values from native types:
//!
//! ```rust
//! use cel_interpreter::Value;
//!
//! let v: Value = 42.into();      // i32 -> Value::Int(i64)
//! let v: Value = 42u32.into();   // u32 -> Value::UInt(u64)
//! let v: Value = true.into();
//! let v: Value = "hello".into();
//! let list: Value = vec![Value::Int(1), Value::Int(2)].into();
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::adapter::MessageValue;
use super::error::{EvalError, EvalErrorKind};
use super::time;

/// Error returned when extracting a native type from a `Value` fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueError {
    /// The expected type name.
    pub expected: &'static str,
    /// The actual type name found.
    pub found: String,
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

impl std::error::Error for ValueError {}

/// A CEL runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// Unsigned 64-bit integer, distinct from `Int`.
    UInt(u64),
    /// 64-bit IEEE-754 floating point.
    Double(f64),
    /// Unicode string (Arc for cheap cloning).
    String(Arc<str>),
    /// Byte sequence (Arc for cheap cloning).
    Bytes(Arc<[u8]>),
    /// Immutable list.
    List(Arc<[Value]>),
    /// Immutable key-value map with deterministic iteration order.
    Map(Arc<ValueMap>),
    /// Timestamp (seconds and nanos since Unix epoch).
    Timestamp(Timestamp),
    /// Duration (seconds and nanos).
    Duration(Duration),
    /// A type descriptor as a first-class value.
    Type(TypeValue),
    /// A message object constructed through the type registry.
    Message(MessageValue),
    /// Error value; evaluation errors propagate as values.
    Error(Arc<EvalError>),
    /// Unknown value produced by a partial activation; the payload is the
    /// set of AST node ids that could not be resolved.
    Unknown(UnknownSet),
}

/// Capability traits a value variant may support.
///
/// The dispatcher uses these as overload guards: an overload registered
/// with an operand trait only matches when the first argument supports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trait {
    Adder,
    Subtractor,
    Multiplier,
    Divider,
    Modder,
    Negater,
    Comparer,
    Indexer,
    Container,
    Sizer,
    Iterable,
    Matcher,
    Receiver,
    FieldTester,
}

/// The set of AST node ids carried by an unknown value.
///
/// Ids are kept sorted and deduplicated so unknown aggregation is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSet {
    ids: Arc<[i64]>,
}

impl UnknownSet {
    /// An unknown originating at a single AST node.
    pub fn single(id: i64) -> Self {
        Self {
            ids: Arc::from([id]),
        }
    }

    /// The ids in ascending order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Union of two unknown sets.
    pub fn union(&self, other: &UnknownSet) -> Self {
        let mut merged: Vec<i64> = self.ids.iter().chain(other.ids.iter()).copied().collect();
        merged.sort_unstable();
        merged.dedup();
        Self {
            ids: Arc::from(merged),
        }
    }
}

/// A CEL timestamp value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Seconds since Unix epoch.
    pub seconds: i64,
    /// Nanoseconds (0..999_999_999).
    pub nanos: i32,
}

impl Timestamp {
    /// Minimum valid timestamp: 0001-01-01T00:00:00Z.
    pub const MIN_SECONDS: i64 = -62135596800;

    /// Maximum valid timestamp: 9999-12-31T23:59:59Z.
    pub const MAX_SECONDS: i64 = 253402300799;

    /// Create a new timestamp.
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    /// Create a timestamp from seconds since Unix epoch.
    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    /// Check that this timestamp falls within years 0001..=9999.
    pub fn is_valid(&self) -> bool {
        self.seconds >= Self::MIN_SECONDS && self.seconds <= Self::MAX_SECONDS
    }

    /// Convert to a chrono `DateTime<Utc>`.
    pub fn to_datetime_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.seconds, self.nanos as u32)
    }
}

/// A CEL duration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    /// Seconds component.
    pub seconds: i64,
    /// Nanoseconds component; negative durations carry negative nanos.
    pub nanos: i32,
}

impl Duration {
    /// Maximum valid duration in seconds, one below the span of the valid
    /// timestamp range so max-minus-min timestamps report a range error.
    pub const MAX_SECONDS: i64 = 315_537_897_598;

    /// Minimum valid duration in seconds.
    pub const MIN_SECONDS: i64 = -315_537_897_598;

    /// Create a new duration.
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    /// Create a duration from seconds.
    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    /// Create a duration from nanoseconds.
    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            seconds: nanos / 1_000_000_000,
            nanos: (nanos % 1_000_000_000) as i32,
        }
    }

    /// Total nanoseconds, saturating at the i64 bounds.
    pub fn to_nanos(&self) -> i64 {
        self.seconds
            .saturating_mul(1_000_000_000)
            .saturating_add(self.nanos as i64)
    }

    /// Check that this duration spans at most ~10000 years.
    pub fn is_valid(&self) -> bool {
        self.seconds >= Self::MIN_SECONDS && self.seconds <= Self::MAX_SECONDS
    }

    /// Total hours, truncated.
    pub fn hours(&self) -> i64 {
        self.seconds / 3600
    }

    /// Total minutes, truncated.
    pub fn minutes(&self) -> i64 {
        self.seconds / 60
    }

    /// Total seconds.
    pub fn total_seconds(&self) -> i64 {
        self.seconds
    }

    /// Milliseconds component.
    pub fn milliseconds(&self) -> i64 {
        (self.nanos / 1_000_000) as i64
    }
}

/// A type descriptor as a runtime value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeValue {
    /// The type name as it appears in CEL.
    pub name: Arc<str>,
}

impl TypeValue {
    /// Create a new type value.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn null_type() -> Self {
        Self::new("null_type")
    }
    pub fn bool_type() -> Self {
        Self::new("bool")
    }
    pub fn int_type() -> Self {
        Self::new("int")
    }
    pub fn uint_type() -> Self {
        Self::new("uint")
    }
    pub fn double_type() -> Self {
        Self::new("double")
    }
    pub fn string_type() -> Self {
        Self::new("string")
    }
    pub fn bytes_type() -> Self {
        Self::new("bytes")
    }
    pub fn list_type() -> Self {
        Self::new("list")
    }
    pub fn map_type() -> Self {
        Self::new("map")
    }
    pub fn timestamp_type() -> Self {
        Self::new("google.protobuf.Timestamp")
    }
    pub fn duration_type() -> Self {
        Self::new("google.protobuf.Duration")
    }
    pub fn type_type() -> Self {
        Self::new("type")
    }
}

/// A map key restricted to CEL's key types: bool, int, uint, string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    String(Arc<str>),
}

impl MapKey {
    /// Create a map key from a value, if the value is a valid key type.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Int(i) => Some(MapKey::Int(*i)),
            Value::UInt(u) => Some(MapKey::UInt(*u)),
            Value::String(s) => Some(MapKey::String(s.clone())),
            _ => None,
        }
    }

    /// Convert back to a value.
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::UInt(u) => Value::UInt(*u),
            MapKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::String(Arc::from(s))
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::String(Arc::from(s))
    }
}

impl From<bool> for MapKey {
    fn from(b: bool) -> Self {
        MapKey::Bool(b)
    }
}

impl From<i64> for MapKey {
    fn from(i: i64) -> Self {
        MapKey::Int(i)
    }
}

impl From<u64> for MapKey {
    fn from(u: u64) -> Self {
        MapKey::UInt(u)
    }
}

/// An immutable CEL map.
///
/// Backed by a `BTreeMap` for deterministic iteration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap {
    entries: BTreeMap<MapKey, Value>,
}

impl ValueMap {
    /// Create a new empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map from an iterator of key-value pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (MapKey, Value)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Get a value by key.
    pub fn get(&self, key: &MapKey) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Insert a key-value pair, returning the previous value if present.
    pub fn insert(&mut self, key: MapKey, value: Value) -> Option<Value> {
        self.entries.insert(key, value)
    }

    /// Check if a key exists.
    pub fn contains_key(&self, key: &MapKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&MapKey, &Value)> {
        self.entries.iter()
    }

    /// Iterate over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &MapKey> {
        self.entries.keys()
    }
}

// ==================== Constructors ====================

impl Value {
    /// Create a map value from key-value pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<MapKey>,
        V: Into<Value>,
    {
        Value::Map(Arc::new(ValueMap::from_entries(
            entries.into_iter().map(|(k, v)| (k.into(), v.into())),
        )))
    }

    /// Create a list value from items.
    pub fn list<T>(items: impl IntoIterator<Item = T>) -> Self
    where
        T: Into<Value>,
    {
        Value::List(Arc::from(
            items.into_iter().map(Into::into).collect::<Vec<_>>(),
        ))
    }

    /// Create a timestamp value.
    pub fn timestamp(seconds: i64, nanos: i32) -> Self {
        Value::Timestamp(Timestamp::new(seconds, nanos))
    }

    /// Create a duration value.
    pub fn duration(seconds: i64, nanos: i32) -> Self {
        Value::Duration(Duration::new(seconds, nanos))
    }

    /// Create an error value.
    pub fn error(err: EvalError) -> Self {
        Value::Error(Arc::new(err))
    }

    /// Create an unknown value for a single AST node id.
    pub fn unknown(id: i64) -> Self {
        Value::Unknown(UnknownSet::single(id))
    }
}

// ==================== From implementations ====================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::UInt(u as u64)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(Arc::from(b))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(Arc::from(b))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(Arc::from(v))
    }
}

impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Duration(d)
    }
}

impl From<EvalError> for Value {
    fn from(e: EvalError) -> Self {
        Value::error(e)
    }
}

// ==================== TryFrom implementations ====================

impl TryFrom<&Value> for bool {
    type Error = ValueError;
    fn try_from(v: &Value) -> Result<Self, ValueError> {
        match v {
            Value::Bool(b) => Ok(*b),
            other => Err(ValueError {
                expected: "bool",
                found: other.kind_name().to_string(),
            }),
        }
    }
}

impl TryFrom<&Value> for i64 {
    type Error = ValueError;
    fn try_from(v: &Value) -> Result<Self, ValueError> {
        match v {
            Value::Int(i) => Ok(*i),
            other => Err(ValueError {
                expected: "int",
                found: other.kind_name().to_string(),
            }),
        }
    }
}

impl TryFrom<&Value> for u64 {
    type Error = ValueError;
    fn try_from(v: &Value) -> Result<Self, ValueError> {
        match v {
            Value::UInt(u) => Ok(*u),
            other => Err(ValueError {
                expected: "uint",
                found: other.kind_name().to_string(),
            }),
        }
    }
}

impl TryFrom<&Value> for f64 {
    type Error = ValueError;
    fn try_from(v: &Value) -> Result<Self, ValueError> {
        match v {
            Value::Double(d) => Ok(*d),
            other => Err(ValueError {
                expected: "double",
                found: other.kind_name().to_string(),
            }),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a str {
    type Error = ValueError;
    fn try_from(v: &'a Value) -> Result<Self, ValueError> {
        match v {
            Value::String(s) => Ok(s),
            other => Err(ValueError {
                expected: "string",
                found: other.kind_name().to_string(),
            }),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a [u8] {
    type Error = ValueError;
    fn try_from(v: &'a Value) -> Result<Self, ValueError> {
        match v {
            Value::Bytes(b) => Ok(b),
            other => Err(ValueError {
                expected: "bytes",
                found: other.kind_name().to_string(),
            }),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a [Value] {
    type Error = ValueError;
    fn try_from(v: &'a Value) -> Result<Self, ValueError> {
        match v {
            Value::List(l) => Ok(l),
            other => Err(ValueError {
                expected: "list",
                found: other.kind_name().to_string(),
            }),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a ValueMap {
    type Error = ValueError;
    fn try_from(v: &'a Value) -> Result<Self, ValueError> {
        match v {
            Value::Map(m) => Ok(m.as_ref()),
            other => Err(ValueError {
                expected: "map",
                found: other.kind_name().to_string(),
            }),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a EvalError {
    type Error = ValueError;
    fn try_from(v: &'a Value) -> Result<Self, ValueError> {
        match v {
            Value::Error(e) => Ok(e.as_ref()),
            other => Err(ValueError {
                expected: "error",
                found: other.kind_name().to_string(),
            }),
        }
    }
}

// ==================== Type information ====================

impl Value {
    /// Short variant name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Timestamp(_) => "timestamp",
            Value::Duration(_) => "duration",
            Value::Type(_) => "type",
            Value::Message(_) => "message",
            Value::Error(_) => "error",
            Value::Unknown(_) => "unknown",
        }
    }

    /// The type descriptor for this value, as returned by `type(v)`.
    pub fn type_value(&self) -> TypeValue {
        match self {
            Value::Null => TypeValue::null_type(),
            Value::Bool(_) => TypeValue::bool_type(),
            Value::Int(_) => TypeValue::int_type(),
            Value::UInt(_) => TypeValue::uint_type(),
            Value::Double(_) => TypeValue::double_type(),
            Value::String(_) => TypeValue::string_type(),
            Value::Bytes(_) => TypeValue::bytes_type(),
            Value::List(_) => TypeValue::list_type(),
            Value::Map(_) => TypeValue::map_type(),
            Value::Timestamp(_) => TypeValue::timestamp_type(),
            Value::Duration(_) => TypeValue::duration_type(),
            Value::Type(_) => TypeValue::type_type(),
            Value::Message(m) => TypeValue::new(m.type_name()),
            Value::Error(_) => TypeValue::new("error"),
            Value::Unknown(_) => TypeValue::new("unknown"),
        }
    }

    /// Check if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Check if this value is an unknown.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    /// Check whether this variant supports the given capability trait.
    pub fn supports(&self, t: Trait) -> bool {
        use Trait::*;
        match t {
            Adder => matches!(
                self,
                Value::Int(_)
                    | Value::UInt(_)
                    | Value::Double(_)
                    | Value::String(_)
                    | Value::Bytes(_)
                    | Value::List(_)
                    | Value::Timestamp(_)
                    | Value::Duration(_)
            ),
            Subtractor => matches!(
                self,
                Value::Int(_)
                    | Value::UInt(_)
                    | Value::Double(_)
                    | Value::Timestamp(_)
                    | Value::Duration(_)
            ),
            Multiplier | Divider => {
                matches!(self, Value::Int(_) | Value::UInt(_) | Value::Double(_))
            }
            Modder => matches!(self, Value::Int(_) | Value::UInt(_)),
            Negater => matches!(
                self,
                Value::Bool(_) | Value::Int(_) | Value::Double(_) | Value::Duration(_)
            ),
            Comparer => matches!(
                self,
                Value::Bool(_)
                    | Value::Int(_)
                    | Value::UInt(_)
                    | Value::Double(_)
                    | Value::String(_)
                    | Value::Bytes(_)
                    | Value::Timestamp(_)
                    | Value::Duration(_)
            ),
            Indexer => matches!(self, Value::List(_) | Value::Map(_) | Value::Message(_)),
            Container => matches!(self, Value::List(_) | Value::Map(_)),
            Sizer => matches!(
                self,
                Value::String(_) | Value::Bytes(_) | Value::List(_) | Value::Map(_)
            ),
            Iterable => matches!(self, Value::List(_) | Value::Map(_)),
            Matcher => matches!(self, Value::String(_)),
            Receiver => matches!(
                self,
                Value::String(_) | Value::Timestamp(_) | Value::Duration(_)
            ),
            FieldTester => matches!(self, Value::Map(_) | Value::Message(_)),
        }
    }
}

/// Strict-operator input check: the first error among `args` wins, then
/// the union of any unknowns. Returns `None` when all inputs are plain
/// values.
pub fn strict_propagate(args: &[Value]) -> Option<Value> {
    for arg in args {
        if arg.is_error() {
            return Some(arg.clone());
        }
    }
    let mut unknown: Option<UnknownSet> = None;
    for arg in args {
        if let Value::Unknown(u) = arg {
            unknown = Some(match unknown {
                Some(acc) => acc.union(u),
                None => u.clone(),
            });
        }
    }
    unknown.map(Value::Unknown)
}

// ==================== Equality ====================

impl Value {
    /// CEL equality.
    ///
    /// Values of disjoint types are unequal rather than an error; errors
    /// and unknowns propagate.
    pub fn equal(&self, other: &Value) -> Value {
        if let Some(v) = strict_propagate(std::slice::from_ref(self)) {
            return v;
        }
        if let Some(v) = strict_propagate(std::slice::from_ref(other)) {
            return v;
        }
        Value::Bool(self.strict_eq(other))
    }

    // Structural equality over non-error, non-unknown values.
    fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            // IEEE semantics: NaN != NaN.
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.strict_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, va)| match b.get(k) {
                        Some(vb) => va.strict_eq(vb),
                        None => false,
                    })
            }
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Message(a), Value::Message(b)) => a == b,
            _ => false,
        }
    }
}

// PartialEq mirrors the operator semantics for test assertions; errors
// compare by kind and message.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Unknown(a), Value::Unknown(b)) => a == b,
            _ => self.strict_eq(other),
        }
    }
}

// ==================== Comparison ====================

impl Value {
    /// Three-way comparison, lifted into `Int(-1 | 0 | 1)`.
    ///
    /// Comparison is only defined between values of the same type; any
    /// other pairing is a `no_such_overload` error. Doubles use the IEEE
    /// total order so NaN comparisons stay deterministic.
    pub fn compare(&self, other: &Value) -> Value {
        let ord = match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::UInt(a), Value::UInt(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => {
                (a.seconds, a.nanos).cmp(&(b.seconds, b.nanos))
            }
            (Value::Duration(a), Value::Duration(b)) => {
                (a.seconds, a.nanos).cmp(&(b.seconds, b.nanos))
            }
            _ => return Value::error(EvalError::no_such_overload("compare")),
        };
        match ord {
            Ordering::Less => Value::Int(-1),
            Ordering::Equal => Value::Int(0),
            Ordering::Greater => Value::Int(1),
        }
    }
}

// ==================== Arithmetic ====================

fn normalize_nanos(nanos: i64) -> (i64, i32) {
    if (0..1_000_000_000).contains(&nanos) {
        (0, nanos as i32)
    } else if nanos >= 1_000_000_000 {
        (nanos / 1_000_000_000, (nanos % 1_000_000_000) as i32)
    } else {
        let abs = -nanos;
        let borrow = (abs + 999_999_999) / 1_000_000_000;
        (-borrow, (borrow * 1_000_000_000 - abs) as i32)
    }
}

fn checked_timestamp(seconds: Option<i64>, nanos: i32) -> Value {
    match seconds {
        Some(seconds) => {
            let ts = Timestamp::new(seconds, nanos);
            if ts.is_valid() {
                Value::Timestamp(ts)
            } else {
                Value::error(EvalError::range(
                    "timestamp out of range: must be between year 0001 and 9999",
                ))
            }
        }
        None => Value::error(EvalError::overflow("timestamp arithmetic overflow")),
    }
}

fn checked_duration(seconds: Option<i64>, nanos: i32) -> Value {
    match seconds {
        Some(seconds) => {
            let d = Duration::new(seconds, nanos);
            if d.is_valid() {
                Value::Duration(d)
            } else {
                Value::error(EvalError::range(
                    "duration out of range: must be within approximately 10000 years",
                ))
            }
        }
        None => Value::error(EvalError::overflow("duration arithmetic overflow")),
    }
}

impl Value {
    /// Addition: matching numeric types, string/bytes/list concatenation,
    /// and timestamp/duration arithmetic.
    pub fn add(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .unwrap_or_else(|| Value::error(EvalError::overflow("integer addition overflow"))),
            (Value::UInt(a), Value::UInt(b)) => a
                .checked_add(*b)
                .map(Value::UInt)
                .unwrap_or_else(|| Value::error(EvalError::overflow("unsigned addition overflow"))),
            (Value::Double(a), Value::Double(b)) => Value::Double(a + b),
            (Value::String(a), Value::String(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Value::String(Arc::from(s))
            }
            (Value::Bytes(a), Value::Bytes(b)) => {
                let mut v = Vec::with_capacity(a.len() + b.len());
                v.extend_from_slice(a);
                v.extend_from_slice(b);
                Value::Bytes(Arc::from(v))
            }
            (Value::List(a), Value::List(b)) => {
                let mut v = Vec::with_capacity(a.len() + b.len());
                v.extend(a.iter().cloned());
                v.extend(b.iter().cloned());
                Value::List(Arc::from(v))
            }
            (Value::Timestamp(t), Value::Duration(d))
            | (Value::Duration(d), Value::Timestamp(t)) => {
                let (extra, nanos) = normalize_nanos(t.nanos as i64 + d.nanos as i64);
                checked_timestamp(
                    t.seconds
                        .checked_add(d.seconds)
                        .and_then(|s| s.checked_add(extra)),
                    nanos,
                )
            }
            (Value::Duration(a), Value::Duration(b)) => {
                let (extra, nanos) = normalize_nanos(a.nanos as i64 + b.nanos as i64);
                checked_duration(
                    a.seconds
                        .checked_add(b.seconds)
                        .and_then(|s| s.checked_add(extra)),
                    nanos,
                )
            }
            _ => Value::error(EvalError::no_such_overload("_+_")),
        }
    }

    /// Subtraction over matching numeric types and timestamps/durations.
    pub fn subtract(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.checked_sub(*b).map(Value::Int).unwrap_or_else(
                || Value::error(EvalError::overflow("integer subtraction overflow")),
            ),
            (Value::UInt(a), Value::UInt(b)) => a.checked_sub(*b).map(Value::UInt).unwrap_or_else(
                || Value::error(EvalError::overflow("unsigned subtraction overflow")),
            ),
            (Value::Double(a), Value::Double(b)) => Value::Double(a - b),
            (Value::Timestamp(a), Value::Timestamp(b)) => {
                let (extra, nanos) = normalize_nanos(a.nanos as i64 - b.nanos as i64);
                checked_duration(
                    a.seconds
                        .checked_sub(b.seconds)
                        .and_then(|s| s.checked_add(extra)),
                    nanos,
                )
            }
            (Value::Timestamp(t), Value::Duration(d)) => {
                let (extra, nanos) = normalize_nanos(t.nanos as i64 - d.nanos as i64);
                checked_timestamp(
                    t.seconds
                        .checked_sub(d.seconds)
                        .and_then(|s| s.checked_add(extra)),
                    nanos,
                )
            }
            (Value::Duration(a), Value::Duration(b)) => {
                let (extra, nanos) = normalize_nanos(a.nanos as i64 - b.nanos as i64);
                checked_duration(
                    a.seconds
                        .checked_sub(b.seconds)
                        .and_then(|s| s.checked_add(extra)),
                    nanos,
                )
            }
            _ => Value::error(EvalError::no_such_overload("_-_")),
        }
    }

    /// Multiplication over matching numeric types.
    pub fn multiply(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.checked_mul(*b).map(Value::Int).unwrap_or_else(
                || Value::error(EvalError::overflow("integer multiplication overflow")),
            ),
            (Value::UInt(a), Value::UInt(b)) => a.checked_mul(*b).map(Value::UInt).unwrap_or_else(
                || Value::error(EvalError::overflow("unsigned multiplication overflow")),
            ),
            (Value::Double(a), Value::Double(b)) => Value::Double(a * b),
            _ => Value::error(EvalError::no_such_overload("_*_")),
        }
    }

    /// Division. Integer division by zero is an error; double division by
    /// zero follows IEEE-754 and yields ±infinity.
    pub fn divide(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(_), Value::Int(0)) => Value::error(EvalError::divide_by_zero()),
            (Value::Int(a), Value::Int(b)) => a.checked_div(*b).map(Value::Int).unwrap_or_else(
                || Value::error(EvalError::overflow("integer division overflow")),
            ),
            (Value::UInt(_), Value::UInt(0)) => Value::error(EvalError::divide_by_zero()),
            (Value::UInt(a), Value::UInt(b)) => Value::UInt(a / b),
            (Value::Double(a), Value::Double(b)) => Value::Double(a / b),
            _ => Value::error(EvalError::no_such_overload("_/_")),
        }
    }

    /// Integer remainder.
    pub fn modulo(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(_), Value::Int(0)) => Value::error(EvalError::modulus_by_zero()),
            (Value::Int(a), Value::Int(b)) => a.checked_rem(*b).map(Value::Int).unwrap_or_else(
                || Value::error(EvalError::overflow("integer modulus overflow")),
            ),
            (Value::UInt(_), Value::UInt(0)) => Value::error(EvalError::modulus_by_zero()),
            (Value::UInt(a), Value::UInt(b)) => Value::UInt(a % b),
            _ => Value::error(EvalError::no_such_overload("_%_")),
        }
    }

    /// Arithmetic or logical negation.
    pub fn negate(&self) -> Value {
        match self {
            Value::Bool(b) => Value::Bool(!b),
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .unwrap_or_else(|| Value::error(EvalError::overflow("integer negation overflow"))),
            Value::Double(d) => Value::Double(-d),
            Value::Duration(d) => {
                if d.seconds == i64::MIN {
                    Value::error(EvalError::overflow("duration negation overflow"))
                } else {
                    Value::Duration(Duration::new(-d.seconds, -d.nanos))
                }
            }
            _ => Value::error(EvalError::no_such_overload("-_")),
        }
    }
}

// ==================== Container operations ====================

impl Value {
    /// Membership test `x in self`.
    ///
    /// For lists, errors raised while comparing elements are absorbed only
    /// when a later element matches; otherwise the first error propagates.
    pub fn contains(&self, item: &Value) -> Value {
        match self {
            Value::List(list) => {
                let mut first_err: Option<Value> = None;
                for elem in list.iter() {
                    match item.equal(elem) {
                        Value::Bool(true) => return Value::Bool(true),
                        Value::Bool(false) => {}
                        other => {
                            if first_err.is_none() {
                                first_err = Some(other);
                            }
                        }
                    }
                }
                first_err.unwrap_or(Value::Bool(false))
            }
            Value::Map(map) => match MapKey::from_value(item) {
                Some(key) => Value::Bool(map.contains_key(&key)),
                None => Value::error(EvalError::no_such_overload("_in_")),
            },
            _ => Value::error(EvalError::no_such_overload("_in_")),
        }
    }

    /// `size(v)` over strings (code points), bytes, lists, and maps.
    pub fn size_of(&self) -> Value {
        match self {
            Value::String(s) => Value::Int(s.chars().count() as i64),
            Value::Bytes(b) => Value::Int(b.len() as i64),
            Value::List(l) => Value::Int(l.len() as i64),
            Value::Map(m) => Value::Int(m.len() as i64),
            _ => Value::error(EvalError::no_such_overload("size")),
        }
    }
}

// ==================== Conversions ====================

impl Value {
    /// Convert to the type named by `ty`; converting to the value's own
    /// type is the identity.
    pub fn convert_to(&self, ty: &TypeValue) -> Value {
        match ty.name.as_ref() {
            "int" => self.convert_to_int(),
            "uint" => self.convert_to_uint(),
            "double" => self.convert_to_double(),
            "string" => self.convert_to_string(),
            "bytes" => self.convert_to_bytes(),
            "bool" => self.convert_to_bool(),
            "type" => Value::Type(self.type_value()),
            "dyn" => self.clone(),
            "google.protobuf.Timestamp" | "timestamp" => self.convert_to_timestamp(),
            "google.protobuf.Duration" | "duration" => self.convert_to_duration(),
            _ => Value::error(EvalError::type_conversion(self.kind_name(), &ty.name)),
        }
    }

    /// Conversion to int.
    ///
    /// Doubles round half away from zero; results at or beyond the i64
    /// boundaries are a range error.
    pub fn convert_to_int(&self) -> Value {
        match self {
            Value::Int(i) => Value::Int(*i),
            Value::UInt(u) => {
                if *u > i64::MAX as u64 {
                    Value::error(EvalError::range(format!("uint {} out of int range", u)))
                } else {
                    Value::Int(*u as i64)
                }
            }
            Value::Double(d) => {
                let r = d.round();
                if r.is_nan() || r >= i64::MAX as f64 || r <= i64::MIN as f64 {
                    Value::error(EvalError::range(format!("double {} out of int range", d)))
                } else {
                    Value::Int(r as i64)
                }
            }
            Value::String(s) => s.parse::<i64>().map(Value::Int).unwrap_or_else(|_| {
                Value::error(EvalError::type_conversion_value("int", s.as_ref()))
            }),
            Value::Timestamp(t) => Value::Int(t.seconds),
            _ => Value::error(EvalError::type_conversion(self.kind_name(), "int")),
        }
    }

    /// Conversion to uint; negative magnitudes are a range error.
    pub fn convert_to_uint(&self) -> Value {
        match self {
            Value::UInt(u) => Value::UInt(*u),
            Value::Int(i) => {
                if *i < 0 {
                    Value::error(EvalError::range(format!("int {} out of uint range", i)))
                } else {
                    Value::UInt(*i as u64)
                }
            }
            Value::Double(d) => {
                let r = d.round();
                if r.is_nan() || r < 0.0 || r >= u64::MAX as f64 {
                    Value::error(EvalError::range(format!("double {} out of uint range", d)))
                } else {
                    Value::UInt(r as u64)
                }
            }
            Value::String(s) => s.parse::<u64>().map(Value::UInt).unwrap_or_else(|_| {
                Value::error(EvalError::type_conversion_value("uint", s.as_ref()))
            }),
            _ => Value::error(EvalError::type_conversion(self.kind_name(), "uint")),
        }
    }

    /// Conversion to double.
    pub fn convert_to_double(&self) -> Value {
        match self {
            Value::Double(d) => Value::Double(*d),
            Value::Int(i) => Value::Double(*i as f64),
            Value::UInt(u) => Value::Double(*u as f64),
            Value::String(s) => s.parse::<f64>().map(Value::Double).unwrap_or_else(|_| {
                Value::error(EvalError::type_conversion_value("double", s.as_ref()))
            }),
            _ => Value::error(EvalError::type_conversion(self.kind_name(), "double")),
        }
    }

    /// Conversion to string. Bytes must be valid UTF-8.
    pub fn convert_to_string(&self) -> Value {
        match self {
            Value::String(s) => Value::String(s.clone()),
            Value::Int(i) => Value::String(Arc::from(i.to_string())),
            Value::UInt(u) => Value::String(Arc::from(u.to_string())),
            Value::Double(d) => Value::String(Arc::from(format_double(*d))),
            Value::Bool(b) => Value::String(Arc::from(b.to_string())),
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => Value::String(Arc::from(s)),
                Err(_) => Value::error(EvalError::type_conversion("bytes", "string")),
            },
            Value::Timestamp(t) => Value::String(Arc::from(time::format_timestamp(t))),
            Value::Duration(d) => Value::String(Arc::from(time::format_duration(d))),
            _ => Value::error(EvalError::type_conversion(self.kind_name(), "string")),
        }
    }

    /// Conversion to bytes.
    pub fn convert_to_bytes(&self) -> Value {
        match self {
            Value::Bytes(b) => Value::Bytes(b.clone()),
            Value::String(s) => Value::Bytes(Arc::from(s.as_bytes())),
            _ => Value::error(EvalError::type_conversion(self.kind_name(), "bytes")),
        }
    }

    /// Conversion to bool; only the exact strings "true"/"false" convert.
    pub fn convert_to_bool(&self) -> Value {
        match self {
            Value::Bool(b) => Value::Bool(*b),
            Value::String(s) => match s.as_ref() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::error(EvalError::type_conversion_value("bool", s.as_ref())),
            },
            _ => Value::error(EvalError::type_conversion(self.kind_name(), "bool")),
        }
    }

    /// Conversion to timestamp from RFC 3339 strings or epoch seconds.
    pub fn convert_to_timestamp(&self) -> Value {
        match self {
            Value::Timestamp(t) => Value::Timestamp(*t),
            Value::String(s) => match time::parse_timestamp(s) {
                Ok(ts) => Value::Timestamp(ts),
                Err(e) => Value::error(EvalError::invalid_argument(e)),
            },
            Value::Int(i) => {
                let ts = Timestamp::from_seconds(*i);
                if ts.is_valid() {
                    Value::Timestamp(ts)
                } else {
                    Value::error(EvalError::range(
                        "timestamp out of range: must be between year 0001 and 9999",
                    ))
                }
            }
            _ => Value::error(EvalError::type_conversion(self.kind_name(), "timestamp")),
        }
    }

    /// Conversion to duration from duration strings or whole seconds.
    pub fn convert_to_duration(&self) -> Value {
        match self {
            Value::Duration(d) => Value::Duration(*d),
            Value::String(s) => match time::parse_duration(s) {
                Ok(d) => Value::Duration(d),
                Err(e) => Value::error(EvalError::invalid_argument(e)),
            },
            Value::Int(i) => {
                let d = Duration::from_seconds(*i);
                if d.is_valid() {
                    Value::Duration(d)
                } else {
                    Value::error(EvalError::range(
                        "duration out of range: must be within approximately 10000 years",
                    ))
                }
            }
            _ => Value::error(EvalError::type_conversion(self.kind_name(), "duration")),
        }
    }
}

impl EvalError {
    // Conversion failures where the type is convertible but the payload is
    // not, e.g. int("11l").
    fn type_conversion_value(to: &str, value: &str) -> Self {
        Self::new(
            EvalErrorKind::TypeConversion,
            format!("cannot convert '{}' to {}", value, to),
        )
    }
}

/// Format a double the way CEL prints it.
fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d.is_sign_positive() {
            "+infinity".to_string()
        } else {
            "-infinity".to_string()
        }
    } else if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{:.1}", d)
    } else {
        d.to_string()
    }
}

// ==================== Display ====================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}u", v),
            Value::Double(v) => write!(f, "{}", format_double(*v)),
            Value::String(v) => write!(f, "\"{}\"", v),
            Value::Bytes(v) => write!(f, "b\"{}\"", String::from_utf8_lossy(v)),
            Value::List(v) => {
                write!(f, "[")?;
                for (i, elem) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (key, value)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Timestamp(t) => write!(f, "timestamp({})", time::format_timestamp(t)),
            Value::Duration(d) => write!(f, "duration({})", time::format_duration(d)),
            Value::Type(t) => write!(f, "{}", t.name),
            Value::Message(m) => write!(f, "{}{{...}}", m.type_name()),
            Value::Error(e) => write!(f, "error({})", e),
            Value::Unknown(u) => write!(f, "unknown({:?})", u.ids()),
        }
    }
}
