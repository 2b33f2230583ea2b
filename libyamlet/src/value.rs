//! YAML value representation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;

use base64::prelude::*;
use chrono::NaiveDate;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::mapping::Mapping;

/// A YAML value.
///
/// Anchored nodes live in the owning [`Document`](crate::Document)'s anchor
/// table and appear in the tree as [`Value::Shared`] handles, both where the
/// anchor is defined and wherever it is aliased.
#[derive(Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Arbitrary-precision integer.
    Integer(BigInt),
    /// 64-bit floating-point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes, written as `!binary` base64.
    Binary(Vec<u8>),
    /// Calendar date without time of day.
    Date(NaiveDate),
    /// Ordered list of values.
    Sequence(Vec<Value>),
    /// Ordered mapping with unique keys.
    Mapping(Mapping),
    /// A value under a tag the resolver does not specialize.
    Tagged(Box<TaggedValue>),
    /// Handle to a node in the document's anchor table.
    Shared(AnchorId),
}

/// An explicit tag, stored without its leading `!`.
///
/// `!semver` is stored as `semver`, `!!str` as `!str`, the non-specific
/// `!` as the empty string, and `!<uri>` as `<uri>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    /// Create a tag from its name as written after the first `!`.
    pub fn new(name: impl Into<String>) -> Self {
        Tag(name.into())
    }

    /// The tag name without its leading `!`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{}", self.0)
    }
}

/// A tag together with the value it decorates.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaggedValue {
    pub tag: Tag,
    pub value: Value,
}

impl TaggedValue {
    /// Decode the payload of a `!binary` value.
    ///
    /// Returns `None` for other tags or a payload that is not base64.
    pub fn decode_binary(&self) -> Option<Vec<u8>> {
        if !matches!(self.tag.as_str(), "binary" | "!binary") {
            return None;
        }
        let text = self.value.as_str()?;
        let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        BASE64_STANDARD.decode(clean).ok()
    }
}

/// Index of a shared node in a document's anchor table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(pub(crate) usize);

impl AnchorId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    /// Build a date value, or `None` if the date does not exist.
    pub fn date(year: i32, month: u32, day: u32) -> Option<Value> {
        NaiveDate::from_ymd_opt(year, month, day).map(Value::Date)
    }

    /// Wrap a value in a tag.
    pub fn tagged(tag: impl Into<String>, value: Value) -> Value {
        Value::Tagged(Box::new(TaggedValue {
            tag: Tag::new(tag),
            value,
        }))
    }

    /// Returns `true` if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns a reference to the integer if this is an `Integer`.
    pub fn as_integer(&self) -> Option<&BigInt> {
        match self {
            Value::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the integer if it is an `Integer` that fits in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(ToPrimitive::to_i64)
    }

    /// Returns the float value if this is a `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns a reference to the items if this is a `Sequence`.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Returns a reference to the mapping if this is a `Mapping`.
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_tagged(&self) -> Option<&TaggedValue> {
        match self {
            Value::Tagged(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_shared(&self) -> Option<AnchorId> {
        match self {
            Value::Shared(id) => Some(*id),
            _ => None,
        }
    }

    /// Look up a string key if this is a mapping.
    ///
    /// Shared handles are returned as they are; use
    /// [`Document::resolve`](crate::Document::resolve) to follow them.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_mapping()?.get_str(key)
    }

    /// Short name of the variant, used in messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Date(_) => "date",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
            Value::Tagged(_) => "tagged value",
            Value::Shared(_) => "alias",
        }
    }
}

/// NaN equals NaN here, so values can serve as mapping keys.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (Value::Mapping(a), Value::Mapping(b)) => a == b,
            (Value::Tagged(a), Value::Tagged(b)) => a == b,
            (Value::Shared(a), Value::Shared(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Integer(n) => n.hash(state),
            Value::Float(f) => float_key_bits(*f).hash(state),
            Value::String(s) => s.hash(state),
            Value::Binary(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Sequence(items) => items.hash(state),
            Value::Mapping(map) => map.hash(state),
            Value::Tagged(t) => t.hash(state),
            Value::Shared(id) => id.hash(state),
        }
    }
}

/// Bit pattern consistent with `PartialEq`: one zero, one NaN.
fn float_key_bits(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0
    } else {
        f.to_bits()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => {
                if n.is_nan() {
                    write!(f, "NaN")
                } else if n.is_infinite() {
                    if *n > 0.0 {
                        write!(f, "Infinity")
                    } else {
                        write!(f, "-Infinity")
                    }
                } else {
                    write!(f, "{:?}", n)
                }
            }
            Value::String(s) => write!(f, "{:?}", s),
            Value::Binary(b) => {
                write!(f, "<")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, ">")
            }
            Value::Date(d) => write!(f, "{}", d),
            Value::Sequence(items) => f.debug_list().entries(items).finish(),
            Value::Mapping(map) => fmt::Debug::fmt(map, f),
            Value::Tagged(t) => {
                write!(f, "{} ", t.tag)?;
                fmt::Debug::fmt(&t.value, f)
            }
            Value::Shared(id) => write!(f, "*#{}", id.0),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::Integer(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(BigInt::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(BigInt::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

impl From<Mapping> for Value {
    fn from(map: Mapping) -> Self {
        Value::Mapping(map)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}
