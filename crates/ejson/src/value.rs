//! The application-side value tree and the `Codable` trait for user types.

use std::fmt;

use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::object_id::ObjectId;

/// Raw regexp flag strings longer than this are truncated before filtering.
pub(crate) const MAX_RAW_FLAGS: usize = 50;

/// A user type the engine can carry through the wire format.
///
/// Implementors surface a stable `type_name` (the registry key) and a plain
/// JSON projection of their state. Decoding goes through the factory
/// registered under the same name.
pub trait Codable: fmt::Debug + Send + Sync {
    /// Registry key; must match the name passed to `add_type`.
    fn type_name(&self) -> &str;

    /// JSON-Value projection of the value's state.
    fn to_wire(&self) -> Value;

    fn boxed_clone(&self) -> Box<dyn Codable>;
}

impl Clone for Box<dyn Codable> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// A value the EJSON codec can encode and decode.
///
/// `Integer` and `Float` both come from JSON numbers; `Float` is the only
/// variant that can hold `NaN` and the infinities (which travel as
/// `{"$InfNaN": ...}` wrappers). Object key insertion order is preserved and
/// is significant for non-canonical round trips.
#[derive(Debug, Clone)]
pub enum EjsonValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    Array(Vec<EjsonValue>),
    Object(IndexMap<String, EjsonValue>),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    /// Source pattern plus a sanitized flag set drawn from `gimuy`.
    RegExp { source: String, flags: String },
    /// An owned byte sequence of any length.
    Binary(Vec<u8>),
    ObjectId(ObjectId),
    /// A user-registered value; equality compares wire projections.
    Custom(Box<dyn Codable>),
}

impl EjsonValue {
    pub fn is_null(&self) -> bool {
        matches!(self, EjsonValue::Null)
    }
}

impl PartialEq for EjsonValue {
    fn eq(&self, other: &Self) -> bool {
        crate::convert::equals(self, other, &crate::convert::EqualsOptions::default())
    }
}

impl From<bool> for EjsonValue {
    fn from(b: bool) -> Self {
        EjsonValue::Bool(b)
    }
}

impl From<i64> for EjsonValue {
    fn from(i: i64) -> Self {
        EjsonValue::Integer(i)
    }
}

impl From<f64> for EjsonValue {
    fn from(f: f64) -> Self {
        EjsonValue::Float(f)
    }
}

impl From<&str> for EjsonValue {
    fn from(s: &str) -> Self {
        EjsonValue::Str(s.to_owned())
    }
}

impl From<String> for EjsonValue {
    fn from(s: String) -> Self {
        EjsonValue::Str(s)
    }
}

/// True iff the value is a byte sequence.
pub fn is_binary(value: &EjsonValue) -> bool {
    matches!(value, EjsonValue::Binary(_))
}

/// Reduce a raw flag string to the `gimuy` whitelist: truncate to
/// [`MAX_RAW_FLAGS`] chars, drop everything outside the whitelist, drop
/// duplicates while keeping first-seen order. Untrusted input cannot smuggle
/// arbitrarily long or repeated flags into pattern construction.
pub fn sanitize_regexp_flags(raw: &str) -> String {
    let mut out = String::new();
    for c in raw.chars().take(MAX_RAW_FLAGS) {
        if matches!(c, 'g' | 'i' | 'm' | 'u' | 'y') && !out.contains(c) {
            out.push(c);
        }
    }
    out
}

/// Compile a matcher from a `RegExp` value's source and flags.
///
/// `i` and `m` map to the builder's case-insensitive and multi-line modes and
/// `u` to explicit unicode mode; `g` and `y` describe host-side matching
/// behavior and carry no compile-time meaning here.
pub fn build_regex(source: &str, flags: &str) -> Result<Regex, regex::Error> {
    let mut builder = RegexBuilder::new(source);
    builder.case_insensitive(flags.contains('i'));
    builder.multi_line(flags.contains('m'));
    if flags.contains('u') {
        builder.unicode(true);
    }
    builder.build()
}
