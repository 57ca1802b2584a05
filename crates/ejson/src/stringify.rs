//! Text emission and parsing.
//!
//! Two paths produce the same bytes for the same value:
//!
//! - the default path (`stringify` without options, `parse`) runs a
//!   single-pass replacer/reviver with every wire shape inlined;
//! - the canonical path handles `canonical` (sorted keys) and `indent`
//!   requests by walking the wire tree produced by the generic converter.
//!
//! The host JSON text layer is `serde_json`; this module never tokenizes
//! JSON text itself.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::convert::{self, MAX_DEPTH};
use crate::error::EjsonError;
use crate::object_id::ObjectId;
use crate::registry::TypeRegistry;
use crate::value::{sanitize_regexp_flags, EjsonValue};
use crate::wire;

/// Options for [`stringify`].
#[derive(Debug, Clone, Default)]
pub struct StringifyOptions {
    /// Sort object keys lexicographically at every level.
    pub canonical: bool,
    /// Pretty-print with the given indent unit per nesting level.
    pub indent: Option<Indent>,
}

/// Indentation unit for pretty-printed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indent {
    Spaces(usize),
    Text(String),
}

impl Default for Indent {
    /// Two spaces, the conventional indent.
    fn default() -> Self {
        Indent::Spaces(2)
    }
}

impl Indent {
    fn unit(&self) -> String {
        match self {
            Indent::Spaces(n) => " ".repeat(*n),
            Indent::Text(s) => s.clone(),
        }
    }
}

/// Serialize a value to EJSON text.
pub fn stringify(value: &EjsonValue, opts: &StringifyOptions) -> Result<String, EjsonError> {
    if !opts.canonical && opts.indent.is_none() {
        return Ok(replace(value)?.to_string());
    }
    let wire = convert::to_json_value(value)?;
    let unit = opts.indent.as_ref().map(Indent::unit);
    let mut out = String::new();
    write_wire(&wire, opts.canonical, unit.as_deref(), 0, &mut out);
    Ok(out)
}

/// Parse EJSON text into a value.
pub fn parse(text: &str, registry: &TypeRegistry) -> Result<EjsonValue, EjsonError> {
    let wire: Value = serde_json::from_str(text)?;
    revive(&wire, registry)
}

// ----------------------------------------------------------------
// Canonical / indented writer

fn write_wire(wire: &Value, canonical: bool, indent: Option<&str>, level: usize, out: &mut String) {
    match wire {
        Value::Array(items) => write_array(items, canonical, indent, level, out),
        Value::Object(map) => write_object(map, canonical, indent, level, out),
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_array(
    items: &[Value],
    canonical: bool,
    indent: Option<&str>,
    level: usize,
    out: &mut String,
) {
    if items.is_empty() {
        out.push_str("[]");
        return;
    }
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_break(indent, level + 1, out);
        write_wire(item, canonical, indent, level + 1, out);
    }
    push_break(indent, level, out);
    out.push(']');
}

fn write_object(
    map: &Map<String, Value>,
    canonical: bool,
    indent: Option<&str>,
    level: usize,
    out: &mut String,
) {
    if map.is_empty() {
        out.push_str("{}");
        return;
    }
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    if canonical {
        keys.sort_unstable();
    }
    out.push('{');
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_break(indent, level + 1, out);
        out.push_str(&Value::String((*key).to_owned()).to_string());
        out.push(':');
        if indent.is_some() {
            out.push(' ');
        }
        write_wire(&map[*key], canonical, indent, level + 1, out);
    }
    push_break(indent, level, out);
    out.push('}');
}

fn push_break(indent: Option<&str>, level: usize, out: &mut String) {
    if let Some(unit) = indent {
        out.push('\n');
        for _ in 0..level {
            out.push_str(unit);
        }
    }
}

// ----------------------------------------------------------------
// Fast hot-path replacer (value tree -> wire tree, shapes inlined)

pub(crate) fn replace(value: &EjsonValue) -> Result<Value, EjsonError> {
    replace_at(value, 0)
}

fn replace_at(value: &EjsonValue, depth: usize) -> Result<Value, EjsonError> {
    if depth > MAX_DEPTH {
        return Err(EjsonError::CircularStructure);
    }
    match value {
        EjsonValue::Null => Ok(Value::Null),
        EjsonValue::Bool(b) => Ok(Value::Bool(*b)),
        EjsonValue::Integer(i) => Ok(Value::from(*i)),
        EjsonValue::Float(f) if f.is_finite() => Ok(serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        EjsonValue::Float(f) => Ok(wrap("$InfNaN", Value::from(wire::inf_nan_sign(*f)))),
        EjsonValue::Str(s) => Ok(Value::String(s.clone())),
        EjsonValue::Date(ms) => Ok(wrap("$date", Value::from(*ms))),
        EjsonValue::RegExp { source, flags } => {
            let mut obj = Map::new();
            obj.insert("$regexp".to_owned(), Value::String(source.clone()));
            obj.insert("$flags".to_owned(), Value::String(flags.clone()));
            Ok(Value::Object(obj))
        }
        EjsonValue::Binary(data) => {
            Ok(wrap("$binary", Value::String(wire::encode_base64(data))))
        }
        EjsonValue::ObjectId(id) => Ok(wrap("$objectId", Value::String(id.to_hex()))),
        EjsonValue::Custom(c) => {
            let mut obj = Map::new();
            obj.insert("$type".to_owned(), Value::String(c.type_name().to_owned()));
            obj.insert("$value".to_owned(), c.to_wire());
            Ok(Value::Object(obj))
        }
        EjsonValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(replace_at(item, depth + 1)?);
            }
            Ok(Value::Array(out))
        }
        EjsonValue::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                out.insert(key.clone(), replace_at(item, depth + 1)?);
            }
            let ambiguous =
                (1..=2).contains(&map.len()) && map.keys().all(|k| k.starts_with('$'));
            if ambiguous {
                Ok(wrap("$escape", Value::Object(out)))
            } else {
                Ok(Value::Object(out))
            }
        }
    }
}

fn wrap(key: &str, value: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(key.to_owned(), value);
    Value::Object(obj)
}

// ----------------------------------------------------------------
// Fast hot-path reviver (wire tree -> value tree, shapes inlined)

pub(crate) fn revive(wire: &Value, registry: &TypeRegistry) -> Result<EjsonValue, EjsonError> {
    revive_at(wire, registry, 0)
}

fn revive_at(
    wire: &Value,
    registry: &TypeRegistry,
    depth: usize,
) -> Result<EjsonValue, EjsonError> {
    if depth > MAX_DEPTH {
        return Err(EjsonError::CircularStructure);
    }
    match wire {
        Value::Null => Ok(EjsonValue::Null),
        Value::Bool(b) => Ok(EjsonValue::Bool(*b)),
        Value::Number(n) => Ok(match n.as_i64() {
            Some(i) => EjsonValue::Integer(i),
            None => EjsonValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        Value::String(s) => Ok(EjsonValue::Str(s.clone())),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(revive_at(item, registry, depth + 1)?);
            }
            Ok(EjsonValue::Array(out))
        }
        Value::Object(map) => revive_object(map, registry, depth),
    }
}

fn revive_object(
    map: &Map<String, Value>,
    registry: &TypeRegistry,
    depth: usize,
) -> Result<EjsonValue, EjsonError> {
    match map.len() {
        1 => {
            if let Some(v) = map.get("$objectId") {
                let hex = v
                    .as_str()
                    .ok_or(EjsonError::MalformedWireValue("$objectId"))?;
                return Ok(EjsonValue::ObjectId(ObjectId::from_hex(hex)?));
            }
            if let Some(v) = map.get("$date") {
                let ms = if let Some(i) = v.as_i64() {
                    i
                } else if let Some(f) = v.as_f64() {
                    f as i64
                } else {
                    return Err(EjsonError::MalformedWireValue("$date"));
                };
                return Ok(EjsonValue::Date(ms));
            }
            if let Some(v) = map.get("$InfNaN") {
                let sign = v.as_f64().ok_or(EjsonError::MalformedWireValue("$InfNaN"))?;
                return Ok(EjsonValue::Float(sign / 0.0));
            }
            if let Some(v) = map.get("$binary") {
                let b64 = v.as_str().ok_or(EjsonError::MalformedWireValue("$binary"))?;
                return wire::decode_base64(b64);
            }
            if let Some(v) = map.get("$escape") {
                let inner = v
                    .as_object()
                    .ok_or(EjsonError::MalformedWireValue("$escape"))?;
                let mut out = IndexMap::with_capacity(inner.len());
                for (key, item) in inner {
                    out.insert(key.clone(), revive_at(item, registry, depth + 1)?);
                }
                return Ok(EjsonValue::Object(out));
            }
        }
        2 => {
            if let (Some(source), Some(flags)) = (map.get("$regexp"), map.get("$flags")) {
                let source = source
                    .as_str()
                    .ok_or(EjsonError::MalformedWireValue("$regexp"))?;
                let flags = flags
                    .as_str()
                    .ok_or(EjsonError::MalformedWireValue("$flags"))?;
                return Ok(EjsonValue::RegExp {
                    source: source.to_owned(),
                    flags: sanitize_regexp_flags(flags),
                });
            }
            if let (Some(name), Some(value)) = (map.get("$type"), map.get("$value")) {
                let name = name.as_str().ok_or(EjsonError::MalformedWireValue("$type"))?;
                return wire::decode_custom(name, value, registry);
            }
        }
        _ => {}
    }
    let mut out = IndexMap::with_capacity(map.len());
    for (key, item) in map {
        out.insert(key.clone(), revive_at(item, registry, depth + 1)?);
    }
    Ok(EjsonValue::Object(out))
}
