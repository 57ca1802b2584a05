//! Recursive tree conversion between application values and wire trees,
//! plus the engine's equality semantics.

use serde_json::{Map, Value};

use crate::error::EjsonError;
use crate::registry::TypeRegistry;
use crate::value::EjsonValue;
use crate::wire;

/// Nesting depth at which conversion gives up with `CircularStructure`
/// instead of blowing the stack.
pub(crate) const MAX_DEPTH: usize = 512;

/// Options for [`equals`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualsOptions {
    /// When set, objects must also agree on key order, not just key sets.
    pub key_order_sensitive: bool,
}

/// Convert an application value tree into a JSON-compatible wire tree.
///
/// The input is only borrowed; the caller's tree is never mutated.
pub fn to_json_value(value: &EjsonValue) -> Result<Value, EjsonError> {
    encode_at(value, 0)
}

fn encode_at(value: &EjsonValue, depth: usize) -> Result<Value, EjsonError> {
    if depth > MAX_DEPTH {
        return Err(EjsonError::CircularStructure);
    }
    if let Some(node) = wire::to_wire_node(value, &mut |child| encode_at(child, depth + 1)) {
        return node;
    }
    match value {
        EjsonValue::Null => Ok(Value::Null),
        EjsonValue::Bool(b) => Ok(Value::Bool(*b)),
        EjsonValue::Integer(i) => Ok(Value::from(*i)),
        EjsonValue::Float(f) => Ok(serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        EjsonValue::Str(s) => Ok(Value::String(s.clone())),
        EjsonValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(encode_at(item, depth + 1)?);
            }
            Ok(Value::Array(out))
        }
        EjsonValue::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                out.insert(key.clone(), encode_at(item, depth + 1)?);
            }
            Ok(Value::Object(out))
        }
        EjsonValue::Date(_)
        | EjsonValue::RegExp { .. }
        | EjsonValue::Binary(_)
        | EjsonValue::ObjectId(_)
        | EjsonValue::Custom(_) => unreachable!("claimed by to_wire_node"),
    }
}

/// Convert a wire tree back into an application value tree.
pub fn from_json_value(wire: &Value, registry: &TypeRegistry) -> Result<EjsonValue, EjsonError> {
    decode_at(wire, registry, 0)
}

fn decode_at(
    wire: &Value,
    registry: &TypeRegistry,
    depth: usize,
) -> Result<EjsonValue, EjsonError> {
    if depth > MAX_DEPTH {
        return Err(EjsonError::CircularStructure);
    }
    if let Some(node) =
        wire::from_wire_node(wire, registry, &mut |child| decode_at(child, registry, depth + 1))
    {
        return node;
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
                out.push(decode_at(item, registry, depth + 1)?);
            }
            Ok(EjsonValue::Array(out))
        }
        Value::Object(map) => {
            let mut out = indexmap::IndexMap::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), decode_at(item, registry, depth + 1)?);
            }
            Ok(EjsonValue::Object(out))
        }
    }
}

/// Deep equality over application values.
///
/// `NaN` equals `NaN`; integers and floats compare numerically across
/// variants; dates compare by instant; binaries byte-for-byte; two custom
/// values compare by type name and wire projection, and a custom value never
/// equals a non-custom one. Object comparison ignores key order unless
/// `key_order_sensitive` is set.
pub fn equals(a: &EjsonValue, b: &EjsonValue, opts: &EqualsOptions) -> bool {
    match (a, b) {
        (EjsonValue::Null, EjsonValue::Null) => true,
        (EjsonValue::Bool(x), EjsonValue::Bool(y)) => x == y,
        (EjsonValue::Integer(x), EjsonValue::Integer(y)) => x == y,
        (EjsonValue::Float(x), EjsonValue::Float(y)) => {
            (x.is_nan() && y.is_nan()) || x == y
        }
        (EjsonValue::Integer(x), EjsonValue::Float(y))
        | (EjsonValue::Float(y), EjsonValue::Integer(x)) => *x as f64 == *y,
        (EjsonValue::Str(x), EjsonValue::Str(y)) => x == y,
        (EjsonValue::Date(x), EjsonValue::Date(y)) => x == y,
        (
            EjsonValue::RegExp { source: xs, flags: xf },
            EjsonValue::RegExp { source: ys, flags: yf },
        ) => xs == ys && xf == yf,
        (EjsonValue::Binary(x), EjsonValue::Binary(y)) => x == y,
        (EjsonValue::ObjectId(x), EjsonValue::ObjectId(y)) => x == y,
        (EjsonValue::Custom(x), EjsonValue::Custom(y)) => {
            x.type_name() == y.type_name() && x.to_wire() == y.to_wire()
        }
        (EjsonValue::Array(xs), EjsonValue::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| equals(x, y, opts))
        }
        (EjsonValue::Object(xm), EjsonValue::Object(ym)) => {
            if xm.len() != ym.len() {
                return false;
            }
            if opts.key_order_sensitive {
                xm.iter()
                    .zip(ym.iter())
                    .all(|((xk, xv), (yk, yv))| xk == yk && equals(xv, yv, opts))
            } else {
                xm.iter()
                    .all(|(k, xv)| ym.get(k).map_or(false, |yv| equals(xv, yv, opts)))
            }
        }
        _ => false,
    }
}
