//! Reserved `$` wire shapes and the single dispatch over them.
//!
//! Every extended value travels as a one- or two-key wrapper object:
//!
//! | Shape | Meaning |
//! |---|---|
//! | `{"$date": ms}` | Date instant |
//! | `{"$regexp": src, "$flags": f}` | Regular expression |
//! | `{"$objectId": hex24}` | 12-byte identifier |
//! | `{"$binary": base64}` | Byte sequence |
//! | `{"$InfNaN": -1\|0\|1}` | -Infinity / NaN / +Infinity |
//! | `{"$escape": obj}` | Plain object that looked reserved |
//! | `{"$type": name, "$value": wire}` | Custom registered type |
//!
//! Any plain object with 1–2 keys all beginning with `$` is presumed to be a
//! wire value by the decoder, so the encoder must wrap such user data in
//! `$escape` before emitting it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::error::EjsonError;
use crate::object_id::ObjectId;
use crate::registry::TypeRegistry;
use crate::value::{sanitize_regexp_flags, EjsonValue};

/// The closed set of reserved wire shapes, in dispatch priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    ObjectId,
    Date,
    RegExp,
    InfNaN,
    Binary,
    Custom,
    Escape,
}

/// Classify a wire tree node by its exact reserved key set.
///
/// Returns `None` for everything that is not a wrapper — including
/// unrecognized `$`-shaped objects, which pass through as plain data.
pub fn wire_kind(wire: &Value) -> Option<WireKind> {
    let obj = wire.as_object()?;
    match obj.len() {
        1 if obj.contains_key("$objectId") => Some(WireKind::ObjectId),
        1 if obj.contains_key("$date") => Some(WireKind::Date),
        2 if obj.contains_key("$regexp") && obj.contains_key("$flags") => Some(WireKind::RegExp),
        1 if obj.contains_key("$InfNaN") => Some(WireKind::InfNaN),
        1 if obj.contains_key("$binary") => Some(WireKind::Binary),
        2 if obj.contains_key("$type") && obj.contains_key("$value") => Some(WireKind::Custom),
        1 if obj.contains_key("$escape") => Some(WireKind::Escape),
        _ => None,
    }
}

/// True iff a plain object would be mistaken for a wire value and must be
/// wrapped in `$escape`: 1–2 keys, all beginning with `$`.
pub(crate) fn needs_escape(map: &IndexMap<String, EjsonValue>) -> bool {
    (1..=2).contains(&map.len()) && map.keys().all(|k| k.starts_with('$'))
}

pub(crate) fn inf_nan_sign(f: f64) -> i64 {
    if f.is_nan() {
        0
    } else if f > 0.0 {
        1
    } else {
        -1
    }
}

/// Encode one node if any wire shape claims it.
///
/// `None` means the caller owns the node: a scalar emitted as-is or a plain
/// compound to recurse into. `encode_child` is called for the members of an
/// escaped object.
pub fn to_wire_node(
    value: &EjsonValue,
    encode_child: &mut dyn FnMut(&EjsonValue) -> Result<Value, EjsonError>,
) -> Option<Result<Value, EjsonError>> {
    match value {
        EjsonValue::ObjectId(id) => Some(Ok(json!({ "$objectId": id.to_hex() }))),
        EjsonValue::Date(ms) => Some(Ok(json!({ "$date": ms }))),
        EjsonValue::RegExp { source, flags } => {
            Some(Ok(json!({ "$regexp": source, "$flags": flags })))
        }
        EjsonValue::Float(f) if !f.is_finite() => {
            Some(Ok(json!({ "$InfNaN": inf_nan_sign(*f) })))
        }
        EjsonValue::Binary(data) => Some(Ok(json!({ "$binary": BASE64.encode(data) }))),
        EjsonValue::Custom(c) => {
            Some(Ok(json!({ "$type": c.type_name(), "$value": c.to_wire() })))
        }
        EjsonValue::Object(map) if needs_escape(map) => Some(escape_object(map, encode_child)),
        _ => None,
    }
}

fn escape_object(
    map: &IndexMap<String, EjsonValue>,
    encode_child: &mut dyn FnMut(&EjsonValue) -> Result<Value, EjsonError>,
) -> Result<Value, EjsonError> {
    let mut inner = Map::new();
    for (key, value) in map {
        inner.insert(key.clone(), encode_child(value)?);
    }
    Ok(json!({ "$escape": inner }))
}

/// Decode one node if any wire shape claims it.
///
/// `None` means the node is plain data. `decode_child` is called for the
/// members of an escaped object.
pub fn from_wire_node(
    wire: &Value,
    registry: &TypeRegistry,
    decode_child: &mut dyn FnMut(&Value) -> Result<EjsonValue, EjsonError>,
) -> Option<Result<EjsonValue, EjsonError>> {
    let kind = wire_kind(wire)?;
    let obj = wire.as_object()?;
    Some(decode_kind(kind, obj, registry, decode_child))
}

fn decode_kind(
    kind: WireKind,
    obj: &Map<String, Value>,
    registry: &TypeRegistry,
    decode_child: &mut dyn FnMut(&Value) -> Result<EjsonValue, EjsonError>,
) -> Result<EjsonValue, EjsonError> {
    match kind {
        WireKind::ObjectId => {
            let hex = obj
                .get("$objectId")
                .and_then(Value::as_str)
                .ok_or(EjsonError::MalformedWireValue("$objectId"))?;
            Ok(EjsonValue::ObjectId(ObjectId::from_hex(hex)?))
        }
        WireKind::Date => {
            let ms = obj
                .get("$date")
                .and_then(as_epoch_ms)
                .ok_or(EjsonError::MalformedWireValue("$date"))?;
            Ok(EjsonValue::Date(ms))
        }
        WireKind::RegExp => {
            let source = obj
                .get("$regexp")
                .and_then(Value::as_str)
                .ok_or(EjsonError::MalformedWireValue("$regexp"))?;
            let flags = obj
                .get("$flags")
                .and_then(Value::as_str)
                .ok_or(EjsonError::MalformedWireValue("$flags"))?;
            Ok(EjsonValue::RegExp {
                source: source.to_owned(),
                flags: sanitize_regexp_flags(flags),
            })
        }
        WireKind::InfNaN => {
            let sign = obj
                .get("$InfNaN")
                .and_then(Value::as_f64)
                .ok_or(EjsonError::MalformedWireValue("$InfNaN"))?;
            // 0/0 is NaN, 1/0 is +Inf, -1/0 is -Inf.
            Ok(EjsonValue::Float(sign / 0.0))
        }
        WireKind::Binary => {
            let b64 = obj
                .get("$binary")
                .and_then(Value::as_str)
                .ok_or(EjsonError::MalformedWireValue("$binary"))?;
            decode_base64(b64)
        }
        WireKind::Custom => {
            let name = obj
                .get("$type")
                .and_then(Value::as_str)
                .ok_or(EjsonError::MalformedWireValue("$type"))?;
            let value = obj.get("$value").unwrap_or(&Value::Null);
            decode_custom(name, value, registry)
        }
        WireKind::Escape => {
            let inner = obj
                .get("$escape")
                .and_then(Value::as_object)
                .ok_or(EjsonError::MalformedWireValue("$escape"))?;
            let mut out = IndexMap::with_capacity(inner.len());
            for (key, value) in inner {
                out.insert(key.clone(), decode_child(value)?);
            }
            Ok(EjsonValue::Object(out))
        }
    }
}

fn as_epoch_ms(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        Some(i)
    } else {
        value.as_f64().map(|f| f as i64)
    }
}

pub(crate) fn decode_base64(b64: &str) -> Result<EjsonValue, EjsonError> {
    BASE64
        .decode(b64)
        .map(EjsonValue::Binary)
        .map_err(|e| EjsonError::InvalidBinary(e.to_string()))
}

pub(crate) fn decode_custom(
    name: &str,
    value: &Value,
    registry: &TypeRegistry,
) -> Result<EjsonValue, EjsonError> {
    let factory = registry
        .get(name)
        .ok_or_else(|| EjsonError::UnregisteredCustomType(name.to_owned()))?;
    Ok(EjsonValue::Custom(factory(value)?))
}

/// Base64 form of a byte sequence, as carried by `$binary` and by binary
/// batch columns.
pub(crate) fn encode_base64(data: &[u8]) -> String {
    BASE64.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_kind_matrix() {
        assert_eq!(
            wire_kind(&json!({"$objectId": "507f1f77bcf86cd799439011"})),
            Some(WireKind::ObjectId)
        );
        assert_eq!(wire_kind(&json!({"$date": 0})), Some(WireKind::Date));
        assert_eq!(
            wire_kind(&json!({"$regexp": "a", "$flags": "g"})),
            Some(WireKind::RegExp)
        );
        assert_eq!(wire_kind(&json!({"$InfNaN": 1})), Some(WireKind::InfNaN));
        assert_eq!(wire_kind(&json!({"$binary": "AQ=="})), Some(WireKind::Binary));
        assert_eq!(
            wire_kind(&json!({"$type": "t", "$value": null})),
            Some(WireKind::Custom)
        );
        assert_eq!(wire_kind(&json!({"$escape": {}})), Some(WireKind::Escape));
    }

    #[test]
    fn unrecognized_shapes_are_plain_data() {
        assert_eq!(wire_kind(&json!({"$foo": 1})), None);
        assert_eq!(wire_kind(&json!({"$date": 0, "$extra": 1})), None);
        assert_eq!(wire_kind(&json!({"date": 0})), None);
        assert_eq!(wire_kind(&json!({"$regexp": "a"})), None);
        assert_eq!(wire_kind(&json!([1, 2])), None);
        assert_eq!(wire_kind(&json!(3)), None);
    }

    #[test]
    fn escape_predicate() {
        let mut one = IndexMap::new();
        one.insert("$date".to_owned(), EjsonValue::Integer(5));
        assert!(needs_escape(&one));

        let mut two = IndexMap::new();
        two.insert("$a".to_owned(), EjsonValue::Null);
        two.insert("$b".to_owned(), EjsonValue::Null);
        assert!(needs_escape(&two));

        let mut mixed = IndexMap::new();
        mixed.insert("$a".to_owned(), EjsonValue::Null);
        mixed.insert("b".to_owned(), EjsonValue::Null);
        assert!(!needs_escape(&mixed));

        assert!(!needs_escape(&IndexMap::new()));

        let mut three = IndexMap::new();
        three.insert("$a".to_owned(), EjsonValue::Null);
        three.insert("$b".to_owned(), EjsonValue::Null);
        three.insert("$c".to_owned(), EjsonValue::Null);
        assert!(!needs_escape(&three));
    }

    #[test]
    fn inf_nan_signs() {
        assert_eq!(inf_nan_sign(f64::NAN), 0);
        assert_eq!(inf_nan_sign(f64::INFINITY), 1);
        assert_eq!(inf_nan_sign(f64::NEG_INFINITY), -1);
    }
}
