//! Batch decoding: envelope validation, per-column reconstruction, and the
//! two-cursor walk over packed columns.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::EjsonError;
use crate::object_id::{from_hex, ObjectId, OBJECT_ID_LEN};
use crate::registry::TypeRegistry;
use crate::value::{sanitize_regexp_flags, EjsonValue};
use crate::wire;

use super::schema::{ColumnSchema, ColumnType};

/// Decode a `{"$batch": ...}` envelope (or a bare payload) back into rows.
pub fn from_batch_json_value(
    wire: &Value,
    registry: &TypeRegistry,
) -> Result<Vec<EjsonValue>, EjsonError> {
    let payload = wire.get("$batch").unwrap_or(wire);
    let obj = payload
        .as_object()
        .ok_or_else(|| malformed("payload must be an object"))?;

    let version = obj
        .get("version")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("missing version"))?;
    if version != 1 {
        return Err(malformed(&format!("unsupported version {version}")));
    }
    let count = obj
        .get("count")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing count"))? as usize;
    let schema = obj
        .get("schema")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("missing schema"))?;
    let columns = schema
        .get("columns")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("missing schema.columns"))?;
    let order = schema
        .get("order")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing schema.order"))?;
    if order.len() != columns.len() {
        return Err(malformed("schema.order does not cover schema.columns"));
    }
    let data = obj
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("missing data"))?;

    let mut rows: Vec<IndexMap<String, EjsonValue>> =
        (0..count).map(|_| IndexMap::new()).collect();
    for name in order {
        let name = name
            .as_str()
            .ok_or_else(|| malformed("schema.order entries must be strings"))?;
        let column_schema = ColumnSchema::from_wire(
            columns
                .get(name)
                .ok_or_else(|| malformed(&format!("column {name} has no schema")))?,
        )?;
        let column = data
            .get(name)
            .and_then(Value::as_object)
            .ok_or_else(|| malformed(&format!("column {name} has no data")))?;
        let cells = decode_column(name, &column_schema, column, count, registry)?;
        for (row, cell) in rows.iter_mut().zip(cells) {
            row.insert(name.to_owned(), cell);
        }
    }
    Ok(rows.into_iter().map(EjsonValue::Object).collect())
}

fn decode_column(
    name: &str,
    schema: &ColumnSchema,
    column: &Map<String, Value>,
    count: usize,
    registry: &TypeRegistry,
) -> Result<Vec<EjsonValue>, EjsonError> {
    if column.contains_key("packed") {
        return decode_packed(name, schema, column, count);
    }
    let v = column
        .get("v")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(&format!("column {name} has neither v nor packed")))?;
    if v.len() != count {
        return Err(malformed(&format!(
            "column {name} has {} values for {count} rows",
            v.len()
        )));
    }
    let mut out = Vec::with_capacity(count);
    for cell in v {
        if cell.is_null() {
            out.push(EjsonValue::Null);
        } else {
            out.push(cell_from_wire(name, schema, cell, registry)?);
        }
    }
    Ok(out)
}

fn cell_from_wire(
    name: &str,
    schema: &ColumnSchema,
    cell: &Value,
    registry: &TypeRegistry,
) -> Result<EjsonValue, EjsonError> {
    match schema.column_type {
        ColumnType::Null => Ok(EjsonValue::Null),
        ColumnType::String => cell
            .as_str()
            .map(|s| EjsonValue::Str(s.to_owned()))
            .ok_or_else(|| malformed(&format!("column {name} expects strings"))),
        ColumnType::Number => {
            if let Some(n) = cell.as_i64() {
                Ok(EjsonValue::Integer(n))
            } else if let Some(f) = cell.as_f64() {
                Ok(EjsonValue::Float(f))
            } else if let Some(sign) = cell.get("$InfNaN").and_then(Value::as_f64) {
                Ok(EjsonValue::Float(sign / 0.0))
            } else {
                Err(malformed(&format!("column {name} expects numbers")))
            }
        }
        ColumnType::Boolean => cell
            .as_bool()
            .map(EjsonValue::Bool)
            .ok_or_else(|| malformed(&format!("column {name} expects booleans"))),
        ColumnType::Date => {
            let ms = if let Some(i) = cell.as_i64() {
                i
            } else if let Some(f) = cell.as_f64() {
                f as i64
            } else {
                return Err(malformed(&format!("column {name} expects epoch millis")));
            };
            Ok(EjsonValue::Date(ms))
        }
        ColumnType::Binary => {
            let b64 = cell
                .as_str()
                .ok_or_else(|| malformed(&format!("column {name} expects base64 strings")))?;
            wire::decode_base64(b64)
        }
        ColumnType::Regexp => {
            let source = cell
                .get("source")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(&format!("column {name} expects regexp objects")))?;
            let flags = cell
                .get("flags")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(&format!("column {name} expects regexp objects")))?;
            Ok(EjsonValue::RegExp {
                source: source.to_owned(),
                flags: sanitize_regexp_flags(flags),
            })
        }
        ColumnType::ObjectId => {
            let hex = cell
                .as_str()
                .ok_or_else(|| malformed(&format!("column {name} expects hex id strings")))?;
            Ok(EjsonValue::ObjectId(ObjectId::from_hex(hex)?))
        }
        ColumnType::Custom => {
            let type_name = schema
                .custom_type_name
                .as_deref()
                .ok_or_else(|| EjsonError::BatchMissingCustomTypeName(name.to_owned()))?;
            let factory = registry.get(type_name).ok_or_else(|| {
                EjsonError::BatchUnregisteredCustomType {
                    column: name.to_owned(),
                    type_name: type_name.to_owned(),
                }
            })?;
            Ok(EjsonValue::Custom(factory(cell)?))
        }
    }
}

/// Decode a packed fixed-width column.
///
/// The hex blob is decoded once; then a single forward pass walks the rows
/// with two cursors, one into the byte buffer and one into the sorted null
/// index list. O(count) by construction — the null list is consulted in
/// order, never searched.
fn decode_packed(
    name: &str,
    schema: &ColumnSchema,
    column: &Map<String, Value>,
    count: usize,
) -> Result<Vec<EjsonValue>, EjsonError> {
    if schema.column_type != ColumnType::ObjectId {
        return Err(malformed(&format!(
            "column {name} is packed but not an id column"
        )));
    }
    let packed = column
        .get("packed")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed(&format!("column {name} packed entry must be an object")))?;
    let hex = packed
        .get("hex")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(&format!("column {name} packed entry has no hex")))?;
    let width = packed
        .get("width")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed(&format!("column {name} packed entry has no width")))?
        as usize;
    if width != OBJECT_ID_LEN {
        return Err(malformed(&format!(
            "column {name} has width {width}, id columns are {OBJECT_ID_LEN} bytes"
        )));
    }
    let bytes =
        from_hex(hex).ok_or_else(|| malformed(&format!("column {name} has invalid hex")))?;
    let nulls = read_nulls(name, column)?;

    let mut out = Vec::with_capacity(count);
    let mut offset = 0;
    let mut next_null = 0;
    for row in 0..count {
        if next_null < nulls.len() && nulls[next_null] == row {
            next_null += 1;
            out.push(EjsonValue::Null);
            continue;
        }
        let end = offset + width;
        if end > bytes.len() {
            return Err(malformed(&format!("column {name} packed data too short")));
        }
        out.push(EjsonValue::ObjectId(ObjectId::from_bytes(
            &bytes[offset..end],
        )?));
        offset = end;
    }
    Ok(out)
}

fn read_nulls(name: &str, column: &Map<String, Value>) -> Result<Vec<usize>, EjsonError> {
    let Some(raw) = column.get("nulls") else {
        return Ok(Vec::new());
    };
    let arr = raw
        .as_array()
        .ok_or_else(|| malformed(&format!("column {name} nulls must be an array")))?;
    let mut out = Vec::with_capacity(arr.len());
    for entry in arr {
        let idx = entry
            .as_u64()
            .ok_or_else(|| malformed(&format!("column {name} nulls must be indices")))?
            as usize;
        if let Some(&last) = out.last() {
            if idx <= last {
                return Err(malformed(&format!(
                    "column {name} nulls must be strictly increasing"
                )));
            }
        }
        out.push(idx);
    }
    Ok(out)
}

fn malformed(msg: &str) -> EjsonError {
    EjsonError::BatchMalformedPayload(msg.to_owned())
}
