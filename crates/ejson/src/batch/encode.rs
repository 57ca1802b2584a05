//! Batch encoding: uniformity checks, per-column emission, packed ids.

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::error::EjsonError;
use crate::object_id::{to_hex, OBJECT_ID_LEN};
use crate::value::EjsonValue;
use crate::wire;

use super::schema::{self, ColumnEncoding, ColumnType};
use super::BatchOptions;

/// Encode uniform flat rows into a `{"$batch": ...}` envelope.
///
/// Fails loudly on every eligibility violation; callers wanting graceful
/// degradation go through `stringify_batch` instead.
pub fn to_batch_json_value(
    rows: &[EjsonValue],
    opts: &BatchOptions,
) -> Result<Value, EjsonError> {
    if rows.is_empty() {
        return Err(EjsonError::BatchEmptyArray);
    }
    let maps = check_rows(rows)?;
    let first = maps[0];

    let mut columns = Map::new();
    let mut order = Vec::with_capacity(first.len());
    let mut data = Map::new();
    for key in first.keys() {
        let mut schema = schema::infer_column(&maps, key)?;
        let column = if schema.column_type == ColumnType::ObjectId && opts.prefer_packed_object_id
        {
            schema.encoding = Some(ColumnEncoding::Packed);
            encode_packed_object_id(&maps, key)?
        } else {
            encode_values(&maps, key)?
        };
        columns.insert(key.clone(), schema.to_wire());
        order.push(Value::String(key.clone()));
        data.insert(key.clone(), column);
    }

    Ok(json!({
        "$batch": {
            "version": 1,
            "schema": { "columns": columns, "order": order },
            "count": rows.len(),
            "data": data,
        }
    }))
}

/// Every row must be a flat object carrying exactly the first row's key set.
fn check_rows(rows: &[EjsonValue]) -> Result<Vec<&IndexMap<String, EjsonValue>>, EjsonError> {
    let mut maps = Vec::with_capacity(rows.len());
    for row in rows {
        let EjsonValue::Object(map) = row else {
            return Err(EjsonError::BatchNonFlatOrNonUniformRow);
        };
        if map
            .values()
            .any(|v| matches!(v, EjsonValue::Array(_) | EjsonValue::Object(_)))
        {
            return Err(EjsonError::BatchNonFlatOrNonUniformRow);
        }
        maps.push(map);
    }
    let first = maps[0];
    for map in &maps[1..] {
        if map.len() != first.len() || !first.keys().all(|k| map.contains_key(k)) {
            return Err(EjsonError::BatchNonFlatOrNonUniformRow);
        }
    }
    Ok(maps)
}

/// `{"v": [...], "nulls": [...]}` — null rows appear both as placeholders in
/// `v` and as indices in `nulls`, so the decoder can blind-copy or null-check
/// without rescanning.
fn encode_values(
    maps: &[&IndexMap<String, EjsonValue>],
    key: &str,
) -> Result<Value, EjsonError> {
    let mut v = Vec::with_capacity(maps.len());
    let mut nulls = Vec::new();
    for (i, map) in maps.iter().enumerate() {
        match map.get(key) {
            None | Some(EjsonValue::Null) => {
                v.push(Value::Null);
                nulls.push(i);
            }
            Some(value) => v.push(cell_to_wire(value, key)?),
        }
    }
    let mut column = Map::new();
    column.insert("v".to_owned(), Value::Array(v));
    if !nulls.is_empty() {
        column.insert("nulls".to_owned(), json!(nulls));
    }
    Ok(Value::Object(column))
}

/// The per-row wire projection used inside `v` arrays.
fn cell_to_wire(value: &EjsonValue, key: &str) -> Result<Value, EjsonError> {
    match value {
        EjsonValue::Str(s) => Ok(Value::String(s.clone())),
        EjsonValue::Integer(i) => Ok(Value::from(*i)),
        EjsonValue::Float(f) if f.is_finite() => Ok(serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        // Plain JSON cannot carry NaN or the infinities, so they keep their
        // tree-codec wrapper inside the column.
        EjsonValue::Float(f) => Ok(json!({ "$InfNaN": wire::inf_nan_sign(*f) })),
        EjsonValue::Bool(b) => Ok(Value::Bool(*b)),
        EjsonValue::Date(ms) => Ok(Value::from(*ms)),
        EjsonValue::RegExp { source, flags } => {
            Ok(json!({ "source": source, "flags": flags }))
        }
        EjsonValue::Binary(data) => Ok(Value::String(wire::encode_base64(data))),
        EjsonValue::ObjectId(id) => Ok(Value::String(id.to_hex())),
        EjsonValue::Custom(c) => Ok(c.to_wire()),
        EjsonValue::Null | EjsonValue::Array(_) | EjsonValue::Object(_) => {
            Err(EjsonError::BatchUnsupportedColumnType(key.to_owned()))
        }
    }
}

/// All non-null ids concatenated in row order into one hex string, with the
/// null rows listed in the sidecar.
fn encode_packed_object_id(
    maps: &[&IndexMap<String, EjsonValue>],
    key: &str,
) -> Result<Value, EjsonError> {
    let mut bytes = Vec::with_capacity(maps.len() * OBJECT_ID_LEN);
    let mut nulls = Vec::new();
    for (i, map) in maps.iter().enumerate() {
        match map.get(key) {
            None | Some(EjsonValue::Null) => nulls.push(i),
            Some(EjsonValue::ObjectId(id)) => bytes.extend_from_slice(id.as_bytes()),
            Some(_) => return Err(EjsonError::BatchUnsupportedColumnType(key.to_owned())),
        }
    }
    let mut column = Map::new();
    column.insert(
        "packed".to_owned(),
        json!({ "hex": to_hex(&bytes), "width": OBJECT_ID_LEN }),
    );
    if !nulls.is_empty() {
        column.insert("nulls".to_owned(), json!(nulls));
    }
    Ok(Value::Object(column))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[(&str, EjsonValue)]) -> EjsonValue {
        EjsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            to_batch_json_value(&[], &BatchOptions::default()),
            Err(EjsonError::BatchEmptyArray)
        ));
    }

    #[test]
    fn non_uniform_rows_are_rejected() {
        let rows = vec![
            row(&[("a", EjsonValue::Integer(1))]),
            row(&[("b", EjsonValue::Integer(2))]),
        ];
        assert!(matches!(
            to_batch_json_value(&rows, &BatchOptions::default()),
            Err(EjsonError::BatchNonFlatOrNonUniformRow)
        ));
    }

    #[test]
    fn nested_values_are_rejected() {
        let rows = vec![row(&[("a", EjsonValue::Array(vec![EjsonValue::Null]))])];
        assert!(matches!(
            to_batch_json_value(&rows, &BatchOptions::default()),
            Err(EjsonError::BatchNonFlatOrNonUniformRow)
        ));
    }

    #[test]
    fn null_sidecar_lists_strictly_increasing_indices() {
        let rows = vec![
            row(&[("a", EjsonValue::Null)]),
            row(&[("a", EjsonValue::Integer(7))]),
            row(&[("a", EjsonValue::Null)]),
        ];
        let wire = to_batch_json_value(&rows, &BatchOptions::default()).unwrap();
        let column = &wire["$batch"]["data"]["a"];
        assert_eq!(column["v"], json!([null, 7, null]));
        assert_eq!(column["nulls"], json!([0, 2]));
        assert_eq!(wire["$batch"]["schema"]["columns"]["a"]["optional"], true);
    }

    #[test]
    fn fully_present_column_has_no_sidecar() {
        let rows = vec![row(&[("a", EjsonValue::Integer(1))])];
        let wire = to_batch_json_value(&rows, &BatchOptions::default()).unwrap();
        assert!(wire["$batch"]["data"]["a"].get("nulls").is_none());
    }

    #[test]
    fn envelope_shape() {
        let rows = vec![row(&[
            ("name", EjsonValue::Str("a".into())),
            ("n", EjsonValue::Integer(1)),
        ])];
        let wire = to_batch_json_value(&rows, &BatchOptions::default()).unwrap();
        let batch = &wire["$batch"];
        assert_eq!(batch["version"], 1);
        assert_eq!(batch["count"], 1);
        assert_eq!(batch["schema"]["order"], json!(["name", "n"]));
        assert_eq!(
            batch["schema"]["columns"]["name"]["type"],
            json!("string")
        );
        assert_eq!(batch["schema"]["columns"]["n"]["type"], json!("number"));
    }
}
