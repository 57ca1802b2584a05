//! Column schema model and inference for the batch codec.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::EjsonError;
use crate::value::EjsonValue;

/// The kinds a batch column can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Every value in the column was null.
    Null,
    String,
    Number,
    Boolean,
    Date,
    Binary,
    Regexp,
    ObjectId,
    Custom,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Null => "null",
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Binary => "binary",
            ColumnType::Regexp => "regexp",
            ColumnType::ObjectId => "objectId",
            ColumnType::Custom => "custom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "null" => Some(ColumnType::Null),
            "string" => Some(ColumnType::String),
            "number" => Some(ColumnType::Number),
            "boolean" => Some(ColumnType::Boolean),
            "date" => Some(ColumnType::Date),
            "binary" => Some(ColumnType::Binary),
            "regexp" => Some(ColumnType::Regexp),
            "objectId" => Some(ColumnType::ObjectId),
            "custom" => Some(ColumnType::Custom),
            _ => None,
        }
    }
}

/// How a column's data is laid out in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnEncoding {
    /// One wire value per row in a `v` array.
    Values,
    /// Fixed-width binary chunks concatenated into one hex string.
    Packed,
}

impl ColumnEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnEncoding::Values => "values",
            ColumnEncoding::Packed => "packed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "values" => Some(ColumnEncoding::Values),
            "packed" => Some(ColumnEncoding::Packed),
            _ => None,
        }
    }
}

/// Schema entry for one column.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub column_type: ColumnType,
    pub optional: bool,
    pub encoding: Option<ColumnEncoding>,
    pub custom_type_name: Option<String>,
}

impl ColumnSchema {
    /// Wire form; `optional` and `encoding` are emitted only when set.
    pub fn to_wire(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "type".to_owned(),
            Value::String(self.column_type.as_str().to_owned()),
        );
        if self.optional {
            obj.insert("optional".to_owned(), Value::Bool(true));
        }
        if let Some(encoding) = self.encoding {
            obj.insert(
                "encoding".to_owned(),
                Value::String(encoding.as_str().to_owned()),
            );
        }
        if let Some(name) = &self.custom_type_name {
            obj.insert("customTypeName".to_owned(), Value::String(name.clone()));
        }
        Value::Object(obj)
    }

    pub fn from_wire(wire: &Value) -> Result<Self, EjsonError> {
        let obj = wire
            .as_object()
            .ok_or_else(|| malformed("column schema must be an object"))?;
        let column_type = obj
            .get("type")
            .and_then(Value::as_str)
            .and_then(ColumnType::from_str)
            .ok_or_else(|| malformed("column schema has no known type"))?;
        let optional = obj
            .get("optional")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let encoding = match obj.get("encoding").and_then(Value::as_str) {
            Some(s) => Some(
                ColumnEncoding::from_str(s)
                    .ok_or_else(|| malformed("column schema has unknown encoding"))?,
            ),
            None => None,
        };
        let custom_type_name = obj
            .get("customTypeName")
            .and_then(Value::as_str)
            .map(str::to_owned);
        Ok(Self {
            column_type,
            optional,
            encoding,
            custom_type_name,
        })
    }
}

fn malformed(msg: &str) -> EjsonError {
    EjsonError::BatchMalformedPayload(msg.to_owned())
}

/// Infer one column's schema from the rows.
///
/// The first non-null value decides the type; a column with mixed
/// incompatible non-null values after the first is undefined behavior by
/// design, mirroring the encode-side contract. All-null columns get type
/// `null` and are fully optional.
pub(crate) fn infer_column(
    rows: &[&IndexMap<String, EjsonValue>],
    key: &str,
) -> Result<ColumnSchema, EjsonError> {
    let mut optional = false;
    let mut inferred: Option<(ColumnType, Option<String>)> = None;
    for row in rows {
        match row.get(key) {
            None | Some(EjsonValue::Null) => optional = true,
            Some(value) => {
                if inferred.is_none() {
                    inferred = Some(cell_type(value, key)?);
                }
            }
        }
    }
    let (column_type, custom_type_name) = inferred.unwrap_or((ColumnType::Null, None));
    Ok(ColumnSchema {
        column_type,
        optional,
        encoding: None,
        custom_type_name,
    })
}

fn cell_type(
    value: &EjsonValue,
    key: &str,
) -> Result<(ColumnType, Option<String>), EjsonError> {
    match value {
        EjsonValue::Null => Ok((ColumnType::Null, None)),
        EjsonValue::Str(_) => Ok((ColumnType::String, None)),
        EjsonValue::Integer(_) | EjsonValue::Float(_) => Ok((ColumnType::Number, None)),
        EjsonValue::Bool(_) => Ok((ColumnType::Boolean, None)),
        EjsonValue::Date(_) => Ok((ColumnType::Date, None)),
        EjsonValue::Binary(_) => Ok((ColumnType::Binary, None)),
        EjsonValue::RegExp { .. } => Ok((ColumnType::Regexp, None)),
        EjsonValue::ObjectId(_) => Ok((ColumnType::ObjectId, None)),
        EjsonValue::Custom(c) => Ok((ColumnType::Custom, Some(c.type_name().to_owned()))),
        EjsonValue::Array(_) | EjsonValue::Object(_) => {
            Err(EjsonError::BatchUnsupportedColumnType(key.to_owned()))
        }
    }
}
