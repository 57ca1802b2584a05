//! Columnar batch codec for arrays of uniform flat records.
//!
//! Rows sharing one key set encode into a `{"$batch": ...}` envelope that
//! groups values by column, lists null rows in index sidecars, and can pack
//! id columns into fixed-width hex blobs. The payload stays JSON-compatible;
//! text emission still goes through the host JSON layer.

mod decode;
mod encode;
mod schema;

use serde_json::Value;

use crate::error::EjsonError;
use crate::registry::TypeRegistry;
use crate::stringify::{self, StringifyOptions};
use crate::value::EjsonValue;

pub use decode::from_batch_json_value;
pub use encode::to_batch_json_value;
pub use schema::{ColumnEncoding, ColumnSchema, ColumnType};

/// Options for batch encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Pack id columns into one fixed-width hex blob instead of per-row
    /// strings.
    pub prefer_packed_object_id: bool,
}

/// Serialize rows, preferring the columnar form.
///
/// Any batch-eligibility failure (non-uniform rows, nested values, empty
/// input, unsupported column) silently falls back to the generic per-row
/// encoding of the same rows, trading compactness for robustness. Failures of
/// the fallback itself still propagate.
pub fn stringify_batch(rows: &[EjsonValue], opts: &BatchOptions) -> Result<String, EjsonError> {
    match to_batch_json_value(rows, opts) {
        Ok(wire) => Ok(wire.to_string()),
        Err(_) => {
            let all = EjsonValue::Array(rows.to_vec());
            stringify::stringify(&all, &StringifyOptions::default())
        }
    }
}

/// Parse text produced by [`stringify_batch`].
///
/// Branches on the `$batch` marker: columnar decode when present, generic
/// parse otherwise — in which case the result must be an array of rows.
pub fn parse_batch(text: &str, registry: &TypeRegistry) -> Result<Vec<EjsonValue>, EjsonError> {
    let wire: Value = serde_json::from_str(text)?;
    if wire.get("$batch").is_some() {
        return from_batch_json_value(&wire, registry);
    }
    match stringify::revive(&wire, registry)? {
        EjsonValue::Array(rows) => Ok(rows),
        _ => Err(EjsonError::BatchNonArrayInput),
    }
}
