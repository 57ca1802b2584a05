//! Error types for the EJSON engine and the batch codec.

use thiserror::Error;

/// Every failure the engine can surface.
///
/// The tree converter and the raw batch primitives propagate these to the
/// caller unmodified. `stringify_batch` is the one entry point that recovers
/// (it re-encodes through the generic per-row path); `parse_batch` only
/// branches on the `$batch` marker and never swallows an error.
#[derive(Debug, Error)]
pub enum EjsonError {
    /// A custom type name was registered twice.
    #[error("custom type {0} is already registered")]
    DuplicateTypeName(String),

    /// A `{"$type": ...}` wrapper named a type with no registered factory.
    #[error("custom type {0} is not defined")]
    UnregisteredCustomType(String),

    /// Input to `parse` was not valid JSON text.
    #[error("cannot parse EJSON input: {0}")]
    InvalidParseInput(#[from] serde_json::Error),

    /// Recursion depth ran out while converting a value tree.
    #[error("converting circular structure to EJSON")]
    CircularStructure,

    /// A `{"$objectId": ...}` wrapper or packed id column held bad bytes.
    #[error("invalid ObjectId: {0}")]
    InvalidObjectId(String),

    /// A `{"$binary": ...}` wrapper held a string that is not base64.
    #[error("invalid binary payload: {0}")]
    InvalidBinary(String),

    /// A recognized `$` wrapper carried a value of the wrong JSON type.
    #[error("malformed {0} wire value")]
    MalformedWireValue(&'static str),

    /// `parse_batch` fell back to generic parsing and got a non-array.
    #[error("batch input must be an array of rows")]
    BatchNonArrayInput,

    /// Batch encoding requires at least one row.
    #[error("batch input must not be empty")]
    BatchEmptyArray,

    /// A row was not a flat object, or its key set differed from the first row.
    #[error("batch rows must be flat objects with a uniform key set")]
    BatchNonFlatOrNonUniformRow,

    /// A column's first non-null value has no columnar representation.
    #[error("column {0} has an unsupported value type")]
    BatchUnsupportedColumnType(String),

    /// A custom column's schema entry lacks its type name.
    #[error("custom column {0} is missing its type name")]
    BatchMissingCustomTypeName(String),

    /// A custom column references a type absent from the registry.
    #[error("custom column {column} references unregistered type {type_name}")]
    BatchUnregisteredCustomType { column: String, type_name: String },

    /// A batch envelope was structurally broken.
    #[error("malformed batch payload: {0}")]
    BatchMalformedPayload(String),
}
