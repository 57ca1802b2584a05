//! Extended JSON: a type-preserving superset of JSON.
//!
//! Plain JSON drops dates, regular expressions, byte sequences, 12-byte
//! identifiers, `NaN`/`Infinity`, and application types. This crate round
//! trips all of them through `$`-prefixed wrapper objects, and ships a
//! columnar batch codec that encodes arrays of uniform flat records far more
//! compactly than per-row trees by grouping values per column and packing id
//! columns into fixed-width hex blobs.
//!
//! The engine is a pure, synchronous value transform: `serde_json` is the
//! host text layer, and the only shared state is the per-engine type
//! registry. Use [`Ejson::new`] for an isolated engine, or the top-level
//! functions for the process-wide default one.
//!
//! ```
//! use ejson::{EjsonValue, StringifyOptions};
//!
//! let text = ejson::stringify(&EjsonValue::Date(0), &StringifyOptions::default()).unwrap();
//! assert_eq!(text, r#"{"$date":0}"#);
//! let back = ejson::parse(&text).unwrap();
//! assert!(matches!(back, EjsonValue::Date(0)));
//! ```

mod batch;
mod convert;
mod error;
mod object_id;
mod registry;
mod stringify;
mod value;
mod wire;

use std::sync::LazyLock;

use serde_json::Value;

pub use batch::{BatchOptions, ColumnEncoding, ColumnSchema, ColumnType};
pub use convert::EqualsOptions;
pub use error::EjsonError;
pub use object_id::{ObjectId, OBJECT_ID_LEN};
pub use registry::{DecodeFactory, TypeRegistry};
pub use stringify::{Indent, StringifyOptions};
pub use value::{build_regex, is_binary, sanitize_regexp_flags, Codable, EjsonValue};
pub use wire::{wire_kind, WireKind};

/// An EJSON engine: the codec surface plus an owned type registry.
///
/// Engines are cheap to create and fully isolated from each other; custom
/// types registered on one are invisible to the rest.
#[derive(Debug, Default)]
pub struct Ejson {
    registry: TypeRegistry,
}

impl Ejson {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Register a decode factory for a custom type name.
    ///
    /// Registration is permanent and must happen before concurrent reads
    /// begin; a duplicate name fails.
    pub fn add_type<F>(&self, name: &str, factory: F) -> Result<(), EjsonError>
    where
        F: Fn(&Value) -> Result<Box<dyn Codable>, EjsonError> + Send + Sync + 'static,
    {
        self.registry.add(name, factory)
    }

    /// True iff `value` is a custom value whose type name is registered here.
    pub fn is_custom_type(&self, value: &EjsonValue) -> bool {
        matches!(value, EjsonValue::Custom(c) if self.registry.contains(c.type_name()))
    }

    /// Application tree → JSON-compatible wire tree.
    pub fn to_json_value(&self, value: &EjsonValue) -> Result<Value, EjsonError> {
        convert::to_json_value(value)
    }

    /// Wire tree → application tree.
    pub fn from_json_value(&self, wire: &Value) -> Result<EjsonValue, EjsonError> {
        convert::from_json_value(wire, &self.registry)
    }

    pub fn stringify(
        &self,
        value: &EjsonValue,
        opts: &StringifyOptions,
    ) -> Result<String, EjsonError> {
        stringify::stringify(value, opts)
    }

    pub fn parse(&self, text: &str) -> Result<EjsonValue, EjsonError> {
        stringify::parse(text, &self.registry)
    }

    /// Deep clone; custom values clone through their own `boxed_clone`.
    pub fn clone_value(&self, value: &EjsonValue) -> EjsonValue {
        value.clone()
    }

    pub fn equals(&self, a: &EjsonValue, b: &EjsonValue, opts: &EqualsOptions) -> bool {
        convert::equals(a, b, opts)
    }

    /// Encode uniform flat rows into a columnar `{"$batch": ...}` envelope.
    /// Propagates every eligibility error; see [`Ejson::stringify_batch`] for
    /// the fallback wrapper.
    pub fn to_batch_json_value(
        &self,
        rows: &[EjsonValue],
        opts: &BatchOptions,
    ) -> Result<Value, EjsonError> {
        batch::to_batch_json_value(rows, opts)
    }

    /// Decode a columnar envelope back into rows. Propagates every error;
    /// in particular an unregistered custom column is fatal for the call.
    pub fn from_batch_json_value(&self, wire: &Value) -> Result<Vec<EjsonValue>, EjsonError> {
        batch::from_batch_json_value(wire, &self.registry)
    }

    /// Columnar serialization with silent fallback to the generic per-row
    /// encoding when the rows are not batch-eligible.
    pub fn stringify_batch(
        &self,
        rows: &[EjsonValue],
        opts: &BatchOptions,
    ) -> Result<String, EjsonError> {
        batch::stringify_batch(rows, opts)
    }

    /// Parse [`Ejson::stringify_batch`] output: columnar when the `$batch`
    /// marker is present, otherwise a generic parse that must yield an array.
    pub fn parse_batch(&self, text: &str) -> Result<Vec<EjsonValue>, EjsonError> {
        batch::parse_batch(text, &self.registry)
    }
}

static DEFAULT_ENGINE: LazyLock<Ejson> = LazyLock::new(Ejson::new);

/// The process-wide default engine used by the top-level functions.
pub fn default_engine() -> &'static Ejson {
    &DEFAULT_ENGINE
}

// ----------------------------------------------------------------
// Top-level convenience functions over the default engine

pub fn add_type<F>(name: &str, factory: F) -> Result<(), EjsonError>
where
    F: Fn(&Value) -> Result<Box<dyn Codable>, EjsonError> + Send + Sync + 'static,
{
    default_engine().add_type(name, factory)
}

pub fn is_custom_type(value: &EjsonValue) -> bool {
    default_engine().is_custom_type(value)
}

pub fn to_json_value(value: &EjsonValue) -> Result<Value, EjsonError> {
    default_engine().to_json_value(value)
}

pub fn from_json_value(wire: &Value) -> Result<EjsonValue, EjsonError> {
    default_engine().from_json_value(wire)
}

pub fn stringify(value: &EjsonValue, opts: &StringifyOptions) -> Result<String, EjsonError> {
    default_engine().stringify(value, opts)
}

pub fn parse(text: &str) -> Result<EjsonValue, EjsonError> {
    default_engine().parse(text)
}

pub fn clone_value(value: &EjsonValue) -> EjsonValue {
    default_engine().clone_value(value)
}

pub fn equals(a: &EjsonValue, b: &EjsonValue, opts: &EqualsOptions) -> bool {
    default_engine().equals(a, b, opts)
}

pub fn to_batch_json_value(
    rows: &[EjsonValue],
    opts: &BatchOptions,
) -> Result<Value, EjsonError> {
    default_engine().to_batch_json_value(rows, opts)
}

pub fn from_batch_json_value(wire: &Value) -> Result<Vec<EjsonValue>, EjsonError> {
    default_engine().from_batch_json_value(wire)
}

pub fn stringify_batch(rows: &[EjsonValue], opts: &BatchOptions) -> Result<String, EjsonError> {
    default_engine().stringify_batch(rows, opts)
}

pub fn parse_batch(text: &str) -> Result<Vec<EjsonValue>, EjsonError> {
    default_engine().parse_batch(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(fields: &[(&str, EjsonValue)]) -> EjsonValue {
        EjsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn tree_roundtrip_matrix() {
        let engine = Ejson::new();
        let id = ObjectId::from_hex("507f1f77bcf86cd799439011").unwrap();
        let cases = vec![
            EjsonValue::Null,
            EjsonValue::Bool(true),
            EjsonValue::Integer(-42),
            EjsonValue::Float(1.5),
            EjsonValue::Float(f64::NAN),
            EjsonValue::Float(f64::INFINITY),
            EjsonValue::Float(f64::NEG_INFINITY),
            EjsonValue::Str("hello".into()),
            EjsonValue::Date(1_700_000_000_000),
            EjsonValue::RegExp {
                source: "^a+$".into(),
                flags: "gi".into(),
            },
            EjsonValue::Binary(vec![0, 1, 2, 254, 255]),
            EjsonValue::ObjectId(id),
            EjsonValue::Array(vec![EjsonValue::Integer(1), EjsonValue::Date(7)]),
            obj(&[
                ("plain", EjsonValue::Str("x".into())),
                ("when", EjsonValue::Date(0)),
            ]),
            obj(&[("$date", EjsonValue::Integer(5))]), // must escape, not decode as a date
        ];
        for case in cases {
            let wire = engine.to_json_value(&case).unwrap();
            let back = engine.from_json_value(&wire).unwrap();
            assert!(
                engine.equals(&case, &back, &EqualsOptions::default()),
                "roundtrip failed for {case:?}: {back:?}"
            );
        }
    }

    #[test]
    fn fast_path_matches_generic_path() {
        let engine = Ejson::new();
        let id = ObjectId::from_hex("507f1f77bcf86cd799439011").unwrap();
        let cases = vec![
            EjsonValue::Null,
            EjsonValue::Float(f64::NAN),
            EjsonValue::Date(123),
            EjsonValue::Binary(vec![9, 8, 7]),
            EjsonValue::ObjectId(id),
            EjsonValue::RegExp {
                source: "x".into(),
                flags: "m".into(),
            },
            obj(&[("$binary", EjsonValue::Str("not bytes".into()))]),
            EjsonValue::Array(vec![obj(&[("k", EjsonValue::Date(1))])]),
        ];
        for case in cases {
            let fast = engine.stringify(&case, &StringifyOptions::default()).unwrap();
            let generic = engine.to_json_value(&case).unwrap().to_string();
            assert_eq!(fast, generic, "paths diverge for {case:?}");
            let revived = engine.parse(&fast).unwrap();
            let converted = engine
                .from_json_value(&serde_json::from_str(&fast).unwrap())
                .unwrap();
            assert!(engine.equals(&revived, &converted, &EqualsOptions::default()));
        }
    }

    #[test]
    fn escaped_shapes_round_trip_as_plain_data() {
        let engine = Ejson::new();
        let value = obj(&[("$date", EjsonValue::Integer(5))]);
        let wire = engine.to_json_value(&value).unwrap();
        assert_eq!(wire, json!({"$escape": {"$date": 5}}));
        let back = engine.from_json_value(&wire).unwrap();
        assert!(engine.equals(&value, &back, &EqualsOptions::default()));
        assert!(!matches!(back, EjsonValue::Date(_)));
    }

    #[test]
    fn canonical_output_ignores_insertion_order() {
        let engine = Ejson::new();
        let a = obj(&[
            ("x", EjsonValue::Integer(1)),
            ("y", EjsonValue::Integer(2)),
        ]);
        let b = obj(&[
            ("y", EjsonValue::Integer(2)),
            ("x", EjsonValue::Integer(1)),
        ]);
        let opts = StringifyOptions {
            canonical: true,
            indent: None,
        };
        assert_eq!(
            engine.stringify(&a, &opts).unwrap(),
            engine.stringify(&b, &opts).unwrap()
        );
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
    }

    impl Codable for Point {
        fn type_name(&self) -> &str {
            "point"
        }
        fn to_wire(&self) -> Value {
            json!({"x": self.x, "y": self.y})
        }
        fn boxed_clone(&self) -> Box<dyn Codable> {
            Box::new(self.clone())
        }
    }

    fn point_factory(wire: &Value) -> Result<Box<dyn Codable>, EjsonError> {
        let x = wire.get("x").and_then(Value::as_i64).unwrap_or(0);
        let y = wire.get("y").and_then(Value::as_i64).unwrap_or(0);
        Ok(Box::new(Point { x, y }))
    }

    #[test]
    fn custom_type_roundtrip() {
        let engine = Ejson::new();
        engine.add_type("point", point_factory).unwrap();
        let value = EjsonValue::Custom(Box::new(Point { x: 3, y: -4 }));
        assert!(engine.is_custom_type(&value));
        let wire = engine.to_json_value(&value).unwrap();
        assert_eq!(wire, json!({"$type": "point", "$value": {"x": 3, "y": -4}}));
        let back = engine.from_json_value(&wire).unwrap();
        assert!(engine.equals(&value, &back, &EqualsOptions::default()));
    }

    #[test]
    fn duplicate_registration_fails() {
        let engine = Ejson::new();
        engine.add_type("point", point_factory).unwrap();
        assert!(matches!(
            engine.add_type("point", point_factory),
            Err(EjsonError::DuplicateTypeName(n)) if n == "point"
        ));
    }

    #[test]
    fn unregistered_custom_type_fails_on_decode() {
        let engine = Ejson::new();
        let wire = json!({"$type": "mystery", "$value": null});
        assert!(matches!(
            engine.from_json_value(&wire),
            Err(EjsonError::UnregisteredCustomType(n)) if n == "mystery"
        ));
    }

    #[test]
    fn engines_are_isolated() {
        let a = Ejson::new();
        let b = Ejson::new();
        a.add_type("point", point_factory).unwrap();
        let value = EjsonValue::Custom(Box::new(Point { x: 0, y: 0 }));
        assert!(a.is_custom_type(&value));
        assert!(!b.is_custom_type(&value));
    }

    #[test]
    fn custom_values_compare_by_projection() {
        let engine = Ejson::new();
        let a = EjsonValue::Custom(Box::new(Point { x: 1, y: 2 }));
        let b = EjsonValue::Custom(Box::new(Point { x: 1, y: 2 }));
        let c = EjsonValue::Custom(Box::new(Point { x: 9, y: 9 }));
        let opts = EqualsOptions::default();
        assert!(engine.equals(&a, &b, &opts));
        assert!(!engine.equals(&a, &c, &opts));
        // A custom value never equals a plain object with the same shape.
        let plain = obj(&[("x", EjsonValue::Integer(1)), ("y", EjsonValue::Integer(2))]);
        assert!(!engine.equals(&a, &plain, &opts));
    }

    #[test]
    fn regexp_flags_sanitize_on_parse() {
        let engine = Ejson::new();
        let value = engine
            .parse(r#"{"$regexp":"a","$flags":"ggimxx"}"#)
            .unwrap();
        match value {
            EjsonValue::RegExp { source, flags } => {
                assert_eq!(source, "a");
                assert_eq!(flags, "gim");
            }
            other => panic!("expected regexp, got {other:?}"),
        }
    }

    #[test]
    fn is_binary_surface() {
        assert!(is_binary(&EjsonValue::Binary(vec![])));
        assert!(!is_binary(&EjsonValue::Null));
    }
}
