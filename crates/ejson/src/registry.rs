//! Registry of user type names and their decode factories.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::EjsonError;
use crate::value::Codable;

/// Rebuilds a [`Codable`] value from the `$value` wire projection.
pub type DecodeFactory =
    Arc<dyn Fn(&Value) -> Result<Box<dyn Codable>, EjsonError> + Send + Sync>;

/// Name → decode factory map. Registration is permanent: a name can be
/// claimed once and never unregistered. Intended use is write-then-freeze —
/// register everything during initialization, then share the registry across
/// threads for lookups.
#[derive(Default)]
pub struct TypeRegistry {
    factories: RwLock<HashMap<String, DecodeFactory>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`; fails if the name is taken.
    pub fn add<F>(&self, name: &str, factory: F) -> Result<(), EjsonError>
    where
        F: Fn(&Value) -> Result<Box<dyn Codable>, EjsonError> + Send + Sync + 'static,
    {
        let mut map = self.factories.write().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(name) {
            return Err(EjsonError::DuplicateTypeName(name.to_owned()));
        }
        map.insert(name.to_owned(), Arc::new(factory));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<DecodeFactory> {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.factories.read().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("TypeRegistry")
            .field("names", &map.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone)]
    struct Marker;

    impl Codable for Marker {
        fn type_name(&self) -> &str {
            "marker"
        }
        fn to_wire(&self) -> Value {
            json!(null)
        }
        fn boxed_clone(&self) -> Box<dyn Codable> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let registry = TypeRegistry::new();
        registry.add("marker", |_| Ok(Box::new(Marker))).unwrap();
        let err = registry.add("marker", |_| Ok(Box::new(Marker)));
        assert!(matches!(err, Err(EjsonError::DuplicateTypeName(n)) if n == "marker"));
    }

    #[test]
    fn lookup_after_registration() {
        let registry = TypeRegistry::new();
        assert!(!registry.contains("marker"));
        assert!(registry.get("marker").is_none());
        registry.add("marker", |_| Ok(Box::new(Marker))).unwrap();
        assert!(registry.contains("marker"));
        let factory = registry.get("marker").unwrap();
        let value = factory(&json!(null)).unwrap();
        assert_eq!(value.type_name(), "marker");
    }
}
