use std::sync::Arc;

use dashmap::DashMap;

use crate::error::RegistryError;
use crate::schema::SchemaInfo;

/// Global `sref → schema` map, shared by the route handlers and the
/// reference resolver.
///
/// The map is created empty in the constructor, populated during startup
/// registration, and read-only afterwards. Registering the same `sref`
/// twice is an error.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    by_sref: Arc<DashMap<String, Arc<SchemaInfo>>>,
    by_path: Arc<DashMap<String, Arc<SchemaInfo>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry {
            by_sref: Arc::new(DashMap::new()),
            by_path: Arc::new(DashMap::new()),
        }
    }

    /// Publish an assembled schema. Returns the shared record handed to
    /// route handlers.
    pub fn insert(&self, info: SchemaInfo) -> Result<Arc<SchemaInfo>, RegistryError> {
        if self.by_sref.contains_key(&info.sref) {
            return Err(RegistryError::Duplicate(info.sref));
        }
        let info = Arc::new(info);
        self.by_sref.insert(info.sref.clone(), info.clone());
        self.by_path.insert(info.path.clone(), info.clone());
        Ok(info)
    }

    pub fn by_sref(&self, sref: &str) -> Option<Arc<SchemaInfo>> {
        self.by_sref.get(sref).map(|entry| entry.value().clone())
    }

    pub fn by_path(&self, path: &str) -> Option<Arc<SchemaInfo>> {
        self.by_path.get(path).map(|entry| entry.value().clone())
    }

    /// All registered schemas, in no particular order.
    pub fn all(&self) -> Vec<Arc<SchemaInfo>> {
        self.by_sref.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_sref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sref.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, RegisterOptions, SchemaDescriptor, SchemaInfo};

    fn info(name: &str) -> SchemaInfo {
        SchemaInfo::assemble(
            SchemaDescriptor::new("mod", name).field("value", FieldKind::Text),
            "svc",
            1,
            0,
            &RegisterOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = SchemaRegistry::new();
        registry.insert(info("X")).unwrap();

        let found = registry.by_sref("mod.X").unwrap();
        assert_eq!(found.dref, "mod_x_1_0");
        assert!(registry.by_path("/svc/v1/mod/x").is_some());
        assert!(registry.by_sref("mod.Y").is_none());
    }

    #[test]
    fn test_duplicate_sref_rejected() {
        let registry = SchemaRegistry::new();
        registry.insert(info("X")).unwrap();
        let err = registry.insert(info("X")).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(sref) if sref == "mod.X"));
    }
}
