//! Information Types registry
//!
//! Holds every registered Information Type, mirrored to the durable store.
//! Removal is unconditional here: the "no producer still supports it"
//! guard belongs to the caller.

use super::store::EntityStore;
use ics_common::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store directory name for types
pub const STORE_KIND: &str = "infotypes";

/// A named category of enrichable data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoType {
    pub id: String,
    /// JSON schema that job data for this type must satisfy
    #[serde(default)]
    pub job_data_schema: Option<Value>,
    #[serde(default)]
    pub type_specific_info: Option<Value>,
}

impl InfoType {
    pub fn new(id: impl Into<String>, job_data_schema: Option<Value>, type_specific_info: Option<Value>) -> Self {
        Self {
            id: id.into(),
            job_data_schema,
            type_specific_info,
        }
    }
}

pub struct InfoTypes {
    types: Mutex<HashMap<String, Arc<InfoType>>>,
    store: EntityStore,
}

impl InfoTypes {
    pub fn new(store: EntityStore) -> Self {
        Self {
            types: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Rebuild the registry from the persisted files. Called once at
    /// startup, before traffic is accepted.
    pub fn restore_from_disk(&self) -> Result<usize> {
        let restored: Vec<InfoType> = self.store.load_all()?;
        let mut types = self.types.lock();
        let count = restored.len();
        for info_type in restored {
            types.insert(info_type.id.clone(), Arc::new(info_type));
        }
        info!(count, "Restored information types");
        Ok(count)
    }

    /// Insert or replace a type and persist it
    pub fn put(&self, info_type: InfoType) -> Arc<InfoType> {
        let info_type = Arc::new(info_type);
        let mut types = self.types.lock();
        types.insert(info_type.id.clone(), Arc::clone(&info_type));
        if let Err(e) = self.store.write(&info_type.id, info_type.as_ref()) {
            warn!(type_id = %info_type.id, error = %e, "Could not save type");
        }
        debug!(type_id = %info_type.id, "Stored information type");
        info_type
    }

    pub fn get(&self, id: &str) -> Option<Arc<InfoType>> {
        self.types.lock().get(id).cloned()
    }

    pub fn get_or_fail(&self, id: &str) -> Result<Arc<InfoType>> {
        self.get(id)
            .ok_or_else(|| Error::not_found("Information type", id))
    }

    pub fn all(&self) -> Vec<Arc<InfoType>> {
        self.types.lock().values().cloned().collect()
    }

    pub fn remove(&self, info_type: &InfoType) {
        let mut types = self.types.lock();
        types.remove(&info_type.id);
        if let Err(e) = self.store.delete(&info_type.id) {
            warn!(type_id = %info_type.id, error = %e, "Could not remove file");
        }
    }

    pub fn len(&self) -> usize {
        self.types.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every type, in memory and on disk
    pub fn clear(&self) {
        let mut types = self.types.lock();
        types.clear();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Could not delete database");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry(dir: &std::path::Path) -> InfoTypes {
        InfoTypes::new(EntityStore::open(dir, STORE_KIND).unwrap())
    }

    #[test]
    fn test_put_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let types = registry(dir.path());

        types.put(InfoType::new("weather", Some(json!({"type": "object"})), None));
        assert_eq!(types.len(), 1);
        assert_eq!(types.get("weather").unwrap().id, "weather");

        let weather = types.get_or_fail("weather").unwrap();
        types.remove(&weather);
        assert!(types.get("weather").is_none());
        assert!(matches!(types.get_or_fail("weather"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_put_replaces_schema() {
        let dir = tempfile::tempdir().unwrap();
        let types = registry(dir.path());

        types.put(InfoType::new("weather", Some(json!({"type": "object"})), None));
        types.put(InfoType::new("weather", Some(json!({"type": "string"})), None));

        assert_eq!(types.len(), 1);
        assert_eq!(
            types.get("weather").unwrap().job_data_schema,
            Some(json!({"type": "string"}))
        );
    }

    #[test]
    fn test_restore_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let original = InfoType::new("weather", Some(json!({"type": "object"})), Some(json!({"unit": "C"})));
        registry(dir.path()).put(original.clone());

        let restarted = registry(dir.path());
        assert_eq!(restarted.restore_from_disk().unwrap(), 1);
        assert_eq!(*restarted.get("weather").unwrap(), original);
    }

    #[test]
    fn test_clear_wipes_disk() {
        let dir = tempfile::tempdir().unwrap();
        let types = registry(dir.path());
        types.put(InfoType::new("weather", None, None));
        types.clear();

        let restarted = registry(dir.path());
        assert_eq!(restarted.restore_from_disk().unwrap(), 0);
    }
}
