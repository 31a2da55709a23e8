//! File-per-entity durable store
//!
//! Each registry mirrors its entities into `{vardata}/database/{kind}`, one
//! JSON file per entity named after the entity id. There are no index
//! files: registries rebuild their indexes from the flat file set at
//! startup. Writes are not transactional.

use ics_common::config::database_directory;
use ics_common::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct EntityStore {
    kind: &'static str,
    dir: PathBuf,
}

impl EntityStore {
    /// Open (and create if missing) the directory for `kind` under `vardata`
    pub fn open(vardata: &Path, kind: &'static str) -> Result<Self> {
        let dir = database_directory(vardata, kind);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { kind, dir })
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Write (or overwrite) the file for `id`
    pub fn write<T: Serialize>(&self, id: &str, entity: &T) -> Result<()> {
        let json = serde_json::to_string(entity)?;
        std::fs::write(self.path_for(id), json)?;
        debug!(kind = self.kind, id, "Stored entity");
        Ok(())
    }

    /// Delete the file for `id`
    pub fn delete(&self, id: &str) -> Result<()> {
        std::fs::remove_file(self.path_for(id))?;
        Ok(())
    }

    /// Read every persisted entity. Unreadable or corrupt files are logged
    /// and skipped.
    pub fn load_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        std::fs::create_dir_all(&self.dir)?;

        let mut entities = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let parsed = std::fs::read_to_string(&path)
                .map_err(ics_common::Error::from)
                .and_then(|json| serde_json::from_str::<T>(&json).map_err(Into::into));

            match parsed {
                Ok(entity) => entities.push(entity),
                Err(e) => warn!(
                    kind = self.kind,
                    file = %path.display(),
                    error = %e,
                    "Skipping unreadable entity file"
                ),
            }
        }
        Ok(entities)
    }

    /// Wipe every persisted entity of this kind
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(file_name_for(id))
    }
}

/// File name for an entity id. Plain ids are used as-is; path separators,
/// other unusual bytes and a leading dot are percent-encoded so that an id
/// can never escape the store directory.
fn file_name_for(id: &str) -> String {
    let mut name = String::with_capacity(id.len());
    for (i, byte) in id.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'_')
            || (byte == b'.' && i > 0);
        if plain {
            name.push(byte as char);
        } else {
            let _ = write!(name, "%{:02X}", byte);
        }
    }
    if name.is_empty() {
        name.push_str("%00");
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: String,
        value: u32,
    }

    fn record(id: &str, value: u32) -> Record {
        Record {
            id: id.to_string(),
            value,
        }
    }

    #[test]
    fn test_write_and_load_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path(), "records").unwrap();

        store.write("a", &record("a", 1)).unwrap();
        store.write("b", &record("b", 2)).unwrap();
        store.write("a", &record("a", 3)).unwrap();

        let mut all: Vec<Record> = store.load_all().unwrap();
        all.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(all, vec![record("a", 3), record("b", 2)]);
    }

    #[test]
    fn test_file_named_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path(), "records").unwrap();
        store.write("job-1", &record("job-1", 1)).unwrap();

        assert!(dir.path().join("database/records/job-1").is_file());
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path(), "records").unwrap();
        store.write("a", &record("a", 1)).unwrap();

        store.delete("a").unwrap();
        assert!(store.load_all::<Record>().unwrap().is_empty());
        assert!(store.delete("a").is_err());
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path(), "records").unwrap();
        store.write("a", &record("a", 1)).unwrap();

        store.clear().unwrap();
        assert!(store.directory().is_dir());
        assert!(store.load_all::<Record>().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(dir.path(), "records").unwrap();
        store.write("good", &record("good", 1)).unwrap();
        std::fs::write(store.directory().join("bad"), "{not json").unwrap();

        let all: Vec<Record> = store.load_all().unwrap();
        assert_eq!(all, vec![record("good", 1)]);
    }

    #[test]
    fn test_hostile_ids_stay_inside_directory() {
        assert_eq!(file_name_for("weather.v2"), "weather.v2");
        assert_eq!(file_name_for("../etc"), "%2E.%2Fetc");
        assert_eq!(file_name_for("a/b"), "a%2Fb");
        assert_eq!(file_name_for(""), "%00");
    }
}
