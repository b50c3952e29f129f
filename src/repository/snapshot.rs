//! Repository snapshot persistence
//!
//! Lets an in-memory repository survive process restarts. The repository
//! loads its snapshot on creation and saves after every mutation.

use super::Entity;
use crate::error::{CoreError, Result};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Trait for persisting a repository's full contents
pub trait SnapshotStore<E: Entity>: Send + Sync {
    /// Save all entities, keyed by id
    fn save(&self, entities: &HashMap<String, E>) -> Result<()>;

    /// Load all entities, keyed by id
    fn load(&self) -> Result<HashMap<String, E>>;
}

/// JSON file snapshot store
///
/// Writes atomically via temp file + rename.
pub struct FileSnapshotStore<E> {
    path: PathBuf,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> FileSnapshotStore<E> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _entity: PhantomData,
        }
    }

    /// Snapshot file for the entity kind inside `dir` (`<dir>/<kind>.json`)
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(format!("{}.json", E::KIND)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<E: Entity> SnapshotStore<E> for FileSnapshotStore<E> {
    fn save(&self, entities: &HashMap<String, E>) -> Result<()> {
        let json = serde_json::to_string_pretty(entities)?;
        let tmp_path = self.path.with_extension("tmp");

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::Storage(format!(
                    "Failed to create snapshot directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        std::fs::write(&tmp_path, json).map_err(|e| {
            CoreError::Storage(format!(
                "Failed to write snapshot {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            CoreError::Storage(format!(
                "Failed to rename snapshot {} → {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(
            path = %self.path.display(),
            kind = E::KIND,
            count = entities.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<HashMap<String, E>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            CoreError::Storage(format!(
                "Failed to read snapshot {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let entities: HashMap<String, E> = serde_json::from_str(&json).map_err(|e| {
            CoreError::Storage(format!(
                "Failed to parse snapshot {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(
            path = %self.path.display(),
            kind = E::KIND,
            count = entities.len(),
            "Snapshot loaded"
        );
        Ok(entities)
    }
}

/// In-memory snapshot store for tests
pub struct MemorySnapshotStore<E> {
    state: std::sync::RwLock<HashMap<String, E>>,
}

impl<E> Default for MemorySnapshotStore<E> {
    fn default() -> Self {
        Self {
            state: std::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl<E: Entity> SnapshotStore<E> for MemorySnapshotStore<E> {
    fn save(&self, entities: &HashMap<String, E>) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| CoreError::Storage(format!("Failed to acquire snapshot lock: {}", e)))?;
        *state = entities.clone();
        Ok(())
    }

    fn load(&self) -> Result<HashMap<String, E>> {
        let state = self
            .state
            .read()
            .map_err(|e| CoreError::Storage(format!("Failed to acquire snapshot lock: {}", e)))?;
        Ok(state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{NewReport, Report, ReportKind};

    fn sample() -> HashMap<String, Report> {
        let report = Report::new(NewReport {
            org_id: "org_1".into(),
            name: "Weekly cash".into(),
            kind: ReportKind::Finance,
            description: None,
            parameters: Default::default(),
        });
        let mut map = HashMap::new();
        map.insert(report.id.clone(), report);
        map
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("backstage-snapshot-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_snapshot_save_load() {
        let store = MemorySnapshotStore::<Report>::default();
        assert!(store.load().unwrap().is_empty());

        let entities = sample();
        store.save(&entities).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.values().next().unwrap().name, "Weekly cash");
    }

    #[test]
    fn test_file_snapshot_save_load() {
        let dir = temp_dir();
        let store = FileSnapshotStore::<Report>::in_dir(&dir);
        assert!(store.path().ends_with("report.json"));

        let entities = sample();
        store.save(&entities).unwrap();
        assert!(store.path().exists());
        assert!(!store.path().with_extension("tmp").exists());

        let loaded = store.load().unwrap();
        let id = entities.keys().next().unwrap();
        assert_eq!(loaded[id], entities[id]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_snapshot_missing_is_empty() {
        let store = FileSnapshotStore::<Report>::new("/tmp/nonexistent-backstage-snapshot.json");
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_snapshot_corrupt_is_error() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let store = FileSnapshotStore::<Report>::in_dir(&dir);
        std::fs::write(store.path(), "[oops").unwrap();

        assert!(matches!(store.load(), Err(CoreError::Storage(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
