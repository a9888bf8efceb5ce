use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use kbase_ai::ModelArtifact;
use kbase_core::TenantId;

use super::r#trait::{ModelStore, ModelStoreError, StoredModel};
use crate::fs::{read_optional, write_atomic};

const MODELS_DIR: &str = "models";
const MODEL_EXTENSION: &str = "json";

/// File-backed append-only model store.
///
/// Layout: `<root>/<tenant_id>/models/<version>.json`, version zero-padded so
/// directory listings sort naturally. A version file only appears once its
/// contents are fully written (temp file + rename); stray temp files from a
/// crash are ignored.
#[derive(Debug)]
pub struct FileModelStore {
    root: PathBuf,
    // Version assignment must not race between writers in this process.
    write_lock: Mutex<()>,
}

impl FileModelStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, ModelStoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| storage(&root, e))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn models_dir(&self, tenant_id: TenantId) -> PathBuf {
        self.root.join(tenant_id.to_string()).join(MODELS_DIR)
    }

    fn version_path(&self, tenant_id: TenantId, version: u64) -> PathBuf {
        self.models_dir(tenant_id)
            .join(format!("{version:020}.{MODEL_EXTENSION}"))
    }
}

fn storage(path: &Path, err: impl std::fmt::Display) -> ModelStoreError {
    ModelStoreError::Storage(format!("{}: {err}", path.display()))
}

impl ModelStore for FileModelStore {
    fn store_model(&self, tenant_id: TenantId, artifact: ModelArtifact) -> Result<StoredModel, ModelStoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ModelStoreError::Storage("lock poisoned".to_string()))?;

        let next = self.list_versions(tenant_id)?.last().copied().unwrap_or(0) + 1;
        let stored = StoredModel {
            tenant_id,
            version: next,
            created_at: Utc::now(),
            artifact,
        };

        let bytes = serde_json::to_vec(&stored).map_err(|e| ModelStoreError::Serialization(e.to_string()))?;
        let path = self.version_path(tenant_id, next);
        write_atomic(&path, &bytes).map_err(|e| storage(&path, e))?;

        Ok(stored)
    }

    fn load_latest(&self, tenant_id: TenantId) -> Result<Option<StoredModel>, ModelStoreError> {
        match self.list_versions(tenant_id)?.last() {
            Some(version) => self.load_version(tenant_id, *version),
            None => Ok(None),
        }
    }

    fn load_version(&self, tenant_id: TenantId, version: u64) -> Result<Option<StoredModel>, ModelStoreError> {
        let path = self.version_path(tenant_id, version);
        match read_optional(&path).map_err(|e| storage(&path, e))? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ModelStoreError::Serialization(format!("{}: {e}", path.display()))),
            None => Ok(None),
        }
    }

    fn list_versions(&self, tenant_id: TenantId) -> Result<Vec<u64>, ModelStoreError> {
        let dir = self.models_dir(tenant_id);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage(&dir, e)),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| storage(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MODEL_EXTENSION) {
                continue;
            }
            if let Some(version) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(n: usize) -> ModelArtifact {
        ModelArtifact::new("test", 1, n, serde_json::json!({ "n": n }))
    }

    #[test]
    fn latest_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = TenantId::new();
        {
            let store = FileModelStore::open(dir.path()).unwrap();
            store.store_model(tenant, artifact(1)).unwrap();
            store.store_model(tenant, artifact(2)).unwrap();
        }

        let store = FileModelStore::open(dir.path()).unwrap();
        let latest = store.load_latest(tenant).unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.artifact, artifact(2));
        assert_eq!(store.list_versions(tenant).unwrap(), vec![1, 2]);
    }

    #[test]
    fn never_trained_tenant_has_no_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        assert!(store.load_latest(TenantId::new()).unwrap().is_none());
    }

    #[test]
    fn interrupted_write_is_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::open(dir.path()).unwrap();
        let tenant = TenantId::new();
        store.store_model(tenant, artifact(1)).unwrap();

        // Simulate a crash after the temp file was written but before rename.
        let tmp = store.version_path(tenant, 2).with_extension(crate::fs::TMP_EXTENSION);
        std::fs::write(&tmp, b"{ partial").unwrap();

        assert_eq!(store.load_latest(tenant).unwrap().unwrap().version, 1);

        // The next write still claims version 2 and replaces the leftover.
        assert_eq!(store.store_model(tenant, artifact(2)).unwrap().version, 2);
        assert_eq!(store.load_latest(tenant).unwrap().unwrap().version, 2);
    }
}
