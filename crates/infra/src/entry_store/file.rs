use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use kbase_core::{Entry, EntryDraft, EntryId, TenantId};

use super::r#trait::{apply_delete, apply_upsert, EntryStore, EntryStoreError};
use crate::fs::{read_optional, write_atomic};

const ENTRIES_FILE: &str = "entries.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct EntriesDocument {
    entries: Vec<Entry>,
}

/// File-backed entry store.
///
/// Layout: `<root>/<tenant_id>/entries.json`, one document per tenant holding
/// the ordered entry list. Every mutation rewrites the document atomically
/// (temp file + rename), so a crash leaves the previous version intact.
#[derive(Debug)]
pub struct FileEntryStore {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileEntryStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, EntryStoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| storage(&root, e))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn document_path(&self, tenant_id: TenantId) -> PathBuf {
        self.root.join(tenant_id.to_string()).join(ENTRIES_FILE)
    }

    fn load(&self, tenant_id: TenantId) -> Result<EntriesDocument, EntryStoreError> {
        let path = self.document_path(tenant_id);
        match read_optional(&path).map_err(|e| storage(&path, e))? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| storage(&path, e)),
            None => Ok(EntriesDocument::default()),
        }
    }

    fn save(&self, tenant_id: TenantId, doc: &EntriesDocument) -> Result<(), EntryStoreError> {
        let path = self.document_path(tenant_id);
        let bytes = serde_json::to_vec_pretty(doc).map_err(|e| storage(&path, e))?;
        write_atomic(&path, &bytes).map_err(|e| storage(&path, e))
    }

    fn mutate<T>(
        &self,
        tenant_id: TenantId,
        f: impl FnOnce(&mut Vec<Entry>) -> Result<T, EntryStoreError>,
    ) -> Result<T, EntryStoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| EntryStoreError::Storage("lock poisoned".to_string()))?;

        let mut doc = self.load(tenant_id)?;
        let out = f(&mut doc.entries)?;
        self.save(tenant_id, &doc)?;
        Ok(out)
    }
}

fn storage(path: &Path, err: impl std::fmt::Display) -> EntryStoreError {
    EntryStoreError::Storage(format!("{}: {err}", path.display()))
}

impl EntryStore for FileEntryStore {
    fn fetch(&self, tenant_id: TenantId) -> Result<Vec<Entry>, EntryStoreError> {
        Ok(self.load(tenant_id)?.entries)
    }

    fn upsert(&self, tenant_id: TenantId, draft: &EntryDraft) -> Result<EntryId, EntryStoreError> {
        // Validate before taking the lock or touching disk.
        draft.validate()?;
        self.mutate(tenant_id, |entries| apply_upsert(entries, draft))
    }

    fn delete(&self, tenant_id: TenantId, entry_id: &EntryId) -> Result<(), EntryStoreError> {
        self.mutate(tenant_id, |entries| apply_delete(entries, entry_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = TenantId::new();

        let id = {
            let store = FileEntryStore::open(dir.path()).unwrap();
            store.upsert(tenant, &EntryDraft::new("hours?", "9-5")).unwrap()
        };

        let store = FileEntryStore::open(dir.path()).unwrap();
        let entries = store.fetch(tenant).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].answer, "9-5");
    }

    #[test]
    fn update_and_delete_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEntryStore::open(dir.path()).unwrap();
        let tenant = TenantId::new();

        let id = store.upsert(tenant, &EntryDraft::new("q", "a")).unwrap();
        store
            .upsert(tenant, &EntryDraft::new("q", "a2").with_id(id.as_str()))
            .unwrap();
        assert_eq!(store.count(tenant).unwrap(), 1);
        assert_eq!(store.get(tenant, &id).unwrap().unwrap().answer, "a2");

        store.delete(tenant, &id).unwrap();
        assert!(matches!(
            store.delete(tenant, &id),
            Err(EntryStoreError::NotFound(_))
        ));
        assert_eq!(store.count(tenant).unwrap(), 0);
    }

    #[test]
    fn invalid_upsert_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEntryStore::open(dir.path()).unwrap();
        let tenant = TenantId::new();

        assert!(store.upsert(tenant, &EntryDraft::new("q", "")).is_err());
        assert!(!dir.path().join(tenant.to_string()).join(ENTRIES_FILE).exists());
    }

    #[test]
    fn corrupt_document_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEntryStore::open(dir.path()).unwrap();
        let tenant = TenantId::new();

        let path = dir.path().join(tenant.to_string()).join(ENTRIES_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(store.fetch(tenant), Err(EntryStoreError::Storage(_))));
    }
}
