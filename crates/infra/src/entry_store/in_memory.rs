use std::collections::HashMap;
use std::sync::RwLock;

use kbase_core::{Entry, EntryDraft, EntryId, TenantId};

use super::r#trait::{apply_delete, apply_upsert, EntryStore, EntryStoreError};

/// In-memory entry store.
///
/// Intended for tests/dev. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryEntryStore {
    tenants: RwLock<HashMap<TenantId, Vec<Entry>>>,
}

impl InMemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> EntryStoreError {
    EntryStoreError::Storage("lock poisoned".to_string())
}

impl EntryStore for InMemoryEntryStore {
    fn fetch(&self, tenant_id: TenantId) -> Result<Vec<Entry>, EntryStoreError> {
        let tenants = self.tenants.read().map_err(|_| poisoned())?;
        Ok(tenants.get(&tenant_id).cloned().unwrap_or_default())
    }

    fn upsert(&self, tenant_id: TenantId, draft: &EntryDraft) -> Result<EntryId, EntryStoreError> {
        let mut tenants = self.tenants.write().map_err(|_| poisoned())?;
        apply_upsert(tenants.entry(tenant_id).or_default(), draft)
    }

    fn delete(&self, tenant_id: TenantId, entry_id: &EntryId) -> Result<(), EntryStoreError> {
        let mut tenants = self.tenants.write().map_err(|_| poisoned())?;
        match tenants.get_mut(&tenant_id) {
            Some(entries) => apply_delete(entries, entry_id),
            None => Err(EntryStoreError::NotFound(entry_id.clone())),
        }
    }
}
