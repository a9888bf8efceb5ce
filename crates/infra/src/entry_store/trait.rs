use std::sync::Arc;

use thiserror::Error;

use kbase_core::{DomainError, Entity, Entry, EntryDraft, EntryId, TenantId};

/// Entry store operation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntryStoreError {
    /// The payload was rejected before anything was written.
    #[error("invalid entry: {0}")]
    Validation(String),

    #[error("entry not found: {0}")]
    NotFound(EntryId),

    /// Persistence failed; no partial write is visible.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<DomainError> for EntryStoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
        }
    }
}

/// Tenant-scoped, durable CRUD over knowledge entries.
///
/// ## Semantics
///
/// - `fetch` returns entries in insertion order; an unknown tenant has an empty corpus.
/// - `upsert` validates first, then either replaces the entry with the same id
///   in place (keeping its position) or appends a new one. A draft without id
///   gets a freshly generated one.
/// - `delete` of an unknown id is `NotFound`, including a second delete of the same id.
///
/// Mutations never trigger training; training is always requested explicitly.
pub trait EntryStore: Send + Sync {
    /// All entries of the tenant, in insertion order.
    fn fetch(&self, tenant_id: TenantId) -> Result<Vec<Entry>, EntryStoreError>;

    /// Create or replace an entry. Returns the id it is stored under.
    fn upsert(&self, tenant_id: TenantId, draft: &EntryDraft) -> Result<EntryId, EntryStoreError>;

    /// Remove an entry by id.
    fn delete(&self, tenant_id: TenantId, entry_id: &EntryId) -> Result<(), EntryStoreError>;

    fn get(&self, tenant_id: TenantId, entry_id: &EntryId) -> Result<Option<Entry>, EntryStoreError> {
        Ok(self.fetch(tenant_id)?.into_iter().find(|e| e.id() == entry_id))
    }

    fn count(&self, tenant_id: TenantId) -> Result<usize, EntryStoreError> {
        Ok(self.fetch(tenant_id)?.len())
    }
}

impl<S> EntryStore for Arc<S>
where
    S: EntryStore + ?Sized,
{
    fn fetch(&self, tenant_id: TenantId) -> Result<Vec<Entry>, EntryStoreError> {
        (**self).fetch(tenant_id)
    }

    fn upsert(&self, tenant_id: TenantId, draft: &EntryDraft) -> Result<EntryId, EntryStoreError> {
        (**self).upsert(tenant_id, draft)
    }

    fn delete(&self, tenant_id: TenantId, entry_id: &EntryId) -> Result<(), EntryStoreError> {
        (**self).delete(tenant_id, entry_id)
    }

    fn get(&self, tenant_id: TenantId, entry_id: &EntryId) -> Result<Option<Entry>, EntryStoreError> {
        (**self).get(tenant_id, entry_id)
    }

    fn count(&self, tenant_id: TenantId) -> Result<usize, EntryStoreError> {
        (**self).count(tenant_id)
    }
}

/// Apply a validated upsert to an ordered entry list.
///
/// Shared by the store implementations so both honour the same ordering rules.
pub(crate) fn apply_upsert(entries: &mut Vec<Entry>, draft: &EntryDraft) -> Result<EntryId, EntryStoreError> {
    let valid = draft.validate()?;
    let id = valid.id.clone().unwrap_or_else(EntryId::generate);
    let entry = valid.into_entry(id.clone());

    match entries.iter_mut().find(|e| e.id() == &id) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
    Ok(id)
}

/// Remove `entry_id` from an ordered entry list.
pub(crate) fn apply_delete(entries: &mut Vec<Entry>, entry_id: &EntryId) -> Result<(), EntryStoreError> {
    let pos = entries
        .iter()
        .position(|e| e.id() == entry_id)
        .ok_or_else(|| EntryStoreError::NotFound(entry_id.clone()))?;
    entries.remove(pos);
    Ok(())
}
