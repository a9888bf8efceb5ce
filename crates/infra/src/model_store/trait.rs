use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kbase_ai::ModelArtifact;
use kbase_core::TenantId;

/// An immutable, versioned model artifact.
///
/// ## Versions
///
/// Versions are assigned by the store on write and are:
/// - **Tenant-scoped**: each tenant counts from 1
/// - **Monotonically increasing**: a new write is always `latest + 1`
/// - **Immutable**: a stored version is never rewritten or removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredModel {
    pub tenant_id: TenantId,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub artifact: ModelArtifact,
}

impl StoredModel {
    /// Number of entries the model was trained on.
    pub fn corpus_size(&self) -> usize {
        self.artifact.document_count
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelStoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Append-only, tenant-scoped model store.
///
/// ## Write Semantics
///
/// `store_model()`:
/// - Assigns the next version for the tenant
/// - Persists atomically: a crash mid-write never exposes a partial version
/// - Makes the new version "latest" only once the write has fully succeeded
///
/// There is no update or delete, so a failed training run can never damage a
/// previously working model.
///
/// ## Read Semantics
///
/// `load_latest()` returns `Ok(None)` for a tenant that was never trained.
/// That is the expected state of a fresh tenant, not an error.
pub trait ModelStore: Send + Sync {
    fn store_model(&self, tenant_id: TenantId, artifact: ModelArtifact) -> Result<StoredModel, ModelStoreError>;

    /// Highest stored version for the tenant, if any.
    fn load_latest(&self, tenant_id: TenantId) -> Result<Option<StoredModel>, ModelStoreError>;

    fn load_version(&self, tenant_id: TenantId, version: u64) -> Result<Option<StoredModel>, ModelStoreError>;

    /// All stored versions, ascending.
    fn list_versions(&self, tenant_id: TenantId) -> Result<Vec<u64>, ModelStoreError>;
}

impl<S> ModelStore for Arc<S>
where
    S: ModelStore + ?Sized,
{
    fn store_model(&self, tenant_id: TenantId, artifact: ModelArtifact) -> Result<StoredModel, ModelStoreError> {
        (**self).store_model(tenant_id, artifact)
    }

    fn load_latest(&self, tenant_id: TenantId) -> Result<Option<StoredModel>, ModelStoreError> {
        (**self).load_latest(tenant_id)
    }

    fn load_version(&self, tenant_id: TenantId, version: u64) -> Result<Option<StoredModel>, ModelStoreError> {
        (**self).load_version(tenant_id, version)
    }

    fn list_versions(&self, tenant_id: TenantId) -> Result<Vec<u64>, ModelStoreError> {
        (**self).list_versions(tenant_id)
    }
}
