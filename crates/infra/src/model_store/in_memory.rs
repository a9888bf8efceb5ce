use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use kbase_ai::ModelArtifact;
use kbase_core::TenantId;

use super::r#trait::{ModelStore, ModelStoreError, StoredModel};

/// In-memory append-only model store.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    models: RwLock<HashMap<TenantId, Vec<StoredModel>>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> ModelStoreError {
    ModelStoreError::Storage("lock poisoned".to_string())
}

impl ModelStore for InMemoryModelStore {
    fn store_model(&self, tenant_id: TenantId, artifact: ModelArtifact) -> Result<StoredModel, ModelStoreError> {
        let mut models = self.models.write().map_err(|_| poisoned())?;
        let versions = models.entry(tenant_id).or_default();
        let next = versions.last().map(|m| m.version).unwrap_or(0) + 1;

        let stored = StoredModel {
            tenant_id,
            version: next,
            created_at: Utc::now(),
            artifact,
        };
        versions.push(stored.clone());
        Ok(stored)
    }

    fn load_latest(&self, tenant_id: TenantId) -> Result<Option<StoredModel>, ModelStoreError> {
        let models = self.models.read().map_err(|_| poisoned())?;
        Ok(models.get(&tenant_id).and_then(|v| v.last()).cloned())
    }

    fn load_version(&self, tenant_id: TenantId, version: u64) -> Result<Option<StoredModel>, ModelStoreError> {
        let models = self.models.read().map_err(|_| poisoned())?;
        Ok(models
            .get(&tenant_id)
            .and_then(|v| v.iter().find(|m| m.version == version))
            .cloned())
    }

    fn list_versions(&self, tenant_id: TenantId) -> Result<Vec<u64>, ModelStoreError> {
        let models = self.models.read().map_err(|_| poisoned())?;
        Ok(models
            .get(&tenant_id)
            .map(|v| v.iter().map(|m| m.version).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn artifact(n: usize) -> ModelArtifact {
        ModelArtifact::new("test", 1, n, serde_json::json!({ "n": n }))
    }

    #[test]
    fn never_trained_tenant_has_no_latest() {
        let store = InMemoryModelStore::new();
        assert!(store.load_latest(TenantId::new()).unwrap().is_none());
    }

    #[test]
    fn versions_start_at_one_and_are_per_tenant() {
        let store = InMemoryModelStore::new();
        let t1 = TenantId::new();
        let t2 = TenantId::new();

        assert_eq!(store.store_model(t1, artifact(1)).unwrap().version, 1);
        assert_eq!(store.store_model(t1, artifact(2)).unwrap().version, 2);
        assert_eq!(store.store_model(t2, artifact(3)).unwrap().version, 1);

        assert_eq!(store.list_versions(t1).unwrap(), vec![1, 2]);
        let v1 = store.load_version(t1, 1).unwrap().unwrap();
        assert_eq!(v1.corpus_size(), 1);
    }

    proptest! {
        /// Property: after any number of writes, `load_latest` returns the
        /// version just stored, and it is >= every earlier version.
        #[test]
        fn latest_is_monotonic(writes in 1usize..20) {
            let store = InMemoryModelStore::new();
            let tenant = TenantId::new();
            let mut previous = 0u64;

            for i in 0..writes {
                let stored = store.store_model(tenant, artifact(i)).unwrap();
                let latest = store.load_latest(tenant).unwrap().unwrap();
                prop_assert_eq!(latest.version, stored.version);
                prop_assert!(latest.version > previous);
                previous = latest.version;
            }
        }
    }
}
