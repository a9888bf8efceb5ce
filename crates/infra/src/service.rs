//! The knowledge base facade: one entry point for entry CRUD, training, and prediction.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use kbase_ai::{ModelCapability, ModelError, TfIdfModel};
use kbase_core::{DomainError, Entry, EntryDraft, EntryId, TenantId};

use crate::config::KbConfig;
use crate::entry_store::{EntryStore, EntryStoreError, FileEntryStore, InMemoryEntryStore};
use crate::model_store::{FileModelStore, InMemoryModelStore, ModelStore, ModelStoreError};
use crate::prediction::{EvaluationReport, EvaluationSample, Prediction, PredictionError, PredictionService};
use crate::tenant::TenantRegistry;
use crate::training::{JobHandle, JobId, TrainingError, TrainingManager, TrainingNotifier, TrainingStatus};

/// Knowledge base operation error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum KbError {
    /// Input rejected before anything changed.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("tenant {0} is already training")]
    AlreadyTraining(TenantId),

    #[error("tenant {0} is not training")]
    NotTraining(TenantId),

    #[error("training disabled on this node")]
    TrainingDisabled,

    #[error("no model available for tenant {0}")]
    NoModelAvailable(TenantId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Model(ModelError),
}

impl From<DomainError> for KbError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => KbError::Validation(msg),
        }
    }
}

impl From<EntryStoreError> for KbError {
    fn from(value: EntryStoreError) -> Self {
        match value {
            EntryStoreError::Validation(msg) => KbError::Validation(msg),
            EntryStoreError::NotFound(id) => KbError::NotFound(format!("entry {id}")),
            EntryStoreError::Storage(msg) => KbError::Storage(msg),
        }
    }
}

impl From<ModelStoreError> for KbError {
    fn from(value: ModelStoreError) -> Self {
        KbError::Storage(value.to_string())
    }
}

impl From<TrainingError> for KbError {
    fn from(value: TrainingError) -> Self {
        match value {
            TrainingError::Disabled => KbError::TrainingDisabled,
            TrainingError::AlreadyTraining(t) => KbError::AlreadyTraining(t),
            TrainingError::NotTraining(t) => KbError::NotTraining(t),
            TrainingError::Storage(msg) => KbError::Storage(msg),
        }
    }
}

impl From<PredictionError> for KbError {
    fn from(value: PredictionError) -> Self {
        match value {
            PredictionError::NoModelAvailable(t) => KbError::NoModelAvailable(t),
            PredictionError::Storage(msg) => KbError::Storage(msg),
            PredictionError::Model(e) => KbError::Model(e),
        }
    }
}

/// Per-tenant knowledge base.
///
/// Entry mutations never trigger training: callers edit entries, then ask for
/// a training run explicitly. Predictions are served from the last committed
/// model while a new one trains.
pub struct KnowledgeBase {
    entries: Arc<dyn EntryStore>,
    models: Arc<dyn ModelStore>,
    training: TrainingManager,
    prediction: PredictionService,
}

impl KnowledgeBase {
    pub fn new(
        config: &KbConfig,
        entries: Arc<dyn EntryStore>,
        models: Arc<dyn ModelStore>,
        model: Arc<dyn ModelCapability>,
    ) -> Self {
        let registry = Arc::new(TenantRegistry::new());
        let training = TrainingManager::new(registry.clone(), entries.clone(), models.clone(), model.clone())
            .with_training_disabled(config.disable_training)
            .with_max_duration(config.max_training_duration);
        let prediction =
            PredictionService::new(registry, models.clone(), model).with_limit(config.prediction_limit);

        Self {
            entries,
            models,
            training,
            prediction,
        }
    }

    /// In-memory stores with the bundled TF-IDF model.
    pub fn in_memory(config: &KbConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryEntryStore::new()),
            Arc::new(InMemoryModelStore::new()),
            Arc::new(TfIdfModel::new()),
        )
    }

    /// Stores under `config.data_dir` (in memory when unset), with the bundled TF-IDF model.
    ///
    /// Entries and models share the per-tenant directory:
    /// `<data_dir>/<tenant>/entries.json` and `<data_dir>/<tenant>/models/`.
    pub fn open(config: &KbConfig) -> Result<Self, KbError> {
        let Some(dir) = &config.data_dir else {
            return Ok(Self::in_memory(config));
        };
        info!(data_dir = %dir.display(), "opening file-backed knowledge base");
        Ok(Self::new(
            config,
            Arc::new(FileEntryStore::open(dir)?),
            Arc::new(FileModelStore::open(dir)?),
            Arc::new(TfIdfModel::new()),
        ))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn TrainingNotifier>) -> Self {
        self.training = self.training.with_notifier(notifier);
        self
    }

    pub fn list_entries(&self, tenant_id: TenantId) -> Result<Vec<Entry>, KbError> {
        Ok(self.entries.fetch(tenant_id)?)
    }

    pub fn get_entry(&self, tenant_id: TenantId, entry_id: &EntryId) -> Result<Entry, KbError> {
        self.entries
            .get(tenant_id, entry_id)?
            .ok_or_else(|| KbError::NotFound(format!("entry {entry_id}")))
    }

    pub fn upsert_entry(&self, tenant_id: TenantId, draft: &EntryDraft) -> Result<EntryId, KbError> {
        let id = self.entries.upsert(tenant_id, draft)?;
        debug!(tenant_id = %tenant_id, entry_id = %id, "entry saved");
        Ok(id)
    }

    pub fn delete_entry(&self, tenant_id: TenantId, entry_id: &EntryId) -> Result<(), KbError> {
        self.entries.delete(tenant_id, entry_id)?;
        debug!(tenant_id = %tenant_id, entry_id = %entry_id, "entry deleted");
        Ok(())
    }

    pub async fn start_training(&self, tenant_id: TenantId) -> Result<JobHandle, KbError> {
        Ok(self.training.start(tenant_id).await?)
    }

    pub async fn start_training_by(
        &self,
        tenant_id: TenantId,
        started_by: impl Into<String>,
    ) -> Result<JobHandle, KbError> {
        Ok(self.training.start_by(tenant_id, Some(started_by.into())).await?)
    }

    pub fn cancel_training(&self, tenant_id: TenantId) -> Result<JobId, KbError> {
        Ok(self.training.cancel(tenant_id)?)
    }

    pub fn training_status(&self, tenant_id: TenantId) -> TrainingStatus {
        self.training.status(tenant_id)
    }

    /// Stored model versions, ascending.
    pub fn model_versions(&self, tenant_id: TenantId) -> Result<Vec<u64>, KbError> {
        Ok(self.models.list_versions(tenant_id)?)
    }

    pub async fn predict(
        &self,
        tenant_id: TenantId,
        query: &str,
        language: &str,
    ) -> Result<Vec<Prediction>, KbError> {
        Ok(self.prediction.predict(tenant_id, query, language).await?)
    }

    pub async fn evaluate(
        &self,
        tenant_id: TenantId,
        samples: &[EvaluationSample],
        language: &str,
    ) -> Result<EvaluationReport, KbError> {
        Ok(self.prediction.evaluate(tenant_id, samples, language).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::JobState;

    #[test]
    fn errors_map_to_facade_kinds() {
        let tenant = TenantId::new();
        assert_eq!(KbError::from(TrainingError::Disabled), KbError::TrainingDisabled);
        assert_eq!(
            KbError::from(TrainingError::AlreadyTraining(tenant)),
            KbError::AlreadyTraining(tenant)
        );
        assert_eq!(
            KbError::from(PredictionError::NoModelAvailable(tenant)),
            KbError::NoModelAvailable(tenant)
        );
        assert!(matches!(
            KbError::from(EntryStoreError::NotFound(EntryId::parse("faq-1").unwrap())),
            KbError::NotFound(msg) if msg.contains("faq-1")
        ));
        assert!(matches!(
            KbError::from(DomainError::validation("question is required")),
            KbError::Validation(_)
        ));
        assert_eq!(
            KbError::from(DomainError::invalid_id("bad id")),
            KbError::Validation("bad id".to_string())
        );
    }

    #[tokio::test]
    async fn rejects_invalid_entry_without_writing() {
        let kb = KnowledgeBase::in_memory(&KbConfig::default());
        let tenant = TenantId::new();

        let err = kb.upsert_entry(tenant, &EntryDraft::new("  ", "answer")).unwrap_err();
        assert!(matches!(err, KbError::Validation(_)));
        assert!(kb.list_entries(tenant).unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_node_refuses_training() {
        let kb = KnowledgeBase::in_memory(&KbConfig::default().with_training_disabled(true));
        let tenant = TenantId::new();

        assert_eq!(kb.start_training(tenant).await.unwrap_err(), KbError::TrainingDisabled);
        assert_eq!(kb.cancel_training(tenant).unwrap_err(), KbError::TrainingDisabled);
        assert_eq!(kb.training_status(tenant).state, JobState::Idle);
    }

    #[tokio::test]
    async fn emptied_corpus_retrains_to_a_model_that_matches_nothing() {
        let kb = KnowledgeBase::in_memory(&KbConfig::default());
        let tenant = TenantId::new();

        let id = kb.upsert_entry(tenant, &EntryDraft::new("hours?", "9-5")).unwrap();
        kb.start_training(tenant).await.unwrap().wait().await.unwrap();
        assert_eq!(kb.predict(tenant, "hours?", "en").await.unwrap().len(), 1);

        kb.delete_entry(tenant, &id).unwrap();
        let job = kb.start_training(tenant).await.unwrap().wait().await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.model_version, Some(2));
        assert_eq!(job.corpus_size, 0);
        assert!(kb.predict(tenant, "hours?", "en").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn never_populated_tenant_trains_an_empty_model() {
        let kb = KnowledgeBase::in_memory(&KbConfig::default());
        let tenant = TenantId::new();

        let job = kb.start_training(tenant).await.unwrap().wait().await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(kb.model_versions(tenant).unwrap(), vec![1]);
        assert!(kb.predict(tenant, "anything", "en").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_without_data_dir_is_in_memory() {
        let kb = KnowledgeBase::open(&KbConfig::default()).unwrap();
        let tenant = TenantId::new();
        kb.upsert_entry(tenant, &EntryDraft::new("q?", "a")).unwrap();
        assert_eq!(kb.list_entries(tenant).unwrap().len(), 1);
    }
}
