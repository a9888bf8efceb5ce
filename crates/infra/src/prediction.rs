//! Query path: rank a tenant's entries against its active model.
//!
//! Reads only the tenant's active model pointer, never the training job state,
//! so predictions keep being served while a new model trains. When the pointer
//! is unset (fresh process), the latest stored model is loaded once and
//! installed through the tenant context.
//!
//! Artifacts are decoded once per tenant and model version; later queries
//! against the same version reuse the decoded model.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use kbase_ai::{LoadedModel, ModelCapability, ModelError};
use kbase_core::{EntryId, TenantId};

use crate::model_store::{ModelStore, ModelStoreError, StoredModel};
use crate::tenant::TenantRegistry;

pub const DEFAULT_PREDICTION_LIMIT: usize = 10;

/// One ranked answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub entry_id: EntryId,
    pub question: String,
    /// The matched entry's answer.
    pub content: String,
    pub confidence: f64,
    /// Model version that produced the ranking.
    pub model_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSample {
    pub question: String,
    pub expected_answer: String,
}

impl EvaluationSample {
    pub fn new(question: impl Into<String>, expected_answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            expected_answer: expected_answer.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedSample {
    pub sample: EvaluationSample,
    /// Top-ranked prediction, if anything matched.
    pub top: Option<Prediction>,
    pub hit: bool,
}

/// Batch prediction results over labelled samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub model_version: u64,
    pub results: Vec<EvaluatedSample>,
}

impl EvaluationReport {
    pub fn hits(&self) -> usize {
        self.results.iter().filter(|r| r.hit).count()
    }

    /// Share of samples whose top answer matched, 0 for an empty batch.
    pub fn hit_rate(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.hits() as f64 / self.results.len() as f64
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PredictionError {
    /// The tenant was never trained successfully.
    #[error("no model available for tenant {0}")]
    NoModelAvailable(TenantId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<ModelStoreError> for PredictionError {
    fn from(value: ModelStoreError) -> Self {
        Self::Storage(value.to_string())
    }
}

pub struct PredictionService {
    registry: Arc<TenantRegistry>,
    models: Arc<dyn ModelStore>,
    model: Arc<dyn ModelCapability>,
    limit: usize,
    // Last decoded model per tenant, keyed by version.
    loaded: Mutex<HashMap<TenantId, (u64, Arc<dyn LoadedModel>)>>,
}

impl PredictionService {
    pub fn new(
        registry: Arc<TenantRegistry>,
        models: Arc<dyn ModelStore>,
        model: Arc<dyn ModelCapability>,
    ) -> Self {
        Self {
            registry,
            models,
            model,
            limit: DEFAULT_PREDICTION_LIMIT,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Maximum number of ranked results (at least 1).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Rank the tenant's entries against `query`, best first.
    ///
    /// A blank query yields no results.
    pub async fn predict(
        &self,
        tenant_id: TenantId,
        query: &str,
        language: &str,
    ) -> Result<Vec<Prediction>, PredictionError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let stored = self.active_model(tenant_id).await?;
        let model = self.loaded(&stored)?;
        rank(model.as_ref(), stored.version, query, language, self.limit)
    }

    /// Predict each sample's question and compare the top answer to the expected one.
    ///
    /// Answers match when equal after trimming and ignoring case.
    pub async fn evaluate(
        &self,
        tenant_id: TenantId,
        samples: &[EvaluationSample],
        language: &str,
    ) -> Result<EvaluationReport, PredictionError> {
        let stored = self.active_model(tenant_id).await?;
        let model = self.loaded(&stored)?;

        let mut results = Vec::with_capacity(samples.len());
        for sample in samples {
            let top = if sample.question.trim().is_empty() {
                None
            } else {
                rank(model.as_ref(), stored.version, &sample.question, language, 1)?
                    .into_iter()
                    .next()
            };
            let hit = top
                .as_ref()
                .is_some_and(|p| same_answer(&p.content, &sample.expected_answer));
            results.push(EvaluatedSample {
                sample: sample.clone(),
                top,
                hit,
            });
        }

        debug!(
            tenant_id = %tenant_id,
            model_version = stored.version,
            samples = results.len(),
            "evaluation finished"
        );
        Ok(EvaluationReport {
            model_version: stored.version,
            results,
        })
    }

    /// The decoded form of `stored`, decoding it on first use.
    fn loaded(&self, stored: &StoredModel) -> Result<Arc<dyn LoadedModel>, PredictionError> {
        let tenant_id = stored.tenant_id;
        let cached = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tenant_id)
            .filter(|(version, _)| *version == stored.version)
            .map(|(_, model)| model.clone());
        if let Some(model) = cached {
            return Ok(model);
        }

        let model = self.model.load(&stored.artifact)?;
        debug!(tenant_id = %tenant_id, model_version = stored.version, "model artifact decoded");

        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        match loaded.get(&tenant_id) {
            // A concurrent query may have cached a newer version meanwhile.
            Some((version, _)) if *version > stored.version => {}
            _ => {
                loaded.insert(tenant_id, (stored.version, model.clone()));
            }
        }
        Ok(model)
    }

    async fn active_model(&self, tenant_id: TenantId) -> Result<Arc<StoredModel>, PredictionError> {
        let tenant = self.registry.context(tenant_id);
        if let Some(model) = tenant.active_model() {
            return Ok(model);
        }

        let models = self.models.clone();
        let latest = tokio::task::spawn_blocking(move || models.load_latest(tenant_id))
            .await
            .map_err(|e| PredictionError::Storage(format!("model load task failed: {e}")))??;

        match latest {
            Some(stored) => {
                let active = tenant.install_if_newer(Arc::new(stored));
                debug!(tenant_id = %tenant_id, model_version = active.version, "active model loaded from store");
                Ok(active)
            }
            None => Err(PredictionError::NoModelAvailable(tenant_id)),
        }
    }
}

fn rank(
    model: &dyn LoadedModel,
    model_version: u64,
    query: &str,
    language: &str,
    limit: usize,
) -> Result<Vec<Prediction>, PredictionError> {
    let ranked = model.predict(query, language, limit)?;
    Ok(ranked
        .into_iter()
        .map(|doc| Prediction {
            entry_id: doc.entry_id,
            question: doc.question,
            content: doc.content,
            confidence: doc.confidence,
            model_version,
        })
        .collect())
}

fn same_answer(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}
