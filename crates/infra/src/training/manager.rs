//! Single-flight, cancellable training jobs per tenant.
//!
//! ## Job Lifecycle
//!
//! ```text
//! start()
//!   ↓
//! 1. Check the disabled-training flag
//!   ↓
//! 2. Claim the tenant slot (CAS Idle -> Training); losers get AlreadyTraining
//!   ↓
//! 3. Snapshot the entry store (later edits do not affect this run)
//!   ↓
//! 4. Spawn the supervisor and return the handle
//!        ↓ (background)
//!     train on the blocking pool, polling cancellation
//!        ↓
//!     cancelled -> Cancelled | error -> Failed | ok -> close cancel window, store_model, swap pointer, Completed
//!        ↓
//!     release the slot (always, even if the supervisor unwinds)
//! ```
//!
//! Training errors never come back through `start`; they surface through the
//! job record, the log, and the `TrainingNotifier`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use kbase_ai::{ModelCapability, TrainOutcome, TrainingContext};
use kbase_core::{Entry, TenantId};

use super::notifier::{TracingNotifier, TrainingNotifier};
use super::types::{JobId, JobOutcome, JobState, TrainingError, TrainingJob, TrainingStatus};
use crate::entry_store::EntryStore;
use crate::model_store::ModelStore;
use crate::tenant::{CompletionReceiver, TenantContext, TenantRegistry};

const TIMED_OUT: &str = "training exceeded max duration";

/// Handle to a started training job.
///
/// Dropping the handle does not affect the job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: JobId,
    tenant: Arc<TenantContext>,
    done: CompletionReceiver,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant.tenant_id()
    }

    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Request cancellation of this job (not of whatever runs later).
    pub fn cancel(&self) -> Result<(), TrainingError> {
        self.tenant.request_cancel(Some(self.job_id))?;
        info!(tenant_id = %self.tenant_id(), job_id = %self.job_id, "training cancellation requested");
        Ok(())
    }

    /// Wait for the job to finish and return its final record.
    ///
    /// `None` only if the runtime shut down before the job could record an outcome.
    pub async fn wait(&mut self) -> Option<TrainingJob> {
        let waited = self
            .done
            .wait_for(Option::is_some)
            .await
            .map(|done| (*done).clone());
        match waited {
            Ok(job) => job,
            Err(_) => self.done.borrow().clone(),
        }
    }
}

/// Coordinates training runs for all tenants.
pub struct TrainingManager {
    registry: Arc<TenantRegistry>,
    entries: Arc<dyn EntryStore>,
    models: Arc<dyn ModelStore>,
    model: Arc<dyn ModelCapability>,
    notifier: Arc<dyn TrainingNotifier>,
    training_disabled: bool,
    max_duration: Option<Duration>,
}

impl TrainingManager {
    pub fn new(
        registry: Arc<TenantRegistry>,
        entries: Arc<dyn EntryStore>,
        models: Arc<dyn ModelStore>,
        model: Arc<dyn ModelCapability>,
    ) -> Self {
        Self {
            registry,
            entries,
            models,
            model,
            notifier: Arc::new(TracingNotifier),
            training_disabled: false,
            max_duration: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn TrainingNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Reject every `start`/`cancel` (node configured not to train).
    pub fn with_training_disabled(mut self, disabled: bool) -> Self {
        self.training_disabled = disabled;
        self
    }

    /// Cancel runs that take longer than `limit` and record them as failed.
    pub fn with_max_duration(mut self, limit: Option<Duration>) -> Self {
        self.max_duration = limit;
        self
    }

    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    pub async fn start(&self, tenant_id: TenantId) -> Result<JobHandle, TrainingError> {
        self.start_by(tenant_id, None).await
    }

    /// Start training for `tenant_id`, recording who asked for it.
    ///
    /// Returns as soon as the slot is claimed and the run is spawned. Must be
    /// called from within a Tokio runtime.
    pub async fn start_by(
        &self,
        tenant_id: TenantId,
        started_by: Option<String>,
    ) -> Result<JobHandle, TrainingError> {
        if self.training_disabled {
            warn!(tenant_id = %tenant_id, "training request rejected: training disabled");
            return Err(TrainingError::Disabled);
        }

        let tenant = self.registry.context(tenant_id);
        let record = TrainingJob::new(tenant_id, started_by);
        let job_id = record.id;
        let ctx = TrainingContext::new();

        let done = tenant.try_claim(record, ctx.clone()).inspect_err(|_| {
            debug!(tenant_id = %tenant_id, "training request rejected: already training");
        })?;
        // From here on the slot must be released on every path.
        let release = SlotRelease::new(tenant.clone(), job_id);
        info!(tenant_id = %tenant_id, job_id = %job_id, state = ?JobState::Training, "training slot claimed");

        let entries = self.entries.clone();
        let corpus = match tokio::task::spawn_blocking(move || entries.fetch(tenant_id)).await {
            Ok(Ok(corpus)) => corpus,
            Ok(Err(e)) => {
                let error = format!("could not snapshot corpus: {e}");
                warn!(tenant_id = %tenant_id, job_id = %job_id, error = %error, "training aborted");
                release.complete(&JobOutcome::Failed { error });
                return Err(TrainingError::Storage(e.to_string()));
            }
            Err(e) => {
                let error = format!("corpus snapshot task failed: {e}");
                warn!(tenant_id = %tenant_id, job_id = %job_id, error = %error, "training aborted");
                release.complete(&JobOutcome::Failed {
                    error: error.clone(),
                });
                return Err(TrainingError::Storage(error));
            }
        };
        tenant.set_corpus_size(corpus.len());
        debug!(tenant_id = %tenant_id, job_id = %job_id, corpus_size = corpus.len(), "corpus snapshot taken");

        let run = JobRun {
            tenant: tenant.clone(),
            job_id,
            ctx,
            models: self.models.clone(),
            model: self.model.clone(),
            notifier: self.notifier.clone(),
            max_duration: self.max_duration,
        };
        tokio::spawn(supervise(run, corpus, release));

        Ok(JobHandle {
            job_id,
            tenant,
            done,
        })
    }

    /// Request cooperative cancellation of the tenant's running job.
    ///
    /// Returns once the request is recorded; the job stops at its next checkpoint.
    pub fn cancel(&self, tenant_id: TenantId) -> Result<JobId, TrainingError> {
        if self.training_disabled {
            warn!(tenant_id = %tenant_id, "cancel request rejected: training disabled");
            return Err(TrainingError::Disabled);
        }

        let tenant = self
            .registry
            .get(tenant_id)
            .ok_or(TrainingError::NotTraining(tenant_id))?;
        let job_id = tenant.request_cancel(None).inspect_err(|_| {
            debug!(tenant_id = %tenant_id, "cancel request rejected: not training");
        })?;

        info!(tenant_id = %tenant_id, job_id = %job_id, state = ?JobState::Cancelling, "training cancellation requested");
        Ok(job_id)
    }

    pub fn status(&self, tenant_id: TenantId) -> TrainingStatus {
        match self.registry.get(tenant_id) {
            Some(tenant) => TrainingStatus {
                tenant_id,
                state: tenant.slot_state(),
                current: tenant.current_job(),
                last: tenant.last_finished(),
                active_model_version: tenant.active_model().map(|m| m.version),
            },
            None => TrainingStatus {
                tenant_id,
                state: JobState::Idle,
                current: None,
                last: None,
                active_model_version: None,
            },
        }
    }
}

/// Releases the tenant slot when dropped unless completed explicitly.
///
/// Covers the paths where the supervisor never reaches its own completion
/// step: a panic, runtime shutdown, or the `start` future being dropped.
struct SlotRelease {
    tenant: Arc<TenantContext>,
    job_id: JobId,
    armed: bool,
}

impl SlotRelease {
    fn new(tenant: Arc<TenantContext>, job_id: JobId) -> Self {
        Self {
            tenant,
            job_id,
            armed: true,
        }
    }

    fn complete(mut self, outcome: &JobOutcome) -> Option<TrainingJob> {
        self.armed = false;
        self.tenant.finish(self.job_id, outcome)
    }
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let outcome = JobOutcome::Failed {
            error: "training task ended unexpectedly".to_string(),
        };
        if self.tenant.finish(self.job_id, &outcome).is_some() {
            error!(
                tenant_id = %self.tenant.tenant_id(),
                job_id = %self.job_id,
                "training task ended without an outcome; slot released"
            );
        }
    }
}

struct JobRun {
    tenant: Arc<TenantContext>,
    job_id: JobId,
    ctx: TrainingContext,
    models: Arc<dyn ModelStore>,
    model: Arc<dyn ModelCapability>,
    notifier: Arc<dyn TrainingNotifier>,
    max_duration: Option<Duration>,
}

async fn supervise(run: JobRun, corpus: Vec<Entry>, release: SlotRelease) {
    let tenant_id = run.tenant.tenant_id();
    let job_id = run.job_id;

    let outcome = run.execute(corpus).await;
    let Some(record) = release.complete(&outcome) else {
        return;
    };

    match &outcome {
        JobOutcome::Completed { model_version } => info!(
            tenant_id = %tenant_id,
            job_id = %job_id,
            model_version,
            corpus_size = record.corpus_size,
            elapsed_ms = record.elapsed().num_milliseconds(),
            "knowledge base training completed"
        ),
        JobOutcome::Cancelled => info!(
            tenant_id = %tenant_id,
            job_id = %job_id,
            "knowledge base training cancelled"
        ),
        JobOutcome::Failed { error } => {
            error!(tenant_id = %tenant_id, job_id = %job_id, error = %error, "could not train knowledge base model");
            run.notifier.training_failed(tenant_id, &record);
        }
    }
}

impl JobRun {
    async fn execute(&self, corpus: Vec<Entry>) -> JobOutcome {
        let tenant_id = self.tenant.tenant_id();

        let model = self.model.clone();
        let ctx = self.ctx.clone();
        let mut work = tokio::task::spawn_blocking(move || model.train(&corpus, &ctx));

        let joined = match self.max_duration {
            Some(limit) => tokio::select! {
                joined = &mut work => joined,
                _ = tokio::time::sleep(limit) => {
                    warn!(
                        tenant_id = %tenant_id,
                        job_id = %self.job_id,
                        limit_ms = limit.as_millis() as u64,
                        "training exceeded max duration; requesting cancellation"
                    );
                    self.tenant.expire(self.job_id);
                    work.await
                }
            },
            None => work.await,
        };

        let trained = match joined {
            Ok(trained) => trained,
            Err(e) => {
                return JobOutcome::Failed {
                    error: format!("training task failed: {e}"),
                };
            }
        };

        // Anything produced after a cancel request is discarded.
        let artifact = match trained {
            Err(e) => return JobOutcome::Failed { error: e.to_string() },
            Ok(_) if self.ctx.is_cancelled() => return self.cancelled(),
            Ok(TrainOutcome::Cancelled) => return self.cancelled(),
            Ok(TrainOutcome::Trained(artifact)) => artifact,
        };

        // Commit: the durable write strictly precedes the pointer swap.
        if !self.tenant.begin_commit(self.job_id) {
            return self.cancelled();
        }
        let models = self.models.clone();
        let stored = match tokio::task::spawn_blocking(move || models.store_model(tenant_id, artifact)).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(e)) => {
                return JobOutcome::Failed {
                    error: format!("could not store model: {e}"),
                };
            }
            Err(e) => {
                return JobOutcome::Failed {
                    error: format!("model store task failed: {e}"),
                };
            }
        };
        debug!(tenant_id = %tenant_id, job_id = %self.job_id, model_version = stored.version, "model stored");

        let model_version = stored.version;
        self.tenant.install_model(Arc::new(stored));
        JobOutcome::Completed { model_version }
    }

    fn cancelled(&self) -> JobOutcome {
        if self.tenant.timed_out(self.job_id) {
            JobOutcome::Failed {
                error: TIMED_OUT.to_string(),
            }
        } else {
            JobOutcome::Cancelled
        }
    }
}
