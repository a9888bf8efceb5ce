//! Per-tenant runtime state: the training slot and the active model pointer.
//!
//! Each tenant gets one `TenantContext`, created on first use and owned by the
//! `TenantRegistry`. All mutation goes through the context's transition methods:
//!
//! - `try_claim`: `Idle -> Training` via compare-and-swap on the slot
//! - `request_cancel`: `Training -> Cancelling`
//! - `begin_commit`: close the cancel window before the model is stored
//! - `finish`: record the terminal state, then release the slot back to `Idle`
//!
//! The job record mutex is held only inside these transitions, never across
//! `.await` points or model work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::watch;

use kbase_ai::TrainingContext;
use kbase_core::TenantId;

use crate::model_store::StoredModel;
use crate::training::types::{JobId, JobOutcome, JobProgress, JobState, TrainingError, TrainingJob};

const SLOT_IDLE: u8 = 0;
const SLOT_TRAINING: u8 = 1;
const SLOT_CANCELLING: u8 = 2;

fn slot_state(raw: u8) -> JobState {
    match raw {
        SLOT_TRAINING => JobState::Training,
        SLOT_CANCELLING => JobState::Cancelling,
        _ => JobState::Idle,
    }
}

/// Completion channel for one job: `None` while running, the final record once done.
pub(crate) type CompletionReceiver = watch::Receiver<Option<TrainingJob>>;

struct ActiveJob {
    record: TrainingJob,
    ctx: TrainingContext,
    timed_out: bool,
    // Past this point the job stores its model; cancel requests are refused.
    committing: bool,
    done: watch::Sender<Option<TrainingJob>>,
}

/// Runtime state of one tenant.
pub struct TenantContext {
    tenant_id: TenantId,
    slot: AtomicU8,
    job: Mutex<Option<ActiveJob>>,
    last_finished: Mutex<Option<TrainingJob>>,
    active_model: RwLock<Option<Arc<StoredModel>>>,
}

// A panic elsewhere must not wedge the slot; the guarded data stays consistent
// because every transition writes it in one step.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            slot: AtomicU8::new(SLOT_IDLE),
            job: Mutex::new(None),
            last_finished: Mutex::new(None),
            active_model: RwLock::new(None),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// `Idle`, `Training` or `Cancelling`.
    pub fn slot_state(&self) -> JobState {
        slot_state(self.slot.load(Ordering::SeqCst))
    }

    /// Claim the training slot for `record`.
    ///
    /// Exactly one of any number of concurrent callers wins while the slot is
    /// `Idle`; the rest get `AlreadyTraining`.
    pub(crate) fn try_claim(
        &self,
        mut record: TrainingJob,
        ctx: TrainingContext,
    ) -> Result<CompletionReceiver, TrainingError> {
        let mut job = lock(&self.job);

        self.slot
            .compare_exchange(SLOT_IDLE, SLOT_TRAINING, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| TrainingError::AlreadyTraining(self.tenant_id))?;

        record.state = JobState::Training;
        let (done, rx) = watch::channel(None);
        *job = Some(ActiveJob {
            record,
            ctx,
            timed_out: false,
            committing: false,
            done,
        });
        Ok(rx)
    }

    pub(crate) fn set_corpus_size(&self, size: usize) {
        if let Some(active) = lock(&self.job).as_mut() {
            active.record.corpus_size = size;
        }
    }

    /// Ask the running job to stop. Returns as soon as the request is recorded.
    ///
    /// With `only_job` set, the request is ignored unless that job is the one
    /// running (a stale handle must not cancel a later job). A job that has
    /// started committing can no longer be cancelled.
    pub(crate) fn request_cancel(&self, only_job: Option<JobId>) -> Result<JobId, TrainingError> {
        let mut job = lock(&self.job);
        let active = match job.as_mut() {
            Some(active)
                if !active.committing && only_job.is_none_or(|id| id == active.record.id) =>
            {
                active
            }
            _ => return Err(TrainingError::NotTraining(self.tenant_id)),
        };

        match self.slot.compare_exchange(
            SLOT_TRAINING,
            SLOT_CANCELLING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) | Err(SLOT_CANCELLING) => {}
            Err(_) => return Err(TrainingError::NotTraining(self.tenant_id)),
        }

        active.record.state = JobState::Cancelling;
        active.record.cancel_requested = true;
        active.ctx.cancel();
        Ok(active.record.id)
    }

    /// Cancel the running job because it overran its time limit.
    ///
    /// A job the user already cancelled stays a user cancellation.
    pub(crate) fn expire(&self, job_id: JobId) -> bool {
        let mut job = lock(&self.job);
        match job.as_mut() {
            Some(active)
                if active.record.id == job_id
                    && !active.record.cancel_requested
                    && !active.committing =>
            {
                active.timed_out = true;
                drop(job);
                self.request_cancel(Some(job_id)).is_ok()
            }
            _ => false,
        }
    }

    /// Atomically decide between committing `job_id` and honouring a cancel.
    ///
    /// Returns `false` if a cancel was requested first; the caller must then
    /// discard its result. Once this returns `true`, `request_cancel` fails
    /// with `NotTraining` until the job finishes.
    pub(crate) fn begin_commit(&self, job_id: JobId) -> bool {
        let mut job = lock(&self.job);
        match job.as_mut() {
            Some(active) if active.record.id == job_id && !active.record.cancel_requested => {
                active.committing = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn timed_out(&self, job_id: JobId) -> bool {
        lock(&self.job)
            .as_ref()
            .is_some_and(|a| a.record.id == job_id && a.timed_out)
    }

    /// Record the terminal state of `job_id` and release the slot.
    ///
    /// Release is the last step; a new `try_claim` can only succeed after the
    /// finished record is visible. Returns `None` if `job_id` is not the
    /// running job (already finished).
    pub(crate) fn finish(&self, job_id: JobId, outcome: &JobOutcome) -> Option<TrainingJob> {
        let mut job = lock(&self.job);
        if job.as_ref().is_none_or(|a| a.record.id != job_id) {
            return None;
        }
        let active = job.take()?;

        let mut record = active.record;
        let (processed, total) = active.ctx.progress();
        record.progress = JobProgress { processed, total };
        record.state = outcome.state();
        record.finished_at = Some(Utc::now());
        match outcome {
            JobOutcome::Completed { model_version } => record.model_version = Some(*model_version),
            JobOutcome::Failed { error } => record.error = Some(error.clone()),
            JobOutcome::Cancelled => {}
        }

        *lock(&self.last_finished) = Some(record.clone());
        self.slot.store(SLOT_IDLE, Ordering::SeqCst);
        drop(job);

        // Receivers may all be gone; nobody has to wait for a job.
        let _ = active.done.send(Some(record.clone()));
        Some(record)
    }

    /// The in-flight job with live progress, if any.
    pub fn current_job(&self) -> Option<TrainingJob> {
        lock(&self.job).as_ref().map(|active| {
            let mut record = active.record.clone();
            let (processed, total) = active.ctx.progress();
            record.progress = JobProgress { processed, total };
            record
        })
    }

    pub fn last_finished(&self) -> Option<TrainingJob> {
        lock(&self.last_finished).clone()
    }

    /// The model currently served to predictions.
    pub fn active_model(&self) -> Option<Arc<StoredModel>> {
        self.active_model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Point predictions at a freshly committed model.
    pub(crate) fn install_model(&self, model: Arc<StoredModel>) {
        *self
            .active_model
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(model);
    }

    /// Populate the pointer from storage unless something newer is already active.
    ///
    /// Returns the model that ends up active.
    pub(crate) fn install_if_newer(&self, model: Arc<StoredModel>) -> Arc<StoredModel> {
        let mut slot = self
            .active_model
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(current) if current.version >= model.version => current.clone(),
            _ => {
                *slot = Some(model.clone());
                model
            }
        }
    }
}

impl std::fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantContext")
            .field("tenant_id", &self.tenant_id)
            .field("slot", &self.slot_state())
            .field(
                "active_model_version",
                &self.active_model().map(|m| m.version),
            )
            .finish()
    }
}

/// Owner of every tenant's runtime context.
#[derive(Debug, Default)]
pub struct TenantRegistry {
    tenants: RwLock<HashMap<TenantId, Arc<TenantContext>>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tenant's context, created on first use.
    pub fn context(&self, tenant_id: TenantId) -> Arc<TenantContext> {
        if let Some(ctx) = self.get(tenant_id) {
            return ctx;
        }
        let mut tenants = self.tenants.write().unwrap_or_else(PoisonError::into_inner);
        tenants
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(TenantContext::new(tenant_id)))
            .clone()
    }

    /// The tenant's context, if it was ever used.
    pub fn get(&self, tenant_id: TenantId) -> Option<Arc<TenantContext>> {
        self.tenants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tenant_id)
            .cloned()
    }

    pub fn tenants(&self) -> Vec<TenantId> {
        let mut ids: Vec<_> = self
            .tenants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }
}
