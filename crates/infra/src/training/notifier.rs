use std::sync::Mutex;

use tracing::warn;

use kbase_core::TenantId;

use super::types::TrainingJob;

/// Fire-and-forget sink for training failures.
///
/// Implementations must not block for long and must not fail the job; the
/// manager ignores whatever happens inside.
pub trait TrainingNotifier: Send + Sync + 'static {
    fn training_failed(&self, tenant_id: TenantId, job: &TrainingJob);
}

/// Default notifier: a structured warning in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl TrainingNotifier for TracingNotifier {
    fn training_failed(&self, tenant_id: TenantId, job: &TrainingJob) {
        warn!(
            tenant_id = %tenant_id,
            job_id = %job.id,
            error = job.error.as_deref().unwrap_or("unknown"),
            "knowledge base training failed"
        );
    }
}

/// In-memory notifier for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    inner: Mutex<Vec<(TenantId, TrainingJob)>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<(TenantId, TrainingJob)> {
        self.inner
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl TrainingNotifier for InMemoryNotifier {
    fn training_failed(&self, tenant_id: TenantId, job: &TrainingJob) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.push((tenant_id, job.clone()));
        }
    }
}
