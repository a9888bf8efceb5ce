//! Training job records, states, and errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use kbase_core::TenantId;

/// Unique training job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Training state of a tenant or a job.
///
/// ```text
/// Idle --start--> Training --success--> Completed --> Idle
/// Training --cancel--> Cancelling --(observed)--> Cancelled --> Idle
/// Training --failure--> Failed --> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Training,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Holds the tenant's single-flight slot.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Training | JobState::Cancelling)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Work units reported by the model capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub processed: u64,
    pub total: u64,
}

impl JobProgress {
    /// Completion ratio in \[0, 1\]; 0 until the capability reports a total.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// One training attempt for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub state: JobState,
    pub cancel_requested: bool,
    pub started_at: DateTime<Utc>,
    pub started_by: Option<String>,
    /// Entries in the corpus snapshot taken at claim time.
    pub corpus_size: usize,
    pub progress: JobProgress,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure reason, for `Failed` jobs.
    pub error: Option<String>,
    /// Version committed to the model store, for `Completed` jobs.
    pub model_version: Option<u64>,
}

impl TrainingJob {
    pub fn new(tenant_id: TenantId, started_by: Option<String>) -> Self {
        Self {
            id: JobId::new(),
            tenant_id,
            state: JobState::Training,
            cancel_requested: false,
            started_at: Utc::now(),
            started_by,
            corpus_size: 0,
            progress: JobProgress::default(),
            finished_at: None,
            error: None,
            model_version: None,
        }
    }

    /// Wall-clock run time so far (or total, once finished).
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }
}

/// How a training run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { model_version: u64 },
    Cancelled,
    Failed { error: String },
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed { .. } => JobState::Completed,
            JobOutcome::Cancelled => JobState::Cancelled,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }
}

/// Point-in-time view of a tenant's training slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingStatus {
    pub tenant_id: TenantId,
    /// `Idle`, `Training` or `Cancelling`.
    pub state: JobState,
    /// The in-flight job, if any.
    pub current: Option<TrainingJob>,
    /// The most recently finished job, if any.
    pub last: Option<TrainingJob>,
    /// Version currently served to predictions, if loaded.
    pub active_model_version: Option<u64>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrainingError {
    #[error("training disabled on this node")]
    Disabled,

    #[error("tenant {0} is already training")]
    AlreadyTraining(TenantId),

    #[error("tenant {0} is not training")]
    NotTraining(TenantId),

    /// The corpus snapshot could not be read; nothing was started.
    #[error("storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_training_and_cancelling_are_active() {
        for state in [
            JobState::Idle,
            JobState::Completed,
            JobState::Failed,
            JobState::Cancelled,
        ] {
            assert!(!state.is_active(), "{state:?}");
        }
        assert!(JobState::Training.is_active());
        assert!(JobState::Cancelling.is_active());
    }

    #[test]
    fn progress_ratio_handles_unknown_total() {
        assert_eq!(JobProgress::default().ratio(), 0.0);
        let p = JobProgress {
            processed: 1,
            total: 4,
        };
        assert!((p.ratio() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_value(JobState::Cancelling).unwrap();
        assert_eq!(json, serde_json::json!("cancelling"));
    }
}
