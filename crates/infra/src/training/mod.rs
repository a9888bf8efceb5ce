//! Knowledge base training: job records, the per-tenant manager, and failure notification.

pub mod manager;
pub mod notifier;
pub mod types;

pub use manager::{JobHandle, TrainingManager};
pub use notifier::{InMemoryNotifier, TracingNotifier, TrainingNotifier};
pub use types::{JobId, JobOutcome, JobProgress, JobState, TrainingError, TrainingJob, TrainingStatus};
