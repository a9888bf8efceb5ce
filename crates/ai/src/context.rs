use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared state between a running training computation and its supervisor.
///
/// Cancellation is advisory: the capability polls [`TrainingContext::is_cancelled`]
/// at whatever granularity it supports and stops on its own. Clones share the
/// same flag and counters.
#[derive(Debug, Clone, Default)]
pub struct TrainingContext {
    cancelled: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl TrainingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Report how many work units are done out of `total`.
    pub fn report_progress(&self, processed: u64, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.processed.store(processed.min(total), Ordering::Relaxed);
    }

    /// `(processed, total)` as last reported.
    pub fn progress(&self) -> (u64, u64) {
        (
            self.processed.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let ctx = TrainingContext::new();
        let seen_by_worker = ctx.clone();
        assert!(!seen_by_worker.is_cancelled());
        ctx.cancel();
        assert!(seen_by_worker.is_cancelled());
    }

    #[test]
    fn progress_is_clamped_to_total() {
        let ctx = TrainingContext::new();
        ctx.report_progress(12, 10);
        assert_eq!(ctx.progress(), (10, 10));
    }
}
