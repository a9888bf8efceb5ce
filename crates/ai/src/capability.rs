use std::sync::Arc;

use kbase_core::Entry;

use crate::context::TrainingContext;
use crate::result::{ModelArtifact, ModelError, RankedDoc, TrainOutcome};

/// A trained model decoded from its artifact, ready to answer queries.
pub trait LoadedModel: Send + Sync {
    /// Rank the trained documents against `query`, best first, at most `limit`.
    fn predict(&self, query: &str, language: &str, limit: usize) -> Result<Vec<RankedDoc>, ModelError>;
}

/// The learning/ranking algorithm behind a knowledge base.
///
/// The orchestration layer treats implementations as black boxes: it hands
/// over a corpus snapshot to `train` on a blocking thread and later feeds the
/// produced artifact back into `load`. Implementations must be deterministic
/// for a fixed artifact and query.
pub trait ModelCapability: Send + Sync + 'static {
    /// Stable name recorded in produced artifacts.
    fn name(&self) -> &str;

    /// Build a model from `corpus`.
    ///
    /// Should poll `ctx.is_cancelled()` between units of work and return
    /// `TrainOutcome::Cancelled` once it is set.
    fn train(&self, corpus: &[Entry], ctx: &TrainingContext) -> Result<TrainOutcome, ModelError>;

    /// Decode an artifact produced by `train`.
    ///
    /// Callers keep the result for as long as the artifact stays active.
    fn load(&self, artifact: &ModelArtifact) -> Result<Arc<dyn LoadedModel>, ModelError>;

    /// Decode and rank in one go.
    fn predict(
        &self,
        artifact: &ModelArtifact,
        query: &str,
        language: &str,
        limit: usize,
    ) -> Result<Vec<RankedDoc>, ModelError> {
        self.load(artifact)?.predict(query, language, limit)
    }
}

impl<M> ModelCapability for Arc<M>
where
    M: ModelCapability + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn train(&self, corpus: &[Entry], ctx: &TrainingContext) -> Result<TrainOutcome, ModelError> {
        (**self).train(corpus, ctx)
    }

    fn load(&self, artifact: &ModelArtifact) -> Result<Arc<dyn LoadedModel>, ModelError> {
        (**self).load(artifact)
    }

    fn predict(
        &self,
        artifact: &ModelArtifact,
        query: &str,
        language: &str,
        limit: usize,
    ) -> Result<Vec<RankedDoc>, ModelError> {
        (**self).predict(artifact, query, language, limit)
    }
}
