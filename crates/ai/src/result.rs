use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use kbase_core::EntryId;

/// Trained model payload as handed to the model store.
///
/// Stores treat this as an opaque blob: only the capability that produced it
/// knows how to read `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Name of the capability that produced the payload.
    pub model: String,

    /// Payload layout version (capability-specific).
    pub format_version: u32,

    /// Number of corpus documents the payload was built from.
    pub document_count: usize,

    pub payload: JsonValue,
}

impl ModelArtifact {
    pub fn new(model: impl Into<String>, format_version: u32, document_count: usize, payload: JsonValue) -> Self {
        Self {
            model: model.into(),
            format_version,
            document_count,
            payload,
        }
    }
}

/// Outcome of a training run that did not error.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    Trained(ModelArtifact),
    /// Cancellation was observed at a checkpoint; nothing usable was produced.
    Cancelled,
}

/// One ranked candidate returned by a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDoc {
    pub entry_id: EntryId,
    pub question: String,
    /// Answer text of the matched entry, as it was at training time.
    pub content: String,
    /// Confidence in \[0, 1\].
    pub confidence: f64,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("invalid training input: {0}")]
    InvalidInput(String),

    #[error("training failed: {0}")]
    TrainingFailed(String),

    #[error("artifact not readable by model {model}: {reason}")]
    IncompatibleArtifact { model: String, reason: String },

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}
