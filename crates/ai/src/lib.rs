//! `kbase-ai`
//!
//! **Responsibility:** the model capability boundary.
//!
//! The orchestration layer never looks inside a model:
//! - `ModelCapability::train` turns a corpus snapshot into a `ModelArtifact`.
//! - `ModelCapability::load` decodes an artifact into a `LoadedModel` that ranks documents against queries.
//! - Cancellation and progress flow through a shared `TrainingContext`.
//!
//! `TfIdfModel` is the bundled deterministic implementation.

pub mod capability;
pub mod context;
pub mod result;
pub mod tfidf;

pub use capability::{LoadedModel, ModelCapability};
pub use context::TrainingContext;
pub use result::{ModelArtifact, ModelError, RankedDoc, TrainOutcome};
pub use tfidf::TfIdfModel;
