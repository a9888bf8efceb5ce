//! Infrastructure layer: stores, tenant runtime state, training, prediction, and the facade.

pub mod config;
pub mod entry_store;
pub mod model_store;
pub mod prediction;
pub mod service;
pub mod tenant;
pub mod training;

mod fs;

pub use config::KbConfig;
pub use prediction::{EvaluationReport, EvaluationSample, Prediction, PredictionError, PredictionService};
pub use service::{KbError, KnowledgeBase};
pub use tenant::{TenantContext, TenantRegistry};
