//! Process configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::prediction::DEFAULT_PREDICTION_LIMIT;

pub const ENV_DISABLE_TRAINING: &str = "KBASE_DISABLE_TRAINING";
pub const ENV_DATA_DIR: &str = "KBASE_DATA_DIR";
pub const ENV_MAX_TRAINING_SECS: &str = "KBASE_MAX_TRAINING_SECS";
pub const ENV_PREDICTION_LIMIT: &str = "KBASE_PREDICTION_LIMIT";

/// Knowledge base configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KbConfig {
    /// Reject training start/cancel on this node
    pub disable_training: bool,
    /// Root of the file-backed stores; in-memory stores when `None`
    pub data_dir: Option<PathBuf>,
    /// Cancel and fail runs that take longer than this
    pub max_training_duration: Option<Duration>,
    /// Maximum number of ranked predictions
    pub prediction_limit: usize,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            disable_training: false,
            data_dir: None,
            max_training_duration: None,
            prediction_limit: DEFAULT_PREDICTION_LIMIT,
        }
    }
}

impl KbConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key -> value source. Invalid values are logged and
    /// replaced by the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DISABLE_TRAINING) {
            match parse_flag(&raw) {
                Some(flag) => config.disable_training = flag,
                None => warn!(key = ENV_DISABLE_TRAINING, value = %raw, "invalid boolean; training stays enabled"),
            }
        }

        if let Some(raw) = lookup(ENV_DATA_DIR) {
            let raw = raw.trim();
            if !raw.is_empty() {
                config.data_dir = Some(PathBuf::from(raw));
            }
        }

        if let Some(raw) = lookup(ENV_MAX_TRAINING_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(0) => {}
                Ok(secs) => config.max_training_duration = Some(Duration::from_secs(secs)),
                Err(_) => warn!(key = ENV_MAX_TRAINING_SECS, value = %raw, "invalid duration; no training time limit"),
            }
        }

        if let Some(raw) = lookup(ENV_PREDICTION_LIMIT) {
            match raw.trim().parse::<usize>() {
                Ok(limit) if limit > 0 => config.prediction_limit = limit,
                _ => warn!(
                    key = ENV_PREDICTION_LIMIT,
                    value = %raw,
                    default = DEFAULT_PREDICTION_LIMIT,
                    "invalid prediction limit; using default"
                ),
            }
        }

        config
    }

    pub fn with_training_disabled(mut self, disabled: bool) -> Self {
        self.disable_training = disabled;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_max_training_duration(mut self, limit: Duration) -> Self {
        self.max_training_duration = Some(limit);
        self
    }

    pub fn with_prediction_limit(mut self, limit: usize) -> Self {
        self.prediction_limit = limit.max(1);
        self
    }
}

/// yes/no style boolean.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" | "" => Some(false),
        _ => None,
    }
}
