use crate::domain::forecasting::ModelFamily;
use thiserror::Error;

/// Errors surfaced by the prediction pipeline.
///
/// The first four variants are the named failures callers are expected to
/// distinguish; none of them is ever downgraded to an empty result.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Failed to load price data from {source_id}: {reason}")]
    DataLoad { source_id: String, reason: String },

    #[error("Insufficient data: {available} points available, at least {required} required")]
    InsufficientData { available: usize, required: usize },

    #[error("{family} model not trained. Please train first.")]
    ModelNotTrained { family: ModelFamily },

    #[error("Invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("Training failed for {family} model: {reason}")]
    Training { family: ModelFamily, reason: String },

    #[error("Artifact '{name}' could not be {action}: {reason}")]
    Persistence {
        name: String,
        action: &'static str,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl ForecastError {
    pub fn persistence(name: &str, action: &'static str, reason: impl ToString) -> Self {
        ForecastError::Persistence {
            name: name.to_string(),
            action,
            reason: reason.to_string(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        ForecastError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

pub type ForecastResult<T> = Result<T, ForecastError>;
