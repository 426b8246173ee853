//! Model families and the capability every forecaster provides.
//!
//! The two families share nothing internally (recurrent weights plus a
//! scaler on one side, additive trend/seasonality coefficients on the
//! other), so they meet only at the [`Forecaster`] trait.

use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::prediction::PredictionRecord;
use crate::domain::series::CleanSeries;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Windowed recurrent regressor (LSTM)
    Sequence,
    /// Additive trend + seasonality model (Prophet-style)
    Decomposition,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 2] = [ModelFamily::Sequence, ModelFamily::Decomposition];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Sequence => "sequence",
            ModelFamily::Decomposition => "decomposition",
        }
    }

    /// Fixed name of the trained model artifact. For the sequence family
    /// this blob carries the fitted scaler alongside the network weights.
    pub fn model_artifact(&self) -> &'static str {
        match self {
            ModelFamily::Sequence => "sequence_model",
            ModelFamily::Decomposition => "decomposition_model",
        }
    }

    /// Fixed name of the full prediction-record cache.
    pub fn predictions_artifact(&self) -> &'static str {
        match self {
            ModelFamily::Sequence => "sequence_predictions",
            ModelFamily::Decomposition => "decomposition_predictions",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequence" | "lstm" => Ok(ModelFamily::Sequence),
            "decomposition" | "prophet" => Ok(ModelFamily::Decomposition),
            other => Err(ForecastError::invalid_config(format!(
                "unknown model family '{}': expected 'lstm' or 'prophet'",
                other
            ))),
        }
    }
}

/// Train/predict contract shared by both model families.
pub trait Forecaster: Send {
    fn family(&self) -> ModelFamily;

    /// True when a trained model is held in memory or persisted.
    fn is_trained(&self) -> ForecastResult<bool>;

    /// Fit on the full series and persist the resulting artifacts.
    ///
    /// On failure the previously persisted artifacts are left untouched.
    fn train(&mut self, series: &CleanSeries) -> ForecastResult<()>;

    /// Produce the full, unfiltered record sequence for `series`,
    /// ascending by date with one record per date.
    fn predict(&mut self, series: &CleanSeries) -> ForecastResult<Vec<PredictionRecord>>;
}
