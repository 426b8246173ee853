//! Sequence (LSTM) forecaster configuration from environment variables.

use super::parse_env;
use crate::domain::errors::{ForecastError, ForecastResult};
use anyhow::Result;

/// Hyper-parameters of the windowed recurrent regressor.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceConfig {
    // Windowing
    pub window_size: usize,

    // Architecture
    pub units: usize,
    pub layers: usize,
    pub dropout: f64,
    pub dense_units: usize,

    // Training
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            window_size: 712, // two "years" of 356 trading days
            units: 64,
            layers: 3,
            dropout: 0.2,
            dense_units: 32,
            epochs: 150,
            batch_size: 32,
            validation_split: 0.1,
            learning_rate: 0.001,
            seed: 42,
        }
    }
}

impl SequenceConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            window_size: parse_env("SEQUENCE_WINDOW_SIZE", "712")?,
            units: parse_env("SEQUENCE_UNITS", "64")?,
            layers: parse_env("SEQUENCE_LAYERS", "3")?,
            dropout: parse_env("SEQUENCE_DROPOUT", "0.2")?,
            dense_units: parse_env("SEQUENCE_DENSE_UNITS", "32")?,
            epochs: parse_env("SEQUENCE_EPOCHS", "150")?,
            batch_size: parse_env("SEQUENCE_BATCH_SIZE", "32")?,
            validation_split: parse_env("SEQUENCE_VALIDATION_SPLIT", "0.1")?,
            learning_rate: parse_env("SEQUENCE_LEARNING_RATE", "0.001")?,
            seed: parse_env("SEQUENCE_SEED", "42")?,
        })
    }

    pub fn validate(&self) -> ForecastResult<()> {
        if self.window_size == 0 {
            return Err(ForecastError::invalid_config("window_size must be positive"));
        }
        if self.units == 0 || self.layers == 0 || self.dense_units == 0 {
            return Err(ForecastError::invalid_config(
                "units, layers and dense_units must be positive",
            ));
        }
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(ForecastError::invalid_config(
                "epochs and batch_size must be positive",
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::invalid_config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(ForecastError::invalid_config(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ForecastError::invalid_config("learning_rate must be positive"));
        }
        Ok(())
    }
}
