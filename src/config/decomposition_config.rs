//! Decomposition (additive trend + seasonality) forecaster configuration.

use super::parse_env;
use crate::domain::errors::{ForecastError, ForecastResult};
use anyhow::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionConfig {
    // Seasonal terms
    pub yearly_seasonality: bool,
    pub weekly_seasonality: bool,
    pub daily_seasonality: bool,
    pub seasonality_prior_scale: f64,

    // Trend flexibility
    pub changepoint_prior_scale: f64,
    pub n_changepoints: usize,
    pub changepoint_range: f64,

    // Uncertainty
    pub interval_width: f64,
    pub uncertainty_samples: usize,

    pub horizon_days: u32,
    pub ridge_alpha: f64,
    pub seed: u64,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            yearly_seasonality: true,
            weekly_seasonality: true,
            daily_seasonality: true,
            seasonality_prior_scale: 10.0,
            changepoint_prior_scale: 0.05,
            n_changepoints: 25,
            changepoint_range: 0.8,
            interval_width: 0.8,
            uncertainty_samples: 1000,
            horizon_days: 365,
            ridge_alpha: 1.0,
            seed: 42,
        }
    }
}

impl DecompositionConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            yearly_seasonality: parse_env("DECOMPOSITION_YEARLY_SEASONALITY", "true")?,
            weekly_seasonality: parse_env("DECOMPOSITION_WEEKLY_SEASONALITY", "true")?,
            daily_seasonality: parse_env("DECOMPOSITION_DAILY_SEASONALITY", "true")?,
            seasonality_prior_scale: parse_env("DECOMPOSITION_SEASONALITY_PRIOR_SCALE", "10.0")?,
            changepoint_prior_scale: parse_env("DECOMPOSITION_CHANGEPOINT_PRIOR_SCALE", "0.05")?,
            n_changepoints: parse_env("DECOMPOSITION_N_CHANGEPOINTS", "25")?,
            changepoint_range: parse_env("DECOMPOSITION_CHANGEPOINT_RANGE", "0.8")?,
            interval_width: parse_env("DECOMPOSITION_INTERVAL_WIDTH", "0.8")?,
            uncertainty_samples: parse_env("DECOMPOSITION_UNCERTAINTY_SAMPLES", "1000")?,
            horizon_days: parse_env("DECOMPOSITION_HORIZON_DAYS", "365")?,
            ridge_alpha: parse_env("DECOMPOSITION_RIDGE_ALPHA", "1.0")?,
            seed: parse_env("DECOMPOSITION_SEED", "42")?,
        })
    }

    pub fn validate(&self) -> ForecastResult<()> {
        if !(self.changepoint_prior_scale > 0.0 && self.seasonality_prior_scale > 0.0) {
            return Err(ForecastError::invalid_config("prior scales must be positive"));
        }
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(ForecastError::invalid_config(format!(
                "changepoint_range must be in (0, 1], got {}",
                self.changepoint_range
            )));
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(ForecastError::invalid_config(format!(
                "interval_width must be in (0, 1), got {}",
                self.interval_width
            )));
        }
        if !(self.ridge_alpha > 0.0 && self.ridge_alpha.is_finite()) {
            return Err(ForecastError::invalid_config("ridge_alpha must be positive"));
        }
        Ok(())
    }
}
