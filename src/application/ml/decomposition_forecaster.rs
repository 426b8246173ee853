use super::decomposition::AdditiveModel;
use crate::config::DecompositionConfig;
use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::forecasting::{Forecaster, ModelFamily};
use crate::domain::prediction::PredictionRecord;
use crate::domain::repositories::{ArtifactStore, load_json, store_json};
use crate::domain::series::CleanSeries;
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const FAMILY: ModelFamily = ModelFamily::Decomposition;

/// Additive trend + seasonality forecaster over date and price only.
///
/// Predictions cover every historical date plus `horizon_days` calendar
/// days past the last observation; future records carry no actual price.
pub struct DecompositionForecaster {
    config: DecompositionConfig,
    store: Arc<dyn ArtifactStore>,
    model: Option<AdditiveModel>,
}

impl DecompositionForecaster {
    pub fn new(config: DecompositionConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            config,
            store,
            model: None,
        }
    }

    pub fn config(&self) -> &DecompositionConfig {
        &self.config
    }

    fn ensure_loaded(&mut self) -> ForecastResult<&AdditiveModel> {
        if self.model.is_none() {
            self.model = load_json(self.store.as_ref(), FAMILY.model_artifact())?;
            if self.model.is_some() {
                info!("Loaded persisted decomposition model");
            }
        }
        self.model
            .as_ref()
            .ok_or(ForecastError::ModelNotTrained { family: FAMILY })
    }

    fn future_dates(&self, last: NaiveDate) -> ForecastResult<Vec<NaiveDate>> {
        (1..=u64::from(self.config.horizon_days))
            .map(|offset| {
                last.checked_add_days(Days::new(offset)).ok_or_else(|| {
                    ForecastError::invalid_config(format!(
                        "horizon of {} days overflows the calendar",
                        self.config.horizon_days
                    ))
                })
            })
            .collect()
    }
}

impl Forecaster for DecompositionForecaster {
    fn family(&self) -> ModelFamily {
        FAMILY
    }

    fn is_trained(&self) -> ForecastResult<bool> {
        if self.model.is_some() {
            return Ok(true);
        }
        self.store.exists(FAMILY.model_artifact())
    }

    fn train(&mut self, series: &CleanSeries) -> ForecastResult<()> {
        let started = Instant::now();
        let model = AdditiveModel::fit(&series.dates(), &series.prices(), &self.config)?;
        store_json(self.store.as_ref(), FAMILY.model_artifact(), &model)?;

        info!(
            "Decomposition model trained in {:.2}s on {} points ({} changepoints, sigma={:.4})",
            started.elapsed().as_secs_f64(),
            series.len(),
            model.changepoint_count(),
            model.sigma()
        );
        self.model = Some(model);
        Ok(())
    }

    fn predict(&mut self, series: &CleanSeries) -> ForecastResult<Vec<PredictionRecord>> {
        let last = series.last_date().ok_or(ForecastError::InsufficientData {
            available: 0,
            required: 1,
        })?;
        let future = self.future_dates(last)?;
        let model = self.ensure_loaded()?;

        let mut dates = series.dates();
        dates.extend(future);
        let intervals = model.forecast(&dates)?;

        let actuals = series.points().iter().map(|p| Some(p.price));
        let records: Vec<PredictionRecord> = dates
            .into_iter()
            .zip(intervals)
            .zip(actuals.chain(std::iter::repeat(None)))
            .map(|((date, interval), actual_price)| PredictionRecord {
                date,
                actual_price,
                predicted_price: interval.yhat,
                predicted_price_low: interval.lower,
                predicted_price_high: interval.upper,
            })
            .collect();

        debug!(
            "Generated {} decomposition predictions ({} future)",
            records.len(),
            records.len() - series.len()
        );
        Ok(records)
    }
}
