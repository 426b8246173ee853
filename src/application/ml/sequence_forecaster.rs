use super::lstm::{Architecture, NetworkSnapshot, SequenceRegressor, TrainingOptions};
use crate::config::SequenceConfig;
use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::forecasting::{Forecaster, ModelFamily};
use crate::domain::ml::{MinMaxScaler, WindowDataset};
use crate::domain::prediction::PredictionRecord;
use crate::domain::repositories::{ArtifactStore, load_json, store_json};
use crate::domain::series::CleanSeries;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const FAMILY: ModelFamily = ModelFamily::Sequence;

/// Persisted form: the network and the scaler it was trained against
/// travel in one blob so they can never be replaced independently.
#[derive(Serialize, Deserialize)]
struct SequenceArtifact {
    scaler: MinMaxScaler,
    network: NetworkSnapshot,
}

struct TrainedSequenceModel {
    regressor: SequenceRegressor,
    scaler: MinMaxScaler,
}

/// One-step-ahead LSTM forecaster over the closing price.
///
/// Predictions always use the persisted scaler, never a refit.
pub struct SequenceForecaster {
    config: SequenceConfig,
    store: Arc<dyn ArtifactStore>,
    trained: Option<TrainedSequenceModel>,
}

impl SequenceForecaster {
    pub fn new(config: SequenceConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            config,
            store,
            trained: None,
        }
    }

    pub fn config(&self) -> &SequenceConfig {
        &self.config
    }

    fn load_persisted(&self) -> ForecastResult<Option<TrainedSequenceModel>> {
        let artifact: Option<SequenceArtifact> =
            load_json(self.store.as_ref(), FAMILY.model_artifact())?;

        match artifact {
            Some(SequenceArtifact { scaler, network }) => {
                let regressor = SequenceRegressor::restore(&network)?;
                info!(
                    "Loaded persisted sequence model (window {})",
                    regressor.window_size()
                );
                Ok(Some(TrainedSequenceModel { regressor, scaler }))
            }
            None => Ok(None),
        }
    }

    fn ensure_loaded(&mut self) -> ForecastResult<&TrainedSequenceModel> {
        if self.trained.is_none() {
            self.trained = self.load_persisted()?;
        }
        self.trained
            .as_ref()
            .ok_or(ForecastError::ModelNotTrained { family: FAMILY })
    }
}

impl Forecaster for SequenceForecaster {
    fn family(&self) -> ModelFamily {
        FAMILY
    }

    fn is_trained(&self) -> ForecastResult<bool> {
        if self.trained.is_some() {
            return Ok(true);
        }
        self.store.exists(FAMILY.model_artifact())
    }

    fn train(&mut self, series: &CleanSeries) -> ForecastResult<()> {
        self.config.validate()?;
        let window_size = self.config.window_size;
        if series.len() <= window_size {
            return Err(ForecastError::InsufficientData {
                available: series.len(),
                required: window_size + 1,
            });
        }

        let started = Instant::now();
        let (scaler, scaled) = MinMaxScaler::fit_transform(&series.prices())?;
        let dataset = WindowDataset::build(&scaled, window_size)?;
        debug!(
            "Scaler fitted on {} prices (min {:.2}, max {:.2}), {} windows",
            series.len(),
            scaler.min(),
            scaler.max(),
            dataset.len()
        );

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let architecture = Architecture {
            window_size,
            units: self.config.units,
            layers: self.config.layers,
            dense_units: self.config.dense_units,
            dropout: self.config.dropout,
        };
        let mut regressor = SequenceRegressor::new(architecture, &mut rng)?;
        let options = TrainingOptions {
            epochs: self.config.epochs,
            batch_size: self.config.batch_size,
            validation_split: self.config.validation_split,
            learning_rate: self.config.learning_rate,
        };
        let report = regressor.fit(&dataset, &options, &mut rng)?;

        // Nothing is written until training has succeeded.
        let artifact = SequenceArtifact {
            scaler,
            network: regressor.snapshot()?,
        };
        store_json(self.store.as_ref(), FAMILY.model_artifact(), &artifact)?;

        info!(
            "Sequence model trained in {:.1}s: {} epochs, loss={:.6}, val_loss={:?}",
            started.elapsed().as_secs_f64(),
            report.epochs,
            report.train_loss,
            report.validation_loss
        );
        self.trained = Some(TrainedSequenceModel { regressor, scaler });
        Ok(())
    }

    fn predict(&mut self, series: &CleanSeries) -> ForecastResult<Vec<PredictionRecord>> {
        let model = self.ensure_loaded()?;
        let window_size = model.regressor.window_size();
        if series.len() <= window_size {
            return Err(ForecastError::InsufficientData {
                available: series.len(),
                required: window_size + 1,
            });
        }

        let scaled = model.scaler.transform_all(&series.prices());
        let dataset = WindowDataset::build(&scaled, window_size)?;
        let predicted: Vec<f64> = model
            .regressor
            .predict(dataset.inputs())?
            .iter()
            .map(|&v| model.scaler.inverse(v))
            .collect();

        // Dataset-wide band: half a population standard deviation of this run's predictions.
        let half_band = 0.5 * predicted.iter().population_std_dev();

        let records: Vec<PredictionRecord> = series.points()[window_size..]
            .iter()
            .zip(&predicted)
            .map(|(point, &price)| PredictionRecord {
                date: point.date,
                actual_price: Some(point.price),
                predicted_price: price,
                predicted_price_low: price - half_band,
                predicted_price_high: price + half_band,
            })
            .collect();

        debug!(
            "Generated {} sequence predictions (band +/-{:.4})",
            records.len(),
            half_band
        );
        Ok(records)
    }
}
