//! Per-family orchestration: training, the prediction cache and range filtering.
//!
//! One `ForecastService` exists per model family for the life of the process.
//! The forecaster sits behind a mutex, so training and model-backed
//! prediction for a family never overlap. Cache hits never touch the lock.

use crate::application::ml::{DecompositionForecaster, SequenceForecaster};
use crate::config::Config;
use crate::domain::errors::ForecastResult;
use crate::domain::forecasting::{Forecaster, ModelFamily};
use crate::domain::prediction::{DateRange, PredictionRecord};
use crate::domain::repositories::{ArtifactStore, PredictionCache, SeriesSource};
use crate::domain::series::CleanSeries;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::{ArtifactPredictionCache, CsvSeriesLoader, FileArtifactStore};
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainOutcome {
    Trained,
    /// Artifacts already existed and training was not forced
    Skipped,
}

impl TrainOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainOutcome::Trained => "trained",
            TrainOutcome::Skipped => "skipped",
        }
    }
}

pub struct ForecastService {
    family: ModelFamily,
    source: Arc<dyn SeriesSource>,
    cache: Arc<dyn PredictionCache>,
    forecaster: Mutex<Box<dyn Forecaster>>,
    series: Mutex<Option<Arc<CleanSeries>>>,
    metrics: Option<Metrics>,
}

impl ForecastService {
    pub fn new(
        forecaster: Box<dyn Forecaster>,
        source: Arc<dyn SeriesSource>,
        cache: Arc<dyn PredictionCache>,
    ) -> Self {
        Self {
            family: forecaster.family(),
            source,
            cache,
            forecaster: Mutex::new(forecaster),
            series: Mutex::new(None),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    fn lock_forecaster(&self) -> MutexGuard<'_, Box<dyn Forecaster>> {
        self.forecaster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_trained(&self) -> ForecastResult<bool> {
        self.lock_forecaster().is_trained()
    }

    /// Series used for prediction, loaded on first use.
    fn series(&self) -> ForecastResult<Arc<CleanSeries>> {
        let mut memo = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(series) = memo.as_ref() {
            return Ok(series.clone());
        }
        let series = Arc::new(self.source.load()?);
        *memo = Some(series.clone());
        Ok(series)
    }

    fn reload_series(&self) -> ForecastResult<Arc<CleanSeries>> {
        let series = Arc::new(self.source.load()?);
        *self.series.lock().unwrap_or_else(PoisonError::into_inner) = Some(series.clone());
        Ok(series)
    }

    /// Trains unless a trained model already exists and `force` is false.
    ///
    /// The source is reloaded before training so the model sees current data.
    /// The prediction cache is left alone; see [`ForecastService::retrain`].
    pub fn train(&self, force: bool) -> ForecastResult<TrainOutcome> {
        let family = self.family.as_str();
        let mut forecaster = self.lock_forecaster();

        if !force && forecaster.is_trained()? {
            info!("{} model already trained, skipping", self.family);
            if let Some(metrics) = &self.metrics {
                metrics.inc_training(family, TrainOutcome::Skipped.as_str());
            }
            return Ok(TrainOutcome::Skipped);
        }

        let series = self.reload_series()?;
        info!(
            "Training {} model on {} rows from {}",
            self.family,
            series.len(),
            self.source.source_id()
        );

        let _timer = self
            .metrics
            .as_ref()
            .map(|m| m.start_training_timer(family));
        match forecaster.train(&series) {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_training(family, TrainOutcome::Trained.as_str());
                }
                Ok(TrainOutcome::Trained)
            }
            Err(e) => {
                error!("{} training failed: {}", self.family, e);
                if let Some(metrics) = &self.metrics {
                    metrics.inc_training(family, "failed");
                }
                Err(e)
            }
        }
    }

    /// `train(force)` followed by an unconditional cache invalidation.
    pub fn retrain(&self, force: bool) -> ForecastResult<TrainOutcome> {
        let outcome = self.train(force)?;
        self.invalidate_cache()?;
        Ok(outcome)
    }

    pub fn invalidate_cache(&self) -> ForecastResult<()> {
        self.cache.invalidate(self.family)?;
        if let Some(metrics) = &self.metrics {
            metrics.inc_invalidation(self.family.as_str());
        }
        info!("{} prediction cache invalidated", self.family);
        Ok(())
    }

    /// Parses the optional `YYYY-MM-DD` bounds, then serves as
    /// [`ForecastService::predictions_in`]. A malformed bound fails before the
    /// cache or the model is consulted.
    pub fn get_predictions(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        regenerate: bool,
    ) -> ForecastResult<Vec<PredictionRecord>> {
        let range = DateRange::parse(start, end)?;
        self.predictions_in(range, regenerate)
    }

    /// Cached records filtered to `range`. The model is only consulted on a
    /// cache miss or when `regenerate` is set, and its full output is stored
    /// before filtering.
    pub fn predictions_in(
        &self,
        range: DateRange,
        regenerate: bool,
    ) -> ForecastResult<Vec<PredictionRecord>> {
        if !regenerate {
            if let Some(records) = self.cache.load(self.family)? {
                debug!("{} predictions served from cache", self.family);
                if let Some(metrics) = &self.metrics {
                    metrics.inc_cache_hit(self.family.as_str());
                }
                return Ok(self.serve(range.apply(&records)));
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.inc_cache_miss(self.family.as_str());
        }
        let records = self.generate()?;
        Ok(self.serve(range.apply(&records)))
    }

    fn generate(&self) -> ForecastResult<Vec<PredictionRecord>> {
        let mut forecaster = self.lock_forecaster();
        let series = self.series()?;

        let _timer = self
            .metrics
            .as_ref()
            .map(|m| m.start_prediction_timer(self.family.as_str()));
        let records = forecaster.predict(&series)?;
        self.cache.store(self.family, &records)?;

        info!(
            "Generated and cached {} {} predictions",
            records.len(),
            self.family
        );
        Ok(records)
    }

    fn serve(&self, records: Vec<PredictionRecord>) -> Vec<PredictionRecord> {
        if let Some(metrics) = &self.metrics {
            metrics.add_records_served(self.family.as_str(), records.len());
        }
        records
    }
}

/// The per-family services, built once at startup.
pub struct ForecastServices {
    pub sequence: Arc<ForecastService>,
    pub decomposition: Arc<ForecastService>,
    metrics: Option<Metrics>,
}

impl ForecastServices {
    pub fn new(sequence: ForecastService, decomposition: ForecastService) -> Self {
        Self {
            sequence: Arc::new(sequence),
            decomposition: Arc::new(decomposition),
            metrics: None,
        }
    }

    /// File-backed services: CSV source at `data_path`, artifacts and
    /// prediction caches under `artifact_dir`.
    pub fn bootstrap(config: &Config) -> Result<Self> {
        let store: Arc<dyn ArtifactStore> = Arc::new(
            FileArtifactStore::new(&config.artifact_dir)
                .context("Failed to open artifact directory")?,
        );
        let source: Arc<dyn SeriesSource> = Arc::new(CsvSeriesLoader::new(&config.data_path));
        let cache: Arc<dyn PredictionCache> = Arc::new(ArtifactPredictionCache::new(store.clone()));
        let metrics = if config.metrics_enabled {
            Some(Metrics::new().context("Failed to register metrics")?)
        } else {
            None
        };

        let mut sequence = ForecastService::new(
            Box::new(SequenceForecaster::new(config.sequence.clone(), store.clone())),
            source.clone(),
            cache.clone(),
        );
        let mut decomposition = ForecastService::new(
            Box::new(DecompositionForecaster::new(
                config.decomposition.clone(),
                store,
            )),
            source,
            cache,
        );
        if let Some(metrics) = &metrics {
            sequence = sequence.with_metrics(metrics.clone());
            decomposition = decomposition.with_metrics(metrics.clone());
        }

        info!(
            "Forecast services ready (data: {:?}, artifacts: {:?})",
            config.data_path, config.artifact_dir
        );
        Ok(Self {
            metrics,
            ..Self::new(sequence, decomposition)
        })
    }

    pub fn get(&self, family: ModelFamily) -> &Arc<ForecastService> {
        match family {
            ModelFamily::Sequence => &self.sequence,
            ModelFamily::Decomposition => &self.decomposition,
        }
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }

    /// Trains every family that has no persisted model yet. Families train
    /// concurrently on the blocking pool; each is still serialized by its own lock.
    pub async fn ensure_trained(&self) -> Result<()> {
        let handles: Vec<_> = ModelFamily::ALL
            .iter()
            .map(|&family| {
                let service = self.get(family).clone();
                tokio::task::spawn_blocking(move || (family, service.train(false)))
            })
            .collect();

        for handle in handles {
            let (family, outcome) = handle.await.context("Training task panicked")?;
            let outcome = outcome.with_context(|| format!("Failed to train {} model", family))?;
            info!("{} model: {}", family, outcome.as_str());
        }
        Ok(())
    }
}
