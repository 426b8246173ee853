//! Prometheus metrics definitions for goldcast
//!
//! All metrics use the `goldcast_` prefix and are labelled by model family.

use prometheus::{
    CounterVec, HistogramOpts, HistogramTimer, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus metrics for the prediction pipeline
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Prediction requests answered from the cache
    pub cache_hits_total: CounterVec,
    /// Prediction requests that had to consult the model
    pub cache_misses_total: CounterVec,
    /// Explicit cache invalidations
    pub cache_invalidations_total: CounterVec,
    /// Training runs by outcome (trained, skipped, failed)
    pub trainings_total: CounterVec,
    /// Wall-clock training duration in seconds
    pub training_duration_seconds: HistogramVec,
    /// Full-series prediction generation duration in seconds
    pub prediction_duration_seconds: HistogramVec,
    /// Records returned to callers after range filtering
    pub records_served_total: CounterVec,
}

impl Metrics {
    /// Create a new Metrics instance with all counters and histograms registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cache_hits_total = CounterVec::new(
            Opts::new("goldcast_cache_hits_total", "Prediction requests served from cache"),
            &["family"],
        )?;
        registry.register(Box::new(cache_hits_total.clone()))?;

        let cache_misses_total = CounterVec::new(
            Opts::new(
                "goldcast_cache_misses_total",
                "Prediction requests that invoked the model",
            ),
            &["family"],
        )?;
        registry.register(Box::new(cache_misses_total.clone()))?;

        let cache_invalidations_total = CounterVec::new(
            Opts::new(
                "goldcast_cache_invalidations_total",
                "Explicit prediction cache invalidations",
            ),
            &["family"],
        )?;
        registry.register(Box::new(cache_invalidations_total.clone()))?;

        let trainings_total = CounterVec::new(
            Opts::new("goldcast_trainings_total", "Training runs by outcome"),
            &["family", "outcome"],
        )?;
        registry.register(Box::new(trainings_total.clone()))?;

        let training_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "goldcast_training_duration_seconds",
                "Model training duration in seconds",
            )
            .buckets(vec![
                0.1, 1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0,
            ]),
            &["family"],
        )?;
        registry.register(Box::new(training_duration_seconds.clone()))?;

        let prediction_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "goldcast_prediction_duration_seconds",
                "Full-series prediction generation duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
            &["family"],
        )?;
        registry.register(Box::new(prediction_duration_seconds.clone()))?;

        let records_served_total = CounterVec::new(
            Opts::new(
                "goldcast_records_served_total",
                "Prediction records returned after range filtering",
            ),
            &["family"],
        )?;
        registry.register(Box::new(records_served_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            cache_hits_total,
            cache_misses_total,
            cache_invalidations_total,
            trainings_total,
            training_duration_seconds,
            prediction_duration_seconds,
            records_served_total,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_cache_hit(&self, family: &str) {
        self.cache_hits_total.with_label_values(&[family]).inc();
    }

    pub fn inc_cache_miss(&self, family: &str) {
        self.cache_misses_total.with_label_values(&[family]).inc();
    }

    pub fn inc_invalidation(&self, family: &str) {
        self.cache_invalidations_total
            .with_label_values(&[family])
            .inc();
    }

    pub fn inc_training(&self, family: &str, outcome: &str) {
        self.trainings_total
            .with_label_values(&[family, outcome])
            .inc();
    }

    /// Observes the elapsed training time when the timer is dropped.
    pub fn start_training_timer(&self, family: &str) -> HistogramTimer {
        self.training_duration_seconds
            .with_label_values(&[family])
            .start_timer()
    }

    pub fn start_prediction_timer(&self, family: &str) -> HistogramTimer {
        self.prediction_duration_seconds
            .with_label_values(&[family])
            .start_timer()
    }

    pub fn add_records_served(&self, family: &str, count: usize) {
        self.records_served_total
            .with_label_values(&[family])
            .inc_by(count as f64);
    }
}
