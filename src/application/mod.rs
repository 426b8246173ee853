// Model implementations
pub mod ml;

// Per-family orchestration (training, cache, range filtering)
pub mod forecast_service;

// Descriptive statistics over price series
pub mod analytics;

pub use forecast_service::{ForecastService, ForecastServices, TrainOutcome};
