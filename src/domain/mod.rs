// Price series types
pub mod series;

// Prediction records and date-range filtering
pub mod prediction;

// Model families and the forecaster contract
pub mod forecasting;

// Scaling and windowing
pub mod ml;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
