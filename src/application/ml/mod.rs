// Numerical models
pub mod decomposition;
pub mod lstm;
pub mod optimizer;

// Forecaster implementations
pub mod decomposition_forecaster;
pub mod sequence_forecaster;

pub use decomposition_forecaster::DecompositionForecaster;
pub use sequence_forecaster::SequenceForecaster;
