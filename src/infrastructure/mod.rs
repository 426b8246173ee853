pub mod observability;
pub mod persistence;
pub mod repositories;
pub mod series_loader;

pub use persistence::{ArtifactPredictionCache, FileArtifactStore};
pub use repositories::{InMemoryArtifactStore, InMemoryPredictionCache, InMemorySeriesSource};
pub use series_loader::CsvSeriesLoader;
