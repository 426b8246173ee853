pub mod in_memory;

pub use in_memory::{InMemoryArtifactStore, InMemoryPredictionCache, InMemorySeriesSource};
