pub mod artifact_store;
pub mod prediction_cache;

pub use artifact_store::FileArtifactStore;
pub use prediction_cache::ArtifactPredictionCache;
