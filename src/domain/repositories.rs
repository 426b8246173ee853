//! Persistence and data-source abstractions.
//!
//! Business logic only sees these traits; the file-backed and in-memory
//! implementations live in `infrastructure`.
//!
//! - `SeriesSource`: produces a [`CleanSeries`] on demand
//! - `ArtifactStore`: named, whole-blob storage for trained models and scalers
//! - `PredictionCache`: the full prediction sequence per model family
//!
//! Every write is a whole-artifact replace, so a reader never observes a
//! partially written blob.

use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::forecasting::ModelFamily;
use crate::domain::prediction::PredictionRecord;
use crate::domain::series::CleanSeries;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Source of a cleaned price series.
pub trait SeriesSource: Send + Sync {
    /// Identifier used in logs and error messages (e.g. a file path).
    fn source_id(&self) -> String;

    fn load(&self) -> ForecastResult<CleanSeries>;
}

/// Named blob storage with atomic replace semantics.
pub trait ArtifactStore: Send + Sync {
    fn read(&self, name: &str) -> ForecastResult<Option<Vec<u8>>>;

    fn write(&self, name: &str, bytes: &[u8]) -> ForecastResult<()>;

    /// Returns true if something was removed.
    fn remove(&self, name: &str) -> ForecastResult<bool>;

    fn exists(&self, name: &str) -> ForecastResult<bool>;
}

/// Full, unfiltered prediction sequence per model family.
pub trait PredictionCache: Send + Sync {
    fn load(&self, family: ModelFamily) -> ForecastResult<Option<Vec<PredictionRecord>>>;

    fn store(&self, family: ModelFamily, records: &[PredictionRecord]) -> ForecastResult<()>;

    fn invalidate(&self, family: ModelFamily) -> ForecastResult<()>;
}

pub fn load_json<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    name: &str,
) -> ForecastResult<Option<T>> {
    match store.read(name)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ForecastError::persistence(name, "parsed", e)),
        None => Ok(None),
    }
}

pub fn store_json<T: Serialize + ?Sized>(
    store: &dyn ArtifactStore,
    name: &str,
    value: &T,
) -> ForecastResult<()> {
    let bytes =
        serde_json::to_vec(value).map_err(|e| ForecastError::persistence(name, "serialized", e))?;
    store.write(name, &bytes)
}
