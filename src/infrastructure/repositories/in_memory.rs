//! In-Memory Repository Implementations
//!
//! Thread-safe, in-memory implementations of the traits defined in
//! `domain::repositories`. Data is lost when the process exits, which makes
//! them suitable for tests and throwaway runs.

use crate::domain::errors::ForecastResult;
use crate::domain::forecasting::ModelFamily;
use crate::domain::prediction::PredictionRecord;
use crate::domain::repositories::{ArtifactStore, PredictionCache, SeriesSource};
use crate::domain::series::CleanSeries;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

/// In-memory implementation of ArtifactStore
pub struct InMemoryArtifactStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = blobs.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn read(&self, name: &str) -> ForecastResult<Option<Vec<u8>>> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(name).cloned())
    }

    fn write(&self, name: &str, bytes: &[u8]) -> ForecastResult<()> {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        blobs.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> ForecastResult<bool> {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.remove(name).is_some())
    }

    fn exists(&self, name: &str) -> ForecastResult<bool> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.contains_key(name))
    }
}

/// In-memory implementation of PredictionCache
pub struct InMemoryPredictionCache {
    entries: RwLock<HashMap<ModelFamily, Vec<PredictionRecord>>>,
}

impl InMemoryPredictionCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPredictionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionCache for InMemoryPredictionCache {
    fn load(&self, family: ModelFamily) -> ForecastResult<Option<Vec<PredictionRecord>>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&family).cloned())
    }

    fn store(&self, family: ModelFamily, records: &[PredictionRecord]) -> ForecastResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(family, records.to_vec());
        Ok(())
    }

    fn invalidate(&self, family: ModelFamily) -> ForecastResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&family);
        Ok(())
    }
}

/// Serves a fixed series and counts how often it was requested.
pub struct InMemorySeriesSource {
    series: CleanSeries,
    loads: AtomicUsize,
}

impl InMemorySeriesSource {
    pub fn new(series: CleanSeries) -> Self {
        Self {
            series,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl SeriesSource for InMemorySeriesSource {
    fn source_id(&self) -> String {
        "memory".to_string()
    }

    fn load(&self) -> ForecastResult<CleanSeries> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.series.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_artifact_store_replace() {
        let store = InMemoryArtifactStore::new();
        store.write("a", b"1").unwrap();
        store.write("a", b"2").unwrap();
        assert_eq!(store.read("a").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.names(), vec!["a".to_string()]);
        assert!(store.remove("a").unwrap());
        assert!(!store.exists("a").unwrap());
    }

    #[test]
    fn test_prediction_cache_round_trip() {
        let cache = InMemoryPredictionCache::new();
        let record = PredictionRecord {
            date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            actual_price: None,
            predicted_price: 1.0,
            predicted_price_low: 0.0,
            predicted_price_high: 2.0,
        };
        cache.store(ModelFamily::Sequence, &[record.clone()]).unwrap();
        assert_eq!(cache.load(ModelFamily::Sequence).unwrap(), Some(vec![record]));
        cache.invalidate(ModelFamily::Sequence).unwrap();
        assert_eq!(cache.load(ModelFamily::Sequence).unwrap(), None);
    }

    #[test]
    fn test_series_source_counts_loads() {
        let source = InMemorySeriesSource::new(CleanSeries::default());
        source.load().unwrap();
        source.load().unwrap();
        assert_eq!(source.load_count(), 2);
    }
}
