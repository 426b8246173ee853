use crate::domain::errors::ForecastResult;
use crate::domain::forecasting::ModelFamily;
use crate::domain::prediction::PredictionRecord;
use crate::domain::repositories::{ArtifactStore, PredictionCache, load_json, store_json};
use std::sync::Arc;
use tracing::info;

/// Prediction cache persisted as one artifact per model family.
///
/// The blob is keyed only by family. It is not tied to the training run or
/// the source data, so it stays valid until explicitly invalidated.
pub struct ArtifactPredictionCache {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactPredictionCache {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }
}

impl PredictionCache for ArtifactPredictionCache {
    fn load(&self, family: ModelFamily) -> ForecastResult<Option<Vec<PredictionRecord>>> {
        load_json(self.store.as_ref(), family.predictions_artifact())
    }

    fn store(&self, family: ModelFamily, records: &[PredictionRecord]) -> ForecastResult<()> {
        store_json(self.store.as_ref(), family.predictions_artifact(), records)
    }

    fn invalidate(&self, family: ModelFamily) -> ForecastResult<()> {
        if self.store.remove(family.predictions_artifact())? {
            info!("Invalidated {} prediction cache", family);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemoryArtifactStore;
    use chrono::NaiveDate;

    fn records() -> Vec<PredictionRecord> {
        vec![
            PredictionRecord {
                date: NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(),
                actual_price: Some(1801.9),
                predicted_price: 1799.123456789012,
                predicted_price_low: 1750.1,
                predicted_price_high: 1848.1,
            },
            PredictionRecord {
                date: NaiveDate::from_ymd_opt(2022, 1, 4).unwrap(),
                actual_price: None,
                predicted_price: 0.1 + 0.2,
                predicted_price_low: -1.0e-7,
                predicted_price_high: 1.0 / 3.0,
            },
        ]
    }

    #[test]
    fn test_families_are_isolated() {
        let cache = ArtifactPredictionCache::new(Arc::new(InMemoryArtifactStore::new()));
        cache.store(ModelFamily::Sequence, &records()).unwrap();

        assert!(cache.load(ModelFamily::Decomposition).unwrap().is_none());
        assert_eq!(cache.load(ModelFamily::Sequence).unwrap().unwrap(), records());
    }

    #[test]
    fn test_reload_is_bit_exact() {
        let cache = ArtifactPredictionCache::new(Arc::new(InMemoryArtifactStore::new()));
        cache.store(ModelFamily::Decomposition, &records()).unwrap();
        let loaded = cache.load(ModelFamily::Decomposition).unwrap().unwrap();
        for (a, b) in records().iter().zip(loaded.iter()) {
            assert_eq!(a.predicted_price.to_bits(), b.predicted_price.to_bits());
            assert_eq!(a.predicted_price_high.to_bits(), b.predicted_price_high.to_bits());
        }
    }

    #[test]
    fn test_invalidate_removes_cache() {
        let cache = ArtifactPredictionCache::new(Arc::new(InMemoryArtifactStore::new()));
        cache.store(ModelFamily::Sequence, &records()).unwrap();
        cache.invalidate(ModelFamily::Sequence).unwrap();
        assert!(cache.load(ModelFamily::Sequence).unwrap().is_none());

        // Invalidating a cold cache is a no-op.
        cache.invalidate(ModelFamily::Sequence).unwrap();
    }
}
