use chrono::{Duration, NaiveDate};
use goldcast::application::ml::DecompositionForecaster;
use goldcast::application::{ForecastService, TrainOutcome};
use goldcast::config::DecompositionConfig;
use goldcast::domain::errors::ForecastError;
use goldcast::domain::repositories::ArtifactStore;
use goldcast::domain::series::{CleanSeries, PricePoint};
use goldcast::infrastructure::{
    ArtifactPredictionCache, InMemoryArtifactStore, InMemorySeriesSource,
};
use std::sync::Arc;

fn series(n: usize) -> CleanSeries {
    let start = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
    CleanSeries::from_points(
        (0..n)
            .map(|i| {
                let price = 1700.0 + 0.5 * i as f64 + 15.0 * (i as f64 / 30.0).cos();
                PricePoint {
                    date: start + Duration::days(i as i64),
                    price,
                    open: price,
                    high: price + 3.0,
                    low: price - 3.0,
                    volume: None,
                    change_pct: 0.0,
                }
            })
            .collect(),
    )
}

fn build(store: Arc<dyn ArtifactStore>, data: CleanSeries) -> ForecastService {
    let config = DecompositionConfig {
        uncertainty_samples: 100,
        ..Default::default()
    };
    ForecastService::new(
        Box::new(DecompositionForecaster::new(config, store.clone())),
        Arc::new(InMemorySeriesSource::new(data)),
        Arc::new(ArtifactPredictionCache::new(store)),
    )
}

#[test]
fn test_history_plus_one_year_of_future_dates() {
    let data = series(400);
    let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    let service = build(store.clone(), data.clone());

    assert!(matches!(
        service.get_predictions(None, None, false),
        Err(ForecastError::ModelNotTrained { .. })
    ));
    assert_eq!(service.train(false).unwrap(), TrainOutcome::Trained);
    assert!(store.exists("decomposition_model").unwrap());

    let records = service.get_predictions(None, None, false).unwrap();
    assert_eq!(records.len(), 400 + 365);

    let last = data.last_date().unwrap();
    let future: Vec<_> = records.iter().filter(|r| r.date > last).collect();
    assert_eq!(future.len(), 365);
    assert!(future.iter().all(|r| r.actual_price.is_none()));
    assert_eq!(future[364].date, last + Duration::days(365));

    let history = &records[..400];
    assert!(history
        .iter()
        .zip(data.points())
        .all(|(r, p)| r.date == p.date && r.actual_price == Some(p.price)));
    assert!(records.windows(2).all(|w| w[0].date < w[1].date));
    assert!(records
        .iter()
        .all(|r| r.predicted_price_low <= r.predicted_price_high));
}

#[test]
fn test_future_only_range() {
    let data = series(200);
    let service = build(Arc::new(InMemoryArtifactStore::new()), data);
    service.train(false).unwrap();

    // Series ends 2020-12-17; ask for the first week of 2021.
    let week = service
        .get_predictions(Some("2021-01-01"), Some("2021-01-07"), false)
        .unwrap();
    assert_eq!(week.len(), 7);
    assert!(week.iter().all(|r| r.actual_price.is_none()));
}

#[test]
fn test_second_train_is_skipped() {
    let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    build(store.clone(), series(100)).train(false).unwrap();

    // A new process over the same artifacts sees the persisted model.
    let restarted = build(store, series(100));
    assert_eq!(restarted.train(false).unwrap(), TrainOutcome::Skipped);
    assert_eq!(restarted.get_predictions(None, None, false).unwrap().len(), 465);
}
