use goldcast::application::ForecastServices;
use goldcast::config::{Config, DecompositionConfig, SequenceConfig};
use goldcast::domain::forecasting::ModelFamily;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

fn workspace() -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "goldcast_bootstrap_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ));
    fs::create_dir_all(&dir).expect("Failed to create workspace");
    dir
}

fn write_prices(path: &PathBuf, rows: usize) {
    let mut csv = String::from("Date,Price,Open,High,Low,Vol.,Change %\n");
    for i in 0..rows {
        let date = chrono::NaiveDate::from_ymd_opt(2021, 3, 1).unwrap() + chrono::Duration::days(i as i64);
        let price = 1700.0 + (i as f64 / 5.0).sin() * 10.0 + i as f64;
        writeln!(
            csv,
            "{},\"{:.2}\",\"{:.2}\",\"{:.2}\",\"{:.2}\",{}K,0.10%",
            date.format("%m/%d/%Y"),
            price,
            price - 1.0,
            price + 4.0,
            price - 4.0,
            i % 3 + 1
        )
        .unwrap();
    }
    fs::write(path, csv).expect("Failed to write prices");
}

fn config(dir: &PathBuf) -> Config {
    Config {
        data_path: dir.join("gold.csv"),
        artifact_dir: dir.join("artifacts"),
        metrics_enabled: true,
        sequence: SequenceConfig {
            window_size: 10,
            units: 3,
            layers: 2,
            dense_units: 2,
            epochs: 2,
            batch_size: 16,
            ..Default::default()
        },
        decomposition: DecompositionConfig {
            uncertainty_samples: 20,
            horizon_days: 10,
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_startup_trains_missing_models_once() {
    let dir = workspace();
    write_prices(&dir.join("gold.csv"), 80);
    let config = config(&dir);

    let services = ForecastServices::bootstrap(&config).unwrap();
    services.ensure_trained().await.unwrap();

    let artifacts = dir.join("artifacts");
    for name in ["sequence_model", "decomposition_model"] {
        assert!(artifacts.join(format!("{}.json", name)).is_file(), "{} missing", name);
    }

    let sequence = services
        .get(ModelFamily::Sequence)
        .get_predictions(None, None, false)
        .unwrap();
    assert_eq!(sequence.len(), 70);
    let decomposition = services
        .get(ModelFamily::Decomposition)
        .get_predictions(None, None, false)
        .unwrap();
    assert_eq!(decomposition.len(), 90);
    assert!(artifacts.join("sequence_predictions.json").is_file());

    // A restart over the same directory skips training.
    let restarted = ForecastServices::bootstrap(&config).unwrap();
    restarted.ensure_trained().await.unwrap();
    let output = restarted.metrics().unwrap().render();
    assert!(output.contains("goldcast_trainings_total{family=\"sequence\",outcome=\"skipped\"} 1"));

    fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn test_missing_data_file_fails_training() {
    let dir = workspace();
    let services = ForecastServices::bootstrap(&config(&dir)).unwrap();
    let err = services.ensure_trained().await.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to load price data"));
    fs::remove_dir_all(dir).ok();
}
