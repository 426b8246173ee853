//! goldcast - price forecasting from the command line
//!
//! Logs go to stderr; command results are printed to stdout as JSON.
//!
//! # Usage
//! ```sh
//! goldcast train
//! goldcast predict --model lstm --start 2022-01-01 --end 2022-01-31
//! goldcast retrain --model prophet --force
//! goldcast correlation gold.csv silver.csv
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use goldcast::application::analytics;
use goldcast::application::{ForecastService, ForecastServices};
use goldcast::config::Config;
use goldcast::domain::forecasting::ModelFamily;
use goldcast::domain::repositories::SeriesSource;
use goldcast::infrastructure::CsvSeriesLoader;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Gold price forecasting", long_about = None)]
struct Cli {
    /// Print Prometheus metrics after the command finishes
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train every model that has no persisted artifacts yet
    Train {
        /// Retrain even if artifacts exist (also clears the prediction caches)
        #[arg(short, long)]
        force: bool,
    },
    /// Retrain one model and clear its prediction cache
    Retrain {
        /// Model family (lstm or prophet)
        #[arg(short, long)]
        model: ModelFamily,

        #[arg(short, long)]
        force: bool,
    },
    /// Print predictions for one model, optionally restricted to a date range
    Predict {
        /// Model family (lstm or prophet)
        #[arg(short, long)]
        model: ModelFamily,

        /// Inclusive start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Inclusive end date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Ignore the cache and regenerate from the model
        #[arg(short, long)]
        regenerate: bool,
    },
    /// Print daily percent returns of the configured price file
    Returns,
    /// Print the correlation matrix of one or more price files
    Correlation {
        /// CSV files; each is labelled by its file stem
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

async fn run_blocking<T, F>(service: &Arc<ForecastService>, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&ForecastService) -> goldcast::domain::errors::ForecastResult<T> + Send + 'static,
{
    let service = service.clone();
    let family = service.family();
    tokio::task::spawn_blocking(move || job(&service))
        .await
        .context("Forecast task panicked")?
        .with_context(|| format!("{} model failed", family))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stderr_layer)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    config.metrics_enabled |= cli.metrics;

    match cli.command {
        Commands::Train { force } => {
            let services = ForecastServices::bootstrap(&config)?;
            if force {
                let jobs: Vec<_> = ModelFamily::ALL
                    .iter()
                    .map(|&family| {
                        let service = services.get(family).clone();
                        tokio::spawn(async move { run_blocking(&service, |s| s.retrain(true)).await })
                    })
                    .collect();
                for job in jobs {
                    job.await.context("Training task panicked")??;
                }
            } else {
                services.ensure_trained().await?;
            }
            info!("Training complete");
            print_metrics(&services, cli.metrics);
        }
        Commands::Retrain { model, force } => {
            let services = ForecastServices::bootstrap(&config)?;
            let outcome = run_blocking(services.get(model), move |s| s.retrain(force)).await?;
            info!("{} retrain finished: {}", model, outcome.as_str());
            print_metrics(&services, cli.metrics);
        }
        Commands::Predict {
            model,
            start,
            end,
            regenerate,
        } => {
            let services = ForecastServices::bootstrap(&config)?;
            let records = run_blocking(services.get(model), move |s| {
                s.get_predictions(start.as_deref(), end.as_deref(), regenerate)
            })
            .await?;
            print_json(&records)?;
            print_metrics(&services, cli.metrics);
        }
        Commands::Returns => {
            let series = CsvSeriesLoader::new(&config.data_path).load()?;
            print_json(&analytics::daily_returns(&series))?;
        }
        Commands::Correlation { files } => {
            let mut loaded = Vec::with_capacity(files.len());
            for path in &files {
                let label = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                let series = CsvSeriesLoader::new(path).load()?;
                loaded.push((label, series));
            }
            let inputs: Vec<(&str, &_)> = loaded
                .iter()
                .map(|(label, series)| (label.as_str(), series))
                .collect();
            print_json(&analytics::correlation_matrix(&inputs))?;
        }
    }

    Ok(())
}

fn print_metrics(services: &ForecastServices, requested: bool) {
    if !requested {
        return;
    }
    if let Some(metrics) = services.metrics() {
        eprintln!("{}", metrics.render());
    }
}
