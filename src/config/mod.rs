//! Configuration module for goldcast.
//!
//! Configuration is loaded from environment variables (a `.env` file is
//! honoured by the binary), organized by model family.

mod decomposition_config;
mod sequence_config;

pub use decomposition_config::DecompositionConfig;
pub use sequence_config::SequenceConfig;

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Price table the forecasters are trained on
    pub data_path: PathBuf,
    /// Directory holding trained models, scalers and prediction caches
    pub artifact_dir: PathBuf,
    pub metrics_enabled: bool,
    pub sequence: SequenceConfig,
    pub decomposition: DecompositionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data.csv"),
            artifact_dir: PathBuf::from("artifacts"),
            metrics_enabled: true,
            sequence: SequenceConfig::default(),
            decomposition: DecompositionConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let data_path = PathBuf::from(
            env::var("FORECAST_DATA_PATH").unwrap_or_else(|_| "data.csv".to_string()),
        );
        let artifact_dir = PathBuf::from(
            env::var("FORECAST_ARTIFACT_DIR").unwrap_or_else(|_| "artifacts".to_string()),
        );

        let metrics_enabled = env::var("METRICS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let config = Self {
            data_path,
            artifact_dir,
            metrics_enabled,
            sequence: SequenceConfig::from_env()?,
            decomposition: DecompositionConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sequence
            .validate()
            .context("Invalid sequence forecaster configuration")?;
        self.decomposition
            .validate()
            .context("Invalid decomposition forecaster configuration")?;
        Ok(())
    }
}

/// Reads `name` from the environment (falling back to `default`) and parses it.
pub(crate) fn parse_env<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse::<T>()
        .with_context(|| format!("Failed to parse {}", name))
}
