//! Observability for the prediction pipeline
//!
//! Prometheus counters and histograms kept in a private registry. Nothing
//! is served over the network; callers render the text format on demand
//! (the CLI prints it with `--metrics`).

pub mod metrics;

pub use metrics::Metrics;
