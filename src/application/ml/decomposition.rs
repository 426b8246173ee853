//! Additive trend + seasonality model.
//!
//! `y(t) = offset + growth * t + sum_j delta_j * (t - s_j)+ + seasonal(t)`
//!
//! Time is scaled to [0, 1] over the history and prices by their largest
//! magnitude. Every design column is multiplied by its prior scale before a
//! ridge fit, so a larger prior scale means a weaker pull towards zero.
//! Seasonal terms are Fourier series over days since the Unix epoch.

use crate::config::DecompositionConfig;
use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::forecasting::ModelFamily;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::ridge_regression::{
    RidgeRegression, RidgeRegressionParameters, RidgeRegressionSolverName,
};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;
use tracing::debug;

// Offset and base growth are only weakly regularized.
const TREND_PRIOR_SCALE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    pub name: String,
    pub period: f64,
    pub order: usize,
}

impl Seasonality {
    fn new(name: &str, period: f64, order: usize) -> Self {
        Self {
            name: name.to_string(),
            period,
            order,
        }
    }

    fn push_features(&self, days: f64, row: &mut Vec<f64>) {
        for k in 1..=self.order {
            let angle = 2.0 * PI * k as f64 * days / self.period;
            row.push(angle.sin());
            row.push(angle.cos());
        }
    }

    fn width(&self) -> usize {
        2 * self.order
    }
}

/// Point forecast with its uncertainty band, in price units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub yhat: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditiveModel {
    start: NaiveDate,
    span_days: f64,
    y_scale: f64,
    /// Changepoint locations in scaled time
    changepoints: Vec<f64>,
    seasonalities: Vec<Seasonality>,
    offset: f64,
    growth: f64,
    deltas: Vec<f64>,
    seasonal_coefficients: Vec<f64>,
    /// Residual standard deviation in scaled units
    sigma: f64,
    interval_width: f64,
    uncertainty_samples: usize,
    seed: u64,
}

fn days_since_epoch(date: NaiveDate) -> f64 {
    date.signed_duration_since(NaiveDate::default()).num_days() as f64
}

fn training_error(reason: impl ToString) -> ForecastError {
    ForecastError::Training {
        family: ModelFamily::Decomposition,
        reason: reason.to_string(),
    }
}

/// Linear-interpolated quantile of an ascending slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Inverse CDF of Laplace(0, scale) for `u` in (-0.5, 0.5).
fn laplace(u: f64, scale: f64) -> f64 {
    -scale * u.signum() * (1.0 - 2.0 * u.abs()).ln()
}

impl AdditiveModel {
    pub fn fit(
        dates: &[NaiveDate],
        values: &[f64],
        config: &DecompositionConfig,
    ) -> ForecastResult<Self> {
        config.validate()?;
        if dates.len() != values.len() {
            return Err(ForecastError::invalid_config(format!(
                "{} dates but {} values",
                dates.len(),
                values.len()
            )));
        }
        let (Some(&start), Some(&end)) = (dates.first(), dates.last()) else {
            return Err(ForecastError::InsufficientData {
                available: 0,
                required: 2,
            });
        };
        let span_days = end.signed_duration_since(start).num_days() as f64;
        if dates.len() < 2 || span_days <= 0.0 {
            return Err(ForecastError::InsufficientData {
                available: dates.len(),
                required: 2,
            });
        }

        let y_scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };

        let mut model = Self {
            start,
            span_days,
            y_scale,
            changepoints: Vec::new(),
            seasonalities: Self::seasonalities(config),
            offset: 0.0,
            growth: 0.0,
            deltas: Vec::new(),
            seasonal_coefficients: Vec::new(),
            sigma: 0.0,
            interval_width: config.interval_width,
            uncertainty_samples: config.uncertainty_samples,
            seed: config.seed,
        };

        let t: Vec<f64> = dates.iter().map(|&d| model.scaled_time(d)).collect();
        let y: Vec<f64> = values.iter().map(|v| v / y_scale).collect();
        model.changepoints = Self::place_changepoints(&t, config);

        // Column prior scales in design order
        let mut scales = vec![TREND_PRIOR_SCALE, TREND_PRIOR_SCALE];
        scales.extend(std::iter::repeat_n(
            config.changepoint_prior_scale,
            model.changepoints.len(),
        ));
        let seasonal_width: usize = model.seasonalities.iter().map(Seasonality::width).sum();
        scales.extend(std::iter::repeat_n(config.seasonality_prior_scale, seasonal_width));

        let rows: Vec<Vec<f64>> = dates
            .iter()
            .zip(&t)
            .map(|(&date, &ti)| {
                model
                    .features(date, ti)
                    .iter()
                    .zip(&scales)
                    .map(|(x, s)| x * s)
                    .collect()
            })
            .collect();

        let coefficients = Self::ridge(&rows, &y, config.ridge_alpha)?;
        let unscaled: Vec<f64> = coefficients.iter().zip(&scales).map(|(b, s)| b * s).collect();

        let n_cp = model.changepoints.len();
        model.offset = unscaled[0];
        model.growth = unscaled[1];
        model.deltas = unscaled[2..2 + n_cp].to_vec();
        model.seasonal_coefficients = unscaled[2 + n_cp..].to_vec();

        let sse: f64 = dates
            .iter()
            .zip(&t)
            .zip(&y)
            .map(|((&date, &ti), &yi)| {
                let residual = yi - model.mean_scaled(date, ti);
                residual * residual
            })
            .sum();
        model.sigma = (sse / y.len() as f64).sqrt();
        if !model.sigma.is_finite() {
            return Err(training_error("non-finite residuals"));
        }

        debug!(
            "Additive model fitted: {} changepoints, {} seasonal terms, sigma={:.6}",
            n_cp,
            seasonal_width,
            model.sigma * y_scale
        );
        Ok(model)
    }

    fn seasonalities(config: &DecompositionConfig) -> Vec<Seasonality> {
        let mut seasonalities = Vec::new();
        if config.yearly_seasonality {
            seasonalities.push(Seasonality::new("yearly", 365.25, 10));
        }
        if config.weekly_seasonality {
            seasonalities.push(Seasonality::new("weekly", 7.0, 3));
        }
        if config.daily_seasonality {
            seasonalities.push(Seasonality::new("daily", 1.0, 4));
        }
        seasonalities
    }

    /// Evenly spaced over the first `changepoint_range` of the history,
    /// excluding the first point.
    fn place_changepoints(t: &[f64], config: &DecompositionConfig) -> Vec<f64> {
        let history = ((t.len() as f64) * config.changepoint_range).floor() as usize;
        let count = config.n_changepoints.min(history.saturating_sub(1));
        if count == 0 {
            return Vec::new();
        }
        (1..=count)
            .map(|k| {
                let index = (k as f64 * (history - 1) as f64 / count as f64).round() as usize;
                t[index.min(t.len() - 1)]
            })
            .collect()
    }

    fn ridge(rows: &[Vec<f64>], y: &[f64], alpha: f64) -> ForecastResult<Vec<f64>> {
        let width = rows.first().map_or(0, Vec::len);
        let x = DenseMatrix::from_2d_vec(&rows.to_vec()).map_err(training_error)?;
        let params = RidgeRegressionParameters::default()
            .with_alpha(alpha)
            .with_normalize(false)
            .with_solver(RidgeRegressionSolverName::Cholesky);
        let model: RidgeRegression<f64, f64, DenseMatrix<f64>, Vec<f64>> =
            RidgeRegression::fit(&x, &y.to_vec(), params).map_err(training_error)?;

        // Read the linear coefficients back by predicting the origin and unit rows.
        let mut basis_rows = vec![vec![0.0; width]];
        for j in 0..width {
            let mut unit = vec![0.0; width];
            unit[j] = 1.0;
            basis_rows.push(unit);
        }
        let basis_matrix = DenseMatrix::from_2d_vec(&basis_rows).map_err(training_error)?;
        let responses = model.predict(&basis_matrix).map_err(training_error)?;
        let intercept = responses.first().copied().unwrap_or(0.0);

        let mut coefficients: Vec<f64> = responses.iter().skip(1).map(|r| r - intercept).collect();
        if let Some(offset) = coefficients.first_mut() {
            // Fold any fitted intercept into the constant column.
            *offset += intercept / TREND_PRIOR_SCALE;
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(training_error("ridge solution is not finite"));
        }
        Ok(coefficients)
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        date.signed_duration_since(self.start).num_days() as f64 / self.span_days
    }

    /// Unscaled design row: constant, time, changepoint hinges, Fourier terms.
    fn features(&self, date: NaiveDate, t: f64) -> Vec<f64> {
        let mut row = Vec::with_capacity(2 + self.changepoints.len() + 2 * 17);
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|&s| (t - s).max(0.0)));
        let days = days_since_epoch(date);
        for seasonality in &self.seasonalities {
            seasonality.push_features(days, &mut row);
        }
        row
    }

    fn trend_scaled(&self, t: f64) -> f64 {
        let hinges: f64 = self
            .changepoints
            .iter()
            .zip(&self.deltas)
            .map(|(&s, &delta)| delta * (t - s).max(0.0))
            .sum();
        self.offset + self.growth * t + hinges
    }

    fn seasonal_scaled(&self, date: NaiveDate) -> f64 {
        let mut terms = Vec::with_capacity(self.seasonal_coefficients.len());
        let days = days_since_epoch(date);
        for seasonality in &self.seasonalities {
            seasonality.push_features(days, &mut terms);
        }
        terms
            .iter()
            .zip(&self.seasonal_coefficients)
            .map(|(x, b)| x * b)
            .sum()
    }

    fn mean_scaled(&self, date: NaiveDate, t: f64) -> f64 {
        self.trend_scaled(t) + self.seasonal_scaled(date)
    }

    pub fn changepoint_count(&self) -> usize {
        self.changepoints.len()
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Residual standard deviation in price units.
    pub fn sigma(&self) -> f64 {
        self.sigma * self.y_scale
    }

    /// Mean forecast for each date, without uncertainty.
    pub fn point_forecast(&self, dates: &[NaiveDate]) -> Vec<f64> {
        dates
            .iter()
            .map(|&d| self.mean_scaled(d, self.scaled_time(d)) * self.y_scale)
            .collect()
    }

    /// Forecast with uncertainty bands. `dates` must be ascending.
    ///
    /// Trend uncertainty only grows past the end of the history: new
    /// changepoints arrive at the historical rate with Laplace-distributed
    /// rate changes. Observation noise is Gaussian with the fitted sigma.
    pub fn forecast(&self, dates: &[NaiveDate]) -> ForecastResult<Vec<Interval>> {
        let times: Vec<f64> = dates.iter().map(|&d| self.scaled_time(d)).collect();
        let means: Vec<f64> = dates
            .iter()
            .zip(&times)
            .map(|(&d, &t)| self.mean_scaled(d, t))
            .collect();

        let lower_q = (1.0 - self.interval_width) / 2.0;
        let upper_q = (1.0 + self.interval_width) / 2.0;

        if self.uncertainty_samples == 0 {
            let z = Normal::new(0.0, 1.0)
                .map_err(training_error)?
                .inverse_cdf(upper_q);
            let half = z * self.sigma;
            return Ok(means
                .iter()
                .map(|&m| Interval {
                    yhat: m * self.y_scale,
                    lower: (m - half) * self.y_scale,
                    upper: (m + half) * self.y_scale,
                })
                .collect());
        }

        let noise = if self.sigma > 0.0 {
            Some(Normal::new(0.0, self.sigma).map_err(training_error)?)
        } else {
            None
        };
        let rate = self.changepoints.len() as f64;
        let delta_scale =
            self.deltas.iter().map(|d| d.abs()).sum::<f64>() / self.deltas.len().max(1) as f64 + 1e-8;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut samples = vec![Vec::with_capacity(self.uncertainty_samples); dates.len()];

        for _ in 0..self.uncertainty_samples {
            // (location, delta) of changepoints added in this path
            let mut future_changes: Vec<(f64, f64)> = Vec::new();
            let mut previous_t = 1.0_f64;

            for (i, &t) in times.iter().enumerate() {
                if t > 1.0 {
                    let dt = t - previous_t.max(1.0);
                    if dt > 0.0 && rng.random::<f64>() < (rate * dt).min(1.0) {
                        let u = rng.random::<f64>() - 0.5;
                        future_changes.push((previous_t.max(1.0), laplace(u, delta_scale)));
                    }
                }
                previous_t = t;

                let extra: f64 = future_changes
                    .iter()
                    .map(|&(s, delta)| delta * (t - s).max(0.0))
                    .sum();
                let epsilon = match &noise {
                    Some(normal) => {
                        let u: f64 = rng.random_range(f64::EPSILON..1.0);
                        normal.inverse_cdf(u)
                    }
                    None => 0.0,
                };
                samples[i].push(means[i] + extra + epsilon);
            }
        }

        Ok(means
            .iter()
            .zip(samples.iter_mut())
            .map(|(&m, draws)| {
                draws.sort_by(f64::total_cmp);
                Interval {
                    yhat: m * self.y_scale,
                    lower: quantile(draws, lower_q) * self.y_scale,
                    upper: quantile(draws, upper_q) * self.y_scale,
                }
            })
            .collect())
    }
}
