//! Descriptive market analytics over cleaned price series.
//!
//! Unknown volume never enters a computation: correlations use only rows where
//! both sides are known, so a blank volume cannot drag a coefficient to zero.

use crate::domain::series::{CleanSeries, PricePoint};
use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::Statistics;

const METRICS: [(&str, fn(&PricePoint) -> Option<f64>); 6] = [
    ("Price", |p| Some(p.price)),
    ("Open", |p| Some(p.open)),
    ("High", |p| Some(p.high)),
    ("Low", |p| Some(p.low)),
    ("Vol.", |p| p.volume),
    ("Change %", |p| Some(p.change_pct)),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DatedValue {
    pub date: NaiveDate,
    pub value: f64,
}

pub fn price_history(series: &CleanSeries) -> Vec<DatedValue> {
    series
        .points()
        .iter()
        .map(|p| DatedValue {
            date: p.date,
            value: p.price,
        })
        .collect()
}

/// Percent change from the previous row, dated at the later row.
/// A zero previous price yields no entry.
pub fn daily_returns(series: &CleanSeries) -> Vec<DatedValue> {
    series
        .points()
        .windows(2)
        .filter(|pair| pair[0].price != 0.0)
        .map(|pair| DatedValue {
            date: pair[1].date,
            value: (pair[1].price - pair[0].price) / pair[0].price * 100.0,
        })
        .collect()
}

/// Symmetric Pearson matrix; `None` where a coefficient is undefined
/// (fewer than two paired observations or zero variance).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        self.values[i][j]
    }
}

/// Pearson correlation over rows where both values are known.
pub fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let (a, b): (Vec<f64>, Vec<f64>) = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip();
    if a.len() < 2 {
        return None;
    }

    let covariance = a.iter().covariance(b.iter());
    let denominator = a.iter().std_dev() * b.iter().std_dev();
    let r = covariance / denominator;
    r.is_finite().then_some(r)
}

/// Correlates every metric of every labelled series with every other.
///
/// Series are aligned by row position (row `i` of each series) and
/// truncated to the shortest. Keys are `"<label>_<metric>"`.
pub fn correlation_matrix(inputs: &[(&str, &CleanSeries)]) -> CorrelationMatrix {
    let rows = inputs.iter().map(|(_, s)| s.len()).min().unwrap_or(0);

    let mut labels = Vec::with_capacity(inputs.len() * METRICS.len());
    let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(labels.capacity());
    for (label, series) in inputs {
        for (metric, extract) in METRICS {
            labels.push(format!("{}_{}", label, metric));
            columns.push(series.points()[..rows].iter().map(extract).collect());
        }
    }

    let values = columns
        .iter()
        .map(|x| columns.iter().map(|y| pearson(x, y)).collect())
        .collect();

    CorrelationMatrix { labels, values }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn series(prices: &[f64], volumes: &[Option<f64>]) -> CleanSeries {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        CleanSeries::from_points(
            prices
                .iter()
                .zip(volumes)
                .enumerate()
                .map(|(i, (&price, &volume))| PricePoint {
                    date: start + Duration::days(i as i64),
                    price,
                    open: price - 1.0,
                    high: price + 1.0,
                    low: price - 2.0,
                    volume,
                    change_pct: i as f64,
                })
                .collect(),
        )
    }

    #[test]
    fn test_daily_returns() {
        let s = series(&[100.0, 110.0, 99.0], &[None, None, None]);
        let returns = daily_returns(&s);
        assert_eq!(returns.len(), 2);
        assert!((returns[0].value - 10.0).abs() < 1e-12);
        assert!((returns[1].value + 10.0).abs() < 1e-12);
        assert_eq!(returns[1].date, s.get(2).unwrap().date);
        assert_eq!(price_history(&s).len(), 3);
    }

    #[test]
    fn test_pearson_perfect() {
        let xs: Vec<Option<f64>> = [1.0, 2.0, 3.0].iter().map(|&v| Some(v)).collect();
        let ys: Vec<Option<f64>> = [2.0, 4.0, 6.0].iter().map(|&v| Some(v)).collect();
        let neg: Vec<Option<f64>> = [3.0, 2.0, 1.0].iter().map(|&v| Some(v)).collect();
        assert!((pearson(&xs, &ys).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&xs, &neg).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_undefined() {
        let constant = vec![Some(1.0); 4];
        let varying = vec![Some(1.0), Some(2.0), Some(3.0), Some(5.0)];
        assert_eq!(pearson(&constant, &varying), None);
        assert_eq!(pearson(&[Some(1.0)], &[Some(2.0)]), None);
    }

    #[test]
    fn test_unknown_volume_is_skipped_not_zeroed() {
        // Paired over the known rows only, volume tracks price exactly.
        let s = series(
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            &[Some(100.0), None, Some(120.0), None, Some(140.0)],
        );
        let matrix = correlation_matrix(&[("gold", &s)]);
        let r = matrix.get("gold_Price", "gold_Vol.").unwrap();
        assert!((r - 1.0).abs() < 1e-12, "r = {}", r);

        // Zero-filling would have broken the relationship.
        let zero_filled: Vec<Option<f64>> = s
            .points()
            .iter()
            .map(|p| Some(p.volume.unwrap_or(0.0)))
            .collect();
        let prices: Vec<Option<f64>> = s.prices().into_iter().map(Some).collect();
        assert!(pearson(&prices, &zero_filled).unwrap() < 0.9);
    }

    #[test]
    fn test_cross_series_labels() {
        let gold = series(&[1.0, 2.0, 3.0, 4.0], &[Some(1.0); 4]);
        let silver = series(&[2.0, 1.0, 4.0], &[Some(1.0); 3]);
        let matrix = correlation_matrix(&[("gold", &gold), ("silver", &silver)]);
        assert_eq!(matrix.labels.len(), 12);
        assert!(matrix.labels.contains(&"silver_Change %".to_string()));
        assert!((matrix.get("gold_Price", "gold_Price").unwrap() - 1.0).abs() < 1e-12);
        // constant volume has no variance
        assert_eq!(matrix.get("gold_Vol.", "silver_Price"), None);
        assert_eq!(
            matrix.get("gold_Price", "silver_Price"),
            matrix.get("silver_Price", "gold_Price")
        );
    }
}
