use crate::domain::errors::{ForecastError, ForecastResult};
use serde::{Deserialize, Serialize};

/// Min-max normalization into [0, 1].
///
/// The bounds are fixed at fit time. A model trained on transformed values
/// must be persisted together with the scaler that produced them, since it is
/// the only valid inverse. `inverse` does not clamp: predictions may land
/// slightly outside the historical range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    pub fn fit(values: &[f64]) -> ForecastResult<Self> {
        if values.is_empty() {
            return Err(ForecastError::InsufficientData {
                available: 0,
                required: 1,
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::invalid_config(
                "cannot fit scaler on non-finite values",
            ));
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(Self { min, max })
    }

    pub fn from_bounds(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    // A constant series has no spread; treat it as unit range so it maps to 0.
    fn range(&self) -> f64 {
        let range = self.max - self.min;
        if range == 0.0 { 1.0 } else { range }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.range()
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }

    pub fn inverse(&self, value: f64) -> f64 {
        value * self.range() + self.min
    }

    pub fn inverse_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.inverse(v)).collect()
    }

    pub fn fit_transform(values: &[f64]) -> ForecastResult<(Self, Vec<f64>)> {
        let scaler = Self::fit(values)?;
        let scaled = scaler.transform_all(values);
        Ok((scaler, scaled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_maps_to_unit_interval() {
        let (scaler, scaled) = MinMaxScaler::fit_transform(&[1800.0, 1900.0, 2000.0]).unwrap();
        assert_eq!(scaled, vec![0.0, 0.5, 1.0]);
        assert_eq!(scaler.min(), 1800.0);
        assert_eq!(scaler.max(), 2000.0);
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let values = vec![-3.5, 0.0, 12.25, 1999.99, 1234.5678, -0.001];
        let (scaler, scaled) = MinMaxScaler::fit_transform(&values).unwrap();
        let restored = scaler.inverse_all(&scaled);
        for (a, b) in values.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_inverse_does_not_clamp() {
        let scaler = MinMaxScaler::from_bounds(100.0, 200.0);
        assert_eq!(scaler.inverse(1.1), 210.0);
        assert_eq!(scaler.inverse(-0.1), 90.0);
    }

    #[test]
    fn test_constant_series() {
        let (scaler, scaled) = MinMaxScaler::fit_transform(&[5.0, 5.0, 5.0]).unwrap();
        assert_eq!(scaled, vec![0.0, 0.0, 0.0]);
        assert_eq!(scaler.inverse(0.0), 5.0);
    }

    #[test]
    fn test_same_bounds_are_bit_reproducible() {
        let a = MinMaxScaler::from_bounds(1234.5, 2077.25);
        let b: MinMaxScaler = serde_json::from_str(&serde_json::to_string(&a).unwrap()).unwrap();
        for v in [1300.1, 1999.9, 2077.25] {
            assert_eq!(a.transform(v).to_bits(), b.transform(v).to_bits());
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            MinMaxScaler::fit(&[]),
            Err(ForecastError::InsufficientData { .. })
        ));
    }
}
