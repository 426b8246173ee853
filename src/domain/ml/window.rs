use crate::domain::errors::{ForecastError, ForecastResult};
use ndarray::{Array1, Array2};

/// Fixed-length input windows over a scaled series with next-step labels.
///
/// Row `i` holds `scaled[i..i + W]` and its label is `scaled[i + W]`, so the
/// source row that prediction `i` belongs to is `W + i`.
#[derive(Debug, Clone)]
pub struct WindowDataset {
    inputs: Array2<f64>,
    targets: Array1<f64>,
    window_size: usize,
}

impl WindowDataset {
    pub fn build(scaled: &[f64], window_size: usize) -> ForecastResult<Self> {
        if window_size == 0 {
            return Err(ForecastError::invalid_config("window size must be positive"));
        }
        let n = scaled.len();
        if n <= window_size {
            return Err(ForecastError::InsufficientData {
                available: n,
                required: window_size + 1,
            });
        }

        let rows = n - window_size;
        let inputs = Array2::from_shape_fn((rows, window_size), |(i, j)| scaled[i + j]);
        let targets = Array1::from_iter(scaled[window_size..].iter().copied());

        Ok(Self {
            inputs,
            targets,
            window_size,
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn inputs(&self) -> &Array2<f64> {
        &self.inputs
    }

    pub fn targets(&self) -> &Array1<f64> {
        &self.targets
    }

    /// Index into the source series of the label for window `i`.
    pub fn target_index(&self, i: usize) -> usize {
        self.window_size + i
    }
}
