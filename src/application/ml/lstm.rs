//! Stacked LSTM regressor over univariate windows, built on candle.
//!
//! Architecture: `layers` LSTM layers of `units` cells, dropout after each of
//! them, then `Dense(dense_units, relu)` and `Dense(1)`. Only the last layer's
//! final hidden state feeds the dense head. Trained with Nadam against mean
//! squared error.
//!
//! Weight initialization and dropout masks are drawn from the caller's
//! `StdRng`, so a fixed seed reproduces a training run exactly.

use super::optimizer::{Nadam, ParamsNadam};
use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::forecasting::ModelFamily;
use crate::domain::ml::WindowDataset;
use candle_core::{DType, Device, Tensor};
use candle_nn::{
    LSTM, LSTMConfig, Linear, Module, Optimizer, RNN, VarBuilder, VarMap, linear, lstm,
};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::PoisonError;
use tracing::{debug, info};

const PREDICT_CHUNK: usize = 64;
const FAMILY: ModelFamily = ModelFamily::Sequence;

fn candle_error(e: candle_core::Error) -> ForecastError {
    ForecastError::Training {
        family: FAMILY,
        reason: e.to_string(),
    }
}

fn restore_error(reason: impl ToString) -> ForecastError {
    ForecastError::persistence(FAMILY.model_artifact(), "restored", reason)
}

fn mean_squared_error(predicted: &Array1<f64>, expected: &Array1<f64>) -> f64 {
    if predicted.is_empty() {
        return 0.0;
    }
    let diff = predicted - expected;
    diff.mapv(|d| d * d).sum() / predicted.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    pub window_size: usize,
    pub units: usize,
    pub layers: usize,
    pub dense_units: usize,
    pub dropout: f64,
}

impl Architecture {
    fn validate(&self) -> ForecastResult<()> {
        if self.window_size == 0 || self.units == 0 || self.layers == 0 || self.dense_units == 0 {
            return Err(ForecastError::invalid_config(
                "window_size, units, layers and dense_units must be positive",
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::invalid_config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTensor {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

/// Serializable copy of every weight, keyed by its `VarMap` name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub architecture: Architecture,
    pub tensors: BTreeMap<String, SavedTensor>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub epochs: usize,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
}

pub struct SequenceRegressor {
    architecture: Architecture,
    device: Device,
    varmap: VarMap,
    recurrent: Vec<LSTM>,
    hidden: Linear,
    output: Linear,
}

impl SequenceRegressor {
    /// Fresh network with Glorot-uniform weights drawn from `rng`.
    pub fn new(architecture: Architecture, rng: &mut StdRng) -> ForecastResult<Self> {
        let regressor = Self::build(architecture)?;
        regressor.initialize(rng)?;
        Ok(regressor)
    }

    fn build(architecture: Architecture) -> ForecastResult<Self> {
        architecture.validate()?;
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let recurrent = (0..architecture.layers)
            .map(|index| {
                let input_dim = if index == 0 { 1 } else { architecture.units };
                lstm(
                    input_dim,
                    architecture.units,
                    LSTMConfig::default(),
                    vb.pp(format!("lstm{}", index)),
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()
            .map_err(candle_error)?;
        let hidden = linear(architecture.units, architecture.dense_units, vb.pp("hidden"))
            .map_err(candle_error)?;
        let output = linear(architecture.dense_units, 1, vb.pp("output")).map_err(candle_error)?;

        Ok(Self {
            architecture,
            device,
            varmap,
            recurrent,
            hidden,
            output,
        })
    }

    // Vars are visited in name order so the draw sequence is stable.
    fn initialize(&self, rng: &mut StdRng) -> ForecastResult<()> {
        let units = self.architecture.units;
        let vars = self.varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = vars.keys().collect();
        names.sort();

        for name in names {
            let var = &vars[name];
            let dims = var.dims().to_vec();
            let count: usize = dims.iter().product();
            let values: Vec<f32> = match dims[..] {
                [fan_out, fan_in] => {
                    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
                    (0..count)
                        .map(|_| rng.random_range(-limit..limit) as f32)
                        .collect()
                }
                _ => {
                    let mut bias = vec![0.0f32; count];
                    // Forget gate starts open
                    if name.contains("bias_ih") && count >= 2 * units {
                        bias[units..2 * units].fill(1.0);
                    }
                    bias
                }
            };
            let tensor = Tensor::from_vec(values, dims, &self.device).map_err(candle_error)?;
            var.set(&tensor).map_err(candle_error)?;
        }
        Ok(())
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn window_size(&self) -> usize {
        self.architecture.window_size
    }

    pub fn layers(&self) -> usize {
        self.recurrent.len()
    }

    pub fn snapshot(&self) -> ForecastResult<NetworkSnapshot> {
        let vars = self.varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
        let mut tensors = BTreeMap::new();
        for (name, var) in vars.iter() {
            let values = var
                .as_tensor()
                .flatten_all()
                .and_then(|t| t.to_vec1::<f32>())
                .map_err(candle_error)?;
            tensors.insert(
                name.clone(),
                SavedTensor {
                    shape: var.dims().to_vec(),
                    values,
                },
            );
        }
        Ok(NetworkSnapshot {
            architecture: self.architecture,
            tensors,
        })
    }

    pub fn restore(snapshot: &NetworkSnapshot) -> ForecastResult<Self> {
        let regressor = Self::build(snapshot.architecture)?;
        {
            let vars = regressor
                .varmap
                .data()
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if vars.len() != snapshot.tensors.len() {
                return Err(restore_error(format!(
                    "expected {} tensors, snapshot has {}",
                    vars.len(),
                    snapshot.tensors.len()
                )));
            }
            for (name, var) in vars.iter() {
                let saved = snapshot
                    .tensors
                    .get(name)
                    .ok_or_else(|| restore_error(format!("missing tensor '{}'", name)))?;
                if saved.shape.as_slice() != var.dims() {
                    return Err(restore_error(format!(
                        "tensor '{}' has shape {:?}, expected {:?}",
                        name,
                        saved.shape,
                        var.dims()
                    )));
                }
                let tensor =
                    Tensor::from_vec(saved.values.clone(), saved.shape.clone(), &regressor.device)
                        .map_err(restore_error)?;
                var.set(&tensor).map_err(restore_error)?;
            }
        }
        Ok(regressor)
    }

    fn check_width(&self, inputs: &Array2<f64>) -> ForecastResult<()> {
        if inputs.ncols() != self.architecture.window_size {
            return Err(ForecastError::invalid_config(format!(
                "expected windows of {} steps, got {}",
                self.architecture.window_size,
                inputs.ncols()
            )));
        }
        Ok(())
    }

    /// `(batch, window)` block as a `(batch, window, 1)` tensor.
    fn windows_tensor(&self, windows: ArrayView2<f64>) -> candle_core::Result<Tensor> {
        let (rows, width) = windows.dim();
        let values: Vec<f32> = windows.iter().map(|&v| v as f32).collect();
        Tensor::from_vec(values, (rows, width, 1), &self.device)
    }

    /// Inverted dropout: kept activations are scaled by `1 / (1 - rate)`.
    fn dropout(&self, xs: &Tensor, rng: &mut StdRng) -> candle_core::Result<Tensor> {
        let rate = self.architecture.dropout;
        if rate <= 0.0 {
            return Ok(xs.clone());
        }
        let keep = (1.0 / (1.0 - rate)) as f32;
        let mask: Vec<f32> = (0..xs.elem_count())
            .map(|_| if rng.random::<f64>() < rate { 0.0 } else { keep })
            .collect();
        let mask = Tensor::from_vec(mask, xs.dims(), &self.device)?;
        xs.mul(&mask)
    }

    /// Dropout is applied only when an rng is supplied (training).
    fn forward(&self, xs: &Tensor, mut rng: Option<&mut StdRng>) -> candle_core::Result<Tensor> {
        let top = self.recurrent.len().saturating_sub(1);
        let mut sequence = xs.clone();
        let mut last_hidden = None;

        for (index, layer) in self.recurrent.iter().enumerate() {
            let states = layer.seq(&sequence)?;
            if index < top {
                sequence = layer.states_to_tensor(&states)?;
                if let Some(rng) = rng.as_deref_mut() {
                    sequence = self.dropout(&sequence, rng)?;
                }
            } else {
                last_hidden = states.last().map(|state| state.h().clone());
            }
        }

        let mut last_hidden = match last_hidden {
            Some(h) => h,
            None => Tensor::zeros((xs.dim(0)?, self.architecture.units), DType::F32, &self.device)?,
        };
        if let Some(rng) = rng.as_deref_mut() {
            last_hidden = self.dropout(&last_hidden, rng)?;
        }
        let hidden = self.hidden.forward(&last_hidden)?.relu()?;
        self.output.forward(&hidden)
    }

    /// Deterministic forward pass (dropout disabled).
    pub fn predict(&self, inputs: &Array2<f64>) -> ForecastResult<Array1<f64>> {
        self.check_width(inputs)?;
        let mut predictions = Vec::with_capacity(inputs.nrows());

        for chunk in inputs.axis_chunks_iter(Axis(0), PREDICT_CHUNK) {
            let output = self
                .windows_tensor(chunk)
                .and_then(|xs| self.forward(&xs, None))
                .and_then(|ys| ys.flatten_all()?.to_vec1::<f32>())
                .map_err(candle_error)?;
            predictions.extend(output.into_iter().map(f64::from));
        }

        Ok(Array1::from(predictions))
    }

    fn train_batch(
        &self,
        dataset: &WindowDataset,
        indices: &[usize],
        optimizer: &mut Nadam,
        rng: &mut StdRng,
    ) -> candle_core::Result<f64> {
        let inputs = dataset.inputs().select(Axis(0), indices);
        let targets: Vec<f32> = dataset
            .targets()
            .select(Axis(0), indices)
            .iter()
            .map(|&v| v as f32)
            .collect();

        let xs = self.windows_tensor(inputs.view())?;
        let ys = Tensor::from_vec(targets, (indices.len(), 1), &self.device)?;
        let prediction = self.forward(&xs, Some(rng))?;
        let loss = candle_nn::loss::mse(&prediction, &ys)?;
        optimizer.backward_step(&loss)?;
        Ok(f64::from(loss.to_scalar::<f32>()?))
    }

    /// Minibatch training.
    ///
    /// The last `validation_split` fraction of windows is held out (not
    /// shuffled) and only reported; training windows are reshuffled every epoch.
    pub fn fit(
        &mut self,
        dataset: &WindowDataset,
        options: &TrainingOptions,
        rng: &mut StdRng,
    ) -> ForecastResult<TrainingReport> {
        self.check_width(dataset.inputs())?;
        if options.batch_size == 0 {
            return Err(ForecastError::invalid_config("batch_size must be positive"));
        }

        let n = dataset.len();
        let split_at = ((n as f64) * (1.0 - options.validation_split)) as usize;
        if split_at == 0 {
            return Err(ForecastError::Training {
                family: FAMILY,
                reason: format!("no training windows left after holding out validation from {}", n),
            });
        }

        let mut train_indices: Vec<usize> = (0..split_at).collect();
        let validation_indices: Vec<usize> = (split_at..n).collect();
        let validation_inputs = dataset.inputs().select(Axis(0), &validation_indices);
        let validation_targets = dataset.targets().select(Axis(0), &validation_indices);

        info!(
            "Training LSTM: {} layers x {} units, window {}, {} train / {} validation windows, {} epochs",
            self.architecture.layers,
            self.architecture.units,
            self.architecture.window_size,
            split_at,
            validation_indices.len(),
            options.epochs
        );

        let params = ParamsNadam {
            lr: options.learning_rate,
            ..Default::default()
        };
        let mut optimizer = Nadam::new(self.varmap.all_vars(), params).map_err(candle_error)?;
        let mut train_loss = f64::NAN;
        let mut validation_loss = None;

        for epoch in 1..=options.epochs {
            train_indices.shuffle(rng);
            let mut squared_error = 0.0;

            for batch_indices in train_indices.chunks(options.batch_size) {
                let batch_loss = self
                    .train_batch(dataset, batch_indices, &mut optimizer, rng)
                    .map_err(candle_error)?;
                squared_error += batch_loss * batch_indices.len() as f64;
            }

            train_loss = squared_error / split_at as f64;
            if !train_loss.is_finite() {
                return Err(ForecastError::Training {
                    family: FAMILY,
                    reason: format!("loss diverged at epoch {}", epoch),
                });
            }

            validation_loss = if validation_indices.is_empty() {
                None
            } else {
                let predicted = self.predict(&validation_inputs)?;
                Some(mean_squared_error(&predicted, &validation_targets))
            };

            debug!(
                "Epoch {}/{}: loss={:.6} val_loss={:?}",
                epoch, options.epochs, train_loss, validation_loss
            );
        }

        info!(
            "LSTM training complete: loss={:.6} val_loss={:?}",
            train_loss, validation_loss
        );

        Ok(TrainingReport {
            epochs: options.epochs,
            train_samples: split_at,
            validation_samples: validation_indices.len(),
            train_loss,
            validation_loss,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn architecture(dropout: f64) -> Architecture {
        Architecture {
            window_size: 4,
            units: 3,
            layers: 2,
            dense_units: 2,
            dropout,
        }
    }

    fn small_regressor(seed: u64, dropout: f64) -> SequenceRegressor {
        let mut rng = StdRng::seed_from_u64(seed);
        SequenceRegressor::new(architecture(dropout), &mut rng).unwrap()
    }

    fn options(epochs: usize) -> TrainingOptions {
        TrainingOptions {
            epochs,
            batch_size: 4,
            validation_split: 0.2,
            learning_rate: 0.01,
        }
    }

    fn sine_dataset() -> WindowDataset {
        let scaled: Vec<f64> = (0..40)
            .map(|i| 0.5 + 0.4 * (i as f64 / 4.0).sin())
            .collect();
        WindowDataset::build(&scaled, 4).unwrap()
    }

    #[test]
    fn test_training_reduces_loss() {
        let dataset = sine_dataset();
        let mut model = small_regressor(42, 0.0);
        let before = {
            let predicted = model.predict(dataset.inputs()).unwrap();
            mean_squared_error(&predicted, dataset.targets())
        };

        let mut rng = StdRng::seed_from_u64(42);
        let report = model.fit(&dataset, &options(60), &mut rng).unwrap();

        let after = {
            let predicted = model.predict(dataset.inputs()).unwrap();
            mean_squared_error(&predicted, dataset.targets())
        };
        assert!(after < before, "before {} after {}", before, after);
        assert_eq!(report.train_samples + report.validation_samples, dataset.len());
        assert!(report.validation_loss.is_some());
    }

    #[test]
    fn test_same_seed_same_weights() {
        let dataset = sine_dataset();
        let run = || {
            let mut model = small_regressor(3, 0.2);
            let mut rng = StdRng::seed_from_u64(3);
            model.fit(&dataset, &options(3), &mut rng).unwrap();
            model.snapshot().unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_initialization_opens_forget_gate() {
        let snapshot = small_regressor(5, 0.0).snapshot().unwrap();
        let bias = &snapshot.tensors["lstm0.bias_ih_l0"].values;
        assert_eq!(bias.len(), 12);
        assert!(bias[3..6].iter().all(|&b| b == 1.0));
        assert!(bias[..3].iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let model = small_regressor(1, 0.0);
        let inputs = Array2::zeros((2, 5));
        assert!(matches!(
            model.predict(&inputs),
            Err(ForecastError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_invalid_architecture() {
        let mut rng = StdRng::seed_from_u64(0);
        let zero_window = Architecture {
            window_size: 0,
            ..architecture(0.0)
        };
        assert!(SequenceRegressor::new(zero_window, &mut rng).is_err());
        assert!(SequenceRegressor::new(architecture(1.0), &mut rng).is_err());
    }

    #[test]
    fn test_snapshot_restore_preserves_predictions() {
        let model = small_regressor(11, 0.2);
        let inputs = Array2::from_shape_fn((3, 4), |(i, j)| 0.05 * (i * 4 + j) as f64);
        let json = serde_json::to_vec(&model.snapshot().unwrap()).unwrap();
        let snapshot: NetworkSnapshot = serde_json::from_slice(&json).unwrap();
        let restored = SequenceRegressor::restore(&snapshot).unwrap();

        assert_eq!(restored.layers(), 2);
        assert_eq!(restored.architecture(), model.architecture());
        assert_eq!(model.predict(&inputs).unwrap(), restored.predict(&inputs).unwrap());
    }

    #[test]
    fn test_restore_rejects_incomplete_snapshot() {
        let mut snapshot = small_regressor(2, 0.0).snapshot().unwrap();
        snapshot.tensors.remove("hidden.weight");
        assert!(matches!(
            SequenceRegressor::restore(&snapshot),
            Err(ForecastError::Persistence { .. })
        ));
    }
}
