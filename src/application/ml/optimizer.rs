use candle_core::backprop::GradStore;
use candle_core::{Result, Var};
use candle_nn::Optimizer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamsNadam {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
}

impl Default for ParamsNadam {
    fn default() -> Self {
        Self {
            lr: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
        }
    }
}

struct VarNadam {
    var: Var,
    first_moment: Var,
    second_moment: Var,
}

/// Adam with Nesterov momentum, laid out like `candle_nn::AdamW`.
pub struct Nadam {
    vars: Vec<VarNadam>,
    step_t: usize,
    params: ParamsNadam,
}

impl Nadam {
    pub fn steps(&self) -> usize {
        self.step_t
    }
}

impl Optimizer for Nadam {
    type Config = ParamsNadam;

    fn new(vars: Vec<Var>, params: ParamsNadam) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let dtype = var.dtype();
                let shape = var.dims();
                let device = var.device();
                let first_moment = Var::zeros(shape, dtype, device)?;
                let second_moment = Var::zeros(shape, dtype, device)?;
                Ok(VarNadam {
                    var,
                    first_moment,
                    second_moment,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            vars,
            step_t: 0,
            params,
        })
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.step_t += 1;
        let t = self.step_t as i32;
        let ParamsNadam {
            lr,
            beta1,
            beta2,
            eps,
        } = self.params;
        let bias_1 = 1.0 - beta1.powi(t);
        let bias_1_next = 1.0 - beta1.powi(t + 1);
        let bias_2 = 1.0 - beta2.powi(t);

        for var in self.vars.iter() {
            let theta = &var.var;
            let m = &var.first_moment;
            let v = &var.second_moment;
            if let Some(g) = grads.get(theta) {
                let next_m = ((m.as_tensor() * beta1)? + (g * (1.0 - beta1))?)?;
                let next_v = ((v.as_tensor() * beta2)? + (g.sqr()? * (1.0 - beta2))?)?;
                // Nesterov look-ahead on the bias-corrected first moment
                let m_hat = ((&next_m * (beta1 / bias_1_next))? + (g * ((1.0 - beta1) / bias_1))?)?;
                let v_hat = (&next_v * (1.0 / bias_2))?;
                let update = (m_hat / (v_hat.sqrt()? + eps)?)?;
                let next_theta = (theta.as_tensor() - (update * lr)?)?;
                m.set(&next_m)?;
                v.set(&next_v)?;
                theta.set(&next_theta)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Tensor};

    #[test]
    fn test_minimizes_quadratic() {
        let device = Device::Cpu;
        let w = Var::from_tensor(&Tensor::new(&[3.0f32, -2.0], &device).unwrap()).unwrap();
        let params = ParamsNadam {
            lr: 0.1,
            ..Default::default()
        };
        let mut optimizer = Nadam::new(vec![w.clone()], params).unwrap();

        for _ in 0..300 {
            let loss = w.as_tensor().sqr().unwrap().sum_all().unwrap();
            optimizer.backward_step(&loss).unwrap();
        }

        let values = w.as_tensor().to_vec1::<f32>().unwrap();
        assert!(values.iter().all(|v| v.abs() < 0.5), "{:?}", values);
        assert_eq!(optimizer.steps(), 300);
    }

    #[test]
    fn test_untouched_var_is_unchanged() {
        let device = Device::Cpu;
        let used = Var::zeros((2,), DType::F32, &device).unwrap();
        let unused = Var::from_tensor(&Tensor::new(&[1.5f32], &device).unwrap()).unwrap();
        let mut optimizer = Nadam::new(vec![used.clone(), unused.clone()], Default::default()).unwrap();

        let loss = (used.as_tensor() - 1.0).unwrap().sqr().unwrap().sum_all().unwrap();
        optimizer.backward_step(&loss).unwrap();

        assert_eq!(unused.as_tensor().to_vec1::<f32>().unwrap(), vec![1.5]);
        assert!(used.as_tensor().to_vec1::<f32>().unwrap()[0] > 0.0);
    }
}
