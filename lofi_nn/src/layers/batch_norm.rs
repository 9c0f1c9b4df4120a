// Batch normalization over `(batch, features)`.
//
// Training normalizes with the statistics of the current batch and folds
// them into exponential running averages. Inference normalizes with the
// running averages only, so a single-sample prediction is well defined.
// The running averages are persisted with the learned scale and shift.

use super::Layer;
use crate::error::NnError;
use crate::param::Param;
use lofi_prng::LofiRng;
use ndarray::{Array2, ArrayD, ArrayView2, Axis, Ix2};

pub const DEFAULT_MOMENTUM: f32 = 0.99;
pub const DEFAULT_EPSILON: f32 = 1e-3;

pub struct BatchNorm {
    features: usize,
    momentum: f32,
    epsilon: f32,
    gamma: Param,
    beta: Param,
    running_mean: Array2<f32>,
    running_var: Array2<f32>,
    cache: Option<BatchNormCache>,
}

struct BatchNormCache {
    x_hat: Array2<f32>,
    inv_std: Array2<f32>,
}

impl BatchNorm {
    pub fn new(features: usize, momentum: f32, epsilon: f32) -> Self {
        Self {
            features,
            momentum,
            epsilon,
            gamma: Param::ones("gamma", 1, features),
            beta: Param::zeros("beta", 1, features),
            running_mean: Array2::zeros((1, features)),
            running_var: Array2::ones((1, features)),
            cache: None,
        }
    }

    fn check_input<'a>(&self, input: &'a ArrayD<f32>) -> Result<ArrayView2<'a, f32>, NnError> {
        let x = input.view().into_dimensionality::<Ix2>()?;
        if x.ncols() != self.features {
            return Err(NnError::shape(
                "batch_norm input",
                &[x.nrows(), self.features],
                x.shape(),
            ));
        }
        if x.nrows() == 0 {
            return Err(NnError::EmptyInput("batch_norm"));
        }
        Ok(x)
    }
}

impl Layer for BatchNorm {
    fn kind(&self) -> &'static str {
        "batch_norm"
    }

    fn forward(&mut self, input: &ArrayD<f32>, _rng: &mut LofiRng) -> Result<ArrayD<f32>, NnError> {
        let x = self.check_input(input)?;
        let n = x.nrows();
        let mean = x
            .mean_axis(Axis(0))
            .ok_or(NnError::EmptyInput("batch_norm"))?
            .insert_axis(Axis(0));
        let centered = &x - &mean;
        let var = centered
            .mapv(|v| v * v)
            .mean_axis(Axis(0))
            .ok_or(NnError::EmptyInput("batch_norm"))?
            .insert_axis(Axis(0));
        let eps = self.epsilon;
        let inv_std = var.mapv(|v| 1.0 / (v + eps).sqrt());
        let x_hat = &centered * &inv_std;
        let y = &x_hat * &self.gamma.value + &self.beta.value;

        // Running variance uses the unbiased estimate.
        let unbiased = if n > 1 {
            &var * (n as f32 / (n - 1) as f32)
        } else {
            var.clone()
        };
        let m = self.momentum;
        self.running_mean = &self.running_mean * m + &mean * (1.0 - m);
        self.running_var = &self.running_var * m + &unbiased * (1.0 - m);

        self.cache = Some(BatchNormCache { x_hat, inv_std });
        Ok(y.into_dyn())
    }

    fn infer(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let x = self.check_input(input)?;
        let eps = self.epsilon;
        let inv_std = self.running_var.mapv(|v| 1.0 / (v + eps).sqrt());
        let y = (&x - &self.running_mean) * &inv_std * &self.gamma.value + &self.beta.value;
        Ok(y.into_dyn())
    }

    fn backward(&mut self, grad: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let cache = self
            .cache
            .take()
            .ok_or(NnError::MissingForward("batch_norm"))?;
        let dy = grad.view().into_dimensionality::<Ix2>()?;
        if dy.dim() != cache.x_hat.dim() {
            return Err(NnError::shape("batch_norm grad", cache.x_hat.shape(), dy.shape()));
        }
        let n = dy.nrows() as f32;

        self.gamma.grad += &(&dy * &cache.x_hat)
            .sum_axis(Axis(0))
            .insert_axis(Axis(0));
        self.beta.grad += &dy.sum_axis(Axis(0)).insert_axis(Axis(0));

        let dx_hat = &dy * &self.gamma.value;
        let sum_dx_hat = dx_hat.sum_axis(Axis(0)).insert_axis(Axis(0));
        let sum_dx_hat_x_hat = (&dx_hat * &cache.x_hat)
            .sum_axis(Axis(0))
            .insert_axis(Axis(0));
        let dx = (&dx_hat * n - &sum_dx_hat - &(&cache.x_hat * &sum_dx_hat_x_hat)) * &cache.inv_std
            / n;
        Ok(dx.into_dyn())
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.gamma, &self.beta]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.gamma, &mut self.beta]
    }

    fn buffers(&self) -> Vec<(&'static str, &Array2<f32>)> {
        vec![
            ("running_mean", &self.running_mean),
            ("running_var", &self.running_var),
        ]
    }

    fn tensors_mut(&mut self) -> Vec<&mut Array2<f32>> {
        vec![
            &mut self.gamma.value,
            &mut self.beta.value,
            &mut self.running_mean,
            &mut self.running_var,
        ]
    }
}
