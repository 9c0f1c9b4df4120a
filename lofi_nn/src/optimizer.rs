// RMSProp.
//
//   acc = rho * acc + (1 - rho) * g^2
//   w  -= lr * g / (sqrt(acc) + eps)
//
// One accumulator per parameter, matched to parameters by position. The
// accumulators are (re)created whenever the parameter list changes length
// or shape, which happens only on the first step or after a topology swap.

use crate::param::Param;
use ndarray::{Array2, Zip};

pub const DEFAULT_LEARNING_RATE: f32 = 0.001;
pub const DEFAULT_RHO: f32 = 0.9;
pub const DEFAULT_EPSILON: f32 = 1e-7;

#[derive(Clone, Debug)]
pub struct RmsProp {
    pub learning_rate: f32,
    pub rho: f32,
    pub epsilon: f32,
    accumulators: Vec<Array2<f32>>,
}

impl Default for RmsProp {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE, DEFAULT_RHO, DEFAULT_EPSILON)
    }
}

impl RmsProp {
    pub fn new(learning_rate: f32, rho: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            rho,
            epsilon,
            accumulators: Vec::new(),
        }
    }

    /// Apply one update from the accumulated gradients, then clear them.
    pub fn step(&mut self, params: Vec<&mut Param>) {
        let stale = self.accumulators.len() != params.len()
            || self
                .accumulators
                .iter()
                .zip(params.iter())
                .any(|(acc, p)| acc.dim() != p.value.dim());
        if stale {
            self.accumulators = params
                .iter()
                .map(|p| Array2::zeros(p.value.raw_dim()))
                .collect();
        }

        let (lr, rho, eps) = (self.learning_rate, self.rho, self.epsilon);
        for (param, acc) in params.into_iter().zip(self.accumulators.iter_mut()) {
            Zip::from(&mut param.value)
                .and(&param.grad)
                .and(acc)
                .for_each(|w, &g, a| {
                    *a = rho * *a + (1.0 - rho) * g * g;
                    *w -= lr * g / (a.sqrt() + eps);
                });
            param.zero_grad();
        }
    }
}
