// Inverted dropout. Identity at inference.

use super::{Layer, dropout_mask};
use crate::error::NnError;
use lofi_prng::LofiRng;
use ndarray::ArrayD;

pub struct Dropout {
    rate: f32,
    mask: Option<ArrayD<f32>>,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Self {
            rate: rate.clamp(0.0, 0.95),
            mask: None,
        }
    }
}

impl Layer for Dropout {
    fn kind(&self) -> &'static str {
        "dropout"
    }

    fn forward(&mut self, input: &ArrayD<f32>, rng: &mut LofiRng) -> Result<ArrayD<f32>, NnError> {
        let mask = dropout_mask(input.shape(), self.rate, rng);
        let out = input * &mask;
        self.mask = Some(mask);
        Ok(out)
    }

    fn infer(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        Ok(input.clone())
    }

    fn backward(&mut self, grad: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let mask = self.mask.take().ok_or(NnError::MissingForward("dropout"))?;
        if mask.shape() != grad.shape() {
            return Err(NnError::shape("dropout grad", mask.shape(), grad.shape()));
        }
        Ok(grad * &mask)
    }
}
