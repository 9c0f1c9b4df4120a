// Elementwise and row-wise activations.
//
// Softmax normalizes along the last axis of a `(batch, classes)` tensor.
// When it is the final layer and the loss is categorical cross-entropy,
// `Sequential` skips its backward pass and feeds the fused gradient into
// the layer below instead (see `loss.rs`).

use super::Layer;
use crate::error::NnError;
use lofi_prng::LofiRng;
use ndarray::{Array2, ArrayD, Axis, Ix2};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFn {
    Relu,
    Softmax,
}

pub struct Activation {
    function: ActivationFn,
    cached_output: Option<ArrayD<f32>>,
}

impl Activation {
    pub fn new(function: ActivationFn) -> Self {
        Self {
            function,
            cached_output: None,
        }
    }

    fn apply(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        match self.function {
            ActivationFn::Relu => Ok(input.mapv(|v| v.max(0.0))),
            ActivationFn::Softmax => {
                let x = input.view().into_dimensionality::<Ix2>()?;
                Ok(softmax_rows(&x.to_owned()).into_dyn())
            }
        }
    }
}

/// Numerically stable softmax over each row.
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    out
}

impl Layer for Activation {
    fn kind(&self) -> &'static str {
        match self.function {
            ActivationFn::Relu => "relu",
            ActivationFn::Softmax => "softmax",
        }
    }

    fn forward(&mut self, input: &ArrayD<f32>, _rng: &mut LofiRng) -> Result<ArrayD<f32>, NnError> {
        let out = self.apply(input)?;
        self.cached_output = Some(out.clone());
        Ok(out)
    }

    fn infer(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        self.apply(input)
    }

    fn backward(&mut self, grad: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let kind = self.kind();
        let out = self
            .cached_output
            .take()
            .ok_or(NnError::MissingForward(kind))?;
        if out.shape() != grad.shape() {
            return Err(NnError::shape("activation grad", out.shape(), grad.shape()));
        }
        match self.function {
            ActivationFn::Relu => {
                let mut dx = grad.clone();
                dx.zip_mut_with(&out, |g, &y| {
                    if y <= 0.0 {
                        *g = 0.0;
                    }
                });
                Ok(dx)
            }
            ActivationFn::Softmax => {
                // dx = s * (dy - sum(dy * s)) per row
                let s = out.into_dimensionality::<Ix2>()?;
                let dy = grad.view().into_dimensionality::<Ix2>()?;
                let dot = (&dy * &s).sum_axis(Axis(1)).insert_axis(Axis(1));
                Ok((&s * &(&dy - &dot)).into_dyn())
            }
        }
    }
}
