// Layer trait and the concrete layers used by the sequence model.
//
// A layer has two forward paths:
// - `forward` is the training path. It applies dropout, uses batch
//   statistics, and caches whatever `backward` needs.
// - `infer` is the inference path. It takes `&self`, caches nothing and
//   applies no dropout, so a trained model can be shared across threads
//   and queried concurrently.
//
// Tensors cross layer boundaries as `ArrayD<f32>` with the batch on axis 0.
// Each layer converts to the fixed rank it works in and reports a
// `ShapeMismatch` when the input does not fit.

mod activation;
mod batch_norm;
mod dense;
mod dropout;
mod lstm;

pub use activation::{Activation, ActivationFn};
pub use batch_norm::{
    BatchNorm, DEFAULT_EPSILON as DEFAULT_BN_EPSILON, DEFAULT_MOMENTUM as DEFAULT_BN_MOMENTUM,
};
pub use dense::Dense;
pub use dropout::Dropout;
pub use lstm::Lstm;

use crate::error::NnError;
use crate::param::Param;
use lofi_prng::LofiRng;
use ndarray::{Array2, ArrayD, IxDyn};

pub trait Layer: Send + Sync {
    /// Short stable name, used in snapshot tensor names and errors.
    fn kind(&self) -> &'static str;

    fn forward(&mut self, input: &ArrayD<f32>, rng: &mut LofiRng) -> Result<ArrayD<f32>, NnError>;

    fn infer(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError>;

    /// Propagate `grad` (dLoss/dOutput) back through the cached forward
    /// pass, adding parameter gradients into each `Param::grad`. Returns
    /// dLoss/dInput.
    fn backward(&mut self, grad: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError>;

    fn params(&self) -> Vec<&Param> {
        Vec::new()
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        Vec::new()
    }

    /// Persisted tensors that are not trained by gradient descent.
    fn buffers(&self) -> Vec<(&'static str, &Array2<f32>)> {
        Vec::new()
    }

    /// Every persisted tensor, parameters first and then buffers, in the
    /// same order as `params` followed by `buffers`.
    fn tensors_mut(&mut self) -> Vec<&mut Array2<f32>> {
        self.params_mut().into_iter().map(|p| &mut p.value).collect()
    }
}

/// Inverted-dropout mask: each entry is `0` with probability `rate`,
/// otherwise `1 / (1 - rate)`.
pub(crate) fn dropout_mask(shape: &[usize], rate: f32, rng: &mut LofiRng) -> ArrayD<f32> {
    let keep = 1.0 - rate;
    if keep <= 0.0 {
        return ArrayD::zeros(IxDyn(shape));
    }
    let scale = 1.0 / keep;
    ArrayD::from_shape_fn(IxDyn(shape), |_| {
        if rng.next_f32() < keep { scale } else { 0.0 }
    })
}

#[cfg(test)]
pub(crate) mod grad_check {
    // Finite-difference gradient checks shared by the layer tests.
    //
    // The scalar objective is `sum(output * weights)` for a fixed random
    // `weights` tensor, so dLoss/dOutput is exactly `weights`.

    use super::Layer;
    use lofi_prng::LofiRng;
    use ndarray::ArrayD;

    pub fn random_like(shape: &[usize], rng: &mut LofiRng) -> ArrayD<f32> {
        ArrayD::from_shape_fn(ndarray::IxDyn(shape), |_| rng.range_f32(-1.0, 1.0))
    }

    fn objective(layer: &mut dyn Layer, input: &ArrayD<f32>, weights: &ArrayD<f32>) -> f32 {
        let mut rng = LofiRng::new(0);
        let out = layer.forward(input, &mut rng).unwrap();
        (&out * weights).sum()
    }

    fn close(numeric: f32, analytic: f32) -> bool {
        (numeric - analytic).abs() <= 5e-3 + 5e-2 * analytic.abs()
    }

    /// Compare analytic parameter and input gradients with central
    /// differences. The layer must be deterministic in `forward`.
    pub fn check(layer: &mut dyn Layer, input: &ArrayD<f32>) {
        let h = 1e-2f32;
        let mut rng = LofiRng::new(99);
        let out = layer.forward(input, &mut rng).unwrap();
        let weights = random_like(out.shape(), &mut rng);
        for p in layer.params_mut() {
            p.zero_grad();
        }
        let grad_in = layer.backward(&weights).unwrap();

        let analytic: Vec<Vec<f32>> = layer
            .params()
            .iter()
            .map(|p| p.grad.iter().copied().collect())
            .collect();
        for (pi, grads) in analytic.iter().enumerate() {
            for (k, &g) in grads.iter().enumerate() {
                let original = layer.params_mut()[pi].value.as_slice_mut().unwrap()[k];
                layer.params_mut()[pi].value.as_slice_mut().unwrap()[k] = original + h;
                let plus = objective(layer, input, &weights);
                layer.params_mut()[pi].value.as_slice_mut().unwrap()[k] = original - h;
                let minus = objective(layer, input, &weights);
                layer.params_mut()[pi].value.as_slice_mut().unwrap()[k] = original;
                let numeric = (plus - minus) / (2.0 * h);
                assert!(
                    close(numeric, g),
                    "{} param {pi}[{k}]: numeric {numeric} vs analytic {g}",
                    layer.kind()
                );
            }
        }

        let grad_in: Vec<f32> = grad_in.iter().copied().collect();
        let mut probe = input.clone();
        for k in 0..probe.len() {
            let original = probe.as_slice().unwrap()[k];
            probe.as_slice_mut().unwrap()[k] = original + h;
            let plus = objective(layer, &probe, &weights);
            probe.as_slice_mut().unwrap()[k] = original - h;
            let minus = objective(layer, &probe, &weights);
            probe.as_slice_mut().unwrap()[k] = original;
            let numeric = (plus - minus) / (2.0 * h);
            let g = grad_in[k];
            assert!(
                close(numeric, g),
                "{} input[{k}]: numeric {numeric} vs analytic {g}",
                layer.kind()
            );
        }
    }
}
