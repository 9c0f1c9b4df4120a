// Categorical cross-entropy against one-hot targets.
//
// The loss is averaged over the batch. Probabilities are clamped away from
// 0 and 1 before taking the log. The gradient is taken with respect to the
// softmax *input*, which for softmax + cross-entropy collapses to
// `(p - y) / batch` and avoids dividing by small probabilities.

use crate::error::NnError;
use ndarray::{Array2, Zip};

const PROB_EPSILON: f32 = 1e-7;

pub fn categorical_crossentropy(probs: &Array2<f32>, targets: &Array2<f32>) -> Result<f32, NnError> {
    check_shapes(probs, targets)?;
    let batch = probs.nrows() as f32;
    let mut total = 0.0f32;
    Zip::from(probs).and(targets).for_each(|&p, &y| {
        if y != 0.0 {
            total -= y * p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON).ln();
        }
    });
    Ok(total / batch)
}

/// dLoss/dLogits for a softmax output layer.
pub fn softmax_crossentropy_grad(
    probs: &Array2<f32>,
    targets: &Array2<f32>,
) -> Result<Array2<f32>, NnError> {
    check_shapes(probs, targets)?;
    let batch = probs.nrows() as f32;
    Ok((probs - targets) / batch)
}

fn check_shapes(probs: &Array2<f32>, targets: &Array2<f32>) -> Result<(), NnError> {
    if probs.dim() != targets.dim() {
        return Err(NnError::shape("loss targets", probs.shape(), targets.shape()));
    }
    if probs.nrows() == 0 {
        return Err(NnError::EmptyInput("loss"));
    }
    Ok(())
}
