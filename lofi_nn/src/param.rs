// Trainable parameters and weight initialization.
//
// Every learned tensor is stored as a 2-D `Param` (biases and per-feature
// scales are `1 x n` rows) together with its gradient accumulator. Layers
// add into `grad` during `backward`; the optimizer consumes and clears it.
// Input kernels start Glorot-uniform, recurrent kernels orthogonal.

use lofi_prng::LofiRng;
use ndarray::Array2;

#[derive(Clone, Debug)]
pub struct Param {
    pub name: &'static str,
    pub value: Array2<f32>,
    pub grad: Array2<f32>,
}

impl Param {
    pub fn new(name: &'static str, value: Array2<f32>) -> Self {
        let grad = Array2::zeros(value.raw_dim());
        Self { name, value, grad }
    }

    pub fn zeros(name: &'static str, rows: usize, cols: usize) -> Self {
        Self::new(name, Array2::zeros((rows, cols)))
    }

    pub fn ones(name: &'static str, rows: usize, cols: usize) -> Self {
        Self::new(name, Array2::ones((rows, cols)))
    }

    /// Glorot-uniform initialization: U(-l, l) with `l = sqrt(6 / (fan_in + fan_out))`.
    pub fn glorot(name: &'static str, fan_in: usize, fan_out: usize, rng: &mut LofiRng) -> Self {
        let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
        let value = Array2::from_shape_fn((fan_in, fan_out), |_| rng.range_f32(-limit, limit));
        Self::new(name, value)
    }

    /// Orthogonal initialization: a Gaussian matrix made orthonormal by
    /// Gram-Schmidt along its shorter side, so rows are orthonormal when
    /// `rows <= cols` and columns otherwise.
    pub fn orthogonal(name: &'static str, rows: usize, cols: usize, rng: &mut LofiRng) -> Self {
        let (short, long) = if rows <= cols { (rows, cols) } else { (cols, rows) };
        let mut basis = Array2::from_shape_fn((short, long), |_| standard_normal(rng));
        for i in 0..short {
            for j in 0..i {
                let previous = basis.row(j).to_owned();
                let overlap = basis.row(i).dot(&previous);
                basis.row_mut(i).scaled_add(-overlap, &previous);
            }
            let norm = basis.row(i).dot(&basis.row(i)).sqrt();
            if norm > f32::EPSILON {
                basis.row_mut(i).mapv_inplace(|v| v / norm);
            }
        }
        let value = if rows <= cols {
            basis
        } else {
            Array2::from_shape_fn((rows, cols), |(r, c)| basis[[c, r]])
        };
        Self::new(name, value)
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}

/// Box-Muller draw from N(0, 1).
fn standard_normal(rng: &mut LofiRng) -> f32 {
    let u1 = 1.0 - rng.next_f64();
    let u2 = rng.next_f64();
    ((-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()) as f32
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
