// Long short-term memory layer.
//
// Input `(batch, time, features)`. Output is either the full hidden
// sequence `(batch, time, units)` or only the final hidden state
// `(batch, units)`, depending on `return_sequences`.
//
// Gates are packed along the second axis of the kernels in the order
// input, forget, cell, output:
//
//   z = x_t K + (h_{t-1} * m) R + b
//   i = sig(z_i)  f = sig(z_f)  g = tanh(z_c)  o = sig(z_o)
//   c_t = f * c_{t-1} + i * g
//   h_t = o * tanh(c_t)
//
// `m` is the recurrent dropout mask. One mask is drawn per forward pass
// and reused across every timestep, so it regularizes the recurrent
// connection itself rather than individual steps. Inference uses `m = 1`.
//
// The forget-gate bias starts at 1 so early training keeps cell state.

use super::{Layer, dropout_mask};
use crate::error::NnError;
use crate::param::{Param, sigmoid};
use lofi_prng::LofiRng;
use ndarray::{Array2, Array3, ArrayD, ArrayView2, ArrayView3, Axis, Ix2, Ix3, s};

pub struct Lstm {
    units: usize,
    input_dim: usize,
    return_sequences: bool,
    recurrent_dropout: f32,
    kernel: Param,
    recurrent: Param,
    bias: Param,
    cache: Option<LstmCache>,
}

struct LstmCache {
    inputs: Array3<f32>,
    mask: Option<Array2<f32>>,
    steps: Vec<StepCache>,
}

/// Per-timestep activations needed to backpropagate through time.
struct StepCache {
    h_in: Array2<f32>,
    c_prev: Array2<f32>,
    i: Array2<f32>,
    f: Array2<f32>,
    g: Array2<f32>,
    o: Array2<f32>,
    tanh_c: Array2<f32>,
}

impl Lstm {
    pub fn new(
        input_dim: usize,
        units: usize,
        return_sequences: bool,
        recurrent_dropout: f32,
        rng: &mut LofiRng,
    ) -> Self {
        let kernel = Param::glorot("kernel", input_dim, 4 * units, rng);
        let recurrent = Param::orthogonal("recurrent_kernel", units, 4 * units, rng);
        let mut bias = Param::zeros("bias", 1, 4 * units);
        bias.value.slice_mut(s![.., units..2 * units]).fill(1.0);
        Self {
            units,
            input_dim,
            return_sequences,
            recurrent_dropout: recurrent_dropout.clamp(0.0, 0.95),
            kernel,
            recurrent,
            bias,
            cache: None,
        }
    }

    fn check_input<'a>(&self, input: &'a ArrayD<f32>) -> Result<ArrayView3<'a, f32>, NnError> {
        let x = input.view().into_dimensionality::<Ix3>()?;
        let (batch, time, features) = x.dim();
        if features != self.input_dim {
            return Err(NnError::shape(
                "lstm input features",
                &[batch, time, self.input_dim],
                &[batch, time, features],
            ));
        }
        if batch == 0 || time == 0 {
            return Err(NnError::EmptyInput("lstm"));
        }
        Ok(x)
    }

    /// One timestep. Returns the cached activations plus the new `(h, c)`.
    fn step(
        &self,
        x_t: ArrayView2<f32>,
        h_prev: &Array2<f32>,
        c_prev: &Array2<f32>,
        mask: Option<&Array2<f32>>,
    ) -> (StepCache, Array2<f32>, Array2<f32>) {
        let u = self.units;
        let h_in = match mask {
            Some(m) => h_prev * m,
            None => h_prev.clone(),
        };
        let z = x_t.dot(&self.kernel.value) + h_in.dot(&self.recurrent.value) + &self.bias.value;
        let i = z.slice(s![.., 0..u]).mapv(sigmoid);
        let f = z.slice(s![.., u..2 * u]).mapv(sigmoid);
        let g = z.slice(s![.., 2 * u..3 * u]).mapv(f32::tanh);
        let o = z.slice(s![.., 3 * u..4 * u]).mapv(sigmoid);
        let c = &f * c_prev + &i * &g;
        let tanh_c = c.mapv(f32::tanh);
        let h = &o * &tanh_c;
        let cache = StepCache {
            h_in,
            c_prev: c_prev.clone(),
            i,
            f,
            g,
            o,
            tanh_c,
        };
        (cache, h, c)
    }

    /// Run the recurrence over a whole batch, optionally recording steps.
    fn run(
        &self,
        x: ArrayView3<f32>,
        mask: Option<&Array2<f32>>,
        mut record: Option<&mut Vec<StepCache>>,
    ) -> ArrayD<f32> {
        let (batch, time, _) = x.dim();
        let mut h = Array2::zeros((batch, self.units));
        let mut c = Array2::zeros((batch, self.units));
        let mut sequence = if self.return_sequences {
            Some(Array3::zeros((batch, time, self.units)))
        } else {
            None
        };
        for t in 0..time {
            let (step, h_next, c_next) = self.step(x.index_axis(Axis(1), t), &h, &c, mask);
            h = h_next;
            c = c_next;
            if let Some(seq) = sequence.as_mut() {
                seq.index_axis_mut(Axis(1), t).assign(&h);
            }
            if let Some(steps) = record.as_deref_mut() {
                steps.push(step);
            }
        }
        match sequence {
            Some(seq) => seq.into_dyn(),
            None => h.into_dyn(),
        }
    }
}

impl Layer for Lstm {
    fn kind(&self) -> &'static str {
        "lstm"
    }

    fn forward(&mut self, input: &ArrayD<f32>, rng: &mut LofiRng) -> Result<ArrayD<f32>, NnError> {
        let x = self.check_input(input)?;
        let batch = x.dim().0;
        let mask = if self.recurrent_dropout > 0.0 {
            let m = dropout_mask(&[batch, self.units], self.recurrent_dropout, rng);
            Some(m.into_dimensionality::<Ix2>()?)
        } else {
            None
        };
        let mut steps = Vec::with_capacity(x.dim().1);
        let output = self.run(x, mask.as_ref(), Some(&mut steps));
        self.cache = Some(LstmCache {
            inputs: x.to_owned(),
            mask,
            steps,
        });
        Ok(output)
    }

    fn infer(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let x = self.check_input(input)?;
        Ok(self.run(x, None, None))
    }

    fn backward(&mut self, grad: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let cache = self.cache.take().ok_or(NnError::MissingForward("lstm"))?;
        let (batch, time, features) = cache.inputs.dim();
        let u = self.units;

        let grad_seq = if self.return_sequences {
            let g = grad.view().into_dimensionality::<Ix3>()?;
            if g.dim() != (batch, time, u) {
                return Err(NnError::shape("lstm grad", &[batch, time, u], g.shape()));
            }
            Some(g)
        } else {
            None
        };
        let grad_last = if self.return_sequences {
            None
        } else {
            let g = grad.view().into_dimensionality::<Ix2>()?;
            if g.dim() != (batch, u) {
                return Err(NnError::shape("lstm grad", &[batch, u], g.shape()));
            }
            Some(g)
        };

        let mut dx = Array3::zeros((batch, time, features));
        let mut dh_next: Array2<f32> = Array2::zeros((batch, u));
        let mut dc_next: Array2<f32> = Array2::zeros((batch, u));

        for t in (0..time).rev() {
            let step = &cache.steps[t];
            let mut dh = dh_next;
            if let Some(g) = grad_seq.as_ref() {
                dh += &g.index_axis(Axis(1), t);
            } else if t + 1 == time {
                if let Some(g) = grad_last.as_ref() {
                    dh += g;
                }
            }

            let d_o = &dh * &step.tanh_c;
            let dc = dc_next + &(&dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v));
            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            let mut dz = Array2::zeros((batch, 4 * u));
            dz.slice_mut(s![.., 0..u])
                .assign(&(d_i * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., u..2 * u])
                .assign(&(d_f * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., 2 * u..3 * u])
                .assign(&(d_g * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * u..4 * u])
                .assign(&(d_o * &step.o.mapv(|v| v * (1.0 - v))));

            let x_t = cache.inputs.index_axis(Axis(1), t);
            self.kernel.grad += &x_t.t().dot(&dz);
            self.recurrent.grad += &step.h_in.t().dot(&dz);
            self.bias.grad += &dz.sum_axis(Axis(0)).insert_axis(Axis(0));

            dx.index_axis_mut(Axis(1), t)
                .assign(&dz.dot(&self.kernel.value.t()));
            let dh_in = dz.dot(&self.recurrent.value.t());
            dh_next = match cache.mask.as_ref() {
                Some(m) => dh_in * m,
                None => dh_in,
            };
        }

        Ok(dx.into_dyn())
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.kernel, &self.recurrent, &self.bias]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.kernel, &mut self.recurrent, &mut self.bias]
    }
}
