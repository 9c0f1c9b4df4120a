// Fully connected projection: `y = x W + b` on `(batch, features)`.

use super::Layer;
use crate::error::NnError;
use crate::param::Param;
use lofi_prng::LofiRng;
use ndarray::{Array2, ArrayD, ArrayView2, Axis, Ix2};

pub struct Dense {
    input_dim: usize,
    units: usize,
    weight: Param,
    bias: Param,
    cached_input: Option<Array2<f32>>,
}

impl Dense {
    pub fn new(input_dim: usize, units: usize, rng: &mut LofiRng) -> Self {
        Self {
            input_dim,
            units,
            weight: Param::glorot("kernel", input_dim, units, rng),
            bias: Param::zeros("bias", 1, units),
            cached_input: None,
        }
    }

    fn check_input<'a>(&self, input: &'a ArrayD<f32>) -> Result<ArrayView2<'a, f32>, NnError> {
        let x = input.view().into_dimensionality::<Ix2>()?;
        if x.ncols() != self.input_dim {
            return Err(NnError::shape(
                "dense input",
                &[x.nrows(), self.input_dim],
                x.shape(),
            ));
        }
        Ok(x)
    }
}

impl Layer for Dense {
    fn kind(&self) -> &'static str {
        "dense"
    }

    fn forward(&mut self, input: &ArrayD<f32>, _rng: &mut LofiRng) -> Result<ArrayD<f32>, NnError> {
        let x = self.check_input(input)?;
        let y = x.dot(&self.weight.value) + &self.bias.value;
        self.cached_input = Some(x.to_owned());
        Ok(y.into_dyn())
    }

    fn infer(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let x = self.check_input(input)?;
        Ok((x.dot(&self.weight.value) + &self.bias.value).into_dyn())
    }

    fn backward(&mut self, grad: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let x = self
            .cached_input
            .take()
            .ok_or(NnError::MissingForward("dense"))?;
        let dy = grad.view().into_dimensionality::<Ix2>()?;
        if dy.dim() != (x.nrows(), self.units) {
            return Err(NnError::shape("dense grad", &[x.nrows(), self.units], dy.shape()));
        }
        self.weight.grad += &x.t().dot(&dy);
        self.bias.grad += &dy.sum_axis(Axis(0)).insert_axis(Axis(0));
        Ok(dy.dot(&self.weight.value.t()).into_dyn())
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.weight, &self.bias]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weight, &mut self.bias]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::grad_check;
    use ndarray::array;

    #[test]
    fn projects_with_bias() {
        let mut rng = LofiRng::new(0);
        let mut dense = Dense::new(2, 2, &mut rng);
        dense.weight.value = array![[1.0, 2.0], [3.0, 4.0]];
        dense.bias.value = array![[0.5, -0.5]];
        let out = dense.infer(&array![[1.0, 1.0]].into_dyn()).unwrap();
        assert_eq!(out, array![[4.5, 5.5]].into_dyn());
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut rng = LofiRng::new(5);
        let input = grad_check::random_like(&[3, 4], &mut rng);
        let mut dense = Dense::new(4, 3, &mut rng);
        grad_check::check(&mut dense, &input);
    }

    #[test]
    fn rejects_three_dimensional_input() {
        let mut rng = LofiRng::new(5);
        let input = grad_check::random_like(&[2, 3, 4], &mut rng);
        let dense = Dense::new(4, 3, &mut rng);
        assert!(matches!(dense.infer(&input), Err(NnError::Shape(_))));
    }
}
