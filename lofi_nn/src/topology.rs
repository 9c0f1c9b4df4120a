// Declarative network topology.
//
// A `Topology` is an ordered list of `LayerSpec`s with their named
// hyperparameters. `Sequential::build` turns it into live layers by walking
// the list and inferring each layer's input width from the one before, so
// changing the architecture means editing a topology value, not the
// training or inference code. Topologies are serialized into weight
// snapshots and compared on load.

use crate::layers::ActivationFn;
use crate::error::NnError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSpec {
    Lstm {
        units: usize,
        return_sequences: bool,
        recurrent_dropout: f32,
    },
    BatchNorm {
        momentum: f32,
        epsilon: f32,
    },
    Dropout {
        rate: f32,
    },
    Dense {
        units: usize,
    },
    Activation {
        function: ActivationFn,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub layers: Vec<LayerSpec>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, spec: LayerSpec) -> Self {
        self.layers.push(spec);
        self
    }

    pub fn ends_in_softmax(&self) -> bool {
        matches!(
            self.layers.last(),
            Some(LayerSpec::Activation {
                function: ActivationFn::Softmax
            })
        )
    }

    /// Per-sample output shape for a per-sample input shape, or an error
    /// naming the first layer that cannot accept its input.
    pub fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, NnError> {
        let mut shape = input_shape.to_vec();
        for (index, spec) in self.layers.iter().enumerate() {
            shape = spec_output_shape(index, spec, &shape)?;
        }
        Ok(shape)
    }
}

pub(crate) fn spec_output_shape(
    index: usize,
    spec: &LayerSpec,
    shape: &[usize],
) -> Result<Vec<usize>, NnError> {
    match spec {
        LayerSpec::Lstm {
            units,
            return_sequences,
            ..
        } => match shape {
            [time, _features] if *return_sequences => Ok(vec![*time, *units]),
            [_time, _features] => Ok(vec![*units]),
            _ => Err(NnError::Topology(format!(
                "layer {index} (lstm) needs (time, features) input, got {shape:?}"
            ))),
        },
        LayerSpec::Dense { units } => match shape {
            [_features] => Ok(vec![*units]),
            _ => Err(NnError::Topology(format!(
                "layer {index} (dense) needs flat input, got {shape:?}"
            ))),
        },
        LayerSpec::BatchNorm { .. } => match shape {
            [_features] => Ok(shape.to_vec()),
            _ => Err(NnError::Topology(format!(
                "layer {index} (batch_norm) needs flat input, got {shape:?}"
            ))),
        },
        LayerSpec::Activation {
            function: ActivationFn::Softmax,
        } => match shape {
            [_classes] => Ok(shape.to_vec()),
            _ => Err(NnError::Topology(format!(
                "layer {index} (softmax) needs flat input, got {shape:?}"
            ))),
        },
        LayerSpec::Dropout { .. } | LayerSpec::Activation { .. } => Ok(shape.to_vec()),
    }
}
