// Sequential model assembled from a `Topology`.
//
// `build` walks the topology, inferring each layer's input width from the
// previous layer's output, and initializes weights from the caller's RNG.
// `train_batch` runs forward in training mode, computes categorical
// cross-entropy, backpropagates and applies one optimizer step.
// `predict` is the read-only inference path.
//
// Snapshots: `export_tensors` flattens every parameter and buffer in layer
// order into `TensorRecord`s; `import_tensors` writes them back only if the
// count and every shape match the instantiated network exactly. Nothing is
// truncated or padded.

use crate::error::NnError;
use crate::layers::{Activation, BatchNorm, Dense, Dropout, Layer, Lstm};
use crate::loss::{categorical_crossentropy, softmax_crossentropy_grad};
use crate::optimizer::RmsProp;
use crate::param::Param;
use crate::topology::{LayerSpec, Topology, spec_output_shape};
use lofi_prng::LofiRng;
use ndarray::{Array2, ArrayD, Ix2};
use serde::{Deserialize, Serialize};

/// One persisted tensor: a name for diagnostics, its shape, and row-major data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorRecord {
    fn from_array(name: String, array: &Array2<f32>) -> Self {
        Self {
            name,
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }
}

pub struct Sequential {
    topology: Topology,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    /// Instantiate `topology` for per-sample inputs of `input_shape`
    /// (the batch axis is not included).
    pub fn build(
        topology: &Topology,
        input_shape: &[usize],
        rng: &mut LofiRng,
    ) -> Result<Self, NnError> {
        if topology.layers.is_empty() {
            return Err(NnError::Topology("no layers".into()));
        }
        let mut shape = input_shape.to_vec();
        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(topology.layers.len());
        for (index, spec) in topology.layers.iter().enumerate() {
            let next = spec_output_shape(index, spec, &shape)?;
            let features = shape.last().copied().unwrap_or(0);
            let layer: Box<dyn Layer> = match spec {
                LayerSpec::Lstm {
                    units,
                    return_sequences,
                    recurrent_dropout,
                } => Box::new(Lstm::new(
                    features,
                    *units,
                    *return_sequences,
                    *recurrent_dropout,
                    rng,
                )),
                LayerSpec::BatchNorm { momentum, epsilon } => {
                    Box::new(BatchNorm::new(features, *momentum, *epsilon))
                }
                LayerSpec::Dropout { rate } => Box::new(Dropout::new(*rate)),
                LayerSpec::Dense { units } => Box::new(Dense::new(features, *units, rng)),
                LayerSpec::Activation { function } => Box::new(Activation::new(*function)),
            };
            layers.push(layer);
            shape = next;
        }
        Ok(Self {
            topology: topology.clone(),
            input_shape: input_shape.to_vec(),
            output_shape: shape,
            layers,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|layer| layer.params())
            .map(|p| p.value.len())
            .sum()
    }

    fn check_batch(&self, input: &ArrayD<f32>) -> Result<(), NnError> {
        if input.shape().get(1..) != Some(self.input_shape.as_slice()) {
            let mut expected = vec![input.shape().first().copied().unwrap_or(0)];
            expected.extend_from_slice(&self.input_shape);
            return Err(NnError::shape("model input", &expected, input.shape()));
        }
        Ok(())
    }

    /// Inference on a batch. Returns `(batch, outputs)`.
    pub fn predict(&self, input: &ArrayD<f32>) -> Result<Array2<f32>, NnError> {
        self.check_batch(input)?;
        let mut activation = input.clone();
        for layer in &self.layers {
            activation = layer.infer(&activation)?;
        }
        Ok(activation.into_dimensionality::<Ix2>()?)
    }

    /// Training-mode forward pass that caches activations for `backward`.
    pub fn forward_train(
        &mut self,
        input: &ArrayD<f32>,
        rng: &mut LofiRng,
    ) -> Result<ArrayD<f32>, NnError> {
        self.check_batch(input)?;
        let mut activation = input.clone();
        for layer in self.layers.iter_mut() {
            activation = layer.forward(&activation, rng)?;
        }
        Ok(activation)
    }

    /// One supervised step on a batch with one-hot `targets`. Returns the
    /// mean cross-entropy of the batch before the update.
    pub fn train_batch(
        &mut self,
        input: &ArrayD<f32>,
        targets: &Array2<f32>,
        optimizer: &mut RmsProp,
        rng: &mut LofiRng,
    ) -> Result<f32, NnError> {
        if !self.topology.ends_in_softmax() {
            return Err(NnError::Topology(
                "categorical cross-entropy training needs a softmax output layer".into(),
            ));
        }
        let probs = self
            .forward_train(input, rng)?
            .into_dimensionality::<Ix2>()?;
        let loss = categorical_crossentropy(&probs, targets)?;
        let mut grad = softmax_crossentropy_grad(&probs, targets)?.into_dyn();

        // The softmax layer's own backward is replaced by the fused gradient.
        let below_softmax = self.layers.len() - 1;
        for layer in self.layers[..below_softmax].iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        optimizer.step(self.params_mut());
        Ok(loss)
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = Vec::new();
        for layer in self.layers.iter_mut() {
            params.extend(layer.params_mut());
        }
        params
    }

    pub fn export_tensors(&self) -> Vec<TensorRecord> {
        let mut records = Vec::new();
        for (index, layer) in self.layers.iter().enumerate() {
            for p in layer.params() {
                let name = format!("{index}.{}.{}", layer.kind(), p.name);
                records.push(TensorRecord::from_array(name, &p.value));
            }
            for (buffer_name, buffer) in layer.buffers() {
                let name = format!("{index}.{}.{buffer_name}", layer.kind());
                records.push(TensorRecord::from_array(name, buffer));
            }
        }
        records
    }

    pub fn import_tensors(&mut self, records: &[TensorRecord]) -> Result<(), NnError> {
        let mut slots: Vec<&mut Array2<f32>> = Vec::new();
        for layer in self.layers.iter_mut() {
            slots.extend(layer.tensors_mut());
        }
        if slots.len() != records.len() {
            return Err(NnError::shape(
                "snapshot tensor count",
                &[slots.len()],
                &[records.len()],
            ));
        }
        // Validate everything before touching any weights.
        for (slot, record) in slots.iter().zip(records) {
            let expected = slot.shape();
            if expected != record.shape.as_slice()
                || record.data.len() != record.shape.iter().product::<usize>()
            {
                return Err(NnError::shape(
                    format!("snapshot tensor {}", record.name),
                    expected,
                    &record.shape,
                ));
            }
        }
        for (slot, record) in slots.into_iter().zip(records) {
            let array = Array2::from_shape_vec(slot.raw_dim(), record.data.clone())?;
            *slot = array;
        }
        Ok(())
    }
}
