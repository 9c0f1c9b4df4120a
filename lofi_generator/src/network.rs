// The lofi sequence model.
//
// `lofi_topology` spells out the network as a declarative layer list:
// stacked LSTMs (all but the last returning sequences), batch norm, dropout,
// a ReLU dense layer, batch norm, dropout, and a softmax over the
// vocabulary. Widths and rates come from `NetworkConfig`.
//
// `LofiModel` pairs the built `Sequential` with the vocabulary fingerprint
// and window length it was built for, which is what snapshots record and
// check. It implements `NextSymbolModel` for the sampler.

use crate::config::NetworkConfig;
use crate::error::{GeneratorError, Result};
use crate::sampler::NextSymbolModel;
use crate::vocab::Vocabulary;
use lofi_nn::{ActivationFn, LayerSpec, NnError, Sequential, Topology};
use lofi_prng::LofiRng;
use ndarray::Array3;

pub fn lofi_topology(config: &NetworkConfig, vocab_size: usize) -> Topology {
    let mut topology = Topology::new();
    let lstm_layers = config.lstm_layers.max(1);
    for layer in 0..lstm_layers {
        topology = topology.push(LayerSpec::Lstm {
            units: config.lstm_units,
            return_sequences: layer + 1 < lstm_layers,
            recurrent_dropout: config.recurrent_dropout,
        });
    }
    let batch_norm = LayerSpec::BatchNorm {
        momentum: config.batch_norm_momentum,
        epsilon: config.batch_norm_epsilon,
    };
    topology
        .push(batch_norm.clone())
        .push(LayerSpec::Dropout {
            rate: config.dropout,
        })
        .push(LayerSpec::Dense {
            units: config.dense_units,
        })
        .push(LayerSpec::Activation {
            function: ActivationFn::Relu,
        })
        .push(batch_norm)
        .push(LayerSpec::Dropout {
            rate: config.dropout,
        })
        .push(LayerSpec::Dense { units: vocab_size })
        .push(LayerSpec::Activation {
            function: ActivationFn::Softmax,
        })
}

pub struct LofiModel {
    network: Sequential,
    sequence_length: usize,
    vocab_size: usize,
    fingerprint: u64,
}

impl LofiModel {
    pub fn build(
        config: &NetworkConfig,
        vocab: &Vocabulary,
        sequence_length: usize,
        rng: &mut LofiRng,
    ) -> Result<Self> {
        if vocab.is_empty() {
            return Err(GeneratorError::Model(NnError::EmptyInput("vocabulary")));
        }
        let topology = lofi_topology(config, vocab.len());
        let network = Sequential::build(&topology, &[sequence_length, 1], rng)?;
        log::info!(
            "built network: {} layers, {} parameters, vocabulary {}",
            topology.layers.len(),
            network.parameter_count(),
            vocab.len()
        );
        Ok(Self {
            network,
            sequence_length,
            vocab_size: vocab.len(),
            fingerprint: vocab.fingerprint(),
        })
    }

    pub fn network(&self) -> &Sequential {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Sequential {
        &mut self.network
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

impl NextSymbolModel for LofiModel {
    fn next_distribution(&self, window: &Array3<f32>) -> std::result::Result<Vec<f32>, NnError> {
        let probs = self.network.predict(&window.clone().into_dyn())?;
        Ok(probs.row(0).to_vec())
    }
}
