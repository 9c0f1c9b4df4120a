// Fixed-length training windows.
//
// A corpus of `L` symbols and a window length `n` yield `L - n` windows with
// stride 1: window `i` holds the ids of symbols `i..i+n` and its target is
// the id of symbol `i+n`. The raw id windows seed generation. Training sees
// them normalized (`id / vocab_size`, shaped `(batch, n, 1)`) with one-hot
// targets.
//
// Normalized tensors are built fresh on every call and never written back.

use crate::error::{GeneratorError, Result};
use crate::vocab::Vocabulary;
use ndarray::{Array2, Array3};

#[derive(Clone, Debug)]
pub struct Windows {
    sequence_length: usize,
    vocab_size: usize,
    inputs: Vec<Vec<usize>>,
    targets: Vec<usize>,
}

impl Windows {
    pub fn build<S: AsRef<str>>(
        symbols: &[S],
        vocab: &Vocabulary,
        sequence_length: usize,
    ) -> Result<Self> {
        let required = sequence_length + 1;
        if symbols.len() < required {
            return Err(GeneratorError::InsufficientData {
                required,
                found: symbols.len(),
            });
        }
        let ids = symbols
            .iter()
            .map(|s| {
                vocab
                    .id_of(s.as_ref())
                    .ok_or_else(|| GeneratorError::InvalidSymbol(s.as_ref().to_string()))
            })
            .collect::<Result<Vec<usize>>>()?;

        let n_patterns = ids.len() - sequence_length;
        let inputs = (0..n_patterns)
            .map(|i| ids[i..i + sequence_length].to_vec())
            .collect();
        let targets = ids[sequence_length..].to_vec();

        Ok(Self {
            sequence_length,
            vocab_size: vocab.len(),
            inputs,
            targets,
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Raw id windows, in corpus order.
    pub fn network_input(&self) -> &[Vec<usize>] {
        &self.inputs
    }

    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    pub fn normalized_input(&self) -> Array3<f32> {
        let all: Vec<usize> = (0..self.len()).collect();
        self.batch(&all).0
    }

    pub fn one_hot_targets(&self) -> Array2<f32> {
        let all: Vec<usize> = (0..self.len()).collect();
        self.batch(&all).1
    }

    /// Normalized inputs and one-hot targets for the windows at `indices`.
    pub fn batch(&self, indices: &[usize]) -> (Array3<f32>, Array2<f32>) {
        let scale = self.vocab_size as f32;
        let inputs = Array3::from_shape_fn(
            (indices.len(), self.sequence_length, 1),
            |(b, t, _)| self.inputs[indices[b]][t] as f32 / scale,
        );
        let mut targets = Array2::zeros((indices.len(), self.vocab_size));
        for (row, &index) in indices.iter().enumerate() {
            targets[[row, self.targets[index]]] = 1.0;
        }
        (inputs, targets)
    }
}

/// Normalize a single id window to the `(1, len, 1)` network input shape.
pub fn normalize_window<I>(ids: I, vocab_size: usize) -> Array3<f32>
where
    I: IntoIterator<Item = usize>,
{
    let ids: Vec<usize> = ids.into_iter().collect();
    let scale = vocab_size as f32;
    Array3::from_shape_fn((1, ids.len(), 1), |(_, t, _)| ids[t] as f32 / scale)
}
