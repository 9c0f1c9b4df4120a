// Autoregressive sampling.
//
// Generation starts from one training window chosen uniformly at random,
// copied into a `SlidingWindow`. Each step normalizes the window, asks the
// model for a next-symbol distribution, takes the most likely id (ties go to
// the lowest id), records its symbol, and slides the window forward by one.
// The start draw is the only randomness; everything after it is greedy.

use crate::error::{GeneratorError, Result};
use crate::vocab::{Symbol, Vocabulary};
use crate::windows::{Windows, normalize_window};
use lofi_nn::NnError;
use lofi_prng::LofiRng;
use ndarray::Array3;
use std::collections::VecDeque;

/// Anything that maps a normalized `(1, sequence_length, 1)` window to a
/// probability distribution over the vocabulary.
pub trait NextSymbolModel {
    fn next_distribution(&self, window: &Array3<f32>) -> std::result::Result<Vec<f32>, NnError>;
}

/// Fixed-capacity window of the most recent ids. Pushing past capacity
/// evicts the oldest id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlidingWindow {
    ids: VecDeque<usize>,
    capacity: usize,
}

impl SlidingWindow {
    pub fn new(seed: &[usize]) -> Self {
        Self {
            ids: seed.iter().copied().collect(),
            capacity: seed.len(),
        }
    }

    pub fn push(&mut self, id: usize) {
        if self.capacity == 0 {
            return;
        }
        if self.ids.len() == self.capacity {
            self.ids.pop_front();
        }
        self.ids.push_back(id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.ids.iter().copied()
    }

    pub fn normalized(&self, vocab_size: usize) -> Array3<f32> {
        normalize_window(self.iter(), vocab_size)
    }
}

/// Index of the largest value; the first one wins ties. NaN never wins.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b || v.is_nan() => {}
            None if v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sampler {
    pub length: usize,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(500)
    }
}

impl Sampler {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn sample<M: NextSymbolModel + ?Sized>(
        &self,
        model: &M,
        windows: &Windows,
        vocab: &Vocabulary,
        rng: &mut LofiRng,
    ) -> Result<Vec<Symbol>> {
        if windows.is_empty() {
            return Err(GeneratorError::InsufficientData {
                required: windows.sequence_length() + 1,
                found: 0,
            });
        }
        let start = rng.range_usize(0, windows.len());
        log::debug!("sampling {} symbols from window {start}", self.length);
        let mut window = SlidingWindow::new(&windows.network_input()[start]);

        let mut output = Vec::with_capacity(self.length);
        for _ in 0..self.length {
            let input = window.normalized(vocab.len());
            let probs = model.next_distribution(&input)?;
            let id = argmax(&probs).ok_or(GeneratorError::Model(NnError::EmptyInput(
                "next-symbol distribution",
            )))?;
            let symbol = vocab
                .symbol_of(id)
                .ok_or(GeneratorError::UnknownSymbolId(id))?;
            output.push(symbol.clone());
            window.push(id);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Always predicts `id`, and records every window it was shown.
    struct ConstantModel {
        id: usize,
        classes: usize,
        seen: RefCell<Vec<Vec<f32>>>,
    }

    impl ConstantModel {
        fn new(id: usize, classes: usize) -> Self {
            Self {
                id,
                classes,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl NextSymbolModel for ConstantModel {
        fn next_distribution(
            &self,
            window: &Array3<f32>,
        ) -> std::result::Result<Vec<f32>, NnError> {
            self.seen.borrow_mut().push(window.iter().copied().collect());
            let mut probs = vec![0.0; self.classes];
            if let Some(p) = probs.get_mut(self.id) {
                *p = 1.0;
            }
            Ok(probs)
        }
    }

    fn corpus() -> (Vec<String>, Vocabulary, Windows) {
        let names = ["C4", "D4", "E4", "R", "0.4.7"];
        let symbols: Vec<String> = (0..30).map(|i| names[i % 5].to_string()).collect();
        let vocab = Vocabulary::from_symbols(&symbols);
        let windows = Windows::build(&symbols, &vocab, 8).unwrap();
        (symbols, vocab, windows)
    }

    #[test]
    fn produces_exactly_length_symbols() {
        let (_, vocab, windows) = corpus();
        let model = ConstantModel::new(1, vocab.len());
        let out = Sampler::default()
            .sample(&model, &windows, &vocab, &mut LofiRng::new(1))
            .unwrap();
        assert_eq!(out.len(), 500);
    }

    #[test]
    fn constant_model_repeats_its_symbol() {
        let (_, vocab, windows) = corpus();
        let c4 = vocab.id_of("C4").unwrap();
        let model = ConstantModel::new(c4, vocab.len());
        let out = Sampler::new(500)
            .sample(&model, &windows, &vocab, &mut LofiRng::new(2))
            .unwrap();
        assert!(out.iter().all(|s| s == "C4"));
    }

    #[test]
    fn window_slides_one_id_per_step() {
        let (_, vocab, windows) = corpus();
        let id = vocab.id_of("R").unwrap();
        let model = ConstantModel::new(id, vocab.len());
        Sampler::new(10)
            .sample(&model, &windows, &vocab, &mut LofiRng::new(3))
            .unwrap();
        let seen = model.seen.borrow();
        assert_eq!(seen.len(), 10);
        let scaled = id as f32 / vocab.len() as f32;
        for step in 1..seen.len() {
            assert_eq!(seen[step][..7], seen[step - 1][1..]);
            assert_eq!(seen[step][7], scaled);
        }
    }

    #[test]
    fn start_window_comes_from_the_corpus() {
        let (_, vocab, windows) = corpus();
        let model = ConstantModel::new(0, vocab.len());
        Sampler::new(1)
            .sample(&model, &windows, &vocab, &mut LofiRng::new(4))
            .unwrap();
        let first = model.seen.borrow()[0].clone();
        let scale = vocab.len() as f32;
        assert!(windows.network_input().iter().any(|w| w
            .iter()
            .map(|&id| id as f32 / scale)
            .eq(first.iter().copied())));
    }

    #[test]
    fn out_of_vocabulary_id_is_an_error() {
        let (_, vocab, windows) = corpus();
        let model = ConstantModel::new(7, 9);
        let result = Sampler::new(5).sample(&model, &windows, &vocab, &mut LofiRng::new(5));
        assert!(matches!(result, Err(GeneratorError::UnknownSymbolId(7))));
    }

    #[test]
    fn argmax_prefers_lowest_id_on_ties() {
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), Some(1));
        assert_eq!(argmax(&[f32::NAN, 0.2, 0.1]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn sliding_window_evicts_oldest() {
        let mut window = SlidingWindow::new(&[1, 2, 3]);
        window.push(4);
        window.push(5);
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn seed_window_is_not_aliased() {
        let seed = vec![0, 1, 2];
        let mut window = SlidingWindow::new(&seed);
        window.push(9);
        assert_eq!(seed, vec![0, 1, 2]);
    }
}
