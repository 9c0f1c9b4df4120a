// Lofi Piano Generator
//
// Trains a stacked-LSTM next-symbol model on an encoded note/chord corpus,
// samples a new symbol sequence from it, and renders the result as a piano
// MIDI file.
//
// Architecture:
// - corpus.rs: Corpus loading/saving (JSON or one symbol per line) and the
//   event -> symbol encoding
// - vocab.rs: Sorted symbol <-> id map with a CRC-32 fingerprint
// - windows.rs: Fixed-length training windows, normalization, one-hot targets
// - network.rs: The lofi layer topology and the `LofiModel` wrapper
// - trainer.rs: Shuffled mini-batch training with best-loss checkpoints
// - snapshot.rs: Weight files, validation on load, selection policies
// - sampler.rs: Greedy autoregressive generation over a sliding window
// - decoder.rs: Symbol -> timed note/chord/rest events
// - midi.rs: SMF output from decoded timelines
// - config.rs: JSON configuration with per-section defaults
// - jobs.rs: Background train/generate jobs with status polling
// - error.rs: The `GeneratorError` type
//
// `train` and `generate` are the two top-level operations. Both are
// synchronous; run them through `jobs::JobRunner` to keep a caller
// responsive. All randomness flows from explicit seeds, so a run with the
// same seed, corpus and weights reproduces its output.

pub mod config;
pub mod corpus;
pub mod decoder;
pub mod error;
pub mod jobs;
pub mod midi;
pub mod network;
pub mod sampler;
pub mod snapshot;
pub mod trainer;
pub mod vocab;
pub mod windows;

pub use config::GeneratorConfig;
pub use error::{GeneratorError, Result};
pub use trainer::TrainingReport;

use config::resolve_seed;
use corpus::Corpus;
use decoder::Decoder;
use lofi_prng::LofiRng;
use network::LofiModel;
use sampler::Sampler;
use snapshot::{Snapshot, select_snapshot};
use std::fmt;
use std::path::PathBuf;
use trainer::Trainer;
use vocab::Vocabulary;
use windows::Windows;

/// What a generation run produced.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationReport {
    pub snapshot: PathBuf,
    pub output: PathBuf,
    pub seed: u64,
    pub symbols: usize,
    pub events: usize,
    pub total_beats: f64,
}

impl fmt::Display for GenerationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wrote {} events ({:.1} beats) to {} using {} (seed {})",
            self.events,
            self.total_beats,
            self.output.display(),
            self.snapshot.display(),
            self.seed
        )
    }
}

/// Corpus, vocabulary and windows shared by both operations.
fn prepare(config: &GeneratorConfig) -> Result<(Vocabulary, Windows)> {
    let corpus = Corpus::load(&config.corpus.path)?;
    let vocab = Vocabulary::from_symbols(corpus.symbols());
    let windows = Windows::build(corpus.symbols(), &vocab, config.corpus.sequence_length)?;
    log::info!(
        "{} symbols, vocabulary {}, {} windows of {}",
        corpus.len(),
        vocab.len(),
        windows.len(),
        windows.sequence_length()
    );
    Ok((vocab, windows))
}

/// Train the network on the configured corpus, checkpointing every
/// improvement into the snapshot directory.
pub fn train(config: &GeneratorConfig) -> Result<TrainingReport> {
    let (vocab, windows) = prepare(config)?;
    let seed = resolve_seed(config.training.seed, "training");
    let mut rng = LofiRng::new(seed);
    let mut model = LofiModel::build(
        &config.network,
        &vocab,
        config.corpus.sequence_length,
        &mut rng,
    )?;

    let mut trainer = Trainer::new(&config.training, &config.snapshots);
    if let Some(path) = &config.training.resume_from {
        let snapshot = Snapshot::load(path)?;
        snapshot.restore_into(&mut model)?;
        log::info!(
            "resuming from {} (epoch {}, loss {:.4})",
            path.display(),
            snapshot.epoch,
            snapshot.loss
        );
        trainer = trainer.resume_after(&snapshot);
    }
    trainer.fit(&mut model, &windows, &mut rng)
}

/// Load the selected weights, sample a symbol sequence and write it as MIDI.
pub fn generate(config: &GeneratorConfig) -> Result<GenerationReport> {
    let (vocab, windows) = prepare(config)?;
    let snapshot_path = select_snapshot(&config.snapshots)?;
    let snapshot = Snapshot::load(&snapshot_path)?;

    let seed = resolve_seed(config.sampling.seed, "sampling");
    let mut rng = LofiRng::new(seed);
    // Initial weights are overwritten by the snapshot; they get their own
    // stream so the network size does not shift the sampling draws.
    let mut model = LofiModel::build(
        &config.network,
        &vocab,
        config.corpus.sequence_length,
        &mut rng.fork(),
    )?;
    snapshot.restore_into(&mut model)?;

    let symbols = Sampler::new(config.sampling.length).sample(&model, &windows, &vocab, &mut rng)?;
    let mut timeline = Decoder::new().decode(&symbols, &mut rng)?;
    timeline.tempo_bpm = config.output.tempo_bpm;
    timeline.velocity = config.output.velocity;
    timeline.write_midi(&config.output.path)?;

    Ok(GenerationReport {
        snapshot: snapshot_path,
        output: config.output.path.clone(),
        seed,
        symbols: symbols.len(),
        events: timeline.len(),
        total_beats: timeline.total_duration(),
    })
}
