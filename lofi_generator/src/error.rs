// Error type for the generator pipeline.
//
// Every failure in corpus loading, windowing, snapshot handling, sampling,
// decoding and MIDI output surfaces as one of these variants. Nothing is
// retried or swallowed; callers decide what to do.

use lofi_nn::NnError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeneratorError {
    /// The corpus file is missing, unreadable, or not a list of symbols.
    #[error("corpus {} unavailable: {reason}", path.display())]
    DataUnavailable { path: PathBuf, reason: String },

    #[error("corpus too short: need at least {required} symbols, found {found}")]
    InsufficientData { required: usize, found: usize },

    /// Persisted weights or metadata do not fit the instantiated network.
    #[error("shape mismatch: {detail}")]
    ShapeMismatch { detail: String },

    /// The snapshot was trained on a different vocabulary.
    #[error("vocabulary fingerprint mismatch: snapshot has {expected:#018x}, corpus has {found:#018x}")]
    VocabularyMismatch { expected: u64, found: u64 },

    #[error("no weight snapshot found in {}", dir.display())]
    NoSnapshot { dir: PathBuf },

    #[error("snapshot {}: {reason}", path.display())]
    SnapshotIo { path: PathBuf, reason: String },

    #[error("model produced symbol id {0}, which is outside the vocabulary")]
    UnknownSymbolId(usize),

    #[error("cannot decode symbol {0:?}")]
    InvalidSymbol(String),

    #[error("cannot write {}: {reason}", path.display())]
    OutputWriteError { path: PathBuf, reason: String },

    #[error("config {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error(transparent)]
    Model(#[from] NnError),
}

pub type Result<T> = std::result::Result<T, GeneratorError>;

impl GeneratorError {
    /// Lift a network error raised while loading weights, so shape problems
    /// are reported as snapshot mismatches rather than numeric failures.
    pub(crate) fn from_import(err: NnError) -> Self {
        match err {
            NnError::ShapeMismatch {
                context,
                expected,
                found,
            } => GeneratorError::ShapeMismatch {
                detail: format!("{context}: network expects {expected:?}, snapshot has {found:?}"),
            },
            other => GeneratorError::Model(other),
        }
    }
}
