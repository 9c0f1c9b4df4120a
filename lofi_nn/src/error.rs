// Error type for the neural-network crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NnError {
    /// A tensor did not have the shape the receiving layer or snapshot
    /// slot was built for.
    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// The layer list cannot be assembled into a working network.
    #[error("invalid topology: {0}")]
    Topology(String),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// A batch or sequence with zero length reached a layer.
    #[error("empty input reached {0}")]
    EmptyInput(&'static str),

    /// `backward` was called without a preceding training-mode `forward`.
    #[error("{0}: backward called before forward")]
    MissingForward(&'static str),
}

impl NnError {
    pub(crate) fn shape(context: impl Into<String>, expected: &[usize], found: &[usize]) -> Self {
        NnError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
