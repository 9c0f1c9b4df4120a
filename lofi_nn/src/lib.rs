// Small CPU neural-network library for next-symbol sequence models.
//
// Built on `ndarray`. A network is described by a declarative `Topology`
// (layer kinds plus hyperparameters), instantiated by `Sequential::build`,
// trained with `Sequential::train_batch` + `RmsProp`, and queried with
// `Sequential::predict`. Only the layers the lofi generator needs are
// implemented: LSTM, dense, batch normalization, dropout, ReLU and softmax.
//
// All randomness (weight init, dropout masks) comes from a caller-supplied
// `LofiRng`, so a fixed seed reproduces a training run exactly.

pub mod error;
pub mod layers;
pub mod loss;
pub mod model;
pub mod optimizer;
pub mod param;
pub mod topology;

pub use error::NnError;
pub use layers::{ActivationFn, Layer};
pub use model::{Sequential, TensorRecord};
pub use optimizer::RmsProp;
pub use topology::{LayerSpec, Topology};
