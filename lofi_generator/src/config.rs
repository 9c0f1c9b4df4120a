// Generator configuration.
//
// Every tunable of the pipeline lives in `GeneratorConfig`, loaded from JSON
// by `GeneratorConfig::load`. Each section is `#[serde(default)]`, so a
// config file only has to name the fields it changes; `{}` is a valid file
// and reproduces the stock lofi setup (100-symbol windows, three 512-unit
// LSTMs, 200 epochs of batch 64, 500 generated symbols, `lofi_output.mid`).
//
// Sections: `CorpusConfig` (input data and window length), `NetworkConfig`
// (layer widths and regularization), `TrainingConfig` (epochs, batching,
// RMSProp, resume), `SnapshotConfig` (weights directory, file prefix and the
// `SnapshotPolicy` used to pick weights at generation time),
// `SamplingConfig` (generation length and seed) and `OutputConfig` (MIDI
// destination, tempo and velocity).
//
// Seeds are optional. A missing seed is derived from the clock by
// `resolve_seed` and logged, so every run can be replayed.

use crate::error::{GeneratorError, Result};
use crate::snapshot::SnapshotPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub corpus: CorpusConfig,
    pub network: NetworkConfig,
    pub training: TrainingConfig,
    pub snapshots: SnapshotConfig,
    pub sampling: SamplingConfig,
    pub output: OutputConfig,
}

impl GeneratorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config_error = |reason: String| GeneratorError::Config {
            path: path.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| config_error(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// JSON array of symbols, or a `.txt` file with one symbol per line.
    pub path: PathBuf,

    /// Number of symbols the network sees before predicting the next one.
    pub sequence_length: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/notes.json"),
            sequence_length: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Stacked LSTM layers. All but the last return full sequences.
    pub lstm_layers: usize,
    pub lstm_units: usize,
    pub recurrent_dropout: f32,
    pub dense_units: usize,
    pub dropout: f32,
    pub batch_norm_momentum: f32,
    pub batch_norm_epsilon: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            lstm_layers: 3,
            lstm_units: 512,
            recurrent_dropout: 0.3,
            dense_units: 256,
            dropout: 0.3,
            batch_norm_momentum: lofi_nn::layers::DEFAULT_BN_MOMENTUM,
            batch_norm_epsilon: lofi_nn::layers::DEFAULT_BN_EPSILON,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub rho: f32,
    pub epsilon: f32,
    pub seed: Option<u64>,

    /// Snapshot to load before the first epoch. Training continues from its
    /// weights and epoch counter.
    pub resume_from: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            batch_size: 64,
            learning_rate: lofi_nn::optimizer::DEFAULT_LEARNING_RATE,
            rho: lofi_nn::optimizer::DEFAULT_RHO,
            epsilon: lofi_nn::optimizer::DEFAULT_EPSILON,
            seed: None,
            resume_from: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub dir: PathBuf,

    /// File names are `<prefix>-<epoch:04>-<loss:.4>.bin`.
    pub prefix: String,

    pub policy: SnapshotPolicy,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("weights"),
            prefix: "lofi-hip-hop-weights-improvement".into(),
            policy: SnapshotPolicy::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Symbols to generate.
    pub length: usize,
    pub seed: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            length: 500,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Overwritten on every generation run.
    pub path: PathBuf,
    pub tempo_bpm: u16,
    pub velocity: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("lofi_output.mid"),
            tempo_bpm: 120,
            velocity: 90,
        }
    }
}

/// Use `seed` if given, otherwise derive one from the clock. Either way the
/// seed is logged under `purpose`.
pub fn resolve_seed(seed: Option<u64>, purpose: &str) -> u64 {
    match seed {
        Some(seed) => {
            log::info!("{purpose} seed: {seed}");
            seed
        }
        None => {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            log::info!("{purpose} seed (from clock): {nanos}");
            nanos
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config: GeneratorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GeneratorConfig::default());
        assert_eq!(config.corpus.sequence_length, 100);
        assert_eq!(config.network.lstm_units, 512);
        assert_eq!(config.training.epochs, 200);
        assert_eq!(config.training.batch_size, 64);
        assert_eq!(config.sampling.length, 500);
        assert_eq!(config.output.path, PathBuf::from("lofi_output.mid"));
        assert_eq!(config.snapshots.policy, SnapshotPolicy::LowestLoss);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let json = r#"{
            "network": { "lstm_units": 16 },
            "snapshots": { "policy": "most_recent" },
            "sampling": { "seed": 7 }
        }"#;
        let config: GeneratorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.network.lstm_units, 16);
        assert_eq!(config.network.dense_units, 256);
        assert_eq!(config.snapshots.policy, SnapshotPolicy::MostRecent);
        assert_eq!(config.snapshots.prefix, "lofi-hip-hop-weights-improvement");
        assert_eq!(config.sampling.seed, Some(7));
        assert_eq!(config.sampling.length, 500);
    }

    #[test]
    fn fixed_policy_names_a_path() {
        let json = r#"{ "snapshots": { "policy": { "fixed": { "path": "w/best.bin" } } } }"#;
        let config: GeneratorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.snapshots.policy,
            SnapshotPolicy::Fixed {
                path: PathBuf::from("w/best.bin")
            }
        );
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = GeneratorConfig::load(Path::new("/nonexistent/lofi/config.json"));
        assert!(matches!(result, Err(GeneratorError::Config { .. })));
    }

    #[test]
    fn explicit_seed_is_used() {
        assert_eq!(resolve_seed(Some(42), "test"), 42);
    }
}
