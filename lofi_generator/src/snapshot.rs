// Weight snapshots.
//
// A snapshot is one bincode file holding everything needed to restore a
// trained network and to prove it matches the corpus it is used with:
// a magic tag and format version, the vocabulary fingerprint and size, the
// window length, the declarative topology, the epoch and loss it was saved
// at, and every tensor in layer order.
//
// Restoring is all-or-nothing. Metadata is checked first (vocabulary size,
// window length, fingerprint, topology), then `Sequential::import_tensors`
// checks every tensor shape before writing any weights.
//
// Files are named `<prefix>-<epoch:04>-<loss:.4>.bin`. `select_snapshot`
// scans a directory for that pattern and applies a `SnapshotPolicy`.

use crate::config::SnapshotConfig;
use crate::error::{GeneratorError, Result};
use crate::network::LofiModel;
use lofi_nn::{TensorRecord, Topology};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const MAGIC: [u8; 4] = *b"LOFI";
const FORMAT_VERSION: u32 = 1;
const EXTENSION: &str = "bin";

/// How generation picks a weights file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPolicy {
    /// Lowest loss in the file name; ties go to the later epoch.
    #[default]
    LowestLoss,
    /// Newest modification time; ties go to the later epoch.
    MostRecent,
    /// Exactly this file.
    Fixed { path: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    magic: [u8; 4],
    version: u32,
    pub fingerprint: u64,
    pub vocab_size: usize,
    pub sequence_length: usize,
    pub topology: Topology,
    pub epoch: usize,
    pub loss: f32,
    pub tensors: Vec<TensorRecord>,
}

impl Snapshot {
    pub fn capture(model: &LofiModel, epoch: usize, loss: f32) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            fingerprint: model.fingerprint(),
            vocab_size: model.vocab_size(),
            sequence_length: model.sequence_length(),
            topology: model.network().topology().clone(),
            epoch,
            loss,
            tensors: model.network().export_tensors(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let io_error = |reason: String| GeneratorError::SnapshotIo {
            path: path.to_path_buf(),
            reason,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_error(e.to_string()))?;
        }
        let file = File::create(path).map_err(|e| io_error(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self).map_err(|e| io_error(e.to_string()))?;
        writer.flush().map_err(|e| io_error(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let io_error = |reason: String| GeneratorError::SnapshotIo {
            path: path.to_path_buf(),
            reason,
        };
        let file = File::open(path).map_err(|e| io_error(e.to_string()))?;
        let snapshot: Snapshot =
            bincode::deserialize_from(BufReader::new(file)).map_err(|e| io_error(e.to_string()))?;
        if snapshot.magic != MAGIC {
            return Err(io_error("not a lofi weights file".into()));
        }
        if snapshot.version != FORMAT_VERSION {
            return Err(io_error(format!(
                "format version {} (expected {FORMAT_VERSION})",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Copy the stored weights into `model` after checking that they were
    /// trained for the same vocabulary, window length and architecture.
    pub fn restore_into(&self, model: &mut LofiModel) -> Result<()> {
        if self.vocab_size != model.vocab_size() {
            return Err(GeneratorError::ShapeMismatch {
                detail: format!(
                    "snapshot vocabulary size {} differs from corpus vocabulary size {}",
                    self.vocab_size,
                    model.vocab_size()
                ),
            });
        }
        if self.sequence_length != model.sequence_length() {
            return Err(GeneratorError::ShapeMismatch {
                detail: format!(
                    "snapshot window length {} differs from configured {}",
                    self.sequence_length,
                    model.sequence_length()
                ),
            });
        }
        if self.fingerprint != model.fingerprint() {
            return Err(GeneratorError::VocabularyMismatch {
                expected: self.fingerprint,
                found: model.fingerprint(),
            });
        }
        if &self.topology != model.network().topology() {
            return Err(GeneratorError::ShapeMismatch {
                detail: "snapshot topology differs from the configured network".into(),
            });
        }
        model
            .network_mut()
            .import_tensors(&self.tensors)
            .map_err(GeneratorError::from_import)
    }
}

pub fn snapshot_file_name(prefix: &str, epoch: usize, loss: f32) -> String {
    format!("{prefix}-{epoch:04}-{loss:.4}.{EXTENSION}")
}

/// `(epoch, loss)` from a file name produced by `snapshot_file_name`.
pub fn parse_snapshot_name(prefix: &str, file_name: &str) -> Option<(usize, f32)> {
    let stem = file_name
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(EXTENSION)?
        .strip_suffix('.')?;
    let (epoch, loss) = stem.split_once('-')?;
    if epoch.is_empty() || !epoch.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let loss: f32 = loss.parse().ok()?;
    if !loss.is_finite() {
        return None;
    }
    Some((epoch.parse().ok()?, loss))
}

struct Candidate {
    path: PathBuf,
    epoch: usize,
    loss: f32,
    modified: SystemTime,
}

/// Pick the weights file for generation according to `config.policy`.
pub fn select_snapshot(config: &SnapshotConfig) -> Result<PathBuf> {
    if let SnapshotPolicy::Fixed { path } = &config.policy {
        return if path.is_file() {
            Ok(path.clone())
        } else {
            Err(GeneratorError::NoSnapshot { dir: path.clone() })
        };
    }

    let no_snapshot = || GeneratorError::NoSnapshot {
        dir: config.dir.clone(),
    };
    let entries = std::fs::read_dir(&config.dir).map_err(|_| no_snapshot())?;
    let mut candidates = Vec::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some((epoch, loss)) = file_name
            .to_str()
            .and_then(|name| parse_snapshot_name(&config.prefix, name))
        else {
            continue;
        };
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push(Candidate {
            path: entry.path(),
            epoch,
            loss,
            modified,
        });
    }

    let chosen = match config.policy {
        SnapshotPolicy::MostRecent => candidates
            .into_iter()
            .max_by(|a, b| (a.modified, a.epoch).cmp(&(b.modified, b.epoch))),
        _ => candidates.into_iter().min_by(|a, b| {
            a.loss
                .total_cmp(&b.loss)
                .then_with(|| b.epoch.cmp(&a.epoch))
        }),
    };
    let chosen = chosen.ok_or_else(no_snapshot)?;
    log::info!(
        "selected snapshot {} (epoch {}, loss {:.4})",
        chosen.path.display(),
        chosen.epoch,
        chosen.loss
    );
    Ok(chosen.path)
}
