// Supervised training loop.
//
// Each epoch shuffles the window order, walks it in mini-batches, and runs
// one RMSProp step per batch. The epoch loss is the sample-weighted mean of
// the batch losses. Whenever an epoch beats the best loss so far, the model
// is written to `<dir>/<prefix>-<epoch:04>-<loss:.4>.bin`; nothing else is
// ever written.
//
// Epochs are numbered from 1, or from one past the resumed snapshot's epoch.

use crate::config::{SnapshotConfig, TrainingConfig};
use crate::error::Result;
use crate::network::LofiModel;
use crate::snapshot::{Snapshot, snapshot_file_name};
use crate::windows::Windows;
use lofi_nn::RmsProp;
use lofi_prng::LofiRng;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub last_epoch: usize,
    pub best_loss: Option<f32>,
    pub final_loss: Option<f32>,
    pub snapshots: Vec<PathBuf>,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trained {} epochs", self.epochs_run)?;
        if let Some(best) = self.best_loss {
            write!(f, ", best loss {best:.4}")?;
        }
        match self.snapshots.last() {
            Some(path) => write!(f, ", latest snapshot {}", path.display()),
            None => write!(f, ", no snapshot written"),
        }
    }
}

pub struct Trainer {
    config: TrainingConfig,
    snapshots: SnapshotConfig,
    first_epoch: usize,
    best_loss: Option<f32>,
}

impl Trainer {
    pub fn new(config: &TrainingConfig, snapshots: &SnapshotConfig) -> Self {
        Self {
            config: config.clone(),
            snapshots: snapshots.clone(),
            first_epoch: 1,
            best_loss: None,
        }
    }

    /// Continue numbering after `snapshot`, and only checkpoint epochs that
    /// improve on its loss.
    pub fn resume_after(mut self, snapshot: &Snapshot) -> Self {
        self.first_epoch = snapshot.epoch + 1;
        self.best_loss = Some(snapshot.loss);
        self
    }

    pub fn fit(
        &self,
        model: &mut LofiModel,
        windows: &Windows,
        rng: &mut LofiRng,
    ) -> Result<TrainingReport> {
        let batch_size = self.config.batch_size.max(1);
        let mut optimizer = RmsProp::new(
            self.config.learning_rate,
            self.config.rho,
            self.config.epsilon,
        );
        let mut order: Vec<usize> = (0..windows.len()).collect();
        let mut best = self.best_loss;
        let mut final_loss = None;
        let mut written = Vec::new();
        // The epoch before `first_epoch` when nothing runs.
        let last_epoch = (self.first_epoch + self.config.epochs).saturating_sub(1);

        log::info!(
            "training on {} windows: epochs {}..={last_epoch}, batch size {batch_size}",
            windows.len(),
            self.first_epoch
        );
        for epoch in self.first_epoch..self.first_epoch + self.config.epochs {
            rng.shuffle(&mut order);
            let mut total = 0.0f64;
            for (batch_index, chunk) in order.chunks(batch_size).enumerate() {
                let (inputs, targets) = windows.batch(chunk);
                let loss = model.network_mut().train_batch(
                    &inputs.into_dyn(),
                    &targets,
                    &mut optimizer,
                    rng,
                )?;
                log::debug!("epoch {epoch} batch {batch_index}: loss {loss:.4}");
                total += f64::from(loss) * chunk.len() as f64;
            }
            let epoch_loss = (total / order.len().max(1) as f64) as f32;
            final_loss = Some(epoch_loss);

            if !epoch_loss.is_finite() {
                log::warn!("epoch {epoch}: loss is {epoch_loss}, not checkpointing");
                continue;
            }
            let improved = best.is_none_or(|b| epoch_loss < b);
            if improved {
                let path = self
                    .snapshots
                    .dir
                    .join(snapshot_file_name(&self.snapshots.prefix, epoch, epoch_loss));
                Snapshot::capture(model, epoch, epoch_loss).save(&path)?;
                log::info!("epoch {epoch}: loss {epoch_loss:.4} (improved, saved {})", path.display());
                best = Some(epoch_loss);
                written.push(path);
            } else {
                log::info!("epoch {epoch}: loss {epoch_loss:.4}");
            }
        }

        Ok(TrainingReport {
            epochs_run: self.config.epochs,
            last_epoch,
            best_loss: best,
            final_loss,
            snapshots: written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::vocab::Vocabulary;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lofi-trainer-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn setup() -> (LofiModel, Windows) {
        let pattern = ["C4", "E4", "G4", "E4"];
        let symbols: Vec<&str> = pattern.iter().cycle().take(40).copied().collect();
        let vocab = Vocabulary::from_symbols(&symbols);
        let windows = Windows::build(&symbols, &vocab, 4).unwrap();
        let network = NetworkConfig {
            lstm_layers: 1,
            lstm_units: 8,
            recurrent_dropout: 0.0,
            dense_units: 8,
            dropout: 0.0,
            ..NetworkConfig::default()
        };
        let model = LofiModel::build(&network, &vocab, 4, &mut LofiRng::new(1)).unwrap();
        (model, windows)
    }

    fn training(epochs: usize) -> TrainingConfig {
        TrainingConfig {
            epochs,
            batch_size: 8,
            learning_rate: 0.01,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn loss_decreases_and_improvements_are_saved() {
        let dir = temp_dir("improves");
        let (mut model, windows) = setup();
        let snapshots = SnapshotConfig {
            dir: dir.clone(),
            ..SnapshotConfig::default()
        };
        let trainer = Trainer::new(&training(30), &snapshots);
        let report = trainer
            .fit(&mut model, &windows, &mut LofiRng::new(2))
            .unwrap();

        assert_eq!(report.epochs_run, 30);
        assert!(!report.snapshots.is_empty());
        assert!(report.snapshots.iter().all(|p| p.exists()));
        let first = Snapshot::load(&report.snapshots[0]).unwrap();
        let best = report.best_loss.unwrap();
        assert!(best < first.loss, "best {best} vs first {}", first.loss);
        assert_eq!(first.epoch, 1);

        // Saved losses strictly improve.
        let losses: Vec<f32> = report
            .snapshots
            .iter()
            .map(|p| Snapshot::load(p).unwrap().loss)
            .collect();
        assert!(losses.windows(2).all(|w| w[1] < w[0]));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn resumed_training_continues_epoch_numbers() {
        let dir = temp_dir("resume");
        let (mut model, windows) = setup();
        let snapshots = SnapshotConfig {
            dir: dir.clone(),
            ..SnapshotConfig::default()
        };
        let previous = Snapshot::capture(&model, 7, f32::INFINITY);
        let trainer = Trainer::new(&training(2), &snapshots).resume_after(&previous);
        let report = trainer
            .fit(&mut model, &windows, &mut LofiRng::new(3))
            .unwrap();
        assert_eq!(report.last_epoch, 9);
        let epoch = Snapshot::load(&report.snapshots[0]).unwrap().epoch;
        assert_eq!(epoch, 8);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn zero_epochs_report_the_previous_epoch() {
        let dir = temp_dir("zero-epochs");
        let (mut model, windows) = setup();
        let snapshots = SnapshotConfig {
            dir: dir.clone(),
            ..SnapshotConfig::default()
        };
        let fresh = Trainer::new(&training(0), &snapshots)
            .fit(&mut model, &windows, &mut LofiRng::new(5))
            .unwrap();
        assert_eq!(fresh.epochs_run, 0);
        assert_eq!(fresh.last_epoch, 0);
        assert_eq!(fresh.final_loss, None);
        assert!(fresh.snapshots.is_empty());

        let previous = Snapshot::capture(&model, 7, 1.0);
        let resumed = Trainer::new(&training(0), &snapshots)
            .resume_after(&previous)
            .fit(&mut model, &windows, &mut LofiRng::new(5))
            .unwrap();
        assert_eq!(resumed.last_epoch, 7);
        assert!(!dir.exists());
    }

    #[test]
    fn no_improvement_writes_nothing() {
        let dir = temp_dir("no-improvement");
        let (mut model, windows) = setup();
        let snapshots = SnapshotConfig {
            dir: dir.clone(),
            ..SnapshotConfig::default()
        };
        let previous = Snapshot::capture(&model, 3, 0.0);
        let report = Trainer::new(&training(2), &snapshots)
            .resume_after(&previous)
            .fit(&mut model, &windows, &mut LofiRng::new(4))
            .unwrap();
        assert!(report.snapshots.is_empty());
        assert!(!dir.exists());
    }
}
