// End-to-end tests: train on a small corpus, then generate MIDI from the
// checkpoint it wrote. Uses a deliberately tiny network so the whole run
// takes well under a second.

use lofi_generator::config::{GeneratorConfig, NetworkConfig};
use lofi_generator::corpus::Corpus;
use lofi_generator::jobs::{JobRunner, JobStatus};
use lofi_generator::snapshot::SnapshotPolicy;
use lofi_generator::{GeneratorError, generate, train};
use std::path::{Path, PathBuf};

struct TempDir(PathBuf);

impl TempDir {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "lofi-pipeline-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        TempDir(dir)
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn write_corpus(dir: &Path, pattern: &[&str]) -> PathBuf {
    let symbols = pattern.iter().cycle().take(60).map(|s| s.to_string()).collect();
    let path = dir.join("notes.json");
    Corpus::new(symbols).save(&path).unwrap();
    path
}

fn tiny_config(dir: &Path, corpus: PathBuf) -> GeneratorConfig {
    let mut config = GeneratorConfig::default();
    config.corpus.path = corpus;
    config.corpus.sequence_length = 6;
    config.network = NetworkConfig {
        lstm_layers: 2,
        lstm_units: 6,
        dense_units: 6,
        ..NetworkConfig::default()
    };
    config.training.epochs = 3;
    config.training.batch_size = 16;
    config.training.seed = Some(11);
    config.snapshots.dir = dir.join("weights");
    config.sampling.length = 40;
    config.sampling.seed = Some(5);
    config.output.path = dir.join("out").join("lofi_output.mid");
    config
}

const PATTERN: [&str; 6] = ["C4", "E-4", "G4", "0.3.7", "R", "B-3"];

#[test]
fn train_then_generate_writes_midi() {
    let dir = TempDir::new("roundtrip");
    let corpus = write_corpus(dir.path(), &PATTERN);
    let config = tiny_config(dir.path(), corpus);

    let training = train(&config).unwrap();
    assert_eq!(training.epochs_run, 3);
    assert!(!training.snapshots.is_empty());
    assert!(training.snapshots.iter().all(|p| p.starts_with(&config.snapshots.dir)));

    let report = generate(&config).unwrap();
    assert_eq!(report.symbols, 40);
    assert_eq!(report.events, 40);
    assert!(report.total_beats > 0.0);

    let bytes = std::fs::read(&config.output.path).unwrap();
    let smf = midly::Smf::parse(&bytes).unwrap();
    assert_eq!(smf.tracks.len(), 2);
}

#[test]
fn generation_is_reproducible_with_a_seed() {
    let dir = TempDir::new("reproducible");
    let corpus = write_corpus(dir.path(), &PATTERN);
    let config = tiny_config(dir.path(), corpus);
    train(&config).unwrap();

    generate(&config).unwrap();
    let first = std::fs::read(&config.output.path).unwrap();
    generate(&config).unwrap();
    let second = std::fs::read(&config.output.path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn generate_without_weights_fails() {
    let dir = TempDir::new("no-weights");
    let corpus = write_corpus(dir.path(), &PATTERN);
    let config = tiny_config(dir.path(), corpus);
    assert!(matches!(
        generate(&config),
        Err(GeneratorError::NoSnapshot { .. })
    ));
    assert!(!config.output.path.exists());
}

#[test]
fn weights_from_another_corpus_are_rejected() {
    let dir = TempDir::new("other-corpus");
    let corpus = write_corpus(dir.path(), &PATTERN);
    let mut config = tiny_config(dir.path(), corpus);
    train(&config).unwrap();

    // Same vocabulary size, different symbols.
    let other = ["D4", "F4", "A4", "2.5.9", "R", "C5"];
    config.corpus.path = write_corpus(dir.path(), &other);
    assert!(matches!(
        generate(&config),
        Err(GeneratorError::VocabularyMismatch { .. })
    ));

    // Different vocabulary size.
    config.corpus.path = write_corpus(dir.path(), &["C4", "D4", "E4"]);
    assert!(matches!(
        generate(&config),
        Err(GeneratorError::ShapeMismatch { .. })
    ));
}

#[test]
fn resumed_training_continues_from_snapshot() {
    let dir = TempDir::new("resume");
    let corpus = write_corpus(dir.path(), &PATTERN);
    let mut config = tiny_config(dir.path(), corpus);
    let first = train(&config).unwrap();

    config.training.resume_from = first.snapshots.last().cloned();
    config.training.epochs = 2;
    let second = train(&config).unwrap();
    assert_eq!(second.last_epoch, first.last_epoch + 2);
}

#[test]
fn fixed_policy_uses_the_named_file() {
    let dir = TempDir::new("fixed");
    let corpus = write_corpus(dir.path(), &PATTERN);
    let mut config = tiny_config(dir.path(), corpus);
    let training = train(&config).unwrap();

    let chosen = training.snapshots[0].clone();
    config.snapshots.policy = SnapshotPolicy::Fixed {
        path: chosen.clone(),
    };
    assert_eq!(generate(&config).unwrap().snapshot, chosen);
}

#[test]
fn jobs_run_the_pipeline_in_the_background() {
    let dir = TempDir::new("jobs");
    let corpus = write_corpus(dir.path(), &PATTERN);
    let config = tiny_config(dir.path(), corpus);

    let runner = JobRunner::new();
    let train_job = runner.spawn_train(config.clone());
    assert!(matches!(
        runner.wait(train_job),
        Some(JobStatus::Succeeded { .. })
    ));
    let generate_job = runner.spawn_generate(config.clone());
    match runner.wait(generate_job) {
        Some(JobStatus::Succeeded { summary }) => assert!(summary.contains("40 events")),
        other => panic!("unexpected status {other:?}"),
    }
    assert!(config.output.path.exists());
}
