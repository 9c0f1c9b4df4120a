// Lofi Piano Generator: CLI entry point.
//
// Two subcommands share one configuration: `train` fits the network to the
// corpus and checkpoints improvements; `generate` picks a checkpoint,
// samples a sequence and writes it as MIDI. Flags override single fields of
// the JSON config (or of the defaults when no config is given).
//
// Usage:
//   cargo run -p lofi_generator --bin lofi -- train [--config FILE]
//     [--corpus FILE] [--weights-dir DIR] [--epochs N] [--batch-size N] [--seed N]
//   cargo run -p lofi_generator --bin lofi -- generate [--config FILE]
//     [--corpus FILE] [--weights-dir DIR] [--weights FILE] [--output FILE]
//     [--length N] [--seed N] [--policy lowest-loss|most-recent]
//
// RUST_LOG controls log verbosity (default: info).

use anyhow::{Context, bail};
use lofi_generator::GeneratorConfig;
use lofi_generator::snapshot::SnapshotPolicy;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).filter(|s| !s.starts_with("--")) else {
        print_usage();
        bail!("missing subcommand");
    };
    let config = load_config(&args)?;

    println!("=== Lofi Piano Generator ===");
    println!("Corpus: {}", config.corpus.path.display());
    println!("Weights: {}", config.snapshots.dir.display());
    println!();

    match command.as_str() {
        "train" => run_train(&config),
        "generate" => run_generate(&config),
        other => {
            print_usage();
            bail!("unknown subcommand '{other}'")
        }
    }
}

fn run_train(config: &GeneratorConfig) -> anyhow::Result<()> {
    println!(
        "[1/2] Training {} epochs (batch {}, window {})...",
        config.training.epochs, config.training.batch_size, config.corpus.sequence_length
    );
    let report = lofi_generator::train(config).context("training failed")?;
    println!("[2/2] Done.");
    println!("  Epochs: {} (last {})", report.epochs_run, report.last_epoch);
    if let Some(best) = report.best_loss {
        println!("  Best loss: {best:.4}");
    }
    println!("  Snapshots written: {}", report.snapshots.len());
    if let Some(path) = report.snapshots.last() {
        println!("  Latest: {}", path.display());
    }
    Ok(())
}

fn run_generate(config: &GeneratorConfig) -> anyhow::Result<()> {
    println!(
        "[1/2] Generating {} symbols into {}...",
        config.sampling.length,
        config.output.path.display()
    );
    let report = lofi_generator::generate(config).context("generation failed")?;
    println!("[2/2] Done.");
    println!("  Weights: {}", report.snapshot.display());
    println!("  Seed: {}", report.seed);
    let seconds = report.total_beats * 60.0 / f64::from(config.output.tempo_bpm.max(1));
    println!(
        "  {} events, {:.1} beats ({:.0}s at {} BPM)",
        report.events, report.total_beats, seconds, config.output.tempo_bpm
    );
    println!();
    println!("Play with: timidity {} (or any MIDI player)", report.output.display());
    Ok(())
}

/// Start from `--config` (or defaults) and apply the per-field flags.
fn load_config(args: &[String]) -> anyhow::Result<GeneratorConfig> {
    let mut config = match parse_flag::<PathBuf>(args, "--config")? {
        Some(path) => GeneratorConfig::load(&path)?,
        None => GeneratorConfig::default(),
    };

    if let Some(path) = parse_flag(args, "--corpus")? {
        config.corpus.path = path;
    }
    if let Some(dir) = parse_flag(args, "--weights-dir")? {
        config.snapshots.dir = dir;
    }
    if let Some(epochs) = parse_flag(args, "--epochs")? {
        config.training.epochs = epochs;
    }
    if let Some(batch) = parse_flag(args, "--batch-size")? {
        config.training.batch_size = batch;
    }
    if let Some(seed) = parse_flag::<u64>(args, "--seed")? {
        config.training.seed = Some(seed);
        config.sampling.seed = Some(seed);
    }
    if let Some(length) = parse_flag(args, "--length")? {
        config.sampling.length = length;
    }
    if let Some(output) = parse_flag(args, "--output")? {
        config.output.path = output;
    }
    if let Some(policy) = parse_flag::<String>(args, "--policy")? {
        config.snapshots.policy = parse_policy(&policy)?;
    }
    if let Some(path) = parse_flag::<PathBuf>(args, "--weights")? {
        config.snapshots.policy = SnapshotPolicy::Fixed { path };
    }
    Ok(config)
}

fn parse_policy(name: &str) -> anyhow::Result<SnapshotPolicy> {
    match name.to_lowercase().as_str() {
        "lowest-loss" | "lowest_loss" => Ok(SnapshotPolicy::LowestLoss),
        "most-recent" | "most_recent" => Ok(SnapshotPolicy::MostRecent),
        _ => bail!("unknown policy '{name}' (expected lowest-loss or most-recent)"),
    }
}

/// Value following `flag`, parsed. A flag with a missing or unparseable
/// value is an error rather than silently ignored.
fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> anyhow::Result<Option<T>> {
    let Some(i) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    let value = args
        .get(i + 1)
        .with_context(|| format!("{flag} requires a value"))?;
    match value.parse() {
        Ok(v) => Ok(Some(v)),
        Err(_) => bail!("invalid value '{value}' for {flag}"),
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  lofi train [--config FILE] [--corpus FILE] [--weights-dir DIR] [--epochs N] [--batch-size N] [--seed N]"
    );
    eprintln!(
        "  lofi generate [--config FILE] [--corpus FILE] [--weights-dir DIR] [--weights FILE] [--output FILE] [--length N] [--seed N] [--policy lowest-loss|most-recent]"
    );
}
