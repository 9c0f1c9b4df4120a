// CLI entry point for the lofi HTTP trigger.
//
// Usage:
//   lofi-server [OPTIONS]
//     --addr <ADDR>       Listen address (default: 0.0.0.0:3000)
//     --config <FILE>     Generator config JSON (default: built-in defaults)
//     --token <TOKEN>     Bearer token required by /train_network (optional)
//
// RUST_LOG controls log verbosity (default: info).

use anyhow::{Context, bail};
use lofi_generator::GeneratorConfig;
use lofi_server::{ServerConfig, start_server};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(config) = parse_args()? else {
        print_usage();
        return Ok(());
    };
    let (_handle, addr) = start_server(config).context("failed to start server")?;
    log::info!("listening on http://{addr}");
    println!("Lofi Generator listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    // The listener thread runs until the process is killed.
    loop {
        std::thread::park();
    }
}

/// `None` when help was requested.
fn parse_args() -> anyhow::Result<Option<ServerConfig>> {
    let mut config = ServerConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--help" | "-h" => return Ok(None),
            "--addr" | "--config" | "--token" => {
                i += 1;
                let value = args
                    .get(i)
                    .with_context(|| format!("{flag} requires a value"))?;
                match flag {
                    "--addr" => config.addr = value.clone(),
                    "--config" => {
                        config.generator = GeneratorConfig::load(&PathBuf::from(value))?;
                    }
                    _ => config.token = Some(value.clone()),
                }
            }
            other => {
                print_usage();
                bail!("unknown argument: {other}");
            }
        }
        i += 1;
    }

    Ok(Some(config))
}

fn print_usage() {
    println!("Usage: lofi-server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --addr <ADDR>       Listen address (default: 0.0.0.0:3000)");
    println!("  --config <FILE>     Generator config JSON");
    println!("  --token <TOKEN>     Bearer token required by /train_network");
    println!("  --help, -h          Show this help");
}
