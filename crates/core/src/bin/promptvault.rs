//! `promptvault <command> [json-args]`
//!
//! Runs one command against the local vault and prints the JSON result on
//! stdout. Logs go to stderr.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use promptvault_core::{app, commands, config::VaultConfig, errors::Result, runtime};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "promptvault")]
#[command(author, version, about = "Local-first prompt vault", long_about = None)]
struct Cli {
    /// Data directory holding the database and sync settings
    #[arg(long, env = "PROMPTVAULT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the available commands and exit
    #[arg(long)]
    list: bool,

    /// Command name, e.g. `prompts.list` or `sync.attach`
    command: Option<String>,

    /// Command arguments as a JSON object
    args: Option<String>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "promptvault_core=debug" } else { "promptvault_core=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Environment first; `--data-dir` relocates the database and settings
fn load_config(cli: &Cli) -> Result<VaultConfig> {
    let config = VaultConfig::from_env()?;
    Ok(match &cli.data_dir {
        Some(dir) => VaultConfig {
            debounce: config.debounce,
            poll_interval: config.poll_interval,
            watch_mode: config.watch_mode,
            ..VaultConfig::for_data_dir(dir)
        },
        None => config,
    })
}

fn run(cli: &Cli, command: &str) -> Result<Value> {
    let args: Value = match &cli.args {
        Some(raw) => serde_json::from_str(raw)?,
        None => Value::Null,
    };

    let config = load_config(cli)?;
    let vault = app::setup(&config)?;
    let result = commands::dispatch(command, args);

    // Let background database writes land before the process exits
    runtime::block_on(vault.shutdown());
    result
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.list {
        for name in commands::list_commands() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    let Some(command) = cli.command.as_deref() else {
        eprintln!("missing command; run with --list to see the available commands");
        return ExitCode::from(2);
    };

    match run(&cli, command) {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()));
            ExitCode::SUCCESS
        },
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            println!("{}", commands::error_response(&err));
            ExitCode::FAILURE
        },
    }
}
