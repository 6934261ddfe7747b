#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use loitergate_lib::{load_from_path, Config, CounterStore, LoiterError};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Operator tool for the loitergate admission table")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", default_value = "loitergate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current connection counters
    Status,
    /// Remove the shared counter table
    ///
    /// The remedy for a size mismatch after a layout change, and the
    /// administrative cleanup at final shutdown.
    Remove,
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Status => status(&cfg),
        Command::Remove => remove(&cfg),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn table_path(cfg: &Config) -> Result<&PathBuf, LoiterError> {
    cfg.table
        .as_ref()
        .ok_or_else(|| LoiterError::Config("no 'table' path configured".into()))
}

fn status(cfg: &Config) -> Result<(), LoiterError> {
    let store = CounterStore::open_or_attach(table_path(cfg)?)?;
    let counts = store.read_counts()?;

    println!("table:         {}", store.path().display());
    println!("connections:   {}", counts.conn_count);
    println!("authenticated: {}", counts.authd_count);
    println!("loitering:     {}", counts.unauthd_count());
    println!("rejected:      {}", counts.reject_count);
    Ok(())
}

fn remove(cfg: &Config) -> Result<(), LoiterError> {
    let path = table_path(cfg)?;
    // Size mismatches are exactly what removal is for, so bypass the attach
    // check and unlink the stale file directly.
    if !path.exists() {
        println!("no counter table at {}", path.display());
        return Ok(());
    }

    std::fs::remove_file(path)?;
    println!("removed counter table {}", path.display());
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
