use std::{io, path::PathBuf};

use anyhow::{Context, Result};
use bank_ledger::{
    bin_utils::Service,
    directory::persistent_directory::PersistentDirectory,
    storage::{DEFAULT_DATA_FILE, JsonFileStorage},
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset. Keeps routine log lines out of the menu.
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser, Debug)]
#[command(name = "bank-ledger", version, about = "Bank account management")]
struct Cli {
    /// File the bank data is loaded from and saved to
    #[arg(long, env = "BANK_DATA_FILE", default_value = DEFAULT_DATA_FILE)]
    data_file: PathBuf,
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut directory = PersistentDirectory::open(JsonFileStorage::new(&cli.data_file));

    let service = Service {
        input: io::stdin().lock(),
        output: &mut io::stdout(),
        directory: &mut directory,
    };
    service
        .run()
        .with_context(|| format!("Session on `{}` failed", cli.data_file.display()))
}
