//! `atlasctl`: control surface for an ATLAS deployment.
//!
//! `status` and `reload-policy` operate directly on the files a running
//! `atlasd` shares with this tool (the policy file and the cost ledger);
//! `cancel` requires a live IPC channel to the daemon, which this build does
//! not yet implement (see DESIGN.md).

use atlas_core::ledger::CostLedger;
use atlas_core::AtlasConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// BSD sysexits used for this tool's exit codes.
mod sysexits {
    pub const OK: u8 = 0;
    pub const USAGE: u8 = 64;
    pub const DATAERR: u8 = 65;
    pub const NOINPUT: u8 = 66;
}

#[derive(Parser)]
#[command(name = "atlasctl", version, about = "Control surface for the ATLAS voice routing daemon")]
struct Cli {
    /// Path to the TOML policy file. Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current budget mode and spend.
    Status,
    /// Cancel the active turn (requires a running daemon's IPC channel).
    Cancel,
    /// Reload the policy file's validated contents and print a summary.
    ReloadPolicy,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(code) => return ExitCode::from(code),
    };

    let code = match cli.command {
        Command::Status => run_status(&config),
        Command::Cancel => run_cancel(),
        Command::ReloadPolicy => run_reload_policy(&config),
    };
    ExitCode::from(code)
}

fn load_config(path: &Option<PathBuf>) -> Result<AtlasConfig, u8> {
    let result = match path {
        Some(path) => AtlasConfig::from_file(path),
        None => AtlasConfig::load_or_default(),
    };
    result.map_err(|e| {
        eprintln!("atlasctl: failed to load config: {e}");
        sysexits::NOINPUT
    })
}

fn run_status(config: &AtlasConfig) -> u8 {
    let ledger = match CostLedger::open(&config.ledger.db_path, config.budget.clone()) {
        Ok(ledger) => ledger,
        Err(e) => {
            eprintln!("atlasctl: failed to open ledger: {e}");
            return sysexits::DATAERR;
        }
    };
    let state = ledger.budget_state();
    println!("mode: {}", state.mode.as_str());
    println!("monthly_spend_usd: {:.4}", state.monthly_spend_usd);
    println!("daily_spend_usd: {:.4}", state.daily_spend_usd);
    sysexits::OK
}

fn run_cancel() -> u8 {
    eprintln!(
        "atlasctl: cancel requires a running atlasd IPC channel, which this build does not implement"
    );
    sysexits::USAGE
}

fn run_reload_policy(config: &AtlasConfig) -> u8 {
    match config.validate() {
        Ok(()) => {
            println!("policy valid");
            sysexits::OK
        }
        Err(e) => {
            eprintln!("atlasctl: policy invalid: {e}");
            sysexits::DATAERR
        }
    }
}
