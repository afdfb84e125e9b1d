//! Dealsheet CLI - scan the deals spreadsheet into a local store

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{list, logs, runs, scan, status};

/// Dealsheet - deals spreadsheet scanner
#[derive(Parser)]
#[command(name = "dealsheet", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the deals sheet and store new or changed rows
    Scan {
        /// Spreadsheet ID (defaults to the configured one)
        #[arg(long)]
        spreadsheet_id: Option<String>,
        /// Sheet/tab name (defaults to the configured one, then Sheet1)
        #[arg(long)]
        sheet: Option<String>,
        /// Read a CSV export instead of the Google Sheets API
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored deals
    List {
        /// Free-text search over company, sector and transaction type
        #[arg(long, short)]
        search: Option<String>,
        /// Only deals in this sector
        #[arg(long)]
        sector: Option<String>,
        /// Only deals of this transaction type
        #[arg(long)]
        transaction_type: Option<String>,
        /// Maximum number of deals to show
        #[arg(long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recent scan runs
    Runs {
        /// Number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show store status and the last scan
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage application logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan { spreadsheet_id, sheet, csv, json } => {
            scan::run(spreadsheet_id, sheet, csv, json)
        }
        Commands::List { search, sector, transaction_type, limit, json } => {
            list::run(search, sector, transaction_type, limit, json)
        }
        Commands::Runs { limit, json } => runs::run(limit, json),
        Commands::Status { json } => status::run(json),
        Commands::Logs { command } => logs::run(command),
    }
}
