//! Scan command - run one scan of the deals sheet

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use colored::Colorize;
use dealsheet_core::adapters::csv_sheet::CsvSheetSource;
use dealsheet_core::{run_sheets_scanner, LogEvent, ScanRequest};

use super::{get_context, get_context_with_source, get_logger};
use crate::output;

pub fn run(
    spreadsheet_id: Option<String>,
    sheet: Option<String>,
    csv: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let ctx = match csv {
        Some(path) => get_context_with_source(Arc::new(CsvSheetSource::new(path)))?,
        None => get_context()?,
    };
    let logger = get_logger().map(Arc::new);
    if let Some(l) = &logger {
        let _ = l.log(LogEvent::new("command").with_command("scan"));
    }
    let ctx = match logger {
        Some(l) => ctx.with_logger(l),
        None => ctx,
    };

    let result = run_sheets_scanner(&ctx, ScanRequest::new(spreadsheet_id, sheet));

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let counts = &result.counts;
        if result.success {
            output::success("Scan completed");
        } else {
            output::error("Scan failed");
        }
        println!("  Inserted: {}", counts.inserted);
        println!("  Updated:  {}", counts.updated);
        println!("  Skipped:  {}", counts.skipped);
        println!("  Failed:   {}", counts.failed);

        if !result.reasons.is_empty() {
            println!();
            println!("{}", "Rejected rows:".red().bold());
            for reason in &result.reasons {
                println!("  {}", reason);
            }
        }
        if !result.warnings.is_empty() {
            println!();
            println!("{}", "Warnings:".yellow().bold());
            for warning in &result.warnings {
                println!("  {}", warning);
            }
        }
    }

    match result.error {
        Some(error) if !result.success => bail!(error),
        _ => Ok(()),
    }
}
