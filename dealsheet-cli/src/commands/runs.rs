//! Runs command - show the scan run history

use anyhow::Result;
use colored::Colorize;
use dealsheet_core::domain::ScanStatus;

use super::get_context;
use crate::output;

pub fn run(limit: usize, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let runs = ctx.query_service.runs(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No scans recorded yet.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec![
        "Started", "Sheet", "Status", "Inserted", "Updated", "Skipped", "Failed", "Error",
    ]);

    for run in runs {
        let status = match run.status {
            ScanStatus::Completed => run.status.as_str().green().to_string(),
            ScanStatus::Failed => run.status.as_str().red().to_string(),
            ScanStatus::Running => run.status.as_str().yellow().to_string(),
        };
        table.add_row(vec![
            run.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            format!("{} / {}", run.spreadsheet_id, run.sheet_name),
            status,
            run.counts.inserted.to_string(),
            run.counts.updated.to_string(),
            run.counts.skipped.to_string(),
            run.counts.failed.to_string(),
            run.error_message.unwrap_or_default(),
        ]);
    }

    println!("{}", table);
    Ok(())
}
