//! Status command - show store summary

use anyhow::Result;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Deal Store Status".bold());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec!["Deals", &status.total_transactions.to_string()]);
    table.add_row(vec!["Database", &status.database_path]);
    table.add_row(vec!["Size", &output::format_size(status.database_size)]);
    table.add_row(vec![
        "Default spreadsheet",
        ctx.config.spreadsheet_id.as_deref().unwrap_or("(not set)"),
    ]);
    table.add_row(vec!["Default sheet", &ctx.config.sheet_name]);

    println!("{}", table);
    println!();

    match &status.last_run {
        Some(run) => {
            println!("{}", "Last Scan".bold());
            println!(
                "  {} {} / {} ({})",
                run.started_at.format("%Y-%m-%d %H:%M:%S"),
                run.spreadsheet_id,
                run.sheet_name,
                run.status.as_str()
            );
            println!(
                "  inserted {}, updated {}, skipped {}, failed {}",
                run.counts.inserted, run.counts.updated, run.counts.skipped, run.counts.failed
            );
            if let Some(err) = &run.error_message {
                println!("  {}", err.red());
            }
        }
        None => println!("No scans recorded yet."),
    }

    Ok(())
}
