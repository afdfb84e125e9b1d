//! CLI command implementations

pub mod list;
pub mod logs;
pub mod runs;
pub mod scan;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use dealsheet_core::config::Config;
use dealsheet_core::ports::SheetSource;
use dealsheet_core::{DealsheetContext, EntryPoint, LoggingService};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("DEALSHEET_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".dealsheet"))
        .context("Could not find home directory; set DEALSHEET_DIR")
}

fn prepare_data_dir() -> Result<(PathBuf, Config)> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;
    let config = Config::load(&data_dir).context("Failed to load settings")?;
    Ok((data_dir, config))
}

/// Get a context reading from the Google Sheets API
pub fn get_context() -> Result<DealsheetContext> {
    let (data_dir, config) = prepare_data_dir()?;
    DealsheetContext::new(&data_dir, config).context("Failed to initialize dealsheet context")
}

/// Get a context reading from the given sheet source
pub fn get_context_with_source(source: Arc<dyn SheetSource>) -> Result<DealsheetContext> {
    let (data_dir, config) = prepare_data_dir()?;
    DealsheetContext::with_source(&data_dir, config, source)
        .context("Failed to initialize dealsheet context")
}
