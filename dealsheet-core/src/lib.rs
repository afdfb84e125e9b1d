//! Dealsheet Core - scan pipeline for the deals spreadsheet
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Cell, CandidateTransaction, ScanResult, etc.)
//! - **ports**: Trait definitions for external dependencies (SheetSource, DealRepository)
//! - **services**: Business logic orchestration (coercion, normalization, reconciliation, scans)
//! - **adapters**: Concrete implementations (DuckDB, Google Sheets, CSV exports)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use adapters::google_sheets::GoogleSheetsSource;
use config::Config;
use ports::SheetSource;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, RowError};
pub use domain::{CandidateTransaction, ScanCounts, ScanRequest, ScanResult, StoredTransaction};
pub use ports::DealFilter;
pub use services::{EntryPoint, LogEntry, LogEvent, LoggingService};

/// Database file inside the data directory
pub const DB_FILENAME: &str = "dealsheet.duckdb";

/// Main context for Dealsheet operations
///
/// This is the primary entry point for all business logic. It holds
/// the database connection, configuration, and all services.
pub struct DealsheetContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub scan_service: ScanService,
    pub query_service: QueryService,
    pub status_service: StatusService,
}

impl DealsheetContext {
    /// Create a context that reads from the Google Sheets API
    pub fn new(data_dir: &Path, config: Config) -> Result<Self> {
        let source = GoogleSheetsSource::new(
            config.google_token.as_deref(),
            &config.sheets_base_url,
            config.fetch_retries,
        )?;
        Self::with_source(data_dir, config, Arc::new(source))
    }

    /// Create a context around any sheet source
    pub fn with_source(
        data_dir: &Path,
        config: Config,
        source: Arc<dyn SheetSource>,
    ) -> Result<Self> {
        let db_path = data_dir.join(DB_FILENAME);
        let repository = Arc::new(DuckDbRepository::new(&db_path)?);

        // Initialize schema
        repository.ensure_schema()?;

        let scan_service = ScanService::new(repository.clone(), source, config.scan_config());
        let query_service = QueryService::new(repository.clone());
        let status_service = StatusService::new(Arc::clone(&repository));

        Ok(Self {
            config,
            repository,
            scan_service,
            query_service,
            status_service,
        })
    }

    /// Record scan events in the given log store
    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.scan_service = self.scan_service.with_logger(logger);
        self
    }
}

/// Run one scan of the deals sheet
///
/// Omitted request parameters fall back to the configured defaults. The
/// result is always well formed; failures are reported in it.
pub fn run_sheets_scanner(ctx: &DealsheetContext, request: ScanRequest) -> ScanResult {
    ctx.scan_service.run(&request)
}
