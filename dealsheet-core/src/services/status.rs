//! Status service - store summary

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::ScanRun;
use crate::ports::DealRepository;

/// Status service for the store summary
pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let total_transactions = self.repository.count_transactions()?;
        let last_run = self.repository.get_scan_runs(1)?.into_iter().next();

        Ok(StatusSummary {
            total_transactions,
            last_run,
            database_path: self.repository.db_path().display().to_string(),
            database_size: self.repository.get_db_size()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_transactions: u64,
    pub last_run: Option<ScanRun>,
    pub database_path: String,
    pub database_size: u64,
}
