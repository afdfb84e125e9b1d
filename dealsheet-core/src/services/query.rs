//! Query service - read-only listing of stored deals and scan runs

use std::sync::Arc;

use anyhow::Result;

use crate::domain::{ScanRun, StoredTransaction};
use crate::ports::{DealFilter, DealRepository};

/// Query service for the listing surfaces
pub struct QueryService {
    repository: Arc<dyn DealRepository>,
}

impl QueryService {
    pub fn new(repository: Arc<dyn DealRepository>) -> Self {
        Self { repository }
    }

    /// Stored deals matching the filter, newest investment first
    pub fn list(&self, filter: &DealFilter) -> Result<Vec<StoredTransaction>> {
        Ok(self.repository.list_transactions(filter)?)
    }

    /// Most recent scan runs
    pub fn runs(&self, limit: usize) -> Result<Vec<ScanRun>> {
        Ok(self.repository.get_scan_runs(limit)?)
    }
}
