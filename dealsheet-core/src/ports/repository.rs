//! Repository port - deal store abstraction

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{CandidateTransaction, ScanCounts, ScanRun, ScanTarget, StoredTransaction};

/// Writes decided by reconciliation for one run
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub inserts: Vec<CandidateTransaction>,
    pub updates: Vec<CandidateTransaction>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }
}

/// What actually happened when a batch was applied
///
/// Each write is re-checked against the store inside the transaction, so
/// these can differ from the batch's insert/update split when another
/// writer got there first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedCounts {
    pub inserted: u64,
    pub updated: u64,
    /// Writes that turned out to match the stored record
    pub unchanged: u64,
}

/// Listing filter; all present criteria must match
#[derive(Debug, Clone, Default)]
pub struct DealFilter {
    /// Case-insensitive substring over company, sector and transaction type
    pub search: Option<String>,
    pub company: Option<String>,
    pub sector: Option<String>,
    pub transaction_type: Option<String>,
    pub limit: Option<usize>,
}

/// Deal store abstraction
///
/// This trait defines all storage operations the scan pipeline needs.
/// Implementations (adapters) provide the actual database access logic.
pub trait DealRepository: Send + Sync {
    // === Transactions ===

    /// Look up stored deals by identity-key fingerprint
    ///
    /// Keys with no stored deal are absent from the map.
    fn find_by_identity_keys(&self, keys: &[String]) -> Result<HashMap<String, StoredTransaction>>;

    /// Apply all inserts and updates atomically
    ///
    /// Either every write lands or none do.
    fn apply_batch(&self, batch: &WriteBatch) -> Result<AppliedCounts>;

    /// List stored deals, newest investment date first
    fn list_transactions(&self, filter: &DealFilter) -> Result<Vec<StoredTransaction>>;

    /// Number of stored deals
    fn count_transactions(&self) -> Result<u64>;

    // === Scan runs ===

    /// Record a run as started
    fn start_scan_run(&self, target: &ScanTarget) -> Result<ScanRun>;

    /// Mark a run completed with its final counts
    fn complete_scan_run(&self, id: Uuid, counts: &ScanCounts) -> Result<()>;

    /// Mark a run failed
    fn fail_scan_run(&self, id: Uuid, error: &str) -> Result<()>;

    /// Most recent runs first
    fn get_scan_runs(&self, limit: usize) -> Result<Vec<ScanRun>>;
}
