//! Scan service - runs one sheet scan end to end
//!
//! Sequence: resolve target, check credentials, fetch the grid, resolve the
//! header once, normalize and validate rows in sheet order, collapse
//! same-key rows, reconcile against the stored snapshot and apply all
//! writes in one batch.

use std::sync::Arc;

use uuid::Uuid;

use super::logging::{LogEvent, LoggingService};
use super::normalize::{normalize, ColumnMap};
use super::reconcile::{collapse_in_run, reconcile, Action};
use super::validate::validate;
use crate::domain::result::{Error, Result};
use crate::domain::{ScanCounts, ScanRequest, ScanResult, ScanTarget};
use crate::ports::{DealRepository, SheetSource, WriteBatch};

/// Defaults applied when a request omits its parameters
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub default_spreadsheet_id: Option<String>,
    pub default_sheet_name: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            default_spreadsheet_id: None,
            default_sheet_name: "Sheet1".to_string(),
        }
    }
}

/// Per-row results accumulated while a run is in progress
#[derive(Debug, Default)]
struct Progress {
    counts: ScanCounts,
    reasons: Vec<String>,
    warnings: Vec<String>,
}

/// Service for scanning a deals sheet into the store
pub struct ScanService {
    repository: Arc<dyn DealRepository>,
    source: Arc<dyn SheetSource>,
    config: ScanConfig,
    logger: Option<Arc<LoggingService>>,
}

impl ScanService {
    pub fn new(
        repository: Arc<dyn DealRepository>,
        source: Arc<dyn SheetSource>,
        config: ScanConfig,
    ) -> Self {
        Self {
            repository,
            source,
            config,
            logger: None,
        }
    }

    /// Record scan events in the given log store
    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Fill omitted request parameters from configuration
    pub fn resolve_target(&self, request: &ScanRequest) -> Result<ScanTarget> {
        let spreadsheet_id = present(&request.spreadsheet_id)
            .or_else(|| present(&self.config.default_spreadsheet_id))
            .ok_or_else(|| {
                Error::Config(
                    "No spreadsheet id given and no default spreadsheet configured".to_string(),
                )
            })?;
        let sheet_name = present(&request.sheet_name)
            .unwrap_or_else(|| self.config.default_sheet_name.clone());

        Ok(ScanTarget {
            spreadsheet_id,
            sheet_name,
        })
    }

    /// Run one scan
    ///
    /// Never fails: every outcome, including run-level errors, is reported
    /// in the returned summary.
    pub fn run(&self, request: &ScanRequest) -> ScanResult {
        let target = match self.resolve_target(request) {
            Ok(target) => target,
            Err(e) => {
                self.log(LogEvent::new("scan_failed").with_error(e.to_string()));
                return ScanResult::failed(e.to_string(), Vec::new(), None);
            }
        };

        self.log(self.event("scan_started", &target));

        let run_id = match self.repository.start_scan_run(&target) {
            Ok(run) => run.id,
            Err(e) => {
                self.log(self.event("scan_failed", &target).with_error(e.to_string()));
                return ScanResult::failed(e.to_string(), Vec::new(), None);
            }
        };

        let mut progress = Progress::default();
        match self.execute(&target, &mut progress) {
            Ok(()) => {
                if let Err(e) = self.repository.complete_scan_run(run_id, &progress.counts) {
                    self.record_failure(run_id, &target, &e);
                }
                self.log(
                    self.event("scan_completed", &target)
                        .with_error_details(summary_details(run_id, &progress.counts)),
                );
                ScanResult::completed(
                    progress.counts,
                    progress.reasons,
                    progress.warnings,
                    Some(run_id),
                )
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(record_err) = self.repository.fail_scan_run(run_id, &message) {
                    self.record_failure(run_id, &target, &record_err);
                }
                self.log(
                    self.event("scan_failed", &target)
                        .with_error(&message)
                        .with_error_details(format!("run {}", run_id)),
                );
                ScanResult::failed(message, progress.reasons, Some(run_id))
            }
        }
    }

    fn execute(&self, target: &ScanTarget, progress: &mut Progress) -> Result<()> {
        self.source.ensure_ready()?;
        let grid = self
            .source
            .fetch_grid(&target.spreadsheet_id, &target.sheet_name)?;

        if grid.header.is_empty() {
            return Ok(());
        }
        let columns = ColumnMap::resolve(&grid.header)?;

        let mut accepted = Vec::new();
        for row in &grid.rows {
            let validation = validate(normalize(row, &columns));

            for warning in &validation.warnings {
                progress
                    .warnings
                    .push(format!("row {}: {}", validation.row_number, warning));
            }

            if validation.is_accepted() {
                accepted.push(validation.candidate);
            } else {
                progress.counts.failed += 1;
                progress
                    .reasons
                    .push(format!("row {}: {}", validation.row_number, validation.reason_text()));
            }
        }

        let collapsed = collapse_in_run(accepted);
        progress.counts.skipped += collapsed.superseded;

        let keys: Vec<String> = collapsed
            .candidates
            .iter()
            .map(|c| c.identity_key().fingerprint())
            .collect();
        let existing = self.repository.find_by_identity_keys(&keys)?;

        let mut batch = WriteBatch::default();
        for candidate in collapsed.candidates {
            let decision = reconcile(candidate, &existing);
            match decision.action {
                Action::Insert => batch.inserts.push(decision.target),
                Action::Update => batch.updates.push(decision.target),
                Action::Skip => progress.counts.skipped += 1,
            }
        }

        if !batch.is_empty() {
            let applied = self.repository.apply_batch(&batch)?;
            progress.counts.inserted += applied.inserted;
            progress.counts.updated += applied.updated;
            progress.counts.skipped += applied.unchanged;
        }

        Ok(())
    }

    /// The run row could not be finalized and stays `running`
    fn record_failure(&self, run_id: Uuid, target: &ScanTarget, error: &Error) {
        eprintln!("[dealsheet] Failed to record outcome of scan run {}: {}", run_id, error);
        self.log(
            self.event("run_record_failed", target)
                .with_error(error.to_string())
                .with_error_details(format!("run {}", run_id)),
        );
    }

    fn event(&self, name: &str, target: &ScanTarget) -> LogEvent {
        LogEvent::new(name)
            .with_source(self.source.name())
            .with_target(&target.spreadsheet_id, &target.sheet_name)
    }

    /// Logging failures never affect the run
    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            let _ = logger.log(event);
        }
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn summary_details(run_id: Uuid, counts: &ScanCounts) -> String {
    format!(
        "run {}: inserted={} updated={} skipped={} failed={}",
        run_id, counts.inserted, counts.updated, counts.skipped, counts.failed
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::domain::{Cell, ScanRun, SheetGrid, StoredTransaction};
    use crate::ports::{AppliedCounts, DealFilter};
    use crate::services::logging::EntryPoint;

    struct FixedSource {
        grid: SheetGrid,
    }

    impl SheetSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch_grid(&self, _: &str, _: &str) -> Result<SheetGrid> {
            Ok(self.grid.clone())
        }
    }

    /// In-memory store that can be told to fail writes
    #[derive(Default)]
    struct MemoryRepository {
        records: Mutex<HashMap<String, StoredTransaction>>,
        fail_writes: bool,
        fail_run_records: bool,
    }

    impl DealRepository for MemoryRepository {
        fn find_by_identity_keys(
            &self,
            keys: &[String],
        ) -> Result<HashMap<String, StoredTransaction>> {
            let records = self.records.lock().unwrap();
            Ok(keys
                .iter()
                .filter_map(|k| records.get(k).map(|r| (k.clone(), r.clone())))
                .collect())
        }

        fn apply_batch(&self, batch: &WriteBatch) -> Result<AppliedCounts> {
            if self.fail_writes {
                return Err(Error::persistence("disk full"));
            }
            let mut records = self.records.lock().unwrap();
            let mut counts = AppliedCounts::default();
            for c in batch.inserts.iter().chain(batch.updates.iter()) {
                let key = c.identity_key().fingerprint();
                match records.get_mut(&key) {
                    Some(existing) => {
                        existing.fields = c.merged_over(&existing.fields);
                        counts.updated += 1;
                    }
                    None => {
                        records.insert(key, StoredTransaction::new(c.clone()));
                        counts.inserted += 1;
                    }
                }
            }
            Ok(counts)
        }

        fn list_transactions(&self, _: &DealFilter) -> Result<Vec<StoredTransaction>> {
            Ok(self.records.lock().unwrap().values().cloned().collect())
        }

        fn count_transactions(&self) -> Result<u64> {
            Ok(self.records.lock().unwrap().len() as u64)
        }

        fn start_scan_run(&self, target: &ScanTarget) -> Result<ScanRun> {
            Ok(ScanRun::start(target))
        }

        fn complete_scan_run(&self, _: Uuid, _: &ScanCounts) -> Result<()> {
            if self.fail_run_records {
                return Err(Error::persistence("run table locked"));
            }
            Ok(())
        }

        fn fail_scan_run(&self, _: Uuid, _: &str) -> Result<()> {
            if self.fail_run_records {
                return Err(Error::persistence("run table locked"));
            }
            Ok(())
        }

        fn get_scan_runs(&self, _: usize) -> Result<Vec<ScanRun>> {
            Ok(Vec::new())
        }
    }

    fn grid(rows: &[&[&str]]) -> SheetGrid {
        SheetGrid::from_values(
            rows.iter()
                .map(|r| r.iter().map(|c| Cell::from(*c)).collect())
                .collect(),
        )
    }

    fn service(repo: Arc<MemoryRepository>, grid: SheetGrid) -> ScanService {
        ScanService::new(
            repo,
            Arc::new(FixedSource { grid }),
            ScanConfig {
                default_spreadsheet_id: Some("sheet-123".to_string()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_resolve_target_defaults() {
        let svc = service(Arc::new(MemoryRepository::default()), SheetGrid::default());
        let target = svc.resolve_target(&ScanRequest::default()).unwrap();
        assert_eq!(target.spreadsheet_id, "sheet-123");
        assert_eq!(target.sheet_name, "Sheet1");

        let explicit = svc
            .resolve_target(&ScanRequest::new(Some("other".into()), Some(" Deals ".into())))
            .unwrap();
        assert_eq!(explicit.spreadsheet_id, "other");
        assert_eq!(explicit.sheet_name, "Deals");
    }

    #[test]
    fn test_missing_spreadsheet_id_is_config_failure() {
        let svc = ScanService::new(
            Arc::new(MemoryRepository::default()),
            Arc::new(FixedSource {
                grid: SheetGrid::default(),
            }),
            ScanConfig::default(),
        );
        let result = svc.run(&ScanRequest::default());
        assert!(!result.success);
        assert!(result.error.unwrap().contains("spreadsheet"));
        assert_eq!(result.run_id, None);
    }

    #[test]
    fn test_empty_sheet_succeeds_with_zero_counts() {
        let repo = Arc::new(MemoryRepository::default());
        let result = service(repo, SheetGrid::default()).run(&ScanRequest::default());
        assert!(result.success);
        assert_eq!(result.counts.total(), 0);
    }

    #[test]
    fn test_counts_cover_every_row() {
        let repo = Arc::new(MemoryRepository::default());
        let sheet = grid(&[
            &["Company", "Amount", "Investment Date", "Transaction Type"],
            &["Acme FC", "$100", "2023-01-10", "Acquisition"],
            &["", "$5", "2023-01-10", "Acquisition"],
            &["Beta SC", "-500", "2023-02-01", "Investment"],
            &["Acme FC", "$200", "2023-01-10", "Acquisition"],
            &["Gamma", "", "", ""],
        ]);

        let result = service(repo.clone(), sheet).run(&ScanRequest::default());
        assert!(result.success);
        assert_eq!(result.counts.inserted, 2);
        assert_eq!(result.counts.skipped, 1);
        assert_eq!(result.counts.failed, 2);
        assert_eq!(result.counts.total(), 5);
        assert_eq!(result.reasons.len(), 2);
        assert!(result.reasons[0].starts_with("row 3: "));
        assert!(result.reasons[1].contains("amount"));
        assert_eq!(repo.count_transactions().unwrap(), 2);
    }

    #[test]
    fn test_persistence_failure_zeroes_counts() {
        let repo = Arc::new(MemoryRepository {
            fail_writes: true,
            ..Default::default()
        });
        let sheet = grid(&[&["Company"], &["Acme FC"], &[""], &["Beta SC"]]);

        let result = service(repo, sheet).run(&ScanRequest::default());
        assert!(!result.success);
        assert_eq!(result.counts, ScanCounts::default());
        assert!(result.error.as_deref().unwrap().contains("disk full"));
        assert_eq!(result.http_status(), 500);
    }

    #[test]
    fn test_schema_failure_processes_no_rows() {
        let repo = Arc::new(MemoryRepository::default());
        let sheet = grid(&[&["Amount", "Sector"], &["$5", "Football"]]);

        let result = service(repo.clone(), sheet).run(&ScanRequest::default());
        assert!(!result.success);
        assert!(result.reasons.is_empty());
        assert_eq!(repo.count_transactions().unwrap(), 0);
    }

    #[test]
    fn test_run_record_failure_is_logged() {
        let dir = tempfile::TempDir::new().unwrap();
        let logger = Arc::new(LoggingService::new(dir.path(), EntryPoint::Api, "test").unwrap());
        let repo = Arc::new(MemoryRepository {
            fail_run_records: true,
            ..Default::default()
        });
        let sheet = grid(&[&["Company"], &["Acme FC"]]);

        let result = service(repo.clone(), sheet)
            .with_logger(logger.clone())
            .run(&ScanRequest::default());
        assert!(result.success);
        assert_eq!(result.counts.inserted, 1);
        assert_eq!(repo.count_transactions().unwrap(), 1);

        let failures: Vec<_> = logger
            .get_errors(10)
            .unwrap()
            .into_iter()
            .filter(|e| e.event == "run_record_failed")
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].error_message.as_deref().unwrap().contains("run table locked"));
        assert_eq!(
            failures[0].error_details,
            Some(format!("run {}", result.run_id.unwrap()))
        );
    }

    #[test]
    fn test_failed_run_record_failure_is_logged() {
        let dir = tempfile::TempDir::new().unwrap();
        let logger = Arc::new(LoggingService::new(dir.path(), EntryPoint::Api, "test").unwrap());
        let repo = Arc::new(MemoryRepository {
            fail_writes: true,
            fail_run_records: true,
            ..Default::default()
        });
        let sheet = grid(&[&["Company"], &["Acme FC"]]);

        let result = service(repo, sheet)
            .with_logger(logger.clone())
            .run(&ScanRequest::default());
        assert!(!result.success);

        let events: Vec<String> = logger
            .get_errors(10)
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert!(events.contains(&"scan_failed".to_string()));
        assert!(events.contains(&"run_record_failed".to_string()));
    }
}
