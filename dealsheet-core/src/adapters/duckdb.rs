//! DuckDB repository implementation

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::types::Type;
use duckdb::{params, params_from_iter, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    CandidateTransaction, ScanCounts, ScanRun, ScanStatus, ScanTarget, StoredTransaction,
};
use crate::migrations::MIGRATIONS;
use crate::ports::{AppliedCounts, DealFilter, DealRepository, WriteBatch};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Keys per `IN (...)` lookup
const LOOKUP_CHUNK: usize = 500;

const TRANSACTION_COLUMNS: &str = "transaction_id, identity_key, company, amount::VARCHAR, company_link, geography,
     investment_date::VARCHAR, investment_stage, investors_buyers, sector, sport,
     transaction_type, annual_revenue::VARCHAR, press_link, created_at::VARCHAR, updated_at::VARCHAR";

const SCAN_RUN_COLUMNS: &str = "run_id, spreadsheet_id, sheet_name, status, started_at::VARCHAR,
     completed_at::VARCHAR, inserted, updated, skipped, failed, error_message";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl DuckDbRepository {
    /// Open (or create) the deal store
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which can occur when a scan and a listing open the database at the
    /// same time.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[dealsheet] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::persistence(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Attempt to open a database connection (called by new() with retry logic)
    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)?;
        Ok(conn)
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn.lock().unwrap();
        MigrationService::new(&conn, MIGRATIONS)
            .run_pending()
            .map_err(|e| Error::persistence(format!("Migration failed: {:#}", e)))
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Size of the database file in bytes
    pub fn get_db_size(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.db_path)?.len())
    }

    fn row_to_transaction(row: &duckdb::Row) -> duckdb::Result<StoredTransaction> {
        // Column order follows TRANSACTION_COLUMNS
        let id_str: String = row.get(0)?;
        let created_str: Option<String> = row.get(14)?;
        let updated_str: Option<String> = row.get(15)?;

        Ok(StoredTransaction {
            id: parse_uuid(0, &id_str)?,
            identity_key: row.get(1)?,
            fields: CandidateTransaction {
                company: row.get(2)?,
                amount: parse_decimal(row.get(3)?),
                company_link: row.get(4)?,
                geography: row.get(5)?,
                investment_date: parse_date(row.get(6)?),
                investment_stage: row.get(7)?,
                investors_buyers: row.get(8)?,
                sector: row.get(9)?,
                sport: row.get(10)?,
                transaction_type: row.get(11)?,
                annual_revenue: parse_decimal(row.get(12)?),
                press_link: row.get(13)?,
            },
            created_at: parse_timestamp(created_str.as_deref()),
            updated_at: parse_timestamp(updated_str.as_deref()),
        })
    }

    fn row_to_scan_run(row: &duckdb::Row) -> duckdb::Result<ScanRun> {
        let id_str: String = row.get(0)?;
        let status_str: String = row.get(3)?;
        let started_str: Option<String> = row.get(4)?;
        let completed_str: Option<String> = row.get(5)?;

        Ok(ScanRun {
            id: parse_uuid(0, &id_str)?,
            spreadsheet_id: row.get(1)?,
            sheet_name: row.get(2)?,
            status: ScanStatus::parse(&status_str).unwrap_or(ScanStatus::Failed),
            started_at: parse_timestamp(started_str.as_deref()),
            completed_at: completed_str.as_deref().map(|s| parse_timestamp(Some(s))),
            counts: ScanCounts {
                inserted: row.get::<_, i64>(6)? as u64,
                updated: row.get::<_, i64>(7)? as u64,
                skipped: row.get::<_, i64>(8)? as u64,
                failed: row.get::<_, i64>(9)? as u64,
            },
            error_message: row.get(10)?,
        })
    }

    fn select_by_identity_key(
        conn: &Connection,
        key: &str,
    ) -> duckdb::Result<Option<StoredTransaction>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_transactions WHERE identity_key = ?",
            TRANSACTION_COLUMNS
        ))?;
        let mut rows = stmt.query_map([key], Self::row_to_transaction)?;
        rows.next().transpose()
    }

    fn insert_transaction(conn: &Connection, tx: &StoredTransaction) -> duckdb::Result<()> {
        let f = &tx.fields;
        conn.execute(
            "INSERT INTO sys_transactions (
                transaction_id, identity_key, company, amount, company_link, geography,
                investment_date, investment_stage, investors_buyers, sector, sport,
                transaction_type, annual_revenue, press_link, created_at, updated_at
             ) VALUES (?, ?, ?, CAST(? AS DECIMAL(18, 2)), ?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?,
                       CAST(? AS DECIMAL(18, 2)), ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
            params![
                tx.id.to_string(),
                tx.identity_key,
                f.company,
                f.amount.map(|d| d.to_string()),
                f.company_link,
                f.geography,
                f.investment_date.map(|d| d.to_string()),
                f.investment_stage,
                f.investors_buyers,
                f.sector,
                f.sport,
                f.transaction_type,
                f.annual_revenue.map(|d| d.to_string()),
                f.press_link,
                format_timestamp(&tx.created_at),
                format_timestamp(&tx.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Overwrite the data columns of an existing record
    ///
    /// Identity columns (id, identity_key, investment_date) never change.
    fn update_transaction(
        conn: &Connection,
        id: Uuid,
        fields: &CandidateTransaction,
        updated_at: &DateTime<Utc>,
    ) -> duckdb::Result<()> {
        conn.execute(
            "UPDATE sys_transactions SET
                company = ?,
                amount = CAST(? AS DECIMAL(18, 2)),
                company_link = ?,
                geography = ?,
                investment_stage = ?,
                investors_buyers = ?,
                sector = ?,
                sport = ?,
                transaction_type = ?,
                annual_revenue = CAST(? AS DECIMAL(18, 2)),
                press_link = ?,
                updated_at = CAST(? AS TIMESTAMP)
             WHERE transaction_id = ?",
            params![
                fields.company,
                fields.amount.map(|d| d.to_string()),
                fields.company_link,
                fields.geography,
                fields.investment_stage,
                fields.investors_buyers,
                fields.sector,
                fields.sport,
                fields.transaction_type,
                fields.annual_revenue.map(|d| d.to_string()),
                fields.press_link,
                format_timestamp(updated_at),
                id.to_string(),
            ],
        )?;
        Ok(())
    }
}

impl DealRepository for DuckDbRepository {
    fn find_by_identity_keys(&self, keys: &[String]) -> Result<HashMap<String, StoredTransaction>> {
        let conn = self.conn.lock().unwrap();
        let mut found = HashMap::new();

        for chunk in keys.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sys_transactions WHERE identity_key IN ({})",
                TRANSACTION_COLUMNS, placeholders
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), Self::row_to_transaction)?;
            for row in rows {
                let record = row?;
                found.insert(record.identity_key.clone(), record);
            }
        }

        Ok(found)
    }

    fn apply_batch(&self, batch: &WriteBatch) -> Result<AppliedCounts> {
        let mut conn = self.conn.lock().unwrap();
        // Dropping the transaction without commit rolls everything back
        let tx = conn.transaction()?;
        let mut counts = AppliedCounts::default();
        let now = Utc::now();

        for candidate in batch.inserts.iter().chain(batch.updates.iter()) {
            let key = candidate.identity_key().fingerprint();

            match Self::select_by_identity_key(&tx, &key)? {
                None => {
                    let mut record = StoredTransaction::new(candidate.clone());
                    record.created_at = now;
                    record.updated_at = now;
                    Self::insert_transaction(&tx, &record)?;
                    counts.inserted += 1;
                }
                Some(existing) => {
                    let merged = candidate.merged_over(&existing.fields);
                    if merged == existing.fields {
                        counts.unchanged += 1;
                    } else {
                        Self::update_transaction(&tx, existing.id, &merged, &now)?;
                        counts.updated += 1;
                    }
                }
            }
        }

        tx.commit()?;
        Ok(counts)
    }

    fn list_transactions(&self, filter: &DealFilter) -> Result<Vec<StoredTransaction>> {
        let conn = self.conn.lock().unwrap();

        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(company) = non_blank(&filter.company) {
            clauses.push("contains(lower(company), ?)");
            values.push(company.to_lowercase());
        }
        if let Some(sector) = non_blank(&filter.sector) {
            clauses.push("lower(sector) = ?");
            values.push(sector.to_lowercase());
        }
        if let Some(kind) = non_blank(&filter.transaction_type) {
            clauses.push("lower(transaction_type) = ?");
            values.push(kind.to_lowercase());
        }
        if let Some(search) = non_blank(&filter.search) {
            clauses.push(
                "(contains(lower(company), ?)
                  OR contains(lower(coalesce(sector, '')), ?)
                  OR contains(lower(coalesce(transaction_type, '')), ?))",
            );
            let needle = search.to_lowercase();
            values.extend([needle.clone(), needle.clone(), needle]);
        }

        let mut sql = format!("SELECT {} FROM sys_transactions", TRANSACTION_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY investment_date DESC NULLS LAST, company");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), Self::row_to_transaction)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn count_transactions(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM sys_transactions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn start_scan_run(&self, target: &ScanTarget) -> Result<ScanRun> {
        let conn = self.conn.lock().unwrap();
        let run = ScanRun::start(target);
        conn.execute(
            "INSERT INTO sys_scan_runs (run_id, spreadsheet_id, sheet_name, status, started_at)
             VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params![
                run.id.to_string(),
                run.spreadsheet_id,
                run.sheet_name,
                run.status.as_str(),
                format_timestamp(&run.started_at),
            ],
        )?;
        Ok(run)
    }

    fn complete_scan_run(&self, id: Uuid, counts: &ScanCounts) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sys_scan_runs SET
                status = ?, completed_at = CAST(? AS TIMESTAMP),
                inserted = ?, updated = ?, skipped = ?, failed = ?
             WHERE run_id = ?",
            params![
                ScanStatus::Completed.as_str(),
                format_timestamp(&Utc::now()),
                counts.inserted as i64,
                counts.updated as i64,
                counts.skipped as i64,
                counts.failed as i64,
                id.to_string(),
            ],
        )?;
        Ok(())
    }

    fn fail_scan_run(&self, id: Uuid, error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sys_scan_runs SET status = ?, completed_at = CAST(? AS TIMESTAMP), error_message = ?
             WHERE run_id = ?",
            params![
                ScanStatus::Failed.as_str(),
                format_timestamp(&Utc::now()),
                error,
                id.to_string(),
            ],
        )?;
        Ok(())
    }

    fn get_scan_runs(&self, limit: usize) -> Result<Vec<ScanRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_scan_runs ORDER BY started_at DESC LIMIT ?",
            SCAN_RUN_COLUMNS
        ))?;
        let rows = stmt.query_map([limit as i64], Self::row_to_scan_run)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}

// Helper functions

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Stored ids are always UUIDs; anything else is a corrupt row
fn parse_uuid(column: usize, raw: &str) -> duckdb::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn parse_timestamp(s: Option<&str>) -> DateTime<Utc> {
    s.map(parse_naive_datetime)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}

fn parse_naive_datetime(s: &str) -> NaiveDateTime {
    // Try various timestamp formats that DuckDB might produce
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .unwrap_or_else(|_| Utc::now().naive_utc())
}

fn parse_date(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn parse_decimal(s: Option<String>) -> Option<Decimal> {
    s.and_then(|s| Decimal::from_str(&s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_repo() -> (TempDir, DuckDbRepository) {
        let dir = TempDir::new().unwrap();
        let repo = DuckDbRepository::new(&dir.path().join("test.duckdb")).unwrap();
        repo.ensure_schema().unwrap();
        (dir, repo)
    }

    fn acme() -> CandidateTransaction {
        CandidateTransaction {
            company: Some("Acme FC".to_string()),
            amount: Some(Decimal::new(5_000_000, 0)),
            investment_date: NaiveDate::from_ymd_opt(2023, 1, 10),
            transaction_type: Some("Acquisition".to_string()),
            sector: Some("Football".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_then_read_back() {
        let (_dir, repo) = create_test_repo();
        let batch = WriteBatch {
            inserts: vec![acme()],
            updates: vec![],
        };

        let applied = repo.apply_batch(&batch).unwrap();
        assert_eq!(applied.inserted, 1);

        let key = acme().identity_key().fingerprint();
        let found = repo.find_by_identity_keys(&[key.clone()]).unwrap();
        let stored = &found[&key];
        assert_eq!(stored.fields, acme());
        assert_eq!(stored.fields.amount, Some(Decimal::new(5_000_000, 0)));
        assert_eq!(repo.count_transactions().unwrap(), 1);
    }

    #[test]
    fn test_reapplying_batch_is_unchanged() {
        let (_dir, repo) = create_test_repo();
        let batch = WriteBatch {
            inserts: vec![acme()],
            updates: vec![],
        };

        repo.apply_batch(&batch).unwrap();
        let again = repo.apply_batch(&batch).unwrap();
        assert_eq!(
            again,
            AppliedCounts {
                inserted: 0,
                updated: 0,
                unchanged: 1
            }
        );
        assert_eq!(repo.count_transactions().unwrap(), 1);
    }

    #[test]
    fn test_update_merges_inside_transaction() {
        let (_dir, repo) = create_test_repo();
        repo.apply_batch(&WriteBatch {
            inserts: vec![acme()],
            updates: vec![],
        })
        .unwrap();

        let mut change = acme();
        change.sector = None;
        change.geography = Some("USA".to_string());
        let applied = repo
            .apply_batch(&WriteBatch {
                inserts: vec![],
                updates: vec![change],
            })
            .unwrap();
        assert_eq!(applied.updated, 1);

        let stored = repo.list_transactions(&DealFilter::default()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].fields.sector.as_deref(), Some("Football"));
        assert_eq!(stored[0].fields.geography.as_deref(), Some("USA"));
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let (_dir, repo) = create_test_repo();
        // Company is NOT NULL in storage; the second write fails the batch
        let broken = CandidateTransaction {
            sector: Some("Tennis".to_string()),
            ..Default::default()
        };
        let err = repo
            .apply_batch(&WriteBatch {
                inserts: vec![acme(), broken],
                updates: vec![],
            })
            .unwrap_err();

        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(repo.count_transactions().unwrap(), 0);
    }

    #[test]
    fn test_list_filters_and_order() {
        let (_dir, repo) = create_test_repo();
        let older = CandidateTransaction {
            company: Some("Beta SC".to_string()),
            investment_date: NaiveDate::from_ymd_opt(2021, 6, 1),
            sector: Some("Basketball".to_string()),
            transaction_type: Some("Investment".to_string()),
            ..Default::default()
        };
        let undated = CandidateTransaction {
            company: Some("Gamma Club".to_string()),
            sector: Some("football".to_string()),
            ..Default::default()
        };
        repo.apply_batch(&WriteBatch {
            inserts: vec![older, acme(), undated],
            updates: vec![],
        })
        .unwrap();

        let all = repo.list_transactions(&DealFilter::default()).unwrap();
        let names: Vec<_> = all.iter().map(|t| t.fields.company.clone().unwrap()).collect();
        assert_eq!(names, vec!["Acme FC", "Beta SC", "Gamma Club"]);

        let football = repo
            .list_transactions(&DealFilter {
                sector: Some("FOOTBALL".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(football.len(), 2);

        let searched = repo
            .list_transactions(&DealFilter {
                search: Some("invest".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].fields.company.as_deref(), Some("Beta SC"));

        let limited = repo
            .list_transactions(&DealFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_scan_run_lifecycle() {
        let (_dir, repo) = create_test_repo();
        let target = ScanTarget {
            spreadsheet_id: "sheet-123".to_string(),
            sheet_name: "Deals".to_string(),
        };

        let run = repo.start_scan_run(&target).unwrap();
        let counts = ScanCounts {
            inserted: 2,
            updated: 1,
            skipped: 3,
            failed: 1,
        };
        repo.complete_scan_run(run.id, &counts).unwrap();

        let failed = repo.start_scan_run(&target).unwrap();
        repo.fail_scan_run(failed.id, "Not found: Sheet 'Deals'").unwrap();

        let runs = repo.get_scan_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        let completed = runs.iter().find(|r| r.id == run.id).unwrap();
        assert_eq!(completed.status, ScanStatus::Completed);
        assert_eq!(completed.counts, counts);
        assert!(completed.completed_at.is_some());

        let failed = runs.iter().find(|r| r.id == failed.id).unwrap();
        assert_eq!(failed.status, ScanStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("Not found: Sheet 'Deals'"));
    }

    #[test]
    fn test_corrupt_ids_fail_instead_of_changing() {
        let (_dir, repo) = create_test_repo();
        {
            let conn = repo.conn.lock().unwrap();
            conn.execute_batch(
                "INSERT INTO sys_transactions (transaction_id, identity_key, company, created_at, updated_at)
                 VALUES ('not-a-uuid', 'k1', 'Corrupt FC', TIMESTAMP '2024-01-01 00:00:00', TIMESTAMP '2024-01-01 00:00:00');
                 INSERT INTO sys_scan_runs (run_id, spreadsheet_id, sheet_name, status, started_at)
                 VALUES ('garbled', 'sheet', 'Deals', 'completed', TIMESTAMP '2024-01-01 00:00:00');",
            )
            .unwrap();
        }

        assert!(matches!(
            repo.list_transactions(&DealFilter::default()),
            Err(Error::Persistence(_))
        ));
        assert!(matches!(repo.get_scan_runs(10), Err(Error::Persistence(_))));
    }

    #[test]
    fn test_find_with_no_keys() {
        let (_dir, repo) = create_test_repo();
        assert!(repo.find_by_identity_keys(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error("IO Error: Could not set lock on file"));
        assert!(is_retryable_error("database is locked"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }
}
