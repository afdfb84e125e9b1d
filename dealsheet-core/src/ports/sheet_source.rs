//! Sheet source port
//!
//! Defines the interface for reading a deals grid from an external
//! spreadsheet (Google Sheets, a CSV export, an in-memory fixture).

use crate::domain::result::Result;
use crate::domain::SheetGrid;

/// Read-only access to one spreadsheet tab
///
/// The ScanService uses this trait without knowing where rows come from.
/// Implementations return the complete grid in one call; paging, if any,
/// is the adapter's concern.
pub trait SheetSource: Send + Sync {
    /// Source name (e.g., "google_sheets", "csv")
    fn name(&self) -> &str;

    /// Check credentials/preconditions before any fetch
    ///
    /// Returning an error here aborts the run without touching the sheet.
    fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    /// Fetch every row of `sheet_name` in `spreadsheet_id`
    ///
    /// Errors map to `Error::Auth` (credentials rejected), `Error::NotFound`
    /// (spreadsheet or tab missing) and `Error::Transient` (rate limits,
    /// network or upstream 5xx).
    fn fetch_grid(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<SheetGrid>;
}
