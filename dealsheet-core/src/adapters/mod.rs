//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the DealRepository port
//! - Google Sheets HTTP client for SheetSource
//! - CSV exports for SheetSource (offline replay)

pub mod csv_sheet;
pub mod duckdb;
pub mod google_sheets;
