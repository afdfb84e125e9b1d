//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

pub mod result;
mod scan;
mod sheet;
mod transaction;

pub use scan::{ScanCounts, ScanRequest, ScanResult, ScanRun, ScanStatus, ScanTarget};
pub use sheet::{Cell, RawRow, SheetGrid};
pub use transaction::{
    split_investors, CandidateTransaction, DealField, FieldKind, IdentityKey, StoredTransaction,
    MAX_MONEY,
};
