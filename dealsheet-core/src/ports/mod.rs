//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod repository;
mod sheet_source;

pub use repository::{AppliedCounts, DealFilter, DealRepository, WriteBatch};
pub use sheet_source::SheetSource;
