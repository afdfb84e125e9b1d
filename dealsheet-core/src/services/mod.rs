//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod coerce;
pub mod logging;
pub mod migration;
pub mod normalize;
mod query;
pub mod reconcile;
pub mod scan;
mod status;
pub mod validate;

pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use query::QueryService;
pub use scan::{ScanConfig, ScanService};
pub use status::{StatusService, StatusSummary};
