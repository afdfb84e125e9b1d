//! Log store migrations - embedded SQL files
//!
//! Kept apart from the deal store migrations so that logs.duckdb can be
//! created, cleared or deleted without touching deal data.

/// Log migrations in apply order: (filename, sql_content)
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
