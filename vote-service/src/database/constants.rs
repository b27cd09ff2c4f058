//! Database migration constants and metadata

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Migration descriptions
pub const MIGRATION_DESCRIPTIONS: &[&str] = &["Vote pool, batches, proofs and commitment journal"];

/// Default database file name
pub const DEFAULT_DB_PATH: &str = "votes.db";
