#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

//! `project-migrate` moves a Keboola project from one stack to another.
//!
//! It does not copy anything itself: it drives the platform components that do
//! (project backup, project restore, secret re-encryption, direct table copy,
//! writer and orchestration migration) through their job and sync-action APIs,
//! waits for every job to finish and decides what to do next.

/// Error handling utilities shared by every error enum in the crate.
pub mod migrate_error;

/// Attribute macros used across the crate.
pub use project_migrate_macros::{log_context, migrate_error};

/// The crate-level error returned by the migration run.
pub mod error;
pub use error::MigrateError;

/// Low level primitives: HTTP transport, logging and secret values.
pub mod primitives;

/// Component configuration (`config.json`) and environment.
pub mod config;

/// Backup read credentials and the restore job payload built from them.
pub mod restore;

/// Storage API wrapper used for tokens, components, configurations and tables.
pub mod storage;

/// Encryption API wrapper that migrates configurations with their secrets.
pub mod secrets;

/// Job execution surfaces (queue and legacy Syrup) and the job poller.
pub mod job_runner;

/// Snowflake workspace sharing between migrated writer configurations.
pub mod workspace;

/// The migration pipeline.
pub mod migration;

/// Checks run against both projects after the migration.
pub mod checker;

/// Preflight helpers run before the migration starts.
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
