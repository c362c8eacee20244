//! The migration pipeline.
//!
//! A run is a fixed sequence of [`MigrationStep`]s executed strictly in
//! order. Whether a step runs is decided up front from the configuration and
//! the capabilities of the source job runner; the first failing step ends the
//! run.

/// Drives a migration run step by step.
pub mod controller;
/// Mutable state and summary of a single run.
pub mod state;
/// The steps of the pipeline and their applicability rules.
pub mod step;

pub use controller::MigrationOrchestrator;
pub use state::MigrationRunSummary;
pub use step::{MigrationStep, RunnerCapabilities, PIPELINE};

/// Creates the backup of the source project.
pub const PROJECT_BACKUP_COMPONENT: &str = "keboola.project-backup";

/// Restores a backup into the destination project.
pub const PROJECT_RESTORE_COMPONENT: &str = "keboola.project-restore";

/// Migrates orchestrations of the legacy orchestrator.
pub const ORCHESTRATOR_MIGRATE_COMPONENT: &str = "keboola.app-orchestrator-migrate";

/// Migrates Snowflake writers together with their workspaces.
pub const SNOWFLAKE_WRITER_MIGRATE_COMPONENT: &str = "keboola.app-snowflake-writer-migrate";

/// Copies table data directly between the projects.
pub const TABLES_DATA_COMPONENT: &str = "keboola.app-project-migrate-large-tables";

/// Components whose configurations are no longer migrated.
pub const OBSOLETE_COMPONENTS: [&str; 3] = ["gooddata-writer", "orchestrator", "pigeon-importer"];

/// Snowflake writers, whose configurations may share a workspace.
pub const SNOWFLAKE_WRITER_COMPONENTS: [&str; 4] = [
    "keboola.wr-db-snowflake",
    "keboola.wr-snowflake-blob-storage",
    "keboola.wr-db-snowflake-gcs",
    "keboola.wr-db-snowflake-gcs-s3",
];
