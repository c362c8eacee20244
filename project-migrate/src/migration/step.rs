use std::fmt;

use crate::config::MigrationConfig;
use crate::job_runner::JobRunner;

/// A step of the migration pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationStep {
    /// Obtains read credentials of a new backup of the source project.
    GenerateCredentials,
    /// Backs up the source project.
    Backup,
    /// Restores the backup into the destination project.
    Restore,
    /// Migrates configurations with their encrypted values.
    MigrateSecrets,
    /// Copies table data directly, outside the backup.
    MigrateTableDataDirectly,
    /// Migrates Snowflake writers.
    MigrateWriters,
    /// Migrates orchestrations of the legacy orchestrator.
    MigrateOrchestrations,
}

/// The steps of a run, in execution order.
pub const PIPELINE: [MigrationStep; 7] = [
    MigrationStep::GenerateCredentials,
    MigrationStep::Backup,
    MigrationStep::Restore,
    MigrationStep::MigrateSecrets,
    MigrationStep::MigrateTableDataDirectly,
    MigrationStep::MigrateWriters,
    MigrationStep::MigrateOrchestrations,
];

/// What the job runners can do, as far as step selection is concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerCapabilities {
    /// The source project still has orchestrations of the legacy orchestrator.
    pub orchestration_migration: bool,
}

impl RunnerCapabilities {
    /// Capabilities derived from the runner of the source project.
    #[must_use]
    pub fn of_source(runner: &dyn JobRunner) -> Self {
        Self {
            orchestration_migration: runner.supports_orchestration_migration(),
        }
    }
}

impl MigrationStep {
    /// Name used in log events.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GenerateCredentials => "generate_credentials",
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::MigrateSecrets => "migrate_secrets",
            Self::MigrateTableDataDirectly => "migrate_table_data",
            Self::MigrateWriters => "migrate_writers",
            Self::MigrateOrchestrations => "migrate_orchestrations",
        }
    }

    /// Whether the step runs for `config`.
    ///
    /// Snowflake writers are migrated by the Encryption API together with
    /// the other configurations when secrets are migrated, so the dedicated
    /// step only runs without it.
    #[must_use]
    pub const fn is_applicable(
        self,
        config: &MigrationConfig,
        capabilities: RunnerCapabilities,
    ) -> bool {
        match self {
            Self::GenerateCredentials | Self::Backup | Self::Restore => true,
            Self::MigrateSecrets => config.parameters.migrate_secrets,
            Self::MigrateTableDataDirectly => config.migrates_table_data_directly(),
            Self::MigrateWriters => !config.parameters.migrate_secrets,
            Self::MigrateOrchestrations => capabilities.orchestration_migration,
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::migration_config;
    use serde_json::json;

    fn applicable(config: &MigrationConfig, orchestrations: bool) -> Vec<MigrationStep> {
        let capabilities = RunnerCapabilities {
            orchestration_migration: orchestrations,
        };
        PIPELINE
            .into_iter()
            .filter(|step| step.is_applicable(config, capabilities))
            .collect()
    }

    #[test]
    fn test_default_run_on_legacy_runner() {
        let config = migration_config(json!({}));
        assert_eq!(
            applicable(&config, true),
            vec![
                MigrationStep::GenerateCredentials,
                MigrationStep::Backup,
                MigrationStep::Restore,
                MigrationStep::MigrateTableDataDirectly,
                MigrationStep::MigrateWriters,
                MigrationStep::MigrateOrchestrations,
            ]
        );
    }

    #[test]
    fn test_secrets_replace_writer_migration() {
        let config = migration_config(json!({
            "migrateSecrets": true,
            "#sourceManageToken": "manage-token",
            "directDataMigration": false,
        }));
        assert_eq!(
            applicable(&config, false),
            vec![
                MigrationStep::GenerateCredentials,
                MigrationStep::Backup,
                MigrationStep::Restore,
                MigrationStep::MigrateSecrets,
            ]
        );
    }

    #[test]
    fn test_structure_only_skips_table_data() {
        let config = migration_config(json!({ "migrateStructureOnly": true }));
        assert!(!MigrationStep::MigrateTableDataDirectly
            .is_applicable(&config, RunnerCapabilities::default()));
    }

    #[test]
    fn test_names() {
        assert_eq!(MigrationStep::MigrateTableDataDirectly.to_string(), "migrate_table_data");
        assert_eq!(PIPELINE[0].name(), "generate_credentials");
    }
}
