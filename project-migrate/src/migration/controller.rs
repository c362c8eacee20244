use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use super::state::{MigrationRun, MigrationRunSummary};
use super::step::{MigrationStep, RunnerCapabilities, PIPELINE};
use super::{
    OBSOLETE_COMPONENTS, ORCHESTRATOR_MIGRATE_COMPONENT, PROJECT_BACKUP_COMPONENT,
    PROJECT_RESTORE_COMPONENT, SNOWFLAKE_WRITER_COMPONENTS, SNOWFLAKE_WRITER_MIGRATE_COMPONENT,
    TABLES_DATA_COMPONENT,
};
use crate::config::{DataMode, DatabaseConfig, MigrationConfig};
use crate::job_runner::{Job, JobRunner};
use crate::primitives::secret::Secret;
use crate::restore::{build_restore_payload, BackupCredentials};
use crate::secrets::{MigrateConfigurationRequest, MigrationsApi};
use crate::storage::StorageApi;
use crate::utils::stack_from_project_url;
use crate::workspace::WorkspaceOutcome;
use crate::MigrateError;

const GENERATE_READ_CREDENTIALS_ACTION: &str = "generate-read-credentials";

/// Parameters of the direct table-data job.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TablesDataParameters<'a> {
    mode: DataMode,
    source_kbc_url: &'a str,
    #[serde(rename = "#sourceKbcToken")]
    source_kbc_token: &'a Secret,
    dry_run: bool,
    is_source_byodb: bool,
    source_byodb: &'a str,
    include_workspace_schemas: &'a [String],
    preserve_timestamp: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<&'a DatabaseConfig>,
}

/// Runs the migration pipeline between two projects.
///
/// The orchestrator keeps no state between runs: the backup credentials and
/// the workspace map belong to a single call of [`MigrationOrchestrator::run`].
pub struct MigrationOrchestrator {
    config: Arc<MigrationConfig>,
    source_runner: Arc<dyn JobRunner>,
    destination_runner: Arc<dyn JobRunner>,
    source_storage: Arc<dyn StorageApi>,
    destination_storage: Arc<dyn StorageApi>,
    migrations: Arc<dyn MigrationsApi>,
}

#[crate::log_context("Orchestrator")]
impl MigrationOrchestrator {
    /// Creates an orchestrator of the migration described by `config`.
    #[must_use]
    pub fn new(
        config: Arc<MigrationConfig>,
        source_runner: Arc<dyn JobRunner>,
        destination_runner: Arc<dyn JobRunner>,
        source_storage: Arc<dyn StorageApi>,
        destination_storage: Arc<dyn StorageApi>,
        migrations: Arc<dyn MigrationsApi>,
    ) -> Self {
        Self {
            config,
            source_runner,
            destination_runner,
            source_storage,
            destination_storage,
            migrations,
        }
    }

    /// Runs every applicable step in order and stops at the first failure.
    ///
    /// # Errors
    /// - `MigrateError::User` when a job finishes unsuccessfully or an API rejects a request with a 4xx status
    /// - `MigrateError::UnrecognizedBackupCredentials` when the backup answers with an unknown backend
    /// - `MigrateError::Http` for server and transport failures
    pub async fn run(&self) -> Result<MigrationRunSummary, MigrateError> {
        self.run_pipeline().await.map_err(MigrateError::classify)
    }
}

impl MigrationOrchestrator {
    async fn run_pipeline(&self) -> Result<MigrationRunSummary, MigrateError> {
        let run_start_time = Utc::now();
        let capabilities = RunnerCapabilities::of_source(self.source_runner.as_ref());

        crate::info!(
            "migration_run.started dry_run={} orchestration_migration={} timestamp={}",
            self.config.parameters.dry_run,
            capabilities.orchestration_migration,
            run_start_time.to_rfc3339()
        );

        let mut run = MigrationRun::new();
        for step in PIPELINE {
            if !step.is_applicable(&self.config, capabilities) {
                crate::debug!(
                    "migration.step.skipped step={step} timestamp={}",
                    Utc::now().to_rfc3339()
                );
                run.summary.skipped_steps.push(step);
                continue;
            }

            let step_start_time = Utc::now();
            crate::info!(
                "migration.step.started step={step} timestamp={}",
                step_start_time.to_rfc3339()
            );

            if let Err(e) = self.run_step(step, &mut run).await {
                crate::error!(
                    "migration.step.failed step={step} duration_ms={} error={e} timestamp={}",
                    (Utc::now() - step_start_time).num_milliseconds(),
                    Utc::now().to_rfc3339()
                );
                return Err(e);
            }

            crate::info!(
                "migration.step.completed step={step} duration_ms={} timestamp={}",
                (Utc::now() - step_start_time).num_milliseconds(),
                Utc::now().to_rfc3339()
            );
            run.summary.completed_steps.push(step);
        }

        let mut summary = run.summary;
        summary.duration_ms = (Utc::now() - run_start_time).num_milliseconds();

        crate::info!(
            "migration_run.completed completed={} skipped={} configurations_migrated={} configurations_failed={} workspaces_reused={} duration_ms={} timestamp={}",
            summary.completed_steps.len(),
            summary.skipped_steps.len(),
            summary.configurations_migrated,
            summary.configurations_failed,
            summary.workspaces_reused,
            summary.duration_ms,
            Utc::now().to_rfc3339()
        );

        Ok(summary)
    }

    async fn run_step(&self, step: MigrationStep, run: &mut MigrationRun) -> Result<(), MigrateError> {
        match step {
            MigrationStep::GenerateCredentials => self.generate_credentials(run).await,
            MigrationStep::Backup => self.backup_source_project(run).await,
            MigrationStep::Restore => self.restore_destination_project(run).await,
            MigrationStep::MigrateSecrets => self.migrate_secrets(run).await,
            MigrationStep::MigrateTableDataDirectly => self.migrate_table_data().await,
            MigrationStep::MigrateWriters => self.migrate_snowflake_writers().await,
            MigrationStep::MigrateOrchestrations => self.migrate_orchestrations().await,
        }
    }

    /// Runs a job and turns any unsuccessful status into a user error starting with `error_prefix`.
    async fn run_checked_job(
        runner: &dyn JobRunner,
        component_id: &str,
        parameters: Value,
        tag: Option<&str>,
        error_prefix: &str,
    ) -> Result<Job, MigrateError> {
        let job = runner
            .run_job(component_id, json!({ "parameters": parameters }), tag)
            .await?;
        crate::debug!(
            "job.finished component={component_id} id={} status={}",
            job.id,
            job.status
        );
        if !job.is_success() {
            return Err(MigrateError::user(format!(
                "{error_prefix}{}",
                job.result_message()
            )));
        }
        Ok(job)
    }

    async fn generate_credentials(&self, run: &mut MigrationRun) -> Result<(), MigrateError> {
        crate::info!("Creating backup credentials");
        let backup_id = self.source_storage.generate_id().await?;

        let result = self
            .source_runner
            .run_sync_action(
                PROJECT_BACKUP_COMPONENT,
                GENERATE_READ_CREDENTIALS_ACTION,
                json!({
                    "parameters": {
                        "backupId": backup_id,
                        "skipRegionValidation": self.config.parameters.skip_region_validation,
                    },
                }),
            )
            .await?;
        let credentials = BackupCredentials::from_action_result(result)?;

        crate::debug!(
            "backup.credentials backup_id={backup_id} backend={}",
            credentials.backend()
        );
        run.set_backup(backup_id, credentials);
        Ok(())
    }

    async fn backup_source_project(&self, run: &MigrationRun) -> Result<(), MigrateError> {
        crate::info!("Creating source project snapshot");
        Self::run_checked_job(
            self.source_runner.as_ref(),
            PROJECT_BACKUP_COMPONENT,
            json!({
                "backupId": run.backup_id()?,
                "exportStructureOnly": self.config.export_structure_only(),
                "skipRegionValidation": self.config.parameters.skip_region_validation,
            }),
            self.config.parameters.tags.backup.as_deref(),
            "Project snapshot create error: ",
        )
        .await?;
        crate::info!("Source project snapshot created");
        Ok(())
    }

    async fn restore_destination_project(&self, run: &mut MigrationRun) -> Result<(), MigrateError> {
        crate::info!("Restoring current project from snapshot");
        let payload = build_restore_payload(run.take_credentials()?, &self.config)?;
        Self::run_checked_job(
            self.destination_runner.as_ref(),
            PROJECT_RESTORE_COMPONENT,
            payload["parameters"].clone(),
            self.config.parameters.tags.restore.as_deref(),
            "Project restore error: ",
        )
        .await?;
        crate::info!("Current project restored");
        Ok(())
    }

    async fn migrate_secrets(&self, run: &mut MigrationRun) -> Result<(), MigrateError> {
        crate::info!("Migrating configurations with secrets");
        let dry_run = self.config.parameters.dry_run;

        let default_branch = self
            .source_storage
            .list_dev_branches()
            .await?
            .into_iter()
            .find(|branch| branch.is_default)
            .ok_or_else(|| MigrateError::user("Default branch not found in the source project."))?;

        let components = self.source_storage.list_components().await?;
        if components.is_empty() {
            crate::info!("There are no components to migrate.");
            return Ok(());
        }

        let destination_stack = stack_from_project_url(&self.config.destination_url)?;
        let prefix = if dry_run { "[dry-run] " } else { "" };

        for component in components {
            if OBSOLETE_COMPONENTS.contains(&component.id.as_str()) {
                crate::info!(
                    "Components \"{}\" is obsolete, skipping migration...",
                    component.id
                );
                run.summary.obsolete_components_skipped += 1;
                continue;
            }

            for configuration in &component.configurations {
                crate::info!(
                    "Migrating configuration \"{}\" of component \"{}\"",
                    configuration.id,
                    component.id
                );

                let request = MigrateConfigurationRequest {
                    source_token: self.config.source_token().clone(),
                    destination_stack: destination_stack.clone(),
                    destination_token: self.config.destination_token.clone(),
                    component_id: component.id.clone(),
                    config_id: configuration.id.clone(),
                    branch_id: default_branch.id.clone(),
                    dry_run,
                };
                let response = match self.migrations.migrate_configuration(request).await {
                    Ok(response) => response,
                    Err(e) if e.is_client_error() => {
                        crate::error!(
                            "Migrating configuration \"{}\" of component \"{}\" failed: {e}",
                            configuration.id,
                            component.id
                        );
                        run.summary.configurations_failed += 1;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                run.summary.configurations_migrated += 1;

                if !dry_run && SNOWFLAKE_WRITER_COMPONENTS.contains(&component.id.as_str()) {
                    let outcome = run
                        .workspaces
                        .share_workspace(
                            self.source_storage.as_ref(),
                            self.destination_storage.as_ref(),
                            &component.id,
                            &configuration.id,
                        )
                        .await?;
                    if outcome == WorkspaceOutcome::Reused {
                        run.summary.workspaces_reused += 1;
                    }
                }

                crate::info!("{prefix}{}", response.message);
                for warning in &response.warnings {
                    crate::warn!("{prefix}{warning}");
                }
            }
        }

        crate::info!("Configurations with secrets have been migrated.");
        Ok(())
    }

    fn tables_data_parameters(&self) -> Result<Value, MigrateError> {
        let p = &self.config.parameters;
        let parameters = TablesDataParameters {
            mode: p.data_mode,
            source_kbc_url: self.config.source_url(),
            source_kbc_token: self.config.source_token(),
            dry_run: p.dry_run,
            is_source_byodb: p.is_source_byodb,
            source_byodb: &p.source_byodb,
            include_workspace_schemas: &p.include_workspace_schemas,
            preserve_timestamp: p.preserve_timestamp,
            db: match p.data_mode {
                DataMode::Database => p.db.as_ref(),
                DataMode::Sapi => None,
            },
        };
        Ok(serde_json::to_value(parameters)?)
    }

    async fn migrate_table_data(&self) -> Result<(), MigrateError> {
        crate::info!("Migrate data of tables directly.");
        let job = self
            .destination_runner
            .run_job(
                TABLES_DATA_COMPONENT,
                json!({ "parameters": self.tables_data_parameters()? }),
                self.config.parameters.tags.tables_data.as_deref(),
            )
            .await?;
        // Completion of the copy is reported by the job itself.
        crate::info!(
            "Data of tables has been migrated (job {} finished with status \"{}\").",
            job.id,
            job.status
        );
        Ok(())
    }

    async fn migrate_snowflake_writers(&self) -> Result<(), MigrateError> {
        crate::info!("Migrating Snowflake writers");
        Self::run_checked_job(
            self.destination_runner.as_ref(),
            SNOWFLAKE_WRITER_MIGRATE_COMPONENT,
            json!({
                "sourceKbcUrl": self.config.source_url(),
                "#sourceKbcToken": self.config.source_token(),
                "dryRun": self.config.parameters.dry_run,
            }),
            self.config.parameters.tags.snowflake_writer_migrate.as_deref(),
            "Snowflake writers migration error: ",
        )
        .await?;
        crate::info!("Snowflake writers migrated");
        Ok(())
    }

    async fn migrate_orchestrations(&self) -> Result<(), MigrateError> {
        crate::info!("Migrating orchestrations");
        Self::run_checked_job(
            self.destination_runner.as_ref(),
            ORCHESTRATOR_MIGRATE_COMPONENT,
            json!({
                "sourceKbcUrl": self.config.source_url(),
                "#sourceKbcToken": self.config.source_token(),
            }),
            self.config.parameters.tags.orchestrator_migrate.as_deref(),
            "Orchestrations migration error: ",
        )
        .await?;
        crate::info!("Orchestrations migrated");
        Ok(())
    }
}
