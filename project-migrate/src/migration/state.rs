use super::MigrationStep;
use crate::restore::BackupCredentials;
use crate::workspace::WorkspaceDeduplicator;
use crate::MigrateError;

/// Summary of a migration run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationRunSummary {
    /// Steps that ran to completion, in order
    pub completed_steps: Vec<MigrationStep>,
    /// Steps that did not apply to the run
    pub skipped_steps: Vec<MigrationStep>,
    /// Configurations migrated with their secrets
    pub configurations_migrated: u32,
    /// Configurations the Encryption API refused to migrate
    pub configurations_failed: u32,
    /// Obsolete components left out of the secret migration
    pub obsolete_components_skipped: u32,
    /// Writer configurations switched to an already migrated workspace
    pub workspaces_reused: u32,
    /// Wall-clock duration of the run
    pub duration_ms: i64,
}

/// State carried between the steps of one run.
#[derive(Debug, Default)]
pub(crate) struct MigrationRun {
    backup_id: Option<String>,
    credentials: Option<BackupCredentials>,
    pub(crate) workspaces: WorkspaceDeduplicator,
    pub(crate) summary: MigrationRunSummary,
}

impl MigrationRun {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_backup(&mut self, backup_id: String, credentials: BackupCredentials) {
        self.backup_id = Some(backup_id);
        self.credentials = Some(credentials);
    }

    pub(crate) fn backup_id(&self) -> Result<&str, MigrateError> {
        self.backup_id.as_deref().ok_or_else(|| {
            MigrateError::InvalidOperation("Backup id requested before it was generated.".to_string())
        })
    }

    /// The read credentials, handed over to the restore exactly once.
    pub(crate) fn take_credentials(&mut self) -> Result<BackupCredentials, MigrateError> {
        self.credentials.take().ok_or_else(|| {
            MigrateError::InvalidOperation("Backup credentials are not available.".to_string())
        })
    }
}
