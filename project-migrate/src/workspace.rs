use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::primitives::secret::Secret;
use crate::storage::StorageApi;
use crate::MigrateError;

/// The `parameters.db` block of a Snowflake writer configuration.
///
/// Only `user` is interpreted; every other key is carried over as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceCredentials {
    /// Workspace user, the identity of the workspace
    pub user: String,
    /// Workspace password
    #[serde(rename = "#password", default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
    /// Host, database, schema, warehouse and anything else the writer stores
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkspaceCredentials {
    /// Reads a `db` block; blocks without a string `user` are no workspace.
    fn from_db(db: Option<&Value>) -> Option<Self> {
        db.and_then(|db| serde_json::from_value(db.clone()).ok())
    }
}

/// What [`WorkspaceDeduplicator::share_workspace`] did with a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceOutcome {
    /// The source configuration has no workspace.
    NoWorkspace,
    /// First configuration using the workspace; its destination workspace is remembered.
    Registered,
    /// The destination configuration was pointed at an already migrated workspace.
    Reused,
    /// The destination configuration has no workspace to remember.
    DestinationMissing,
}

/// Keeps writer configurations that shared a workspace in the source sharing one in the destination.
///
/// Migrating a configuration with its secrets creates a new destination
/// workspace for every configuration. The first configuration of each source
/// workspace keeps its new workspace; later ones are switched to it.
/// Owned by a single migration run.
#[derive(Debug, Default)]
pub struct WorkspaceDeduplicator {
    workspaces: HashMap<String, WorkspaceCredentials>,
}

impl WorkspaceDeduplicator {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct source workspaces seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    /// Whether no workspace was registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    /// Applies the sharing rule to a freshly migrated configuration.
    ///
    /// # Errors
    /// Storage API failures of either project.
    pub async fn share_workspace(
        &mut self,
        source: &dyn StorageApi,
        destination: &dyn StorageApi,
        component_id: &str,
        config_id: &str,
    ) -> Result<WorkspaceOutcome, MigrateError> {
        let source_config = source.get_configuration(component_id, config_id).await?;
        let Some(source_workspace) = WorkspaceCredentials::from_db(source_config.db()) else {
            crate::info!(
                "Configuration with ID '{config_id}' ({component_id}) does not have a Snowflake workspace."
            );
            return Ok(WorkspaceOutcome::NoWorkspace);
        };

        let mut destination_config = destination
            .get_configuration(component_id, config_id)
            .await?;

        if let Some(shared) = self.workspaces.get(&source_workspace.user) {
            destination_config.set_db(serde_json::to_value(shared)?);
            destination
                .update_configuration(component_id, &destination_config)
                .await?;
            crate::info!(
                "Used existing Snowflake workspace '{}' for configuration with ID '{config_id}' ({component_id}).",
                source_workspace.user
            );
            return Ok(WorkspaceOutcome::Reused);
        }

        let Some(destination_workspace) = WorkspaceCredentials::from_db(destination_config.db())
        else {
            crate::warn!(
                "Migrated configuration with ID '{config_id}' ({component_id}) does not have a Snowflake workspace."
            );
            return Ok(WorkspaceOutcome::DestinationMissing);
        };
        crate::debug!(
            "workspace.registered source_user={} destination_user={} config={config_id}",
            source_workspace.user,
            destination_workspace.user
        );
        self.workspaces
            .insert(source_workspace.user, destination_workspace);
        Ok(WorkspaceOutcome::Registered)
    }
}
