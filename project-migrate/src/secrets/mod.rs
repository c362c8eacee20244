//! Migration of configurations together with their encrypted values.
//!
//! Encrypted values (`#`-prefixed keys) are bound to the stack and the project
//! that encrypted them, so a restored configuration cannot decrypt them. The
//! Encryption API of the source stack decrypts each configuration, encrypts it
//! for the destination project and saves it there.

use serde::Deserialize;
use serde_json::Value;

use crate::primitives::http_client::HttpError;
use crate::primitives::secret::Secret;

/// [`MigrationsApi`] implemented over HTTP.
pub mod client;
pub use client::EncryptionApiClient;

/// One configuration to migrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateConfigurationRequest {
    /// Storage API token of the source project
    pub source_token: Secret,
    /// Host name of the destination stack, e.g. `connection.eu-central-1.keboola.com`
    pub destination_stack: String,
    /// Storage API token of the destination project
    pub destination_token: Secret,
    /// Component id
    pub component_id: String,
    /// Configuration id
    pub config_id: String,
    /// Source branch the configuration is read from
    pub branch_id: String,
    /// Only report what would be migrated
    pub dry_run: bool,
}

/// Outcome of a configuration migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MigrateConfigurationResponse {
    /// Human-readable summary
    pub message: String,
    /// Issues that did not stop the migration
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Details of the migrated configuration
    #[serde(default)]
    pub data: Value,
}

/// The Encryption API migration endpoint.
#[async_trait::async_trait]
pub trait MigrationsApi: Send + Sync {
    /// Migrates one configuration with its secrets to the destination project.
    async fn migrate_configuration(
        &self,
        request: MigrateConfigurationRequest,
    ) -> Result<MigrateConfigurationResponse, HttpError>;
}
