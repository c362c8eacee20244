use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::primitives::secret::Secret;
use crate::MigrateError;

const DEFAULT_SOURCE_URL: &str = "https://connection.keboola.com";
const DEFAULT_DATA_DIR: &str = "/data";

/// How the direct table-data step copies data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    /// Through the Storage API of both projects.
    #[default]
    Sapi,
    /// Directly between the backend databases, using the `db` parameters.
    Database,
}

/// Connection to the destination backend database, used in [`DataMode::Database`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host
    pub host: String,
    /// User name
    pub username: String,
    /// Password
    #[serde(rename = "#password")]
    pub password: Secret,
    /// Snowflake warehouse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
}

/// Optional job tags, selecting a specific component image per step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTags {
    /// Tag of the `keboola.project-backup` job
    pub backup: Option<String>,
    /// Tag of the `keboola.project-restore` job
    pub restore: Option<String>,
    /// Tag of the direct table-data job
    pub tables_data: Option<String>,
    /// Tag of the Snowflake writers migration job
    pub snowflake_writer_migrate: Option<String>,
    /// Tag of the orchestrations migration job
    pub orchestrator_migrate: Option<String>,
}

const fn default_true() -> bool {
    true
}

fn default_source_url() -> String {
    DEFAULT_SOURCE_URL.to_string()
}

/// The `parameters` object of `config.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct Parameters {
    /// API URL of the source project
    #[serde(default = "default_source_url")]
    pub source_kbc_url: String,
    /// Storage API token of the source project
    #[serde(rename = "#sourceKbcToken")]
    pub source_kbc_token: Secret,
    /// Manage API token of the source stack, needed to migrate secrets
    #[serde(rename = "#sourceManageToken", default)]
    pub source_manage_token: Option<Secret>,
    /// Copy table data directly instead of through the backup
    #[serde(default = "default_true")]
    pub direct_data_migration: bool,
    /// Migrate configurations with their encrypted values
    #[serde(default)]
    pub migrate_secrets: bool,
    /// Restore permanent files
    #[serde(default = "default_true")]
    pub migrate_permanent_files: bool,
    /// Restore triggers
    #[serde(default = "default_true")]
    pub migrate_triggers: bool,
    /// Restore notifications
    #[serde(default = "default_true")]
    pub migrate_notifications: bool,
    /// Restore the project structure only, no table data
    #[serde(default, alias = "exportStructureOnly")]
    pub migrate_structure_only: bool,
    /// Restore buckets
    #[serde(default = "default_true")]
    pub migrate_buckets: bool,
    /// Restore tables
    #[serde(default = "default_true")]
    pub migrate_tables: bool,
    /// Restore project metadata
    #[serde(default = "default_true")]
    pub migrate_project_metadata: bool,
    /// Allow migrating between regions
    #[serde(default)]
    pub skip_region_validation: bool,
    /// Refuse to restore into a project that already contains data
    #[serde(default = "default_true")]
    pub check_empty_project: bool,
    /// Report what would be done without writing to the destination
    #[serde(default)]
    pub dry_run: bool,
    /// Keep table timestamps when copying data
    #[serde(default)]
    pub preserve_timestamp: bool,
    /// The source project uses its own database (BYODB)
    #[serde(default)]
    pub is_source_byodb: bool,
    /// Identifier of the source BYODB
    #[serde(default)]
    pub source_byodb: String,
    /// Workspace schemas copied by the direct table-data step
    #[serde(default)]
    pub include_workspace_schemas: Vec<String>,
    /// How the direct table-data step copies data
    #[serde(default)]
    pub data_mode: DataMode,
    /// Destination database connection, only in [`DataMode::Database`]
    #[serde(default)]
    pub db: Option<DatabaseConfig>,
    /// Optional per-step job tags
    #[serde(default)]
    pub tags: StepTags,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    parameters: Parameters,
}

impl Parameters {
    /// Loads `parameters` from a platform `config.json`.
    ///
    /// # Errors
    /// `MigrateError::Generic` when the file cannot be read, `MigrateError::InvalidConfig`
    /// when it does not describe a valid migration.
    pub fn load(path: &Path) -> Result<Self, MigrateError> {
        let raw = MigrateError::from_anyhow_result(
            std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read configuration file {}", path.display())),
        )?;
        Self::from_json(&raw)
    }

    /// Parses the content of a `config.json`.
    ///
    /// # Errors
    /// `MigrateError::InvalidConfig` for malformed JSON or missing required parameters.
    pub fn from_json(raw: &str) -> Result<Self, MigrateError> {
        let file: ConfigFile = serde_json::from_str(raw)
            .map_err(|e| MigrateError::InvalidConfig(format!("Invalid configuration: {e}")))?;
        Ok(file.parameters)
    }
}

/// Values provided by the platform through the environment.
#[derive(Debug, Clone)]
pub struct Environment {
    /// API URL of the destination project (`KBC_URL`)
    pub destination_url: String,
    /// Storage API token of the destination project (`KBC_TOKEN`)
    pub destination_token: Secret,
    /// Run id of the job executing the migration (`KBC_RUNID`)
    pub run_id: Option<String>,
    /// Data directory containing `config.json` (`KBC_DATADIR`)
    pub data_dir: PathBuf,
}

impl Environment {
    /// Reads the process environment.
    ///
    /// # Errors
    /// `MigrateError::InvalidConfig` when `KBC_URL` or `KBC_TOKEN` is missing.
    pub fn from_env() -> Result<Self, MigrateError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the environment from an arbitrary variable lookup.
    ///
    /// # Errors
    /// `MigrateError::InvalidConfig` when `KBC_URL` or `KBC_TOKEN` is missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, MigrateError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    MigrateError::InvalidConfig(format!(
                        "Environment variable \"{key}\" is not set."
                    ))
                })
        };

        Ok(Self {
            destination_url: required("KBC_URL")?,
            destination_token: Secret::new(required("KBC_TOKEN")?),
            run_id: lookup("KBC_RUNID").filter(|value| !value.is_empty()),
            data_dir: lookup("KBC_DATADIR")
                .filter(|value| !value.is_empty())
                .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
        })
    }

    /// Path of the component configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }
}

/// Everything a migration run needs to know, validated once and never mutated.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Parameters of the component configuration
    pub parameters: Parameters,
    /// API URL of the destination project
    pub destination_url: String,
    /// Storage API token of the destination project
    pub destination_token: Secret,
}

impl MigrationConfig {
    /// Validates the parameters against the rules that cannot be expressed by the schema.
    ///
    /// # Errors
    /// `MigrateError::InvalidConfig` naming the offending parameter.
    pub fn new(
        parameters: Parameters,
        destination_url: String,
        destination_token: Secret,
    ) -> Result<Self, MigrateError> {
        if parameters.source_kbc_url.trim().is_empty() {
            return Err(MigrateError::InvalidConfig(
                "Parameter \"sourceKbcUrl\" cannot be empty.".to_string(),
            ));
        }
        if parameters.source_kbc_token.is_empty() {
            return Err(MigrateError::InvalidConfig(
                "Parameter \"#sourceKbcToken\" cannot be empty.".to_string(),
            ));
        }
        let has_manage_token = parameters
            .source_manage_token
            .as_ref()
            .is_some_and(|token| !token.is_empty());
        if parameters.migrate_secrets && !has_manage_token {
            return Err(MigrateError::InvalidConfig(
                "Parameter \"#sourceManageToken\" is required when \"migrateSecrets\" is set to true."
                    .to_string(),
            ));
        }
        match (parameters.data_mode, &parameters.db) {
            (DataMode::Sapi, Some(_)) => {
                return Err(MigrateError::InvalidConfig(
                    "Parameter \"db\" is allowed only when \"dataMode\" is set to \"database\"."
                        .to_string(),
                ));
            }
            (DataMode::Database, None) => {
                return Err(MigrateError::InvalidConfig(
                    "Parameter \"db\" is required when \"dataMode\" is set to \"database\"."
                        .to_string(),
                ));
            }
            _ => {}
        }

        Ok(Self {
            parameters,
            destination_url,
            destination_token,
        })
    }

    /// API URL of the source project.
    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.parameters.source_kbc_url
    }

    /// Storage API token of the source project.
    #[must_use]
    pub const fn source_token(&self) -> &Secret {
        &self.parameters.source_kbc_token
    }

    /// Whether the backup exports the project structure without table data.
    ///
    /// Data is left out when it is copied directly by a later step or when
    /// only the structure is migrated.
    #[must_use]
    pub const fn export_structure_only(&self) -> bool {
        self.parameters.direct_data_migration || self.parameters.migrate_structure_only
    }

    /// Whether table data is copied directly, outside the backup.
    #[must_use]
    pub const fn migrates_table_data_directly(&self) -> bool {
        let p = &self.parameters;
        p.direct_data_migration && !p.migrate_structure_only && p.migrate_buckets && p.migrate_tables
    }

    /// Whether row counts of both projects are compared after the run.
    ///
    /// A dry run writes nothing and a structure-only run leaves every table empty.
    #[must_use]
    pub const fn runs_post_migration_check(&self) -> bool {
        !self.parameters.dry_run && !self.parameters.migrate_structure_only
    }
}
