//! Read credentials of a project backup and the restore job built from them.
//!
//! `keboola.project-backup` answers the `generate-read-credentials` action with
//! short-lived credentials to the storage the backup is written to. The shape of
//! the answer depends on the backend of the source stack (AWS S3, Azure Blob
//! Storage or Google Cloud Storage); it is parsed once into [`BackupCredentials`]
//! and consumed by [`build_restore_payload`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::MigrationConfig;
use crate::primitives::secret::Secret;
use crate::MigrateError;

/// Credentials to read a project backup, one variant per storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupCredentials {
    /// AWS S3
    S3 {
        /// `s3://` URI of the backup
        backup_uri: String,
        /// Access key id
        access_key_id: String,
        /// Secret access key
        secret_access_key: Secret,
        /// STS session token
        session_token: Secret,
    },
    /// Azure Blob Storage
    Abs {
        /// Container holding the backup
        container: String,
        /// SAS connection string
        connection_string: Secret,
    },
    /// Google Cloud Storage
    Gcs {
        /// GCP project id
        project_id: String,
        /// Bucket holding the backup
        bucket: String,
        /// `gs://` URI of the backup
        backup_uri: String,
        /// OAuth access token
        access_token: Secret,
        /// Token lifetime, passed through as received
        expires_in: Value,
        /// Token type, usually `Bearer`
        token_type: String,
    },
}

impl BackupCredentials {
    /// Backend name, safe to log.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "s3",
            Self::Abs { .. } => "abs",
            Self::Gcs { .. } => "gcs",
        }
    }

    /// Parses the result of the `generate-read-credentials` sync action.
    ///
    /// # Errors
    /// `MigrateError::UnrecognizedBackupCredentials` when the result matches no known backend.
    pub fn from_action_result(result: Value) -> Result<Self, MigrateError> {
        let raw: RawCredentials = serde_json::from_value(result)
            .map_err(|_| MigrateError::UnrecognizedBackupCredentials)?;

        Ok(match raw {
            RawCredentials::S3 {
                backup_uri,
                credentials,
            } => Self::S3 {
                backup_uri,
                access_key_id: credentials.access_key_id,
                secret_access_key: credentials.secret_access_key,
                session_token: credentials.session_token,
            },
            RawCredentials::Abs {
                container,
                credentials,
            } => Self::Abs {
                container,
                connection_string: credentials.connection_string,
            },
            RawCredentials::Gcs {
                project_id,
                bucket,
                backup_uri,
                credentials,
            } => Self::Gcs {
                project_id,
                bucket,
                backup_uri,
                access_token: credentials.access_token,
                expires_in: credentials.expires_in,
                token_type: credentials.token_type,
            },
        })
    }
}

// Variant order matters: GCS answers also carry `backupUri`, S3 is told apart by its credentials.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCredentials {
    #[serde(rename_all = "camelCase")]
    S3 {
        backup_uri: String,
        credentials: RawS3Credentials,
    },
    Abs {
        container: String,
        credentials: RawAbsCredentials,
    },
    #[serde(rename_all = "camelCase")]
    Gcs {
        project_id: String,
        bucket: String,
        backup_uri: String,
        credentials: RawGcsCredentials,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawS3Credentials {
    access_key_id: String,
    secret_access_key: Secret,
    session_token: Secret,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAbsCredentials {
    connection_string: Secret,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGcsCredentials {
    access_token: Secret,
    expires_in: Value,
    token_type: String,
}

#[derive(Serialize)]
enum RestoreBackend {
    #[serde(rename = "s3")]
    S3 {
        #[serde(rename = "backupUri")]
        backup_uri: String,
        #[serde(rename = "accessKeyId")]
        access_key_id: String,
        #[serde(rename = "#secretAccessKey")]
        secret_access_key: Secret,
        #[serde(rename = "#sessionToken")]
        session_token: Secret,
    },
    #[serde(rename = "abs")]
    Abs {
        container: String,
        #[serde(rename = "#connectionString")]
        connection_string: Secret,
    },
    #[serde(rename = "gcs")]
    Gcs {
        #[serde(rename = "projectId")]
        project_id: String,
        bucket: String,
        #[serde(rename = "backupUri")]
        backup_uri: String,
        credentials: GcsToken,
    },
}

#[derive(Serialize)]
struct GcsToken {
    #[serde(rename = "#accessToken")]
    access_token: Secret,
    #[serde(rename = "expiresIn")]
    expires_in: Value,
    #[serde(rename = "tokenType")]
    token_type: String,
}

impl From<BackupCredentials> for RestoreBackend {
    fn from(credentials: BackupCredentials) -> Self {
        match credentials {
            BackupCredentials::S3 {
                backup_uri,
                access_key_id,
                secret_access_key,
                session_token,
            } => Self::S3 {
                backup_uri,
                access_key_id,
                secret_access_key,
                session_token,
            },
            BackupCredentials::Abs {
                container,
                connection_string,
            } => Self::Abs {
                container,
                connection_string,
            },
            BackupCredentials::Gcs {
                project_id,
                bucket,
                backup_uri,
                access_token,
                expires_in,
                token_type,
            } => Self::Gcs {
                project_id,
                bucket,
                backup_uri,
                credentials: GcsToken {
                    access_token,
                    expires_in,
                    token_type,
                },
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
struct RestoreParameters {
    #[serde(flatten)]
    backend: RestoreBackend,
    use_default_backend: bool,
    restore_configs: bool,
    dry_run: bool,
    restore_permanent_files: bool,
    restore_triggers: bool,
    restore_notifications: bool,
    restore_buckets: bool,
    restore_tables: bool,
    restore_project_metadata: bool,
    check_empty_project: bool,
}

/// Builds the `keboola.project-restore` job data: exactly one backend block plus the restore flags.
///
/// Configurations are restored by the backup only when secrets are not
/// migrated; otherwise they are copied later, with their secrets, by the
/// Encryption API.
///
/// # Errors
/// `MigrateError::Json` if the payload cannot be serialized.
pub fn build_restore_payload(
    credentials: BackupCredentials,
    config: &MigrationConfig,
) -> Result<Value, MigrateError> {
    let p = &config.parameters;
    let parameters = RestoreParameters {
        backend: credentials.into(),
        use_default_backend: true,
        restore_configs: !p.migrate_secrets,
        dry_run: p.dry_run,
        restore_permanent_files: p.migrate_permanent_files,
        restore_triggers: p.migrate_triggers,
        restore_notifications: p.migrate_notifications,
        restore_buckets: p.migrate_buckets,
        restore_tables: p.migrate_tables,
        restore_project_metadata: p.migrate_project_metadata,
        check_empty_project: p.check_empty_project,
    };
    Ok(json!({ "parameters": serde_json::to_value(parameters)? }))
}
