use url::Url;

use crate::config::MigrationConfig;
use crate::migration::{
    ORCHESTRATOR_MIGRATE_COMPONENT, PROJECT_BACKUP_COMPONENT, PROJECT_RESTORE_COMPONENT,
    SNOWFLAKE_WRITER_MIGRATE_COMPONENT, TABLES_DATA_COMPONENT,
};
use crate::primitives::http_client::HttpError;
use crate::storage::{StorageApi, StorageIndex, TokenInfo};
use crate::MigrateError;

/// Components that may already exist in an otherwise empty destination project.
///
/// The migration itself runs as one of them.
const MIGRATION_TOOLING_COMPONENTS: [&str; 3] = [
    "keboola.app-project-migrate",
    TABLES_DATA_COMPONENT,
    "keboola.orchestrator",
];

/// The stack of a project URL: its host, e.g. `connection.eu-central-1.keboola.com`.
///
/// # Errors
/// A user error when `url` is not an absolute http(s) URL.
pub fn stack_from_project_url(url: &str) -> Result<String, MigrateError> {
    let invalid = || MigrateError::user(format!("Invalid destination project URL: \"{url}\"."));
    let parsed = Url::parse(url).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(ToString::to_string)
        .ok_or_else(invalid)
}

fn missing<'a>(index: &StorageIndex, required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|id| !index.has_component(id))
        .collect()
}

/// Checks that both stacks expose the applications the migration runs.
///
/// # Errors
/// A user error naming the missing applications of the source, or else of the destination.
pub fn check_migration_apps(
    source: &StorageIndex,
    destination: &StorageIndex,
) -> Result<(), MigrateError> {
    let missing_source = missing(source, &[PROJECT_BACKUP_COMPONENT]);
    if !missing_source.is_empty() {
        return Err(MigrateError::user(format!(
            "Missing \"{}\" application in the source project.",
            missing_source.join(", ")
        )));
    }

    let missing_destination = missing(
        destination,
        &[
            PROJECT_RESTORE_COMPONENT,
            ORCHESTRATOR_MIGRATE_COMPONENT,
            SNOWFLAKE_WRITER_MIGRATE_COMPONENT,
        ],
    );
    if !missing_destination.is_empty() {
        return Err(MigrateError::user(format!(
            "Missing \"{}\" application in the destination project.",
            missing_destination.join(", ")
        )));
    }
    Ok(())
}

/// Whether `project` has no buckets and no components besides the migration tooling.
///
/// # Errors
/// Storage API failures.
pub async fn check_if_project_empty(project: &dyn StorageApi) -> Result<bool, MigrateError> {
    let components = project.list_components().await?;
    if components
        .iter()
        .any(|component| !MIGRATION_TOOLING_COMPONENTS.contains(&component.id.as_str()))
    {
        return Ok(false);
    }

    Ok(project.list_buckets().await?.is_empty())
}

/// A project as seen by its token.
#[derive(Debug, Clone)]
pub struct ProjectInfo {
    /// The verified token and its project
    pub token: TokenInfo,
    /// Services and components of the project's stack
    pub index: StorageIndex,
}

/// Both projects, verified and ready to be migrated.
#[derive(Debug, Clone)]
pub struct Preflight {
    /// The project migrated from
    pub source: ProjectInfo,
    /// The project migrated to
    pub destination: ProjectInfo,
}

fn authorization_error(project: &str, e: &HttpError) -> MigrateError {
    MigrateError::User {
        message: format!("Cannot authorize {project} project: {e}"),
        code: e.status_code(),
    }
}

/// Verifies both tokens and checks that the migration can start.
///
/// # Errors
/// - a user error when a token is rejected, an application is missing or the
///   destination project is not empty while `checkEmptyProject` is set
/// - Storage API failures
pub async fn preflight(
    config: &MigrationConfig,
    source: &dyn StorageApi,
    destination: &dyn StorageApi,
) -> Result<Preflight, MigrateError> {
    let source_token = source
        .verify_token()
        .await
        .map_err(|e| authorization_error("source", &e))?;
    let destination_token = destination
        .verify_token()
        .await
        .map_err(|e| authorization_error("destination", &e))?;

    let source_index = source.index().await?;
    let destination_index = destination.index().await?;
    check_migration_apps(&source_index, &destination_index)?;

    if config.parameters.check_empty_project && !check_if_project_empty(destination).await? {
        return Err(MigrateError::user(format!(
            "Destination project \"{}\" is not empty.",
            destination_token.owner.name
        )));
    }

    crate::info!(
        "Restoring current project from project {} ({}) at {}",
        source_token.owner.name,
        source_token.owner.id,
        source.api_url()
    );

    Ok(Preflight {
        source: ProjectInfo {
            token: source_token,
            index: source_index,
        },
        destination: ProjectInfo {
            token: destination_token,
            index: destination_index,
        },
    })
}
