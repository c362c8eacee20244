use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::primitives::http_client::HttpError;
use crate::MigrateError;

/// [`StorageApi`] implemented over HTTP.
pub mod client;
pub use client::StorageClient;

/// Storage API of one project.
///
/// Reference: <https://keboola.docs.apiary.io/>
#[async_trait::async_trait]
pub trait StorageApi: Send + Sync {
    /// API URL of the project's stack, e.g. `https://connection.keboola.com`.
    fn api_url(&self) -> &str;

    /// `GET /v2/storage/tokens/verify`
    async fn verify_token(&self) -> Result<TokenInfo, HttpError>;

    /// `GET /v2/storage`: services and components of the stack.
    async fn index(&self) -> Result<StorageIndex, HttpError>;

    /// `POST /v2/storage/tickets`: a unique id, used as the backup id.
    async fn generate_id(&self) -> Result<String, HttpError>;

    /// `GET /v2/storage/dev-branches/`
    async fn list_dev_branches(&self) -> Result<Vec<DevBranch>, HttpError>;

    /// `GET /v2/storage/components?include=`: components with their configurations.
    async fn list_components(&self) -> Result<Vec<Component>, HttpError>;

    /// `GET /v2/storage/components/{component}/configs/{id}`
    async fn get_configuration(
        &self,
        component_id: &str,
        config_id: &str,
    ) -> Result<ComponentConfiguration, HttpError>;

    /// `PUT /v2/storage/components/{component}/configs/{id}`: replaces the configuration body.
    async fn update_configuration(
        &self,
        component_id: &str,
        configuration: &ComponentConfiguration,
    ) -> Result<(), HttpError>;

    /// `GET /v2/storage/buckets`
    async fn list_buckets(&self) -> Result<Vec<Bucket>, HttpError>;

    /// `GET /v2/storage/buckets/{bucket}/tables`
    async fn list_tables(&self, bucket_id: &str) -> Result<Vec<Table>, HttpError>;

    /// `GET /v2/storage/tables/{table}`
    async fn get_table(&self, table_id: &str) -> Result<Table, HttpError>;
}

/// Ids are numbers in some endpoints and strings in others.
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        String(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::String(id) => id,
        Id::Number(id) => id.to_string(),
    })
}

/// Result of the token verification.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    /// The project owning the token
    pub owner: TokenOwner,
}

/// A project.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenOwner {
    /// Project id
    pub id: u64,
    /// Project name
    pub name: String,
    /// Project features
    #[serde(default)]
    pub features: Vec<String>,
}

impl TokenOwner {
    /// Whether the project has `feature` enabled.
    #[must_use]
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// A service of the stack.
#[derive(Debug, Clone, Deserialize)]
pub struct Service {
    /// Service id, e.g. `queue` or `encryption`
    pub id: String,
    /// Base URL
    pub url: String,
}

/// A component available in the stack.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentInfo {
    /// Component id
    pub id: String,
}

/// The stack index.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageIndex {
    /// Services of the stack
    #[serde(default)]
    pub services: Vec<Service>,
    /// Components available to the project
    #[serde(default)]
    pub components: Vec<ComponentInfo>,
}

impl StorageIndex {
    /// URL of service `id`.
    ///
    /// # Errors
    /// `MigrateError::InvalidOperation` when the stack has no such service.
    pub fn service_url(&self, id: &str) -> Result<String, MigrateError> {
        self.services
            .iter()
            .find(|service| service.id == id)
            .map(|service| service.url.clone())
            .ok_or_else(|| {
                MigrateError::InvalidOperation(format!(
                    "Service \"{id}\" not found in the stack index."
                ))
            })
    }

    /// Whether component `id` is available.
    #[must_use]
    pub fn has_component(&self, id: &str) -> bool {
        self.components.iter().any(|component| component.id == id)
    }
}

/// A development branch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevBranch {
    /// Branch id
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Branch name
    pub name: String,
    /// Whether this is the main branch
    #[serde(default)]
    pub is_default: bool,
}

/// A configuration as listed under its component.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigurationSummary {
    /// Configuration id
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Configuration name
    #[serde(default)]
    pub name: String,
}

/// A component with its configurations.
#[derive(Debug, Clone, Deserialize)]
pub struct Component {
    /// Component id
    pub id: String,
    /// Configurations of the component
    #[serde(default)]
    pub configurations: Vec<ConfigurationSummary>,
}

/// A component configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfiguration {
    /// Configuration id
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Configuration name
    pub name: String,
    /// Configuration description
    #[serde(default)]
    pub description: String,
    /// Whether the configuration is disabled
    #[serde(default)]
    pub is_disabled: bool,
    /// The configuration body
    #[serde(default)]
    pub configuration: Value,
}

impl ComponentConfiguration {
    /// The `parameters.db` block, if present and not null.
    #[must_use]
    pub fn db(&self) -> Option<&Value> {
        self.configuration
            .get("parameters")
            .and_then(|parameters| parameters.get("db"))
            .filter(|db| !db.is_null())
    }

    /// Replaces the `parameters.db` block, creating `parameters` when missing.
    pub fn set_db(&mut self, db: Value) {
        if !self.configuration.is_object() {
            self.configuration = Value::Object(Map::new());
        }
        let parameters = &mut self.configuration["parameters"];
        if !parameters.is_object() {
            *parameters = Value::Object(Map::new());
        }
        parameters["db"] = db;
    }
}

/// A bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct Bucket {
    /// Bucket id, e.g. `in.c-main`
    pub id: String,
    /// Bucket name
    pub name: String,
}

/// A table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Table id, e.g. `in.c-main.orders`
    pub id: String,
    /// Table name
    pub name: String,
    /// Number of rows, unknown for tables never loaded
    #[serde(default)]
    pub rows_count: Option<u64>,
}
