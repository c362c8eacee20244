use std::sync::Arc;

use serde_json::json;

use super::{MigrateConfigurationRequest, MigrateConfigurationResponse, MigrationsApi};
use crate::primitives::http_client::{fetch_json, HttpClient, HttpError, HttpRequest};
use crate::primitives::secret::Secret;

/// Client of the Encryption API of the source stack.
///
/// Authenticated with a Manage API token, as migrating reads configurations
/// across the boundary of a single project.
pub struct EncryptionApiClient {
    http: Arc<dyn HttpClient>,
    url: String,
    manage_token: Secret,
}

impl EncryptionApiClient {
    /// Creates a client of the Encryption API at `url`.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>, url: &str, manage_token: Secret) -> Self {
        Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            manage_token,
        }
    }
}

#[async_trait::async_trait]
impl MigrationsApi for EncryptionApiClient {
    async fn migrate_configuration(
        &self,
        request: MigrateConfigurationRequest,
    ) -> Result<MigrateConfigurationResponse, HttpError> {
        let body = json!({
            "sourceToken": request.source_token.expose(),
            "destinationStack": request.destination_stack,
            "destinationToken": request.destination_token.expose(),
            "componentId": request.component_id,
            "configId": request.config_id,
            "branchId": request.branch_id,
            "dryRun": request.dry_run,
        });
        let http_request = HttpRequest::post(format!("{}/migrate-configuration", self.url), &body)
            .header("X-KBC-ManageApiToken", self.manage_token.expose());
        fetch_json(self.http.as_ref(), http_request).await
    }
}
