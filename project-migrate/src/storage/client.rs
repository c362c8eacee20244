use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use super::{
    string_or_number, Bucket, Component, ComponentConfiguration, DevBranch, StorageApi,
    StorageIndex, Table, TokenInfo,
};
use crate::primitives::http_client::{fetch_json, HttpClient, HttpError, HttpRequest};
use crate::primitives::secret::Secret;

/// Storage API client of one project.
pub struct StorageClient {
    http: Arc<dyn HttpClient>,
    api_url: String,
    token: Secret,
    run_id: Option<String>,
}

#[derive(Deserialize)]
struct Ticket {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
}

impl StorageClient {
    /// Creates a client for the project owning `token` at `api_url`.
    #[must_use]
    pub fn new(
        http: Arc<dyn HttpClient>,
        api_url: &str,
        token: Secret,
        run_id: Option<String>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            run_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/storage{path}", self.api_url)
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        let request = request.header("X-StorageApi-Token", self.token.expose());
        match &self.run_id {
            Some(run_id) => request.header("X-KBC-RunId", run_id),
            None => request,
        }
    }

    async fn get<T: serde::de::DeserializeOwned + Send>(
        &self,
        path: &str,
    ) -> Result<T, HttpError> {
        fetch_json(
            self.http.as_ref(),
            self.authorized(HttpRequest::get(self.url(path))),
        )
        .await
    }
}

#[async_trait::async_trait]
impl StorageApi for StorageClient {
    fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn verify_token(&self) -> Result<TokenInfo, HttpError> {
        self.get("/tokens/verify").await
    }

    async fn index(&self) -> Result<StorageIndex, HttpError> {
        self.get("").await
    }

    async fn generate_id(&self) -> Result<String, HttpError> {
        let request = self.authorized(HttpRequest::post(self.url("/tickets"), &json!({})));
        let ticket: Ticket = fetch_json(self.http.as_ref(), request).await?;
        Ok(ticket.id)
    }

    async fn list_dev_branches(&self) -> Result<Vec<DevBranch>, HttpError> {
        self.get("/dev-branches/").await
    }

    async fn list_components(&self) -> Result<Vec<Component>, HttpError> {
        self.get("/components?include=").await
    }

    async fn get_configuration(
        &self,
        component_id: &str,
        config_id: &str,
    ) -> Result<ComponentConfiguration, HttpError> {
        self.get(&format!("/components/{component_id}/configs/{config_id}"))
            .await
    }

    async fn update_configuration(
        &self,
        component_id: &str,
        configuration: &ComponentConfiguration,
    ) -> Result<(), HttpError> {
        let body = json!({
            "name": configuration.name,
            "description": configuration.description,
            "isDisabled": configuration.is_disabled,
            "configuration": configuration.configuration,
            "changeDescription": "Shared Snowflake workspace of a migrated configuration",
        });
        let request = self.authorized(HttpRequest::put(
            self.url(&format!(
                "/components/{component_id}/configs/{}",
                configuration.id
            )),
            &body,
        ));
        self.http.fetch(request).await?;
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>, HttpError> {
        self.get("/buckets").await
    }

    async fn list_tables(&self, bucket_id: &str) -> Result<Vec<Table>, HttpError> {
        self.get(&format!("/buckets/{bucket_id}/tables")).await
    }

    async fn get_table(&self, table_id: &str) -> Result<Table, HttpError> {
        self.get(&format!("/tables/{table_id}")).await
    }
}
