use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{Job, JobHandle, JobPoller, JobQueue, JobRunner};
use crate::primitives::http_client::{fetch_json, HttpClient, HttpError, HttpRequest};
use crate::primitives::secret::Secret;
use crate::storage::string_or_number;

/// Runs jobs through the Job Queue and actions through the sync-actions service.
pub struct QueueJobRunner {
    http: Arc<dyn HttpClient>,
    queue_url: String,
    sync_actions_url: String,
    token: Secret,
    poller: JobPoller,
}

#[derive(Deserialize)]
struct CreatedJob {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
}

impl QueueJobRunner {
    /// Creates a runner for the project owning `token`.
    #[must_use]
    pub fn new(
        http: Arc<dyn HttpClient>,
        queue_url: &str,
        sync_actions_url: &str,
        token: Secret,
        poller: JobPoller,
    ) -> Self {
        Self {
            http,
            queue_url: queue_url.trim_end_matches('/').to_string(),
            sync_actions_url: sync_actions_url.trim_end_matches('/').to_string(),
            token,
            poller,
        }
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request.header("X-StorageApi-Token", self.token.expose())
    }
}

#[async_trait::async_trait]
impl JobQueue for QueueJobRunner {
    async fn create_job(
        &self,
        component_id: &str,
        data: Value,
        tag: Option<&str>,
    ) -> Result<JobHandle, HttpError> {
        let mut body = json!({
            "component": component_id,
            "mode": "run",
            "configData": data,
        });
        if let Some(tag) = tag {
            body["tag"] = json!(tag);
        }

        let request = self.authorized(HttpRequest::post(format!("{}/jobs", self.queue_url), &body));
        let created: CreatedJob = fetch_json(self.http.as_ref(), request).await?;
        Ok(JobHandle {
            id: created.id,
            component_id: component_id.to_string(),
        })
    }

    async fn get_job(&self, handle: &JobHandle) -> Result<Job, HttpError> {
        let request =
            self.authorized(HttpRequest::get(format!("{}/jobs/{}", self.queue_url, handle.id)));
        fetch_json(self.http.as_ref(), request).await
    }
}

#[async_trait::async_trait]
impl JobRunner for QueueJobRunner {
    async fn run_job(
        &self,
        component_id: &str,
        data: Value,
        tag: Option<&str>,
    ) -> Result<Job, HttpError> {
        self.poller
            .submit_and_await(self, component_id, data, tag)
            .await
    }

    async fn run_sync_action(
        &self,
        component_id: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, HttpError> {
        let body = json!({
            "componentId": component_id,
            "action": action,
            "configData": data,
        });
        let request = self.authorized(HttpRequest::post(
            format!("{}/actions", self.sync_actions_url),
            &body,
        ));
        fetch_json(self.http.as_ref(), request).await
    }

    fn supports_orchestration_migration(&self) -> bool {
        false
    }
}
