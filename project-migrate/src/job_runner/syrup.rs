use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{Job, JobHandle, JobPoller, JobQueue, JobRunner};
use crate::primitives::http_client::{fetch_json, HttpClient, HttpError, HttpRequest};
use crate::primitives::secret::Secret;
use crate::storage::string_or_number;

/// Runs jobs through the legacy Syrup runner and actions through docker-runner.
pub struct SyrupJobRunner {
    http: Arc<dyn HttpClient>,
    syrup_url: String,
    docker_runner_url: String,
    token: Secret,
    poller: JobPoller,
}

#[derive(Deserialize)]
struct QueuedJob {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
}

impl SyrupJobRunner {
    /// Creates a runner for the project owning `token`.
    #[must_use]
    pub fn new(
        http: Arc<dyn HttpClient>,
        syrup_url: &str,
        docker_runner_url: &str,
        token: Secret,
        poller: JobPoller,
    ) -> Self {
        Self {
            http,
            syrup_url: syrup_url.trim_end_matches('/').to_string(),
            docker_runner_url: docker_runner_url.trim_end_matches('/').to_string(),
            token,
            poller,
        }
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request.header("X-StorageApi-Token", self.token.expose())
    }
}

#[async_trait::async_trait]
impl JobQueue for SyrupJobRunner {
    async fn create_job(
        &self,
        component_id: &str,
        data: Value,
        tag: Option<&str>,
    ) -> Result<JobHandle, HttpError> {
        let mut body = json!({ "configData": data });
        if let Some(tag) = tag {
            body["tag"] = json!(tag);
        }

        let request = self.authorized(HttpRequest::post(
            format!("{}/docker/{component_id}/run", self.syrup_url),
            &body,
        ));
        let queued: QueuedJob = fetch_json(self.http.as_ref(), request).await?;
        Ok(JobHandle {
            id: queued.id,
            component_id: component_id.to_string(),
        })
    }

    async fn get_job(&self, handle: &JobHandle) -> Result<Job, HttpError> {
        let request = self.authorized(HttpRequest::get(format!(
            "{}/queue/job/{}",
            self.syrup_url, handle.id
        )));
        fetch_json(self.http.as_ref(), request).await
    }
}

#[async_trait::async_trait]
impl JobRunner for SyrupJobRunner {
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
        let request = self.authorized(HttpRequest::post(
            format!(
                "{}/docker/{component_id}/action/{action}",
                self.docker_runner_url
            ),
            &data,
        ));
        fetch_json(self.http.as_ref(), request).await
    }

    fn supports_orchestration_migration(&self) -> bool {
        true
    }
}
