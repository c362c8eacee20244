//! Job execution surfaces.
//!
//! Components are run either through the Job Queue (projects with the
//! `queuev2` feature) or through the legacy Syrup runner. Both implement
//! [`JobRunner`]; the rest of the crate never depends on which one it talks to.

use std::{fmt, sync::Arc};

use serde::Deserialize;
use serde_json::Value;

use crate::primitives::http_client::{HttpClient, HttpError};
use crate::primitives::secret::Secret;
use crate::storage::{string_or_number, StorageIndex, TokenInfo};
use crate::MigrateError;

/// Waiting for jobs with exponential backoff.
pub mod poller;
/// Job Queue and sync-actions service.
pub mod queue;
/// Legacy Syrup runner and docker-runner sync actions.
pub mod syrup;

pub use poller::{delay_for_attempt, JobPoller, JobQueue, Sleeper, TokioSleeper};
pub use queue::QueueJobRunner;
pub use syrup::SyrupJobRunner;

/// Project feature enabling the Job Queue.
pub const QUEUE_V2_FEATURE: &str = "queuev2";

/// Runs components in one project.
#[async_trait::async_trait]
pub trait JobRunner: Send + Sync {
    /// Runs a component job with `data` as its configuration and waits until it finishes.
    ///
    /// Returns the finished job whatever its status; the caller decides
    /// whether a non-success status is fatal.
    async fn run_job(
        &self,
        component_id: &str,
        data: Value,
        tag: Option<&str>,
    ) -> Result<Job, HttpError>;

    /// Calls a synchronous component action and returns its result.
    async fn run_sync_action(
        &self,
        component_id: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, HttpError>;

    /// Whether orchestrations of this project can be migrated.
    ///
    /// Only projects still on the legacy runner have orchestrations of the
    /// old orchestrator that need migrating.
    fn supports_orchestration_migration(&self) -> bool;
}

/// Status of a job, as reported by both the queue and Syrup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, not scheduled yet
    Created,
    /// Scheduled
    Waiting,
    /// Running
    Processing,
    /// Finished successfully
    Success,
    /// Finished with warnings
    Warning,
    /// Failed
    Error,
    /// Being terminated
    Terminating,
    /// Terminated by a user
    Terminated,
    /// Cancelled before it started
    Cancelled,
    /// Any status this crate does not know about
    #[serde(other)]
    Unknown,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Created => "created",
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(status)
    }
}

/// A job as returned by the job detail endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Job id
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Current status
    pub status: JobStatus,
    /// Whether the job reached a terminal status
    #[serde(default)]
    pub is_finished: bool,
    /// Job result, `{"message": "..."}` for failed jobs
    #[serde(default)]
    pub result: Value,
}

impl Job {
    /// Whether the job finished successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }

    /// The message the component left in the job result.
    #[must_use]
    pub fn result_message(&self) -> String {
        self.result
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(
                || format!("Job {} finished with status \"{}\".", self.id, self.status),
                ToString::to_string,
            )
    }
}

/// A submitted job, used to poll its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Job id
    pub id: String,
    /// Component the job runs
    pub component_id: String,
}

/// Creates the runner matching the project of `token`.
///
/// # Errors
/// `MigrateError::InvalidOperation` when a service the runner needs is missing from the stack index.
pub fn create_job_runner(
    token: &TokenInfo,
    index: &StorageIndex,
    storage_token: &Secret,
    http: Arc<dyn HttpClient>,
    sleeper: Arc<dyn Sleeper>,
) -> Result<Arc<dyn JobRunner>, MigrateError> {
    let poller = JobPoller::new(sleeper);
    if token.owner.has_feature(QUEUE_V2_FEATURE) {
        crate::debug!(
            "job_runner.selected kind=queue project={}",
            token.owner.id
        );
        Ok(Arc::new(QueueJobRunner::new(
            http,
            &index.service_url("queue")?,
            &index.service_url("sync-actions")?,
            storage_token.clone(),
            poller,
        )))
    } else {
        crate::debug!(
            "job_runner.selected kind=syrup project={}",
            token.owner.id
        );
        Ok(Arc::new(SyrupJobRunner::new(
            http,
            &index.service_url("syrup")?,
            &index.service_url("docker-runner")?,
            storage_token.clone(),
            poller,
        )))
    }
}
