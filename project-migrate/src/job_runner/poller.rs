use std::{sync::Arc, time::Duration};

use serde_json::Value;

use super::{Job, JobHandle};
use crate::primitives::http_client::HttpError;

/// Upper bound of the delay between two status reads, in seconds.
pub const MAX_DELAY_SECONDS: u64 = 10;

/// Delay after the `attempt`-th status read of an unfinished job: `min(2^attempt, 10)` seconds.
#[must_use]
pub fn delay_for_attempt(attempt: u32) -> Duration {
    let seconds = 2_u64
        .checked_pow(attempt)
        .unwrap_or(u64::MAX)
        .min(MAX_DELAY_SECONDS);
    Duration::from_secs(seconds)
}

/// Suspends the poller between two status reads.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleeps for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// The two calls the poller needs from a job API.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Submits a job and returns its handle.
    async fn create_job(
        &self,
        component_id: &str,
        data: Value,
        tag: Option<&str>,
    ) -> Result<JobHandle, HttpError>;

    /// Reads the current state of a job.
    async fn get_job(&self, handle: &JobHandle) -> Result<Job, HttpError>;
}

/// Submits jobs and waits for them to finish.
///
/// There is no upper bound on the number of status reads; callers that need
/// a deadline wrap the call in `tokio::time::timeout`. Transport errors end
/// the wait immediately and are not retried.
#[derive(Clone)]
pub struct JobPoller {
    sleeper: Arc<dyn Sleeper>,
}

impl JobPoller {
    /// Creates a poller sleeping through `sleeper`.
    #[must_use]
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    /// Submits the job once, then reads its status until it reports `isFinished`.
    ///
    /// # Errors
    /// Any transport error of `queue`, unchanged.
    pub async fn submit_and_await(
        &self,
        queue: &dyn JobQueue,
        component_id: &str,
        data: Value,
        tag: Option<&str>,
    ) -> Result<Job, HttpError> {
        let handle = queue.create_job(component_id, data, tag).await?;
        crate::debug!(
            "job.submitted id={} component={} tag={}",
            handle.id,
            handle.component_id,
            tag.unwrap_or("-")
        );

        let mut attempt: u32 = 1;
        loop {
            let job = queue.get_job(&handle).await?;
            if job.is_finished {
                crate::debug!(
                    "job.finished id={} component={} status={} attempts={}",
                    job.id,
                    handle.component_id,
                    job.status,
                    attempt
                );
                return Ok(job);
            }

            let delay = delay_for_attempt(attempt);
            crate::trace!(
                "job.waiting id={} status={} attempt={} delay_s={}",
                job.id,
                job.status,
                attempt,
                delay.as_secs()
            );
            self.sleeper.sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }
}
