//! Job status polling.
//!
//! A server-side job is observed on a fixed cadence until it reaches a
//! terminal status. The loop is strictly sequential (never two polls for the
//! same job in flight), delivers its result exactly once, and issues no poll
//! after a terminal status has been observed. Cancellation stops future polls
//! but does not attempt to stop the server-side job.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{ImportApiClient, JobSnapshot, JobStatus};
use crate::config::EngineConfig;
use crate::error::{redact, ImportError};

/// Trait for job status queries, allowing test fakes.
pub trait JobPoll: Send + Sync {
    fn poll_job<'a>(
        &'a self,
        job_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<JobSnapshot, ImportError>> + Send + 'a>>;
}

impl JobPoll for ImportApiClient {
    fn poll_job<'a>(
        &'a self,
        job_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<JobSnapshot, ImportError>> + Send + 'a>> {
        Box::pin(ImportApiClient::poll_job(self, job_key))
    }
}

/// Polls one job to a terminal status.
pub struct JobStatusPoller<'a, P: JobPoll> {
    api: &'a P,
    config: &'a EngineConfig,
    cancel: CancellationToken,
}

impl<'a, P: JobPoll> JobStatusPoller<'a, P> {
    pub fn new(api: &'a P, config: &'a EngineConfig, cancel: CancellationToken) -> Self {
        Self { api, config, cancel }
    }

    /// Polls until the job finishes or fails.
    ///
    /// Returns the result payload on `Finished`. Intermediate feedback from
    /// non-terminal snapshots is forwarded to `on_feedback`, deduplicated
    /// against the previously forwarded value.
    pub async fn poll_to_completion(
        &self,
        job_key: &str,
        mut on_feedback: impl FnMut(&str),
    ) -> Result<String, ImportError> {
        let started = Instant::now();
        let mut last_feedback: Option<String> = None;

        loop {
            if started.elapsed() > self.config.poll_timeout {
                return Err(ImportError::Internal(format!(
                    "job did not reach a terminal status within {:?}",
                    self.config.poll_timeout
                )));
            }

            match self.api.poll_job(job_key).await {
                Ok(snapshot) if snapshot.status.is_terminal() => {
                    return if snapshot.status == JobStatus::Finished {
                        info!("[JOB] {} finished", redact(job_key));
                        snapshot.result_path.ok_or_else(|| {
                            ImportError::Internal("finished job carried no result payload".into())
                        })
                    } else {
                        Err(ImportError::JobFailed {
                            job_key: job_key.to_string(),
                            message: snapshot
                                .failure_message
                                .unwrap_or_else(|| "Unknown error".to_string()),
                        })
                    };
                }
                Ok(snapshot) => {
                    if let Some(feedback) = snapshot.feedback {
                        if last_feedback.as_deref() != Some(feedback.as_str()) {
                            on_feedback(&feedback);
                            last_feedback = Some(feedback);
                        }
                    }
                }
                // Network blips do not end the watch; the next tick retries
                Err(ImportError::ConnectionFailed(e)) => {
                    warn!("[JOB] Poll of {} failed transiently: {}", redact(job_key), e);
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(ImportError::Cancelled),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }
}
