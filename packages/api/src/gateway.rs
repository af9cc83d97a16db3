//! Submission gateway: assigns a job id, subscribes, then enqueues.

use std::sync::Arc;
use std::time::Duration;

use actors::{JobQueue, QueueError};
use chrono::{TimeDelta, Utc};
use relay::{RelayChannel, RelayError};
use stream_core::{Job, JobId};
use thiserror::Error;

use crate::bridge::{BridgeStream, bridge_stream};

/// Submission errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Prompt is empty")]
    EmptyPrompt,
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// An accepted submission.
pub struct Submission {
    pub job_id: JobId,
    pub records: BridgeStream,
}

/// Entry point for prompts. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    queue: JobQueue,
    relay: Arc<dyn RelayChannel>,
    bridge_max_duration: Duration,
    job_ttl: Option<Duration>,
}

impl Gateway {
    pub fn new(
        queue: JobQueue,
        relay: Arc<dyn RelayChannel>,
        bridge_max_duration: Duration,
    ) -> Self {
        Self {
            queue,
            relay,
            bridge_max_duration,
            job_ttl: None,
        }
    }

    /// Give every submitted job an expiry this far in the future.
    pub fn with_job_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.job_ttl = ttl;
        self
    }

    /// Submit a prompt and get its record stream.
    ///
    /// The relay subscription is live before the job is enqueued, so no event
    /// of this job can be published unobserved.
    pub async fn submit(&self, prompt: impl Into<String>) -> Result<Submission, GatewayError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(GatewayError::EmptyPrompt);
        }

        let mut job = Job::new(JobId::new(), prompt);
        if let Some(ttl) = self.job_ttl
            && let Ok(ttl) = TimeDelta::from_std(ttl)
            && let Some(expires_at) = Utc::now().checked_add_signed(ttl)
        {
            job = job.with_expiry(expires_at);
        }

        let mut subscription = self.relay.subscribe(job.id.as_str()).await?;

        if let Err(e) = self.queue.publish_job(&job).await {
            tracing::error!("Failed to enqueue job {}: {}", job.id, e);
            subscription.release();
            return Err(e.into());
        }
        tracing::info!("Job {} enqueued", job.id);

        Ok(Submission {
            records: bridge_stream(subscription, self.bridge_max_duration),
            job_id: job.id,
        })
    }
}
