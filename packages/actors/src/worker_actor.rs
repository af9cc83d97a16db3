//! Worker actor for turning queued prompts into relayed token streams.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{FutureExt, StreamExt};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use relay::{RelayChannel, RelayError};
use stream_core::{EnvelopeError, Job, JobEnvelope, JobEvent, JobId, RelayMessage};

use crate::messages::{Delivery, QueueMessage, WorkerMessage};
use crate::producer::{Producer, ProducerError};
use crate::queue_actor::JobQueue;

/// Per-worker processing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    /// Bound on producing and relaying tokens. The terminal `done` or
    /// `timeout` publish runs after it and is not covered.
    pub processing_timeout: Duration,
    /// Publish an `error` event when a job with a known id is rejected for an
    /// unhandled fault. Malformed messages never publish.
    pub publish_error_on_fault: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            processing_timeout: Duration::from_secs(30),
            publish_error_on_fault: true,
        }
    }
}

/// Faults that abort a job after it passed validation.
#[derive(Debug, thiserror::Error)]
pub enum WorkerFault {
    #[error("Producer failed: {0}")]
    Producer(#[from] ProducerError),
    #[error("Relay failed: {0}")]
    Relay(#[from] RelayError),
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Processing panicked: {0}")]
    Panicked(String),
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// How a delivery leaves the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Dropped without requeue.
    Reject,
}

/// Terminal state of one delivery.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The envelope failed validation. Nothing was published.
    Invalid(EnvelopeError),
    /// Expiry had passed on receipt; `expired` was published.
    Expired,
    /// The producer finished in time; `done` was published.
    Completed { tokens: usize },
    /// The deadline elapsed first; `timeout` was published.
    TimedOut { tokens: usize },
    /// Processing failed after validation.
    Faulted(WorkerFault),
}

impl ProcessOutcome {
    pub fn disposition(&self) -> Disposition {
        match self {
            ProcessOutcome::Invalid(_) | ProcessOutcome::Faulted(_) => Disposition::Reject,
            ProcessOutcome::Expired
            | ProcessOutcome::Completed { .. }
            | ProcessOutcome::TimedOut { .. } => Disposition::Ack,
        }
    }

    /// Get a simple outcome string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessOutcome::Invalid(_) => "invalid",
            ProcessOutcome::Expired => "expired",
            ProcessOutcome::Completed { .. } => "completed",
            ProcessOutcome::TimedOut { .. } => "timed_out",
            ProcessOutcome::Faulted(_) => "faulted",
        }
    }
}

/// Runs one delivery through validation, the expiry check and the deadline
/// bounded producer, publishing events along the way.
#[derive(Clone)]
pub struct JobProcessor {
    relay: Arc<dyn RelayChannel>,
    producer: Arc<dyn Producer>,
    settings: WorkerSettings,
}

impl JobProcessor {
    pub fn new(
        relay: Arc<dyn RelayChannel>,
        producer: Arc<dyn Producer>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            relay,
            producer,
            settings,
        }
    }

    /// Process a raw message body. Never panics and never publishes more than
    /// one terminal event.
    pub async fn process(&self, body: &str) -> ProcessOutcome {
        let job = match JobEnvelope::parse_job(body) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!("Invalid message payload, rejecting: {}", e);
                return ProcessOutcome::Invalid(e);
            }
        };

        let result = match AssertUnwindSafe(self.run(&job)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(WorkerFault::Panicked(panic_message(panic))),
        };

        match result {
            Ok(outcome) => outcome,
            Err(fault) => {
                tracing::error!("Error processing job {}: {}", job.id, fault);
                if self.settings.publish_error_on_fault {
                    self.publish_best_effort(&job.id, &JobEvent::Error).await;
                }
                ProcessOutcome::Faulted(fault)
            }
        }
    }

    async fn run(&self, job: &Job) -> Result<ProcessOutcome, WorkerFault> {
        if job.is_expired_at(Utc::now()) {
            tracing::warn!("Job {} expired, discarding", job.id);
            self.publish(&job.id, &JobEvent::Expired).await?;
            return Ok(ProcessOutcome::Expired);
        }

        tracing::debug!(
            "Job {} processing with {} (deadline {:?})",
            job.id,
            self.producer.name(),
            self.settings.processing_timeout
        );

        let mut tokens = 0;
        let result = tokio::time::timeout(
            self.settings.processing_timeout,
            self.stream_tokens(job, &mut tokens),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                self.publish(&job.id, &JobEvent::Done).await?;
                tracing::debug!("Job {} streamed {} tokens", job.id, tokens);
                Ok(ProcessOutcome::Completed { tokens })
            }
            Ok(Err(fault)) => Err(fault),
            Err(_) => {
                tracing::error!(
                    "Processing timeout reached for job {} after {} tokens",
                    job.id,
                    tokens
                );
                self.publish(&job.id, &JobEvent::Timeout).await?;
                Ok(ProcessOutcome::TimedOut { tokens })
            }
        }
    }

    /// Relay tokens one by one; the next token is only requested once the
    /// previous one was published.
    async fn stream_tokens(&self, job: &Job, tokens: &mut usize) -> Result<(), WorkerFault> {
        let mut stream = self.producer.produce(job);
        while let Some(token) = stream.next().await {
            let token = token?;
            self.publish_best_effort(&job.id, &JobEvent::Token(token))
                .await;
            *tokens += 1;
        }
        Ok(())
    }

    async fn publish(&self, job_id: &JobId, event: &JobEvent) -> Result<usize, WorkerFault> {
        let payload = RelayMessage::from(event).encode()?;
        Ok(self.relay.publish(job_id.as_str(), payload).await?)
    }

    async fn publish_best_effort(&self, job_id: &JobId, event: &JobEvent) {
        if let Err(e) = self.publish(job_id, event).await {
            tracing::error!(
                "Relay publish error for job {} ({}): {}",
                job_id,
                event.description(),
                e
            );
        }
    }
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub queue: JobQueue,
    pub processor: JobProcessor,
    /// Deployment label, logged on every received message.
    pub label: String,
}

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID, also the queue consumer id.
    pub worker_id: String,
    pub queue: JobQueue,
    pub processor: JobProcessor,
    pub label: String,
    /// Deliveries disposed so far.
    pub processed: u64,
}

impl WorkerActorState {
    fn request_delivery(&self, myself: &ActorRef<WorkerMessage>) -> Result<(), ActorProcessingErr> {
        self.queue.actor().send_message(QueueMessage::Consume {
            consumer_id: self.worker_id.clone(),
            consumer: myself.clone(),
        })?;
        Ok(())
    }
}

/// Worker actor that processes one delivery at a time.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            queue: args.queue,
            processor: args.processor,
            label: args.label,
            processed: 0,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.request_delivery(&myself)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Deliver(delivery) => {
                let Delivery {
                    tag,
                    body,
                    redelivered,
                } = delivery;
                tracing::info!(
                    "Message received by {} (region {}, tag {}{})",
                    state.worker_id,
                    state.label,
                    tag,
                    if redelivered { ", redelivered" } else { "" }
                );

                let outcome = state.processor.process(&body).await;

                let disposition = match outcome.disposition() {
                    Disposition::Ack => QueueMessage::Ack { tag },
                    Disposition::Reject => QueueMessage::Reject { tag },
                };
                state.queue.actor().send_message(disposition)?;
                tracing::debug!(
                    "Worker {} disposed tag {} as {}",
                    state.worker_id,
                    tag,
                    outcome.as_str()
                );

                state.processed += 1;
                state.request_delivery(&myself)?;
            }

            WorkerMessage::Shutdown => {
                tracing::info!(
                    "Shutting down worker: {} ({} processed)",
                    state.worker_id,
                    state.processed
                );
                myself.stop(None);
            }
        }

        Ok(())
    }
}
