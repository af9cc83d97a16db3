//! Queue actor: an in-process durable job queue with at-least-once delivery.

use std::collections::{HashMap, VecDeque};

use ractor::{Actor, ActorProcessingErr, ActorRef, SpawnErr};
use stream_core::Job;
use tokio::task::JoinHandle;

use crate::messages::{Delivery, QueueMessage, WorkerMessage};

/// Errors surfaced to publishers.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue is full")]
    Full,
    #[error("Queue unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Configuration for queue behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Queue name, used in logs.
    pub name: String,
    /// Maximum number of messages waiting for a consumer.
    pub max_ready: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "llm_queue".to_string(),
            max_ready: None,
        }
    }
}

/// Statistics for a queue's current state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages waiting for a consumer.
    pub ready: u64,
    /// Messages delivered but not yet disposed.
    pub unacked: u64,
    /// Consumers waiting for a delivery.
    pub consumers: u64,
    pub published: u64,
    pub acked: u64,
    pub rejected: u64,
    /// Messages handed out again after their consumer was lost.
    pub redelivered: u64,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    body: String,
    redelivered: bool,
}

struct Unacked {
    consumer_id: String,
    message: StoredMessage,
}

struct Waiter {
    consumer_id: String,
    consumer: ActorRef<WorkerMessage>,
}

/// State for the queue actor.
pub struct QueueActorState {
    pub config: QueueConfig,
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, Unacked>,
    waiting: VecDeque<Waiter>,
    stats: QueueStats,
    next_message_id: u64,
    next_tag: u64,
}

impl QueueActorState {
    /// Create a new queue actor state.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            ready: VecDeque::new(),
            unacked: HashMap::new(),
            waiting: VecDeque::new(),
            stats: QueueStats::default(),
            next_message_id: 0,
            next_tag: 0,
        }
    }

    fn holds_delivery(&self, consumer_id: &str) -> bool {
        self.unacked.values().any(|u| u.consumer_id == consumer_id)
    }

    /// Hand ready messages to waiting consumers that hold no delivery.
    fn dispatch(&mut self) {
        let mut parked = VecDeque::new();

        while let Some(waiter) = self.waiting.pop_front() {
            if self.holds_delivery(&waiter.consumer_id) {
                parked.push_back(waiter);
                continue;
            }
            let Some(message) = self.ready.pop_front() else {
                parked.push_back(waiter);
                continue;
            };

            self.next_tag += 1;
            let tag = self.next_tag;
            let delivery = Delivery {
                tag,
                body: message.body.clone(),
                redelivered: message.redelivered,
            };

            match waiter.consumer.send_message(WorkerMessage::Deliver(delivery)) {
                Ok(()) => {
                    tracing::debug!(
                        "Delivered message {} to {} (tag {})",
                        message.id,
                        waiter.consumer_id,
                        tag
                    );
                    self.unacked.insert(
                        tag,
                        Unacked {
                            consumer_id: waiter.consumer_id,
                            message,
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!("Consumer {} unreachable: {}", waiter.consumer_id, e);
                    self.ready.push_front(message);
                }
            }
        }

        self.waiting = parked;
        self.refresh_gauges();
    }

    fn refresh_gauges(&mut self) {
        self.stats.ready = self.ready.len() as u64;
        self.stats.unacked = self.unacked.len() as u64;
        self.stats.consumers = self.waiting.len() as u64;
    }

    fn requeue_consumer(&mut self, consumer_id: &str) -> usize {
        self.waiting.retain(|w| w.consumer_id != consumer_id);

        let mut tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, u)| u.consumer_id == consumer_id)
            .map(|(tag, _)| *tag)
            .collect();
        tags.sort_unstable();

        // Front of the queue, oldest first.
        for tag in tags.iter().rev() {
            if let Some(unacked) = self.unacked.remove(tag) {
                let mut message = unacked.message;
                message.redelivered = true;
                self.ready.push_front(message);
            }
        }

        self.stats.redelivered += tags.len() as u64;
        tags.len()
    }
}

/// Queue actor that owns every message until it is acknowledged or rejected.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueConfig;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting queue actor: {}", args.name);
        Ok(QueueActorState::new(args))
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Publish { body, reply } => {
                if let Some(max_ready) = state.config.max_ready
                    && state.ready.len() >= max_ready
                {
                    let _ = reply.send(Err(QueueError::Full));
                    return Ok(());
                }

                state.next_message_id += 1;
                let id = state.next_message_id;
                state.ready.push_back(StoredMessage {
                    id,
                    body,
                    redelivered: false,
                });
                state.stats.published += 1;

                let _ = reply.send(Ok(id));
                state.dispatch();
            }

            QueueMessage::Consume {
                consumer_id,
                consumer,
            } => {
                if state.waiting.iter().any(|w| w.consumer_id == consumer_id) {
                    tracing::debug!("Consumer {} already waiting", consumer_id);
                } else {
                    state.waiting.push_back(Waiter {
                        consumer_id,
                        consumer,
                    });
                }
                state.dispatch();
            }

            QueueMessage::Ack { tag } => {
                if state.unacked.remove(&tag).is_some() {
                    state.stats.acked += 1;
                } else {
                    tracing::warn!("Ack for unknown delivery tag {}", tag);
                }
                state.dispatch();
            }

            QueueMessage::Reject { tag } => {
                if let Some(unacked) = state.unacked.remove(&tag) {
                    state.stats.rejected += 1;
                    tracing::warn!(
                        "Message {} rejected by {}, dropped without requeue",
                        unacked.message.id,
                        unacked.consumer_id
                    );
                } else {
                    tracing::warn!("Reject for unknown delivery tag {}", tag);
                }
                state.dispatch();
            }

            QueueMessage::ConsumerLost { consumer_id } => {
                let requeued = state.requeue_consumer(&consumer_id);
                if requeued > 0 {
                    tracing::warn!(
                        "Consumer {} lost, requeued {} unacknowledged message(s)",
                        consumer_id,
                        requeued
                    );
                }
                state.dispatch();
            }

            QueueMessage::GetStats { reply } => {
                state.refresh_gauges();
                let _ = reply.send(state.stats.clone());
            }

            QueueMessage::Shutdown => {
                tracing::info!(
                    "Shutting down queue {} ({} ready, {} unacked)",
                    state.config.name,
                    state.ready.len(),
                    state.unacked.len()
                );
                myself.stop(None);
            }
        }

        Ok(())
    }
}

/// Owned handle for publishing to and inspecting the queue.
#[derive(Clone)]
pub struct JobQueue {
    actor: ActorRef<QueueMessage>,
}

impl JobQueue {
    /// Spawn a queue actor.
    pub async fn start(config: QueueConfig) -> Result<(Self, JoinHandle<()>), SpawnErr> {
        let (actor, handle) = Actor::spawn(None, QueueActor, config).await?;
        Ok((Self { actor }, handle))
    }

    pub fn actor(&self) -> &ActorRef<QueueMessage> {
        &self.actor
    }

    /// Publish a raw message body. Resolves once the queue has stored it.
    pub async fn publish(&self, body: String) -> Result<u64, QueueError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(QueueMessage::Publish {
                body,
                reply: tx.into(),
            })
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        rx.await
            .map_err(|_| QueueError::Unavailable("no reply from queue".to_string()))?
    }

    /// Publish a job as a wire envelope.
    pub async fn publish_job(&self, job: &Job) -> Result<u64, QueueError> {
        let body = job.to_envelope().encode()?;
        self.publish(body).await
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(QueueMessage::GetStats { reply: tx.into() })
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        rx.await
            .map_err(|_| QueueError::Unavailable("no reply from queue".to_string()))
    }

    pub fn shutdown(&self) {
        let _ = self.actor.send_message(QueueMessage::Shutdown);
    }
}
