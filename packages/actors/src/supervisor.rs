//! Supervisor actor that keeps a fixed number of worker slots alive.

use std::collections::HashMap;
use std::sync::Arc;

use ractor::{
    Actor, ActorId, ActorProcessingErr, ActorRef, ActorStatus, SpawnErr, SupervisionEvent,
};
use relay::RelayChannel;
use tokio::task::JoinHandle;

use crate::messages::{QueueMessage, SupervisorMessage, WorkerMessage};
use crate::producer::Producer;
use crate::queue_actor::JobQueue;
use crate::worker_actor::{JobProcessor, WorkerActor, WorkerArgs, WorkerSettings};

/// Configuration for a worker pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Number of concurrent worker slots.
    pub slots: usize,
    pub worker: WorkerSettings,
    /// Deployment label attached to worker logs.
    pub label: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            slots: 4,
            worker: WorkerSettings::default(),
            label: "unknown".to_string(),
        }
    }
}

/// Arguments for the pipeline supervisor.
pub struct PipelineArgs {
    pub config: PipelineConfig,
    pub queue: JobQueue,
    pub processor: JobProcessor,
}

/// State for the supervisor actor.
pub struct PipelineState {
    config: PipelineConfig,
    queue: JobQueue,
    processor: JobProcessor,
    /// Live workers by actor id, mapped to their consumer id.
    workers: HashMap<ActorId, (String, ActorRef<WorkerMessage>)>,
    shutting_down: bool,
    /// Worker counter for unique IDs.
    worker_counter: u64,
}

impl PipelineState {
    /// Generate a unique worker ID.
    fn next_worker_id(&mut self) -> String {
        self.worker_counter += 1;
        format!("{}-worker-{}", self.config.label, self.worker_counter)
    }

    async fn spawn_worker(
        &mut self,
        myself: &ActorRef<SupervisorMessage>,
    ) -> Result<(), ActorProcessingErr> {
        let worker_id = self.next_worker_id();
        let args = WorkerArgs {
            worker_id: worker_id.clone(),
            queue: self.queue.clone(),
            processor: self.processor.clone(),
            label: self.config.label.clone(),
        };

        let (worker, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;

        self.workers.insert(worker.get_id(), (worker_id, worker));
        Ok(())
    }

    fn worker_lost(&mut self, id: ActorId) -> Option<String> {
        let (worker_id, _) = self.workers.remove(&id)?;
        if let Err(e) = self.queue.actor().send_message(QueueMessage::ConsumerLost {
            consumer_id: worker_id.clone(),
        }) {
            tracing::warn!("Could not report lost consumer {}: {}", worker_id, e);
        }
        Some(worker_id)
    }
}

/// Supervisor actor for the worker slots of one queue.
pub struct PipelineSupervisor;

impl Actor for PipelineSupervisor {
    type Msg = SupervisorMessage;
    type State = PipelineState;
    type Arguments = PipelineArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting pipeline supervisor with {} worker slots",
            args.config.slots
        );

        Ok(PipelineState {
            config: args.config,
            queue: args.queue,
            processor: args.processor,
            workers: HashMap::new(),
            shutting_down: false,
            worker_counter: 0,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for _ in 0..state.config.slots {
            state.spawn_worker(&myself).await?;
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::WorkerCount { reply } => {
                let _ = reply.send(state.workers.len());
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down pipeline supervisor");
                state.shutting_down = true;
                if state.workers.is_empty() {
                    myself.stop(None);
                    return Ok(());
                }
                for (_, worker) in state.workers.values() {
                    let _ = worker.send_message(WorkerMessage::Shutdown);
                }
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let lost = match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                let lost = state.worker_lost(cell.get_id());
                if let Some(worker_id) = &lost
                    && !state.shutting_down
                {
                    tracing::warn!("Worker {} terminated: {:?}", worker_id, reason);
                }
                lost
            }
            SupervisionEvent::ActorFailed(cell, error) => {
                let lost = state.worker_lost(cell.get_id());
                if let Some(worker_id) = &lost {
                    tracing::error!("Worker {} failed: {}", worker_id, error);
                }
                lost
            }
            _ => None,
        };

        if lost.is_none() {
            return Ok(());
        }

        if state.shutting_down {
            if state.workers.is_empty() {
                myself.stop(None);
            }
        } else if state.queue.actor().get_status() != ActorStatus::Running {
            // Replacement slots could never consume.
            tracing::warn!("Queue is gone, not restarting worker slot");
        } else {
            state.spawn_worker(&myself).await?;
        }
        Ok(())
    }
}

/// Handle for a running pipeline of queue, supervisor and workers.
pub struct Pipeline {
    queue: JobQueue,
    supervisor: ActorRef<SupervisorMessage>,
    handle: JoinHandle<()>,
}

impl Pipeline {
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn supervisor(&self) -> &ActorRef<SupervisorMessage> {
        &self.supervisor
    }

    /// Number of live worker slots.
    pub async fn worker_count(&self) -> usize {
        let (tx, rx) = ractor::concurrency::oneshot();
        if self
            .supervisor
            .send_message(SupervisorMessage::WorkerCount { reply: tx.into() })
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Stop every worker once its current delivery is disposed, then stop the
    /// queue.
    pub async fn shutdown(self) {
        if self
            .supervisor
            .send_message(SupervisorMessage::Shutdown)
            .is_ok()
        {
            let _ = self.handle.await;
        }
        self.queue.shutdown();
    }
}

/// Start the worker slots for `queue`.
pub async fn start_pipeline(
    config: PipelineConfig,
    queue: JobQueue,
    relay: Arc<dyn RelayChannel>,
    producer: Arc<dyn Producer>,
) -> Result<Pipeline, SpawnErr> {
    let processor = JobProcessor::new(relay, producer, config.worker.clone());
    let args = PipelineArgs {
        config,
        queue: queue.clone(),
        processor,
    };

    let (supervisor, handle) = Actor::spawn(None, PipelineSupervisor, args).await?;

    Ok(Pipeline {
        queue,
        supervisor,
        handle,
    })
}
