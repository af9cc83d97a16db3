//! Actor system for the prompt pipeline.
//!
//! This crate provides the Ractor-based actors that move jobs from the
//! queue to the relay.
//!
//! # Architecture
//!
//! - `QueueActor` - Durable in-process queue with ack, reject and redelivery
//! - `WorkerActor` - Turns one delivery at a time into relayed events
//! - `PipelineSupervisor` - Keeps the worker slots alive
//!
//! # Usage
//!
//! ```ignore
//! use actors::{JobQueue, PipelineConfig, QueueConfig, SimulatedProducer, start_pipeline};
//!
//! let (queue, _handle) = JobQueue::start(QueueConfig::default()).await?;
//! let pipeline = start_pipeline(
//!     PipelineConfig::default(),
//!     queue,
//!     Arc::new(relay),
//!     Arc::new(SimulatedProducer::default()),
//! )
//! .await?;
//! ```

mod messages;
mod producer;
mod queue_actor;
mod supervisor;
pub mod testing;
mod worker_actor;

pub use messages::{Delivery, QueueMessage, SupervisorMessage, WorkerMessage};
pub use producer::{FnProducer, Producer, ProducerError, SimulatedProducer, TokenStream};
pub use queue_actor::{JobQueue, QueueActor, QueueConfig, QueueError, QueueStats};
pub use supervisor::{Pipeline, PipelineConfig, PipelineSupervisor, start_pipeline};
pub use worker_actor::{
    Disposition, JobProcessor, ProcessOutcome, WorkerActor, WorkerArgs, WorkerFault,
    WorkerSettings,
};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, concurrency};
