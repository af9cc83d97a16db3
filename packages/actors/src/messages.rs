//! Message types for actor communication.

use ractor::{ActorRef, RpcReplyPort};

use crate::queue_actor::{QueueError, QueueStats};

/// One message handed to a consumer. The tag identifies this delivery and is
/// what the consumer acknowledges or rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    /// Raw message body, validated by the consumer.
    pub body: String,
    /// Set when an earlier delivery of the same message was never disposed.
    pub redelivered: bool,
}

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Durably append a message. Replies with the message id.
    Publish {
        body: String,
        reply: RpcReplyPort<Result<u64, QueueError>>,
    },

    /// Register demand for one delivery (prefetch of 1).
    Consume {
        consumer_id: String,
        consumer: ActorRef<WorkerMessage>,
    },

    /// Remove a delivered message permanently after successful handling.
    Ack { tag: u64 },

    /// Remove a delivered message permanently without requeueing it.
    Reject { tag: u64 },

    /// A consumer went away; requeue whatever it had not disposed of.
    ConsumerLost { consumer_id: String },

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Shutdown the queue.
    Shutdown,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Process one delivery from the queue.
    Deliver(Delivery),

    /// Shutdown the worker once the current delivery is disposed.
    Shutdown,
}

/// Messages for the PipelineSupervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Number of live worker slots.
    WorkerCount { reply: RpcReplyPort<usize> },

    /// Shutdown all workers.
    Shutdown,
}
