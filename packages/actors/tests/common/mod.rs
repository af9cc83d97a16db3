#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use actors::{
    Delivery, JobQueue, Pipeline, PipelineConfig, Producer, QueueConfig, QueueStats,
    WorkerMessage, WorkerSettings, start_pipeline,
};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use relay::{MemoryRelay, RelayChannel, RelayError, RelayFuture, Subscription};
use stream_core::{JobEvent, RelayMessage};
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(5);

pub async fn start_queue() -> JobQueue {
    let (queue, _handle) = JobQueue::start(QueueConfig::default())
        .await
        .expect("queue actor should start");
    queue
}

pub fn worker_settings(processing_timeout: Duration) -> WorkerSettings {
    WorkerSettings {
        processing_timeout,
        publish_error_on_fault: true,
    }
}

pub async fn start_single_worker(
    relay: Arc<dyn RelayChannel>,
    producer: Arc<dyn Producer>,
    settings: WorkerSettings,
) -> Pipeline {
    let queue = start_queue().await;
    let config = PipelineConfig {
        slots: 1,
        worker: settings,
        label: "test".to_string(),
    };
    start_pipeline(config, queue, relay, producer)
        .await
        .expect("pipeline should start")
}

/// Read events until a terminal one arrives.
pub async fn collect_events(subscription: &mut Subscription) -> Vec<JobEvent> {
    let mut events = Vec::new();
    loop {
        let payload = tokio::time::timeout(WAIT, subscription.next_message())
            .await
            .expect("timed out waiting for an event")
            .expect("topic closed before a terminal event")
            .expect("subscriber lagged");
        let event = RelayMessage::decode_event(&payload).expect("worker published a bad payload");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

/// Assert nothing else shows up on the subscription for a short while.
pub async fn assert_quiet(subscription: &mut Subscription, wait: Duration) {
    let next = tokio::time::timeout(wait, subscription.next_message()).await;
    assert!(next.is_err(), "unexpected message: {:?}", next);
}

/// Poll queue stats until `done` holds.
pub async fn wait_for_stats(queue: &JobQueue, done: impl Fn(&QueueStats) -> bool) -> QueueStats {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let stats = queue.stats().await.expect("queue should answer");
        if done(&stats) {
            return stats;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "queue never reached the expected state: {:?}",
            stats
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn tokens(words: &[&str]) -> Vec<JobEvent> {
    words
        .iter()
        .map(|word| JobEvent::Token(word.to_string()))
        .collect()
}

/// Relay that refuses selected publishes and forwards the rest.
pub struct FlakyRelay {
    inner: MemoryRelay,
    fail_tokens: bool,
    fail_terminals: bool,
    terminal_delay: Option<Duration>,
}

impl FlakyRelay {
    pub fn failing_tokens(inner: MemoryRelay) -> Self {
        Self {
            inner,
            fail_tokens: true,
            fail_terminals: false,
            terminal_delay: None,
        }
    }

    pub fn failing_everything(inner: MemoryRelay) -> Self {
        Self {
            inner,
            fail_tokens: true,
            fail_terminals: true,
            terminal_delay: None,
        }
    }

    /// Delivers everything, but holds each terminal event for `delay` first.
    pub fn slow_terminals(inner: MemoryRelay, delay: Duration) -> Self {
        Self {
            inner,
            fail_tokens: false,
            fail_terminals: false,
            terminal_delay: Some(delay),
        }
    }

    fn is_terminal(payload: &str) -> bool {
        RelayMessage::decode_event(payload).is_ok_and(|event| event.is_terminal())
    }

    fn refuses(&self, payload: &str) -> bool {
        match RelayMessage::decode_event(payload) {
            Ok(JobEvent::Token(_)) => self.fail_tokens,
            Ok(_) => self.fail_terminals,
            Err(_) => false,
        }
    }
}

impl RelayChannel for FlakyRelay {
    fn publish<'a>(&'a self, topic: &'a str, payload: String) -> RelayFuture<'a, usize> {
        if self.refuses(&payload) {
            return Box::pin(async { Err(RelayError::Unavailable("injected failure".to_string())) });
        }
        if let Some(delay) = self.terminal_delay
            && Self::is_terminal(&payload)
        {
            return Box::pin(async move {
                tokio::time::sleep(delay).await;
                self.inner.publish(topic, payload).await
            });
        }
        self.inner.publish(topic, payload)
    }

    fn subscribe<'a>(&'a self, topic: &'a str) -> RelayFuture<'a, Subscription> {
        self.inner.subscribe(topic)
    }
}

/// Consumer that records deliveries and never disposes of them.
pub struct HoldingConsumer;

impl Actor for HoldingConsumer {
    type Msg = WorkerMessage;
    type State = mpsc::UnboundedSender<Delivery>;
    type Arguments = mpsc::UnboundedSender<Delivery>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(args)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Deliver(delivery) => {
                let _ = state.send(delivery);
            }
            WorkerMessage::Shutdown => myself.stop(None),
        }
        Ok(())
    }
}

pub async fn holding_consumer() -> (ActorRef<WorkerMessage>, mpsc::UnboundedReceiver<Delivery>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (consumer, _handle) = Actor::spawn(None, HoldingConsumer, tx)
        .await
        .expect("consumer should start");
    (consumer, rx)
}

pub async fn next_delivery(deliveries: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
    tokio::time::timeout(WAIT, deliveries.recv())
        .await
        .expect("timed out waiting for a delivery")
        .expect("consumer stopped")
}
