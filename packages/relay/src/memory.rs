//! In-process relay backed by one tokio broadcast channel per topic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::channel::{RelayChannel, RelayFuture, Subscription};
use crate::config::{RelayConfig, RelayError};

/// Snapshot of relay counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Topics with at least one live subscription.
    pub topics: u64,
    /// Subscriptions ever opened.
    pub subscriptions: u64,
    /// Subscriptions released.
    pub releases: u64,
    /// Payloads delivered to at least one subscriber.
    pub published: u64,
    /// Payloads dropped because nobody was listening.
    pub dropped: u64,
}

struct Topic {
    sender: broadcast::Sender<String>,
    subscribers: usize,
}

struct Shared {
    config: RelayConfig,
    topics: Mutex<HashMap<String, Topic>>,
    closed: AtomicBool,
    subscriptions: AtomicU64,
    releases: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, topic: &str) {
        let mut topics = self.topics();
        if let Some(entry) = topics.get_mut(topic) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
            if entry.subscribers == 0 {
                topics.remove(topic);
            }
        }
        self.releases.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-process relay channel.
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct MemoryRelay {
    shared: Arc<Shared>,
}

impl MemoryRelay {
    /// Create a relay with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                topics: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                subscriptions: AtomicU64::new(0),
                releases: AtomicU64::new(0),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Validate the configuration and create the relay.
    pub fn connect(config: RelayConfig) -> Result<Self, RelayError> {
        if !config.endpoint.starts_with("memory://") {
            return Err(RelayError::UnsupportedEndpoint(config.endpoint));
        }
        if config.capacity == 0 {
            return Err(RelayError::InvalidConfig(
                "capacity must be greater than zero".to_string(),
            ));
        }

        tracing::info!(
            "Relay ready: {} (capacity {}, label {})",
            config.endpoint,
            config.capacity,
            config.label
        );
        Ok(Self::new(config))
    }

    /// Close the relay. Every open subscription sees its topic end and later
    /// operations fail with [`RelayError::Closed`].
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let mut topics = self.shared.topics();
        // Dropping the senders ends every receiver.
        topics.clear();
        tracing::info!("Relay closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared
            .topics()
            .get(topic)
            .map_or(0, |entry| entry.subscribers)
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            topics: self.shared.topics().len() as u64,
            subscriptions: self.shared.subscriptions.load(Ordering::Relaxed),
            releases: self.shared.releases.load(Ordering::Relaxed),
            published: self.shared.published.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }

    fn publish_now(&self, topic: &str, payload: String) -> Result<usize, RelayError> {
        if self.is_closed() {
            return Err(RelayError::Closed);
        }

        let delivered = {
            let topics = self.shared.topics();
            match topics.get(topic) {
                Some(entry) => entry.sender.send(payload).unwrap_or(0),
                None => 0,
            }
        };

        if delivered == 0 {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("No subscribers on {}, payload dropped", topic);
        } else {
            self.shared.published.fetch_add(1, Ordering::Relaxed);
        }
        Ok(delivered)
    }

    fn subscribe_now(&self, topic: &str) -> Result<Subscription, RelayError> {
        if self.is_closed() {
            return Err(RelayError::Closed);
        }

        let receiver = {
            let mut topics = self.shared.topics();
            let entry = topics.entry(topic.to_string()).or_insert_with(|| Topic {
                sender: broadcast::channel(self.shared.config.capacity).0,
                subscribers: 0,
            });
            entry.subscribers += 1;
            entry.sender.subscribe()
        };
        self.shared.subscriptions.fetch_add(1, Ordering::Relaxed);

        let messages = stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(payload) => Some((Ok(payload), receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    Some((Err(RelayError::Lagged(skipped)), receiver))
                }
                Err(RecvError::Closed) => None,
            }
        })
        .boxed();

        let shared = Arc::clone(&self.shared);
        let owned_topic = topic.to_string();
        let release = Box::new(move || shared.release(&owned_topic));

        Ok(Subscription::new(topic, messages, release))
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new(RelayConfig::memory())
    }
}

impl RelayChannel for MemoryRelay {
    fn publish<'a>(&'a self, topic: &'a str, payload: String) -> RelayFuture<'a, usize> {
        Box::pin(async move { self.publish_now(topic, payload) })
    }

    fn subscribe<'a>(&'a self, topic: &'a str) -> RelayFuture<'a, Subscription> {
        Box::pin(async move { self.subscribe_now(topic) })
    }
}
