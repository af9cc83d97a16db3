//! The relay channel capability and its subscription handle.

use std::future::Future;
use std::pin::Pin;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use crate::config::RelayError;

/// Future type for relay operations.
pub type RelayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RelayError>> + Send + 'a>>;

/// Stream of raw payloads received on a subscribed topic.
pub type MessageStream = BoxStream<'static, Result<String, RelayError>>;

/// Callback run when a subscription is released.
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Ephemeral fan-out broadcast, one topic per job.
///
/// Implementations must not buffer for absent subscribers: a payload published
/// to a topic nobody is subscribed to is gone.
pub trait RelayChannel: Send + Sync + 'static {
    /// Publish a payload, returning how many subscribers received it.
    fn publish<'a>(&'a self, topic: &'a str, payload: String) -> RelayFuture<'a, usize>;

    /// Subscribe to a topic. Resolves once the subscription is live.
    fn subscribe<'a>(&'a self, topic: &'a str) -> RelayFuture<'a, Subscription>;
}

/// A live subscription to one topic.
///
/// Released exactly once: either explicitly through [`Subscription::release`]
/// or when dropped.
pub struct Subscription {
    topic: String,
    messages: MessageStream,
    release: Option<ReleaseFn>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, messages: MessageStream, release: ReleaseFn) -> Self {
        Self {
            topic: topic.into(),
            messages,
            release: Some(release),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    /// Wait for the next payload. `None` once the topic is closed or the
    /// subscription has been released.
    pub async fn next_message(&mut self) -> Option<Result<String, RelayError>> {
        if self.is_released() {
            return None;
        }
        self.messages.next().await
    }

    /// Unsubscribe. Idempotent.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            tracing::debug!("Released subscription to {}", self.topic);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("released", &self.is_released())
            .finish()
    }
}
