//! Relay configuration and errors.

use thiserror::Error;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Connection endpoint. Only `memory://` is served in-process.
    pub endpoint: String,
    /// Per-topic buffer for subscribers that fall behind. Not a replay buffer:
    /// nothing published before a subscription exists is kept.
    pub capacity: usize,
    /// Deployment label, used in logs.
    pub label: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoint: "memory://".to_string(),
            capacity: 256,
            label: "unknown".to_string(),
        }
    }
}

impl RelayConfig {
    /// Create a config for the in-process relay.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the per-topic capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the deployment label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Relay errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("Relay is closed")]
    Closed,
    #[error("Subscriber lagged behind, {0} messages skipped")]
    Lagged(u64),
    #[error("Relay unavailable: {0}")]
    Unavailable(String),
    #[error("Unsupported relay endpoint: {0}")]
    UnsupportedEndpoint(String),
    #[error("Invalid relay configuration: {0}")]
    InvalidConfig(String),
}
