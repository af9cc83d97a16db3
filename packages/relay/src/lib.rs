//! Relay channel for streaming job events to subscribers.
//!
//! This crate provides the ephemeral per-job broadcast topics that carry a
//! worker's events to whichever bridge is listening.
//!
//! # Endpoints
//!
//! - `memory://` (default): in-process broker built on tokio broadcast channels

mod channel;
mod config;
mod memory;

pub use channel::{MessageStream, RelayChannel, RelayFuture, ReleaseFn, Subscription};
pub use config::{RelayConfig, RelayError};
pub use memory::{MemoryRelay, RelayStats};
