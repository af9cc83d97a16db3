//! Submission side of the prompt relay.
//!
//! This crate contains:
//! - Settings read from the environment
//! - The gateway that subscribes and enqueues
//! - The bridge from a relay subscription to a bounded record stream
//! - SSE framing and the axum routes
//! - System wiring

mod bridge;
mod config;
mod gateway;
mod init;
mod realtime;
mod routes;

pub use bridge::{BridgeStream, bridge_stream};
pub use config::{ConfigError, Settings};
pub use gateway::{Gateway, GatewayError, Submission};
pub use init::{System, init_system, init_system_with_producer};
pub use realtime::{format_sse_record, sse_event, sse_stream};
pub use routes::{ApiError, AppState, AskRequest, router};

// Re-export core types for convenience
pub use stream_core::{EventKind, JobEvent, JobId, RecordOrigin, StreamRecord};
