//! Core domain types for the prompt relay.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobId and the queue message envelope
//! - JobEvent and the relay wire format
//! - StreamRecord for the outbound client stream

mod events;
mod job;

pub use events::{EventKind, JobEvent, RecordOrigin, RelayMessage, RelayMessageError, StreamRecord};
pub use job::{EnvelopeError, Job, JobEnvelope, JobId};
