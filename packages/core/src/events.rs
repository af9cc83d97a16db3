//! Event types for the relay channel and the outbound client stream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Events published by a worker for a single job.
///
/// Zero or more `Token`s are followed by exactly one terminal variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// One incremental unit of produced output.
    Token(String),
    /// The producer finished before the deadline.
    Done,
    /// The processing deadline (or the bridge's max-duration) elapsed.
    Timeout,
    /// The job's expiry had passed before processing started.
    Expired,
    /// Processing failed, or the stream could not be relayed.
    Error,
}

impl JobEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            JobEvent::Token(_) => EventKind::Token,
            JobEvent::Done => EventKind::Done,
            JobEvent::Timeout => EventKind::Timeout,
            JobEvent::Expired => EventKind::Expired,
            JobEvent::Error => EventKind::Error,
        }
    }

    /// Check if this event ends the job's event sequence.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Token(_))
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::Token(token) => format!("token {:?}", token),
            other => other.kind().as_str().to_string(),
        }
    }
}

/// Discriminant of a [`JobEvent`], as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Token,
    Done,
    Timeout,
    Expired,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Token => "token",
            EventKind::Done => "done",
            EventKind::Timeout => "timeout",
            EventKind::Expired => "expired",
            EventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors decoding a relay payload.
#[derive(Debug, thiserror::Error)]
pub enum RelayMessageError {
    #[error("Malformed relay payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Token event without a string payload")]
    MissingToken,
}

/// Relay wire body: `{"event": "<kind>", "data": <token string> | {}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub event: EventKind,
    #[serde(default)]
    pub data: Value,
}

impl RelayMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(payload: &str) -> Result<Self, RelayMessageError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Decode a payload straight into the event it carries.
    pub fn decode_event(payload: &str) -> Result<JobEvent, RelayMessageError> {
        JobEvent::try_from(Self::decode(payload)?)
    }
}

impl From<&JobEvent> for RelayMessage {
    fn from(event: &JobEvent) -> Self {
        let data = match event {
            JobEvent::Token(token) => Value::String(token.clone()),
            _ => Value::Object(Map::new()),
        };
        Self {
            event: event.kind(),
            data,
        }
    }
}

impl TryFrom<RelayMessage> for JobEvent {
    type Error = RelayMessageError;

    fn try_from(message: RelayMessage) -> Result<Self, RelayMessageError> {
        Ok(match message.event {
            EventKind::Token => match message.data {
                Value::String(token) => JobEvent::Token(token),
                _ => return Err(RelayMessageError::MissingToken),
            },
            EventKind::Done => JobEvent::Done,
            EventKind::Timeout => JobEvent::Timeout,
            EventKind::Expired => JobEvent::Expired,
            EventKind::Error => JobEvent::Error,
        })
    }
}

/// Where an outbound record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrigin {
    /// Relayed from the worker over the relay channel.
    Relay,
    /// Synthesized by the bridge itself (its own timeout or a transport fault).
    Local,
}

/// One record of the outbound client stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub event: JobEvent,
    pub origin: RecordOrigin,
}

impl StreamRecord {
    pub fn relayed(event: JobEvent) -> Self {
        Self {
            event,
            origin: RecordOrigin::Relay,
        }
    }

    pub fn local(event: JobEvent) -> Self {
        Self {
            event,
            origin: RecordOrigin::Local,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.event.is_terminal()
    }

    /// Client-facing JSON: `{"token": ...}` for tokens, `{}` for terminal records.
    pub fn payload(&self) -> Value {
        match &self.event {
            JobEvent::Token(token) => {
                let mut map = Map::new();
                map.insert("token".to_string(), Value::String(token.clone()));
                Value::Object(map)
            }
            _ => Value::Object(Map::new()),
        }
    }
}
