//! Job domain types and the queue message envelope.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque correlation key for a job.
///
/// The gateway mints ULIDs, but workers accept any non-empty string so that
/// other producers of queue messages can pick their own scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Wrap an existing identifier.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated unit of work: one prompt to be turned into a token stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Correlation key, also the relay topic.
    pub id: JobId,
    /// Opaque prompt payload.
    pub prompt: String,
    /// Absolute deadline after which the job must not be processed.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a job without an expiry.
    pub fn new(id: JobId, prompt: impl Into<String>) -> Self {
        Self {
            id,
            prompt: prompt.into(),
            expires_at: None,
        }
    }

    /// Set the absolute expiry for this job.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the expiry has already passed at `now`. No expiry never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline < now)
    }

    /// Build the queue wire envelope for this job.
    pub fn to_envelope(&self) -> JobEnvelope {
        JobEnvelope {
            job_id: Some(self.id.to_string()),
            prompt: Some(self.prompt.clone()),
            expiry: self.expires_at.map(to_unix_seconds),
        }
    }
}

/// Why a queue message could not be turned into a [`Job`].
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Malformed message body: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Message is missing a job id")]
    MissingJobId,
    #[error("Message is missing a prompt")]
    MissingPrompt,
    #[error("Expiry is not a valid timestamp: {0}")]
    InvalidExpiry(f64),
}

/// Queue message body as it travels through the broker.
///
/// Every field is optional on the wire; [`JobEnvelope::into_job`] enforces
/// the required ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    #[serde(default, alias = "uuid", skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, alias = "query", skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Absolute unix timestamp in (fractional) seconds.
    #[serde(default, alias = "expires_at", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<f64>,
}

impl JobEnvelope {
    /// Parse a raw message body.
    pub fn decode(body: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Validate the envelope into a [`Job`].
    pub fn into_job(self) -> Result<Job, EnvelopeError> {
        let job_id = self
            .job_id
            .filter(|id| !id.is_empty())
            .ok_or(EnvelopeError::MissingJobId)?;
        let prompt = self
            .prompt
            .filter(|p| !p.is_empty())
            .ok_or(EnvelopeError::MissingPrompt)?;

        let mut job = Job::new(JobId::from_string(job_id), prompt);
        if let Some(seconds) = self.expiry {
            job = job.with_expiry(from_unix_seconds(seconds)?);
        }
        Ok(job)
    }

    /// Decode and validate in one step.
    pub fn parse_job(body: &str) -> Result<Job, EnvelopeError> {
        Self::decode(body)?.into_job()
    }
}

fn to_unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

fn from_unix_seconds(seconds: f64) -> Result<DateTime<Utc>, EnvelopeError> {
    if !seconds.is_finite() {
        return Err(EnvelopeError::InvalidExpiry(seconds));
    }
    Utc.timestamp_millis_opt((seconds * 1000.0).round() as i64)
        .single()
        .ok_or(EnvelopeError::InvalidExpiry(seconds))
}
