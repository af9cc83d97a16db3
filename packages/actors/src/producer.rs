//! Producer trait and the built-in token producers.

use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use stream_core::Job;

/// Stream of tokens produced for one job.
///
/// Dropping the stream cancels generation at its current suspension point.
pub type TokenStream = BoxStream<'static, Result<String, ProducerError>>;

/// Errors raised while generating tokens.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("Generation failed: {0}")]
    Generation(String),
}

/// Trait for token producers.
///
/// Implement this trait to plug a generation engine into the workers.
pub trait Producer: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Start producing tokens for a job.
    fn produce(&self, job: &Job) -> TokenStream;
}

/// Deterministic stand-in for a generation engine.
///
/// Streams the words of a synthetic sentence built from the prompt and the
/// job id, sleeping `interval` before each word.
#[derive(Debug, Clone)]
pub struct SimulatedProducer {
    interval: Duration,
}

impl SimulatedProducer {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The tokens this producer yields for `job`, in order.
    pub fn words(job: &Job) -> Vec<String> {
        format!(
            "{}: This is a simulated LLM stream. Channel ID: {}",
            job.prompt, job.id
        )
        .split_whitespace()
        .map(str::to_string)
        .collect()
    }
}

impl Default for SimulatedProducer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

impl Producer for SimulatedProducer {
    fn name(&self) -> &str {
        "simulated"
    }

    fn produce(&self, job: &Job) -> TokenStream {
        let interval = self.interval;
        stream::iter(Self::words(job))
            .then(move |word| async move {
                tokio::time::sleep(interval).await;
                Ok(word)
            })
            .boxed()
    }
}

/// A simple function-based producer.
pub struct FnProducer<F>
where
    F: Fn(&Job) -> TokenStream + Send + Sync + 'static,
{
    name: String,
    produce: F,
}

impl<F> FnProducer<F>
where
    F: Fn(&Job) -> TokenStream + Send + Sync + 'static,
{
    /// Create a new function-based producer.
    pub fn new(name: impl Into<String>, produce: F) -> Self {
        Self {
            name: name.into(),
            produce,
        }
    }
}

impl<F> Producer for FnProducer<F>
where
    F: Fn(&Job) -> TokenStream + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn produce(&self, job: &Job) -> TokenStream {
        (self.produce)(job)
    }
}
