//! Producer test doubles with explicit fault injection.
//!
//! Nothing here is used by the default wiring; stalls and failures only happen
//! when a test configures them.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use stream_core::Job;

use crate::producer::{Producer, ProducerError, TokenStream};

/// How long a stalled producer sleeps. Far past any deadline used in practice.
pub const STALL: Duration = Duration::from_secs(3600);

/// Yields a fixed script of tokens, optionally stalling or failing part way.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProducer {
    tokens: Vec<String>,
    delay: Duration,
    stall_after: Option<usize>,
    fail_after: Option<usize>,
    yielded: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

impl ScriptedProducer {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Sleep this long before every token.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hang for [`STALL`] once `count` tokens have been yielded.
    pub fn stalling_after(mut self, count: usize) -> Self {
        self.stall_after = Some(count);
        self
    }

    /// Fail with a [`ProducerError`] once `count` tokens have been yielded.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Tokens handed out across every stream so far.
    pub fn yielded(&self) -> usize {
        self.yielded.load(Ordering::SeqCst)
    }

    /// Streams that have been started and not yet dropped.
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ScriptState {
    index: usize,
    _guard: ActiveGuard,
}

impl Producer for ScriptedProducer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn produce(&self, _job: &Job) -> TokenStream {
        let script = Arc::new(self.clone());
        let state = ScriptState {
            index: 0,
            _guard: ActiveGuard::enter(&self.active),
        };

        stream::unfold(Some(state), move |state| {
            let script = Arc::clone(&script);
            async move {
                let mut state = state?;
                let index = state.index;

                if script.stall_after == Some(index) {
                    tokio::time::sleep(STALL).await;
                }
                if script.fail_after == Some(index) {
                    let error = ProducerError::Generation(format!(
                        "scripted failure after {} tokens",
                        index
                    ));
                    return Some((Err(error), None));
                }

                let token = script.tokens.get(index)?.clone();
                if !script.delay.is_zero() {
                    tokio::time::sleep(script.delay).await;
                }

                script.yielded.fetch_add(1, Ordering::SeqCst);
                state.index += 1;
                Some((Ok(token), Some(state)))
            }
        })
        .boxed()
    }
}
