use std::time::Duration;

use relay::{MemoryRelay, RelayConfig, RelayError, Subscription};

pub fn relay_with_capacity(capacity: usize) -> MemoryRelay {
    MemoryRelay::new(RelayConfig::memory().with_capacity(capacity))
}

/// Next payload, failing the test instead of hanging.
pub async fn next_within(
    subscription: &mut Subscription,
    wait: Duration,
) -> Option<Result<String, RelayError>> {
    tokio::time::timeout(wait, subscription.next_message())
        .await
        .expect("timed out waiting for relay message")
}
