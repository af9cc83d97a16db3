//! Bridge from a job's relay subscription to an ordered client stream.

use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use relay::{RelayError, Subscription};
use stream_core::{JobEvent, RelayMessage, StreamRecord};
use tokio::time::Instant;

/// Outbound records for one job. Ends right after the first terminal record.
///
/// Dropping the stream releases the subscription.
pub type BridgeStream = BoxStream<'static, StreamRecord>;

/// Stand-in deadline for durations too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Turn `subscription` into a stream bounded by `max_duration`, counted from
/// now.
pub fn bridge_stream(subscription: Subscription, max_duration: Duration) -> BridgeStream {
    let now = Instant::now();
    let deadline = now.checked_add(max_duration).unwrap_or_else(|| now + FAR_FUTURE);

    stream::unfold(Some(subscription), move |state| async move {
        let mut subscription = state?;
        let record = next_record(&mut subscription, deadline, max_duration).await;

        if record.is_terminal() {
            tracing::debug!(
                "Bridge for {} finished with {} ({:?})",
                subscription.topic(),
                record.event.description(),
                record.origin
            );
            subscription.release();
            Some((record, None))
        } else {
            Some((record, Some(subscription)))
        }
    })
    .boxed()
}

async fn next_record(
    subscription: &mut Subscription,
    deadline: Instant,
    max_duration: Duration,
) -> StreamRecord {
    let message = match tokio::time::timeout_at(deadline, subscription.next_message()).await {
        Ok(message) => message,
        Err(_) => {
            tracing::warn!(
                "Bridge for {} reached its max duration of {:?}",
                subscription.topic(),
                max_duration
            );
            return StreamRecord::local(JobEvent::Timeout);
        }
    };

    let payload = match message {
        Some(Ok(payload)) => payload,
        Some(Err(e)) => return transport_fault(subscription, e),
        None => return transport_fault(subscription, RelayError::Closed),
    };

    match RelayMessage::decode_event(&payload) {
        Ok(event) => StreamRecord::relayed(event),
        Err(e) => {
            tracing::error!(
                "Undecodable relay payload for {}: {}",
                subscription.topic(),
                e
            );
            StreamRecord::local(JobEvent::Error)
        }
    }
}

fn transport_fault(subscription: &Subscription, error: RelayError) -> StreamRecord {
    tracing::error!("Relay failure for {}: {}", subscription.topic(), error);
    StreamRecord::local(JobEvent::Error)
}
