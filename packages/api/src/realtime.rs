//! Server-Sent Events framing of outbound records.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures_util::{Stream, StreamExt};
use stream_core::StreamRecord;

use crate::bridge::BridgeStream;

/// Convert a record into an SSE event.
///
/// Tokens go out as unnamed events carrying `{"token": ...}`; the terminal
/// record is named after its kind and carries `{}`.
pub fn sse_event(record: &StreamRecord) -> Event {
    let event = if record.is_terminal() {
        Event::default().event(record.event.kind().as_str())
    } else {
        Event::default()
    };
    event.data(record.payload().to_string())
}

/// Helper to format a record as raw SSE text.
pub fn format_sse_record(record: &StreamRecord) -> String {
    if record.is_terminal() {
        format!("event: {}\ndata: {}\n\n", record.event.kind(), record.payload())
    } else {
        format!("data: {}\n\n", record.payload())
    }
}

/// Adapt a bridge stream for an axum SSE response.
pub fn sse_stream(records: BridgeStream) -> impl Stream<Item = Result<Event, Infallible>> {
    records.map(|record| Ok(sse_event(&record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_core::JobEvent;

    #[test]
    fn test_token_frame() {
        let record = StreamRecord::relayed(JobEvent::Token("hi:".to_string()));
        assert_eq!(format_sse_record(&record), "data: {\"token\":\"hi:\"}\n\n");
    }

    #[test]
    fn test_terminal_frames_omit_origin() {
        let relayed = StreamRecord::relayed(JobEvent::Timeout);
        let local = StreamRecord::local(JobEvent::Timeout);
        assert_eq!(format_sse_record(&relayed), "event: timeout\ndata: {}\n\n");
        assert_eq!(format_sse_record(&relayed), format_sse_record(&local));

        let done = StreamRecord::relayed(JobEvent::Done);
        assert_eq!(format_sse_record(&done), "event: done\ndata: {}\n\n");
    }
}
