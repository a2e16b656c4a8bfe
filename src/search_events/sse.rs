//! Server-sent-event framing for the search event stream
//!
//! Events travel as `data: {json}\n\n` frames. The encoder side is a plain
//! function; the decoder side buffers partial trailing lines between
//! chunks, since HTTP chunk boundaries do not respect frame boundaries.

use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use super::types::SearchEvent;

/// Encode one event as an SSE data frame.
pub fn encode_frame(event: &SearchEvent) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Turn a bus subscription into a stream of SSE frames.
///
/// Lagged or unencodable events are skipped; the stream ends when the bus
/// is dropped. Intended for chunked HTTP response bodies.
pub fn frame_stream(
    receiver: broadcast::Receiver<SearchEvent>,
) -> impl tokio_stream::Stream<Item = String> {
    BroadcastStream::new(receiver)
        .filter_map(|received| received.ok().and_then(|event| encode_frame(&event).ok()))
}

/// Incremental decoder for a chunked SSE stream.
///
/// Feed raw chunks in arrival order; complete `data:` lines come out as
/// JSON values. Incomplete trailing lines are retained until the next
/// chunk. Unknown fields are preserved as-is: consumers decide what to
/// ignore.
#[derive(Debug, Default)]
pub struct SseFrameBuffer {
    buffer: String,
}

impl SseFrameBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk and drain every complete event it finishes.
    pub fn push(&mut self, chunk: &str) -> Vec<Value> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim().to_string();
            self.buffer.drain(..=line_end);

            if let Some(data) = line.strip_prefix("data: ")
                && let Ok(value) = serde_json::from_str::<Value>(data)
            {
                events.push(value);
            }
        }

        events
    }

    /// Bytes currently held waiting for a line terminator.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_data_frame() {
        let frame = encode_frame(&SearchEvent::combinations_generated(2)).expect("encodes");
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
    }

    #[test]
    fn decoder_handles_frame_split_across_chunks() {
        let frame = encode_frame(&SearchEvent::loading("halfway")).expect("encodes");
        let (head, tail) = frame.split_at(frame.len() / 2);

        let mut decoder = SseFrameBuffer::new();
        assert!(decoder.push(head).is_empty());
        assert!(decoder.pending() > 0);

        let events = decoder.push(tail);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "loading");
        assert_eq!(events[0]["message"], "halfway");
    }

    #[test]
    fn decoder_drains_multiple_frames_from_one_chunk() {
        let chunk = format!(
            "{}{}",
            encode_frame(&SearchEvent::combinations_generated(1)).expect("encodes"),
            encode_frame(&SearchEvent::error("bad config")).expect("encodes"),
        );
        let mut decoder = SseFrameBuffer::new();
        let events = decoder.push(&chunk);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "combinations_generated");
        assert_eq!(events[1]["type"], "error");
    }

    #[test]
    fn round_trip_preserves_event_payload() {
        let event = SearchEvent::combinations_generated(42);
        let frame = encode_frame(&event).expect("encodes");
        let mut decoder = SseFrameBuffer::new();
        let events = decoder.push(&frame);
        assert_eq!(events[0]["total"], 42);
    }

    #[tokio::test]
    async fn frame_stream_yields_encoded_frames() {
        let bus = crate::search_events::SearchEventBus::new();
        let mut frames = std::pin::pin!(frame_stream(bus.subscribe()));
        bus.publish(SearchEvent::combinations_generated(9))
            .expect("publish succeeds");
        drop(bus);
        let frame = frames.next().await.expect("one frame");
        assert!(frame.starts_with("data: {"));
        assert!(frames.next().await.is_none(), "stream ends with the bus");
    }

    #[test]
    fn non_data_lines_are_skipped() {
        let mut decoder = SseFrameBuffer::new();
        let events = decoder.push(": keepalive\n\ndata: {\"type\":\"loading\",\"message\":\"x\",\"timestamp\":\"2025-01-01T00:00:00Z\"}\n\n");
        assert_eq!(events.len(), 1);
    }
}
