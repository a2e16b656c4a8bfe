//! Event stream wire-format tests
//!
//! The subscriber contract: externally tagged JSON events in SSE frames,
//! with unknown fields ignorable and incomplete chunks buffered.

use chrono::NaiveDate;
use farescout::model::{DatePair, Flight, WorkerResult};
use farescout::{SearchEvent, SearchEventBus, SseFrameBuffer, encode_frame};

fn sample_pair() -> DatePair {
    DatePair {
        pair_id: 2,
        dep_date: NaiveDate::from_ymd_opt(2025, 11, 2).expect("valid date"),
        ret_date: NaiveDate::from_ymd_opt(2025, 11, 27).expect("valid date"),
    }
}

fn sample_result() -> WorkerResult {
    WorkerResult::completed(
        &sample_pair(),
        vec![Flight {
            airline: "AC".into(),
            price: "$1,234".into(),
            duration: "14h 10m".into(),
            route: "YVR-DEL".into(),
            stops: Some("1 stop".into()),
            trip_type: "round_trip".into(),
        }],
    )
}

#[test]
fn events_serialize_with_snake_case_tags() {
    let result = sample_result();
    let cases = vec![
        (SearchEvent::combinations_generated(5), "combinations_generated"),
        (
            SearchEvent::session_created(&sample_pair(), "sess-1".into(), None),
            "session_created",
        ),
        (SearchEvent::loading("starting"), "loading"),
        (SearchEvent::minion_completed(&result), "minion_completed"),
        (
            SearchEvent::minion_failed_final(&sample_pair(), "worker_timeout: too slow".into()),
            "minion_failed_final",
        ),
        (SearchEvent::error("configuration: missing key"), "error"),
    ];
    for (event, expected_tag) in cases {
        let json = serde_json::to_value(&event).expect("serializes");
        assert_eq!(json["type"], expected_tag);
    }
}

#[test]
fn dates_use_iso_format_on_the_wire() {
    let json =
        serde_json::to_value(SearchEvent::minion_completed(&sample_result())).expect("serializes");
    assert_eq!(json["dep_date"], "2025-11-02");
    assert_eq!(json["ret_date"], "2025-11-27");
    assert_eq!(json["pair_id"], 2);
    assert_eq!(json["flights"][0]["type"], "round_trip");
    assert_eq!(json["flights"][0]["price"], "$1,234");
}

#[test]
fn sse_round_trip_across_arbitrary_chunk_boundaries() {
    let frames: String = [
        SearchEvent::combinations_generated(3),
        SearchEvent::session_created(&sample_pair(), "sess-9".into(), Some("https://lv".into())),
        SearchEvent::minion_completed(&sample_result()),
    ]
    .iter()
    .map(|e| encode_frame(e).expect("encodes"))
    .collect();

    // Feed the byte stream in awkward 7-byte chunks.
    let mut decoder = SseFrameBuffer::new();
    let mut decoded = Vec::new();
    let bytes = frames.as_bytes();
    for chunk in bytes.chunks(7) {
        decoded.extend(decoder.push(std::str::from_utf8(chunk).expect("utf8 chunks")));
    }

    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded[0]["type"], "combinations_generated");
    assert_eq!(decoded[1]["live_view_url"], "https://lv");
    assert_eq!(decoded[2]["flights"][0]["airline"], "AC");
}

#[test]
fn consumers_can_ignore_unknown_fields() {
    // A frame from a newer producer with extra fields still decodes.
    let mut decoder = SseFrameBuffer::new();
    let events = decoder.push(
        "data: {\"type\":\"loading\",\"message\":\"x\",\"timestamp\":\"2025-01-01T00:00:00Z\",\"shiny_new_field\":1}\n\n",
    );
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "loading");
}

#[tokio::test]
async fn bus_delivers_a_totally_ordered_history() {
    let bus = SearchEventBus::new();
    let mut rx = bus.subscribe();

    for i in 0..10usize {
        bus.publish(SearchEvent::combinations_generated(i))
            .expect("publish succeeds");
    }

    for i in 0..10usize {
        match rx.recv().await.expect("receives") {
            SearchEvent::CombinationsGenerated { total, .. } => assert_eq!(total, i),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
