//! Script stream protocol tests: byte-split invariance and
//! replace-on-complete semantics.

use telecue::script::{LineBuffer, NullSink, ScriptSession, ScriptSink, SessionState};

fn event_payload() -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"data: {\"type\":\"status\",\"message\":\"Starting script generation...\"}\n\n");
    payload.extend_from_slice(b"data: {\"type\":\"chunk\",\"content\":\"Good morning. \"}\n\n");
    // Multi-byte characters force mid-UTF-8 splits at odd offsets.
    payload.extend_from_slice(
        "data: {\"type\":\"chunk\",\"content\":\"Caf\u{e9} \u{4e16}\u{754c} notes. \"}\n\n"
            .as_bytes(),
    );
    payload.extend_from_slice(b"data: {\"type\":\"chunk\",\"content\":\"Thanks for watching.\"}\n\n");
    payload
}

fn feed_in_splits(payload: &[u8], split: usize) -> ScriptSession {
    let mut session = ScriptSession::default();
    let mut buffer = LineBuffer::default();
    let mut sink = NullSink;

    for piece in payload.chunks(split.max(1)) {
        if !session.feed(piece, &mut buffer, &mut sink) {
            break;
        }
    }
    if !session.is_terminal() {
        if let Some(rest) = buffer.finish() {
            session.handle_line(&rest, &mut sink);
        }
    }
    session
}

#[test]
fn test_arbitrary_split_boundaries_match_unsplit_feed() {
    let payload = event_payload();
    let reference = feed_in_splits(&payload, payload.len());

    for split in [1, 2, 3, 5, 7, 11, 16, 64] {
        let session = feed_in_splits(&payload, split);
        assert_eq!(
            session.text(),
            reference.text(),
            "split size {split} diverged"
        );
        assert_eq!(session.status_messages().len(), 1);
    }

    assert_eq!(
        reference.text(),
        "Good morning. Caf\u{e9} \u{4e16}\u{754c} notes. Thanks for watching."
    );
}

#[test]
fn test_mid_json_split_of_complete_event() {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"data: {\"type\":\"chunk\",\"content\":\"draft\"}\n");
    payload.extend_from_slice(
        b"data: {\"type\":\"complete\",\"script\":\"Final text.\",\"scriptId\":\"abc123\",\"title\":\"Boats\"}\n",
    );

    for split in [1, 3, 9, 40] {
        let session = feed_in_splits(&payload, split);
        assert_eq!(session.state(), &SessionState::Completed);
        assert_eq!(session.text(), "Final text.");
        assert_eq!(session.script_id(), Some("abc123"));
        assert_eq!(session.title(), Some("Boats"));
    }
}

#[test]
fn test_complete_replaces_accumulated_text() {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"data: {\"type\":\"chunk\",\"content\":\"Hello \"}\n");
    payload.extend_from_slice(b"data: {\"type\":\"chunk\",\"content\":\"World\"}\n");
    payload.extend_from_slice(b"data: {\"type\":\"complete\",\"script\":\"Goodbye\"}\n");

    let session = feed_in_splits(&payload, 4);
    assert_eq!(session.text(), "Goodbye");
    assert_eq!(session.state(), &SessionState::Completed);
}

#[test]
fn test_error_event_stops_processing() {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"data: {\"type\":\"chunk\",\"content\":\"before\"}\n");
    payload.extend_from_slice(b"data: {\"type\":\"error\",\"message\":\"Invalid API key\"}\n");
    payload.extend_from_slice(b"data: {\"type\":\"chunk\",\"content\":\"after\"}\n");

    let session = feed_in_splits(&payload, 8);
    assert_eq!(
        session.state(),
        &SessionState::Failed("Invalid API key".to_string())
    );
    assert_eq!(session.text(), "before");
}

#[test]
fn test_malformed_lines_are_dropped_not_fatal() {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"data: {\"type\":\"chunk\",\"content\":\"keep\"}\n");
    payload.extend_from_slice(b"data: {oops not json\n");
    payload.extend_from_slice(b"totally unrelated line\n");
    payload.extend_from_slice(b"data: {\"type\":\"chunk\",\"content\":\" going\"}\n");

    let session = feed_in_splits(&payload, 13);
    assert_eq!(session.text(), "keep going");
    assert_eq!(session.state(), &SessionState::Streaming);
}

#[test]
fn test_chunks_forwarded_in_order() {
    struct Collecting {
        chunks: Vec<String>,
    }
    impl ScriptSink for Collecting {
        fn on_chunk(&mut self, content: &str) {
            self.chunks.push(content.to_string());
        }
    }

    let mut payload = Vec::new();
    for word in ["alpha ", "beta ", "gamma"] {
        payload
            .extend_from_slice(format!("data: {{\"type\":\"chunk\",\"content\":\"{word}\"}}\n").as_bytes());
    }

    let mut session = ScriptSession::default();
    let mut buffer = LineBuffer::default();
    let mut sink = Collecting { chunks: Vec::new() };
    for piece in payload.chunks(5) {
        session.feed(piece, &mut buffer, &mut sink);
    }

    assert_eq!(sink.chunks, vec!["alpha ", "beta ", "gamma"]);
    assert_eq!(session.text(), "alpha beta gamma");
}
