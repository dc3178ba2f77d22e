//! Script stream session state.
//!
//! Accumulates partial text until a `complete` event replaces it
//! wholesale, or an `error` event ends the session.

use tracing::debug;

use super::protocol::{parse_event, LineBuffer, ScriptEvent, EVENT_PREFIX};

/// Callbacks fired as events arrive. All default to no-ops.
pub trait ScriptSink: Send {
    fn on_status(&mut self, _message: &str) {}
    fn on_chunk(&mut self, _content: &str) {}
    fn on_complete(&mut self, _script: &str, _script_id: Option<&str>, _title: Option<&str>) {}
    fn on_error(&mut self, _message: &str) {}
}

/// Sink that ignores everything.
pub struct NullSink;

impl ScriptSink for NullSink {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Streaming,
    Completed,
    Failed(String),
}

#[derive(Debug)]
pub struct ScriptSession {
    accumulated: String,
    status_messages: Vec<String>,
    script_id: Option<String>,
    title: Option<String>,
    state: SessionState,
}

impl Default for ScriptSession {
    fn default() -> Self {
        Self {
            accumulated: String::new(),
            status_messages: Vec::new(),
            script_id: None,
            title: None,
            state: SessionState::Streaming,
        }
    }
}

impl ScriptSession {
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    pub fn status_messages(&self) -> &[String] {
        &self.status_messages
    }

    pub fn script_id(&self) -> Option<&str> {
        self.script_id.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state != SessionState::Streaming
    }

    /// Process one line. Returns `false` once the session is terminal;
    /// no further events are processed after that.
    pub fn handle_line(&mut self, line: &str, sink: &mut dyn ScriptSink) -> bool {
        if self.is_terminal() {
            return false;
        }

        let Some(event) = parse_event(line) else {
            if line.starts_with(EVENT_PREFIX) {
                debug!("Dropping malformed script event line");
            }
            return true;
        };

        match event {
            ScriptEvent::Status { message } => {
                self.status_messages.push(message.clone());
                sink.on_status(&message);
                true
            }
            ScriptEvent::Chunk { content } => {
                self.accumulated.push_str(&content);
                sink.on_chunk(&content);
                true
            }
            ScriptEvent::Complete {
                script,
                script_id,
                title,
            } => {
                // Authoritative text replaces, never merges.
                self.accumulated = script;
                self.script_id = script_id;
                self.title = title;
                self.state = SessionState::Completed;
                sink.on_complete(
                    &self.accumulated,
                    self.script_id.as_deref(),
                    self.title.as_deref(),
                );
                false
            }
            ScriptEvent::Error { message } => {
                self.state = SessionState::Failed(message.clone());
                sink.on_error(&message);
                false
            }
        }
    }

    /// Feed raw bytes through a line buffer. Returns `false` once the
    /// session is terminal.
    pub fn feed(&mut self, bytes: &[u8], buffer: &mut LineBuffer, sink: &mut dyn ScriptSink) -> bool {
        for line in buffer.push(bytes) {
            if !self.handle_line(&line, sink) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_line(content: &str) -> String {
        format!("data: {{\"type\":\"chunk\",\"content\":\"{content}\"}}")
    }

    #[test]
    fn test_chunks_accumulate() {
        let mut session = ScriptSession::default();
        assert!(session.handle_line(&chunk_line("Hello "), &mut NullSink));
        assert!(session.handle_line(&chunk_line("World"), &mut NullSink));
        assert_eq!(session.text(), "Hello World");
        assert_eq!(session.state(), &SessionState::Streaming);
    }

    #[test]
    fn test_complete_replaces_not_appends() {
        let mut session = ScriptSession::default();
        session.handle_line(&chunk_line("Hello "), &mut NullSink);
        session.handle_line(&chunk_line("World"), &mut NullSink);
        let more = session.handle_line(
            "data: {\"type\":\"complete\",\"script\":\"Goodbye\",\"scriptId\":\"s9\",\"title\":\"T\"}",
            &mut NullSink,
        );
        assert!(!more);
        assert_eq!(session.text(), "Goodbye");
        assert_eq!(session.script_id(), Some("s9"));
        assert_eq!(session.title(), Some("T"));
        assert_eq!(session.state(), &SessionState::Completed);
    }

    #[test]
    fn test_error_terminates_and_ignores_later_events() {
        let mut session = ScriptSession::default();
        session.handle_line(&chunk_line("partial"), &mut NullSink);
        let more = session.handle_line(
            "data: {\"type\":\"error\",\"message\":\"rate limited\"}",
            &mut NullSink,
        );
        assert!(!more);
        assert_eq!(
            session.state(),
            &SessionState::Failed("rate limited".to_string())
        );
        // Events after terminal are not processed.
        assert!(!session.handle_line(&chunk_line("late"), &mut NullSink));
        assert_eq!(session.text(), "partial");
    }

    #[test]
    fn test_malformed_line_is_not_fatal() {
        let mut session = ScriptSession::default();
        assert!(session.handle_line("data: {\"type\":\"chunk\",", &mut NullSink));
        assert!(session.handle_line(&chunk_line("ok"), &mut NullSink));
        assert_eq!(session.text(), "ok");
    }

    #[test]
    fn test_status_collects_messages() {
        let mut session = ScriptSession::default();
        session.handle_line(
            "data: {\"type\":\"status\",\"message\":\"Starting script generation...\"}",
            &mut NullSink,
        );
        assert_eq!(session.status_messages().len(), 1);
        assert_eq!(session.text(), "");
    }

    #[test]
    fn test_sink_receives_forwarded_chunks() {
        struct Collecting {
            chunks: Vec<String>,
        }
        impl ScriptSink for Collecting {
            fn on_chunk(&mut self, content: &str) {
                self.chunks.push(content.to_string());
            }
        }

        let mut sink = Collecting { chunks: Vec::new() };
        let mut session = ScriptSession::default();
        session.handle_line(&chunk_line("a"), &mut sink);
        session.handle_line(&chunk_line("b"), &mut sink);
        assert_eq!(sink.chunks, vec!["a", "b"]);
    }
}
