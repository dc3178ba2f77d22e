//! Wire protocol of the script generation stream.
//!
//! Each event is one line `data: <json>` followed by a blank line, with
//! the payload tagged by a `type` discriminator. Events can be split at
//! arbitrary byte boundaries, including mid-UTF-8 and mid-JSON, so the
//! decoder buffers bytes and only surfaces complete lines.

use serde::Deserialize;

pub const EVENT_PREFIX: &str = "data: ";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScriptEvent {
    Status {
        message: String,
    },
    Chunk {
        content: String,
    },
    Complete {
        script: String,
        #[serde(rename = "scriptId", default)]
        script_id: Option<String>,
        #[serde(default)]
        title: Option<String>,
    },
    Error {
        message: String,
    },
}

/// Incremental line decoder.
///
/// Bytes go in, complete lines come out; the trailing fragment stays
/// buffered until its newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Hand back whatever is buffered once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Parse one line into an event.
///
/// Lines without the event prefix (blank separators, comments) and lines
/// whose payload is not valid JSON both yield `None`; dropping them is
/// an accepted protocol characteristic, not an error.
pub fn parse_event(line: &str) -> Option<ScriptEvent> {
    let payload = line.strip_prefix(EVENT_PREFIX)?;
    serde_json::from_str(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_reads() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"data: {\"type\":").is_empty());
        assert!(buffer.push(b"\"status\",\"message\"").is_empty());
        let lines = buffer.push(b":\"warming up\"}\n\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "data: {\"type\":\"status\",\"message\":\"warming up\"}");
        assert_eq!(lines[1], "");
    }

    #[test]
    fn test_multibyte_utf8_split_mid_character() {
        let text = "data: {\"type\":\"chunk\",\"content\":\"héllo\"}\n";
        let bytes = text.as_bytes();
        // Split inside the two-byte 'é'.
        let split = text.find('é').unwrap() + 1;

        let mut buffer = LineBuffer::default();
        assert!(buffer.push(&bytes[..split]).is_empty());
        let lines = buffer.push(&bytes[split..]);
        assert_eq!(lines.len(), 1);
        let event = parse_event(&lines[0]).unwrap();
        assert_eq!(
            event,
            ScriptEvent::Chunk {
                content: "héllo".to_string()
            }
        );
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut buffer = LineBuffer::default();
        let lines = buffer.push(b"data: {\"type\":\"status\",\"message\":\"ok\"}\r\n");
        assert_eq!(lines.len(), 1);
        assert!(parse_event(&lines[0]).is_some());
    }

    #[test]
    fn test_finish_returns_trailing_fragment() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"data: tail");
        assert_eq!(buffer.finish().as_deref(), Some("data: tail"));
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn test_parse_event_kinds() {
        assert_eq!(
            parse_event("data: {\"type\":\"status\",\"message\":\"m\"}"),
            Some(ScriptEvent::Status {
                message: "m".to_string()
            })
        );
        assert_eq!(
            parse_event("data: {\"type\":\"chunk\",\"content\":\"c\"}"),
            Some(ScriptEvent::Chunk {
                content: "c".to_string()
            })
        );
        assert_eq!(
            parse_event(
                "data: {\"type\":\"complete\",\"script\":\"s\",\"scriptId\":\"id1\",\"title\":\"t\"}"
            ),
            Some(ScriptEvent::Complete {
                script: "s".to_string(),
                script_id: Some("id1".to_string()),
                title: Some("t".to_string()),
            })
        );
        assert_eq!(
            parse_event("data: {\"type\":\"error\",\"message\":\"boom\"}"),
            Some(ScriptEvent::Error {
                message: "boom".to_string()
            })
        );
    }

    #[test]
    fn test_complete_without_identifiers() {
        let event = parse_event("data: {\"type\":\"complete\",\"script\":\"s\"}").unwrap();
        assert_eq!(
            event,
            ScriptEvent::Complete {
                script: "s".to_string(),
                script_id: None,
                title: None,
            }
        );
    }

    #[test]
    fn test_malformed_and_foreign_lines_dropped() {
        assert!(parse_event("").is_none());
        assert!(parse_event(": keepalive").is_none());
        assert!(parse_event("data: {\"type\":\"chunk\",\"content\"").is_none());
        assert!(parse_event("data: {\"type\":\"unknown\",\"x\":1}").is_none());
    }
}
