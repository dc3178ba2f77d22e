//! Cleanup of generated scripts before display or saving.
//!
//! Generators leak metadata despite being told not to: lead-in phrases,
//! section headers, timestamps, list markers. Applied by the CLI on the
//! finished script, never inside the stream session.

use regex::Regex;
use std::sync::OnceLock;

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Lead-in and metadata prefixes at line starts.
            r"(?im)^(here's your script:|script begins:|generated script:|script:)\s*",
            r"(?im)^(title:|topic:|duration:|tone:).*$",
            r"(?im)^(word count:|length:|estimated time:).*$",
            r"(?im)^(introduction:|opening:|closing:|conclusion:)\s*",
            r"(?im)^(paragraph \d+:|section \d+:|part \d+:)\s*",
            // Timestamps like [1:23] or (0:45).
            r"\[\d{1,2}:\d{2}\]",
            r"\(\d{1,2}:\d{2}\)",
            // List markers.
            r"(?m)^\s*[-*]\s+",
            r"(?m)^\s*\d+\.\s+",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static sanitize pattern"))
        .collect()
    })
}

fn blank_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n\s*\n+").expect("static blank-run pattern"))
}

/// Strip generator metadata and collapse whitespace.
pub fn clean_script(raw: &str) -> String {
    let mut text = raw.to_string();
    for pattern in patterns() {
        text = pattern.replace_all(&text, "").into_owned();
    }
    let text = blank_runs().replace_all(&text, "\n\n");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_lead_in_phrase() {
        let cleaned = clean_script("Here's your script: Welcome everyone.");
        assert_eq!(cleaned, "Welcome everyone.");
    }

    #[test]
    fn test_strips_metadata_lines() {
        let raw = "Title: My Talk\nWelcome everyone.\nWord count: 150\nThanks for watching.";
        let cleaned = clean_script(raw);
        assert!(!cleaned.contains("Title:"));
        assert!(!cleaned.contains("Word count:"));
        assert!(cleaned.contains("Welcome everyone."));
        assert!(cleaned.contains("Thanks for watching."));
    }

    #[test]
    fn test_strips_timestamps_and_list_markers() {
        let raw = "[0:15] First point\n- second point\n3. third point";
        let cleaned = clean_script(raw);
        assert!(!cleaned.contains("[0:15]"));
        assert!(!cleaned.contains("- "));
        assert!(cleaned.contains("First point"));
        assert!(cleaned.contains("second point"));
        assert!(cleaned.contains("third point"));
    }

    #[test]
    fn test_collapses_blank_runs() {
        let cleaned = clean_script("one\n\n\n\ntwo");
        assert_eq!(cleaned, "one\n\ntwo");
    }

    #[test]
    fn test_clean_text_unchanged() {
        let raw = "Good morning. Today we talk about boats.\n\nBoats float.";
        assert_eq!(clean_script(raw), raw);
    }
}
