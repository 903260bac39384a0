//! Annotation cleaning shared by every description source

use regex::Regex;
use std::sync::OnceLock;

/// Sentences annotators and models use to say nothing was performed.
/// Matched case-insensitively, ignoring a trailing period.
pub const NO_GESTURE_PHRASES: [&str; 8] = [
    "no gesture performed",
    "no hand gesture performed",
    "the user does not perform any gesture",
    "the user does not perform any hand gesture",
    "the user does not perform any hand gestures",
    "the user does not perform any gesture throughout the sequence",
    "the user does not perform any distinct gesture",
    "no discernible hand gesture is performed",
];

fn unknown_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^\s*unknown\s*$").unwrap())
}

/// Trim and collapse internal whitespace
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean one annotation value.
///
/// Returns `None` when nothing usable is left: empty text, `unknown`, or a
/// "no gesture" sentence. A single trailing period is removed.
pub fn clean_annotation(raw: &str) -> Option<String> {
    if unknown_pattern().is_match(raw) {
        return None;
    }
    let mut text = collapse_whitespace(raw);
    if text.ends_with('.') {
        text.pop();
        text = text.trim_end().to_string();
    }
    if text.is_empty() {
        return None;
    }
    let lowered = text.to_lowercase();
    if NO_GESTURE_PHRASES.contains(&lowered.as_str()) {
        return None;
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  open \n palm\t up "), "open palm up");
    }

    #[test]
    fn test_clean_removes_trailing_period_once() {
        assert_eq!(
            clean_annotation(" Index finger taps the lips. ").as_deref(),
            Some("Index finger taps the lips")
        );
        assert_eq!(clean_annotation("Wave..").as_deref(), Some("Wave."));
    }

    #[test]
    fn test_clean_unknown_is_missing() {
        assert_eq!(clean_annotation("unknown"), None);
        assert_eq!(clean_annotation("  Unknown "), None);
        assert_eq!(
            clean_annotation("unknown hand shape").as_deref(),
            Some("unknown hand shape")
        );
    }

    #[test]
    fn test_clean_no_gesture_phrases() {
        assert_eq!(clean_annotation("No gesture performed."), None);
        assert_eq!(clean_annotation("The user does not perform any hand gestures."), None);
        assert_eq!(clean_annotation("the user does not perform any gesture"), None);
    }

    #[test]
    fn test_clean_empty() {
        assert_eq!(clean_annotation(""), None);
        assert_eq!(clean_annotation("   "), None);
        assert_eq!(clean_annotation("."), None);
    }
}
