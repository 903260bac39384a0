//! Closed command vocabulary and label normalization

use super::types::{GestureRecord, PredictedCommand};
use std::collections::{BTreeMap, BTreeSet};

/// Normalize a command label for comparison.
///
/// Non-letters become spaces, the result is case-folded, trimmed and
/// whitespace-collapsed: `" Swipe_LEFT. "` and `"swipe left"` compare equal.
pub fn normalize_command(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if c.is_alphabetic() { c } else { ' ' })
        .collect();
    replaced
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|t| !t.is_empty()).collect()
}

fn contains_sequence(haystack: &[&str], needle: &[&str]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

fn jaccard(a: &[&str], b: &[&str]) -> f64 {
    let a: BTreeSet<&str> = a.iter().copied().collect();
    let b: BTreeSet<&str> = b.iter().copied().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// The set of commands a prediction may take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandVocabulary {
    /// normalized form -> canonical label (first ground-truth spelling seen)
    entries: BTreeMap<String, String>,
}

impl CommandVocabulary {
    /// Build from explicit labels. Fails on an empty result.
    pub fn from_labels<I, S>(labels: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = BTreeMap::new();
        for label in labels {
            let canonical = label.as_ref().trim();
            let normalized = normalize_command(canonical);
            if normalized.is_empty() {
                continue;
            }
            entries
                .entry(normalized)
                .or_insert_with(|| canonical.to_string());
        }
        if entries.is_empty() {
            return Err(crate::Error::EmptyVocabulary);
        }
        Ok(Self { entries })
    }

    /// Derive the vocabulary from every record's ground-truth command
    pub fn from_records(records: &[GestureRecord]) -> crate::Result<Self> {
        Self::from_labels(records.iter().map(|r| r.ground_truth_command.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical labels in normalized order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }

    /// Canonical label for an exactly matching input
    pub fn canonical(&self, raw: &str) -> Option<&str> {
        self.entries.get(&normalize_command(raw)).map(String::as_str)
    }

    /// Map free text onto the vocabulary.
    ///
    /// Tries an exact normalized match, then the longest entry contained as a
    /// contiguous token run, then the best token-overlap match at or above
    /// `min_similarity`.
    pub fn snap(&self, raw: &str, min_similarity: f64) -> PredictedCommand {
        let normalized = normalize_command(raw);
        if let Some(label) = self.entries.get(&normalized) {
            return PredictedCommand::Known(label.clone());
        }

        let response_tokens = tokens(&normalized);
        if response_tokens.is_empty() {
            return PredictedCommand::Unrecognized(raw.trim().to_string());
        }

        let contained = self
            .entries
            .iter()
            .filter(|(norm, _)| contains_sequence(&response_tokens, &tokens(norm)))
            .max_by(|(a, _), (b, _)| {
                tokens(a)
                    .len()
                    .cmp(&tokens(b).len())
                    // max_by keeps the last maximum; reverse so the first entry wins ties
                    .then_with(|| b.cmp(a))
            });
        if let Some((_, label)) = contained {
            return PredictedCommand::Known(label.clone());
        }

        let mut best: Option<(f64, &String)> = None;
        for (norm, label) in &self.entries {
            let score = jaccard(&response_tokens, &tokens(norm));
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, label));
            }
        }
        match best {
            Some((score, label)) if score >= min_similarity && score > 0.0 => {
                PredictedCommand::Known(label.clone())
            }
            _ => PredictedCommand::Unrecognized(raw.trim().to_string()),
        }
    }

    /// Strict lookup used when an unmappable label must be an error
    pub fn require(&self, raw: &str) -> crate::Result<&str> {
        self.canonical(raw)
            .ok_or_else(|| crate::Error::OutOfVocabulary(raw.to_string()))
    }

    /// Render the options list for a classification prompt
    pub fn render_options(&self) -> String {
        self.labels()
            .map(|l| format!("- `{}`", l))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ucp() -> CommandVocabulary {
        CommandVocabulary::from_labels([
            "Increase volume",
            "Decrease volume",
            "Mute microphone",
            "Unmute microphone",
            "Turn off camera",
            "Turn on camera",
            "Ask for a question",
            "End call",
        ])
        .unwrap()
    }

    #[test]
    fn test_normalize_command() {
        assert_eq!(normalize_command("  Swipe_LEFT. "), "swipe left");
        assert_eq!(normalize_command("`End call`"), "end call");
        assert_eq!(normalize_command("123"), "");
    }

    #[test]
    fn test_empty_vocabulary_is_error() {
        assert!(matches!(
            CommandVocabulary::from_labels(Vec::<String>::new()),
            Err(crate::Error::EmptyVocabulary)
        ));
        assert!(CommandVocabulary::from_labels(["  ", "42"]).is_err());
    }

    #[test]
    fn test_first_spelling_is_canonical() {
        let vocab = CommandVocabulary::from_labels(["swipe_left", "Swipe Left"]).unwrap();
        assert_eq!(vocab.len(), 1);
        assert_eq!(vocab.canonical("SWIPE LEFT"), Some("swipe_left"));
    }

    #[test]
    fn test_snap_exact_match() {
        let vocab = ucp();
        assert_eq!(
            vocab.snap("end CALL.", 0.5),
            PredictedCommand::Known("End call".into())
        );
    }

    #[test]
    fn test_snap_prefers_longest_contained_entry() {
        let vocab = ucp();
        assert_eq!(
            vocab.snap("The user wants to unmute microphone", 0.5),
            PredictedCommand::Known("Unmute microphone".into())
        );
        assert_eq!(
            vocab.snap("Command: mute microphone", 0.5),
            PredictedCommand::Known("Mute microphone".into())
        );
    }

    #[test]
    fn test_snap_by_overlap() {
        let vocab = ucp();
        assert_eq!(
            vocab.snap("mute the microphone", 0.5),
            PredictedCommand::Known("Mute microphone".into())
        );
    }

    #[test]
    fn test_snap_unrecognized() {
        let vocab = ucp();
        assert_eq!(
            vocab.snap("Wave hello", 0.5),
            PredictedCommand::Unrecognized("Wave hello".into())
        );
        assert!(!vocab.snap("", 0.5).is_recognized());
    }

    #[test]
    fn test_require_out_of_vocabulary() {
        let vocab = ucp();
        assert_eq!(vocab.require("end call").unwrap(), "End call");
        assert!(matches!(
            vocab.require("Raise hand"),
            Err(crate::Error::OutOfVocabulary(_))
        ));
    }

    #[test]
    fn test_render_options() {
        let vocab = CommandVocabulary::from_labels(["b", "a"]).unwrap();
        assert_eq!(vocab.render_options(), "- `a` - `b`");
    }
}
