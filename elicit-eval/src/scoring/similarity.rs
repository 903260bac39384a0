//! Text similarity metrics
//!
//! Every metric is symmetric, bounded in [0, 1] and scores identical
//! non-empty text 1.0. Text is tokenized with the command normalization
//! (letters only, case-folded).

use crate::records::vocabulary::normalize_command;
use std::collections::{BTreeMap, BTreeSet};

/// Pluggable similarity strategy
pub trait SimilarityMetric: Send + Sync {
    /// Name used in configuration
    fn name(&self) -> &'static str;

    fn similarity(&self, a: &str, b: &str) -> f64;
}

fn token_counts(text: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for token in normalize_command(text).split_whitespace() {
        *counts.entry(token.to_string()).or_insert(0) += 1;
    }
    counts
}

fn identical(a: &str, b: &str) -> bool {
    let a = a.trim();
    !a.is_empty() && a == b.trim()
}

/// Token-set overlap: |A ∩ B| / |A ∪ B|
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenJaccard;

impl SimilarityMetric for TokenJaccard {
    fn name(&self) -> &'static str {
        "jaccard"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        if identical(a, b) {
            return 1.0;
        }
        let normalized_a = normalize_command(a);
        let normalized_b = normalize_command(b);
        let a: BTreeSet<&str> = normalized_a.split_whitespace().collect();
        let b: BTreeSet<&str> = normalized_b.split_whitespace().collect();
        let union = a.union(&b).count();
        if union == 0 {
            return 0.0;
        }
        a.intersection(&b).count() as f64 / union as f64
    }
}

/// Cosine of term-frequency vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct TfCosine;

impl SimilarityMetric for TfCosine {
    fn name(&self) -> &'static str {
        "cosine"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        if identical(a, b) {
            return 1.0;
        }
        let a = token_counts(a);
        let b = token_counts(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        // Sorted shared keys, so the sum is the same whichever side is first
        let dot: f64 = a
            .iter()
            .filter_map(|(token, &ca)| b.get(token).map(|&cb| (ca * cb) as f64))
            .sum();
        let norm = |counts: &BTreeMap<String, usize>| {
            (counts.values().map(|&c| (c * c) as f64).sum::<f64>()).sqrt()
        };
        (dot / (norm(&a) * norm(&b))).clamp(0.0, 1.0)
    }
}

/// Metric by configuration name
pub fn metric_by_name(name: &str) -> crate::Result<Box<dyn SimilarityMetric>> {
    match name.trim().to_lowercase().as_str() {
        "jaccard" => Ok(Box::new(TokenJaccard)),
        "cosine" => Ok(Box::new(TfCosine)),
        other => Err(crate::Error::Config(format!(
            "unknown similarity metric {:?} (expected jaccard or cosine)",
            other
        ))),
    }
}
