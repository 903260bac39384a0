//! Skip/drop accounting for a run
//!
//! Row-level problems never abort a stage; they are tallied here by category
//! with a handful of sample keys so the analyst can judge coverage.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Number of sample keys kept per category
pub const MAX_SAMPLES: usize = 5;

/// Why a row was skipped or dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipCategory {
    /// Malformed input row or column
    Schema,
    /// Key present in one source but not the other at load time
    MissingKey,
    /// Annotation empty after cleaning
    EmptyText,
    /// Text-generation call failed after retries
    Collaborator,
    /// Prediction not mappable to the vocabulary
    OutOfVocabulary,
    /// Prediction with no matching gesture record at scoring time
    MissingRecord,
}

impl SkipCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::MissingKey => "missing_key",
            Self::EmptyText => "empty_text",
            Self::Collaborator => "collaborator",
            Self::OutOfVocabulary => "out_of_vocabulary",
            Self::MissingRecord => "missing_record",
        }
    }
}

impl fmt::Display for SkipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count plus a bounded sample of offending keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkipTally {
    pub count: usize,
    pub samples: Vec<String>,
}

/// Skip/drop counts accumulated across stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub categories: BTreeMap<SkipCategory, SkipTally>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one skipped row
    pub fn record(&mut self, category: SkipCategory, sample: impl fmt::Display) {
        let tally = self.categories.entry(category).or_default();
        tally.count += 1;
        if tally.samples.len() < MAX_SAMPLES {
            tally.samples.push(sample.to_string());
        }
    }

    pub fn count(&self, category: SkipCategory) -> usize {
        self.categories.get(&category).map_or(0, |t| t.count)
    }

    pub fn total(&self) -> usize {
        self.categories.values().map(|t| t.count).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }

    /// Fold another summary into this one
    pub fn merge(&mut self, other: RunSummary) {
        for (category, tally) in other.categories {
            let entry = self.categories.entry(category).or_default();
            entry.count += tally.count;
            for sample in tally.samples {
                if entry.samples.len() < MAX_SAMPLES {
                    entry.samples.push(sample);
                }
            }
        }
    }

    /// Emit one warning per non-empty category
    pub fn log(&self, stage: &str) {
        for (category, tally) in &self.categories {
            warn!(
                stage,
                category = %category,
                count = tally.count,
                samples = ?tally.samples,
                "Skipped rows"
            );
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return writeln!(f, "Skipped/dropped: none");
        }
        writeln!(f, "Skipped/dropped ({} total):", self.total())?;
        for (category, tally) in &self.categories {
            writeln!(
                f,
                "  {:<18} {:>6}  e.g. {}",
                category.as_str(),
                tally.count,
                tally.samples.join(", ")
            )?;
        }
        Ok(())
    }
}
