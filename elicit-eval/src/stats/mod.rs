//! Statistical Test Runner
//!
//! One-way and repeated-measures ANOVA, chi-square independence and Tukey
//! HSD. Precondition problems never abort: they are attached to the result
//! as [`StatisticalPreconditionWarning`]s and leave the statistic undefined
//! where it cannot be computed.

pub mod anova;
pub mod chi_square;
pub mod distributions;
pub mod runner;
pub mod tukey;

use serde::Serialize;
use std::fmt;

pub use anova::{one_way_anova, repeated_measures_anova, AnovaResult, Group, RepeatedMeasuresResult};
pub use chi_square::{chi_square_independence, ChiSquareResult};
pub use runner::{run_study_tests, StatsSettings, StudyTests};
pub use tukey::{tukey_hsd, TukeyComparison, TukeyResult};

/// A test precondition that did not hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticalPreconditionWarning {
    pub test: String,
    pub message: String,
}

impl StatisticalPreconditionWarning {
    pub fn new(test: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            test: test.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StatisticalPreconditionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.test, self.message)
    }
}

/// Sum in ascending order, so the result does not depend on input order
pub fn sorted_sum(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.iter().sum()
}

/// Mean over sorted values; `None` for an empty slice
pub fn sorted_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(sorted_sum(values) / values.len() as f64)
    }
}
