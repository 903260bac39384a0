//! The study's test battery over score rows

use super::anova::{one_way_anova, repeated_measures_anova, AnovaResult, Group, RepeatedMeasuresResult};
use super::chi_square::{chi_square_independence, ChiSquareResult};
use super::tukey::{tukey_hsd, TukeyResult};
use super::sorted_mean;
use crate::records::types::ScoreRow;
use crate::scoring::aggregation::ScoreGrouping;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSettings {
    pub alpha: f64,
    pub yates_correction: bool,
    pub grouping: ScoreGrouping,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            yates_correction: false,
            grouping: ScoreGrouping::Source,
        }
    }
}

/// Size and mean of one tested group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub name: String,
    pub n: usize,
    pub mean: Option<f64>,
}

/// One-way ANOVA with its post-hoc comparisons
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnovaReport {
    /// What was measured, e.g. `accuracy`
    pub measure: String,
    pub groups: Vec<GroupSummary>,
    pub anova: AnovaResult,
    /// Present only when the ANOVA is significant
    pub tukey: Option<TukeyResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatedMeasuresReport {
    pub measure: String,
    pub conditions: Vec<String>,
    pub result: RepeatedMeasuresResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChiSquareReport {
    /// Group of each table row; columns are (correct, incorrect)
    pub rows: Vec<String>,
    pub observed: Vec<Vec<u64>>,
    pub result: ChiSquareResult,
}

/// Every test run on one set of score rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyTests {
    pub grouping: String,
    pub alpha: f64,
    pub accuracy: AnovaReport,
    pub accuracy_repeated: RepeatedMeasuresReport,
    pub correctness: ChiSquareReport,
    /// Similarity by description source; absent when no row has a similarity
    pub similarity: Option<AnovaReport>,
}

impl StudyTests {
    /// Number of precondition warnings across all tests
    pub fn warning_count(&self) -> usize {
        let anova = |r: &AnovaReport| {
            r.anova.warnings.len() + r.tukey.as_ref().map(|t| t.warnings.len()).unwrap_or(0)
        };
        anova(&self.accuracy)
            + self.accuracy_repeated.result.warnings.len()
            + self.correctness.result.warnings.len()
            + self.similarity.as_ref().map(anova).unwrap_or(0)
    }
}

/// group -> participant -> values
type ParticipantValues = BTreeMap<String, BTreeMap<String, Vec<f64>>>;

fn participant_means(values: &ParticipantValues) -> BTreeMap<String, BTreeMap<String, f64>> {
    values
        .iter()
        .map(|(group, by_participant)| {
            let means = by_participant
                .iter()
                .filter_map(|(p, v)| sorted_mean(v).map(|m| (p.clone(), m)))
                .collect();
            (group.clone(), means)
        })
        .collect()
}

fn anova_report(measure: &str, means: &BTreeMap<String, BTreeMap<String, f64>>, alpha: f64) -> AnovaReport {
    let groups: Vec<Group> = means
        .iter()
        .map(|(name, by_participant)| Group::new(name.clone(), by_participant.values().copied().collect()))
        .collect();
    let anova = one_way_anova(&groups);
    let tukey = anova.is_significant(alpha).then(|| tukey_hsd(&groups, &anova, alpha));
    AnovaReport {
        measure: measure.to_string(),
        groups: groups
            .iter()
            .map(|g| GroupSummary {
                name: g.name.clone(),
                n: g.len(),
                mean: sorted_mean(&g.values),
            })
            .collect(),
        anova,
        tukey,
    }
}

/// Run the test battery.
///
/// Observations are per-participant means, so every participant weighs the
/// same whatever number of gestures they contributed. The chi-square table
/// counts individual rows.
pub fn run_study_tests(rows: &[ScoreRow], settings: &StatsSettings) -> StudyTests {
    let mut accuracy: ParticipantValues = BTreeMap::new();
    let mut similarity: ParticipantValues = BTreeMap::new();
    let mut counts: BTreeMap<String, [u64; 2]> = BTreeMap::new();

    for row in rows {
        let group = settings.grouping.key(row);
        accuracy
            .entry(group.clone())
            .or_default()
            .entry(row.participant_id.clone())
            .or_default()
            .push(if row.is_correct { 1.0 } else { 0.0 });
        let cell = counts.entry(group).or_insert([0, 0]);
        cell[if row.is_correct { 0 } else { 1 }] += 1;

        if let Some(score) = row.similarity_score {
            similarity
                .entry(row.description_source.to_string())
                .or_default()
                .entry(row.participant_id.clone())
                .or_default()
                .push(score);
        }
    }

    let accuracy_means = participant_means(&accuracy);
    let accuracy_report = anova_report("accuracy", &accuracy_means, settings.alpha);

    // subject -> condition -> value
    let mut by_subject: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for (group, by_participant) in &accuracy_means {
        for (participant, mean) in by_participant {
            by_subject
                .entry(participant.clone())
                .or_default()
                .insert(group.clone(), *mean);
        }
    }
    let conditions: Vec<String> = accuracy_means.keys().cloned().collect();
    let repeated = repeated_measures_anova(&conditions, &by_subject);

    let row_names: Vec<String> = counts.keys().cloned().collect();
    let observed: Vec<Vec<u64>> = counts.values().map(|c| c.to_vec()).collect();
    let chi_square = chi_square_independence(&observed, settings.yates_correction);

    let similarity_report = if similarity.is_empty() {
        None
    } else {
        Some(anova_report("similarity", &participant_means(&similarity), settings.alpha))
    };

    let tests = StudyTests {
        grouping: settings.grouping.to_string(),
        alpha: settings.alpha,
        accuracy: accuracy_report,
        accuracy_repeated: RepeatedMeasuresReport {
            measure: "accuracy".to_string(),
            conditions,
            result: repeated,
        },
        correctness: ChiSquareReport {
            rows: row_names,
            observed,
            result: chi_square,
        },
        similarity: similarity_report,
    };

    let warnings = tests.warning_count();
    if warnings > 0 {
        warn!(warnings, "Statistical preconditions not met for some tests");
    }
    info!(
        rows = rows.len(),
        grouping = %settings.grouping,
        anova_p = ?tests.accuracy.anova.p_value,
        chi_square_p = ?tests.correctness.result.p_value,
        "Statistical tests finished"
    );
    tests
}
