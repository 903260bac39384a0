//! Aggregation of score rows into summary statistics

use super::alignment::AlignmentReport;
use super::similarity::SimilarityMetric;
use crate::records::types::{AggregateStat, Description, DescriptionSource, RecordKey, ScoreRow};
use crate::stats::distributions::t_critical;
use crate::stats::{sorted_mean, sorted_sum};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub const METRIC_N: &str = "n";
pub const METRIC_N_CORRECT: &str = "n_correct";
pub const METRIC_ACCURACY: &str = "accuracy";
pub const METRIC_MEAN_SIMILARITY: &str = "mean_similarity";
pub const METRIC_UNRECOGNIZED: &str = "unrecognized";

/// Two-sided 95% standard normal quantile
pub const Z_95: f64 = 1.959963984540054;

/// How score rows are grouped for aggregation and testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreGrouping {
    /// Predictor source (`human`, `model:<name>`)
    #[default]
    Source,
    /// Source of the description the prediction was made from
    DescriptionSource,
    /// `description_source|source`
    Pair,
}

impl ScoreGrouping {
    pub fn key(&self, row: &ScoreRow) -> String {
        match self {
            Self::Source => row.source.to_string(),
            Self::DescriptionSource => row.description_source.to_string(),
            Self::Pair => format!("{}|{}", row.description_source, row.source),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::DescriptionSource => "description-source",
            Self::Pair => "pair",
        }
    }
}

impl fmt::Display for ScoreGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreGrouping {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "source" => Ok(Self::Source),
            "description-source" => Ok(Self::DescriptionSource),
            "pair" => Ok(Self::Pair),
            other => Err(crate::Error::Config(format!(
                "unknown grouping {:?} (expected source, description-source or pair)",
                other
            ))),
        }
    }
}

/// 95% Wilson score interval for `successes` out of `n`
pub fn wilson_interval(successes: usize, n: usize) -> Option<(f64, f64)> {
    if n == 0 {
        return None;
    }
    let n = n as f64;
    let p = successes as f64 / n;
    let z2 = Z_95 * Z_95;
    let denom = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denom;
    let half = Z_95 * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denom;
    Some(((center - half).max(0.0), (center + half).min(1.0)))
}

/// 95% Student-t interval for the mean; needs at least two values
pub fn mean_interval(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = sorted_mean(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - mean).powi(2)).collect();
    let sd = (sorted_sum(&deviations) / (n - 1) as f64).sqrt();
    let t = t_critical(0.95, (n - 1) as f64)?;
    let half = t * sd / (n as f64).sqrt();
    Some((mean - half, mean + half))
}

#[derive(Default)]
struct GroupTally {
    n: usize,
    n_correct: usize,
    similarities: Vec<f64>,
    unrecognized: usize,
}

fn emit(grouping_key: &str, tally: &GroupTally, out: &mut Vec<AggregateStat>) {
    out.push(AggregateStat::new(grouping_key, METRIC_N, tally.n as f64));
    out.push(AggregateStat::new(grouping_key, METRIC_N_CORRECT, tally.n_correct as f64));
    if tally.n > 0 {
        out.push(
            AggregateStat::new(grouping_key, METRIC_ACCURACY, tally.n_correct as f64 / tally.n as f64)
                .with_interval(wilson_interval(tally.n_correct, tally.n)),
        );
    }
    if let Some(mean) = sorted_mean(&tally.similarities) {
        out.push(
            AggregateStat::new(grouping_key, METRIC_MEAN_SIMILARITY, mean)
                .with_interval(mean_interval(&tally.similarities)),
        );
    }
    out.push(AggregateStat::new(grouping_key, METRIC_UNRECOGNIZED, tally.unrecognized as f64));
}

/// Aggregate by predictor source and by `description_source|source`.
///
/// Every reduction is independent of row order.
pub fn aggregate(report: &AlignmentReport) -> Vec<AggregateStat> {
    let mut out = Vec::new();
    for grouping in [ScoreGrouping::Source, ScoreGrouping::Pair] {
        let mut groups: BTreeMap<String, GroupTally> = BTreeMap::new();
        for row in &report.rows {
            let tally = groups.entry(grouping.key(row)).or_default();
            tally.n += 1;
            if row.is_correct {
                tally.n_correct += 1;
            }
            if let Some(score) = row.similarity_score {
                tally.similarities.push(score);
            }
        }
        for ((source, description_source), count) in &report.unrecognized {
            let key = match grouping {
                ScoreGrouping::Source => source.to_string(),
                ScoreGrouping::DescriptionSource => description_source.to_string(),
                ScoreGrouping::Pair => format!("{}|{}", description_source, source),
            };
            groups.entry(key).or_default().unrecognized += count;
        }
        for (key, tally) in &groups {
            emit(key, tally, &mut out);
        }
    }
    out
}

/// Mean pairwise similarity between description sources over shared keys.
///
/// One `n` and one `mean_similarity` row per ordered pair `a < b`, keyed
/// `"a|b"`; pairs without a shared key only get `n = 0`.
pub fn similarity_matrix(descriptions: &[Description], metric: &dyn SimilarityMetric) -> Vec<AggregateStat> {
    let mut by_source: BTreeMap<&DescriptionSource, BTreeMap<RecordKey, &str>> = BTreeMap::new();
    for description in descriptions {
        by_source
            .entry(&description.source)
            .or_default()
            .entry(description.key())
            .or_insert(description.text.as_str());
    }

    let sources: Vec<&DescriptionSource> = by_source.keys().copied().collect();
    let mut out = Vec::new();
    for (i, a) in sources.iter().enumerate() {
        for b in &sources[i + 1..] {
            let texts_a = &by_source[a];
            let texts_b = &by_source[b];
            let shared: BTreeSet<&RecordKey> = texts_a.keys().filter(|k| texts_b.contains_key(*k)).collect();
            let scores: Vec<f64> = shared
                .iter()
                .map(|k| metric.similarity(texts_a[*k], texts_b[*k]))
                .collect();

            let grouping_key = format!("{}|{}", a, b);
            out.push(AggregateStat::new(&grouping_key, METRIC_N, scores.len() as f64));
            if let Some(mean) = sorted_mean(&scores) {
                out.push(
                    AggregateStat::new(&grouping_key, METRIC_MEAN_SIMILARITY, mean)
                        .with_interval(mean_interval(&scores)),
                );
            }
        }
    }
    out
}

/// Look up one metric of one group
pub fn find_stat<'a>(stats: &'a [AggregateStat], grouping_key: &str, metric_name: &str) -> Option<&'a AggregateStat> {
    stats
        .iter()
        .find(|s| s.grouping_key == grouping_key && s.metric_name == metric_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::types::PredictorSource;
    use crate::scoring::similarity::TokenJaccard;

    fn row(p: &str, source: PredictorSource, correct: bool, similarity: Option<f64>) -> ScoreRow {
        ScoreRow {
            participant_id: p.into(),
            gesture_id: "c1".into(),
            source,
            description_source: DescriptionSource::HumanUnstructured,
            is_correct: correct,
            similarity_score: similarity,
        }
    }

    fn report() -> AlignmentReport {
        let mut report = AlignmentReport {
            rows: vec![
                row("p1", PredictorSource::Human, true, Some(0.5)),
                row("p2", PredictorSource::Human, true, Some(0.25)),
                row("p3", PredictorSource::Human, false, Some(0.75)),
                row("p1", PredictorSource::model("gpt"), false, None),
            ],
            ..Default::default()
        };
        report.unrecognized.insert(
            (PredictorSource::model("gpt"), DescriptionSource::HumanUnstructured),
            2,
        );
        report
    }

    #[test]
    fn test_wilson_interval() {
        let (lo, hi) = wilson_interval(5, 10).unwrap();
        assert!((lo - 0.2365931).abs() < 1e-6);
        assert!((hi - 0.7634069).abs() < 1e-6);
        assert_eq!(wilson_interval(0, 0), None);
        let (lo, _) = wilson_interval(0, 4).unwrap();
        assert_eq!(lo, 0.0);
    }

    #[test]
    fn test_mean_interval() {
        let (lo, hi) = mean_interval(&[1.0, 2.0, 3.0]).unwrap();
        // 2 ± 4.302653 / sqrt(3)
        assert!((lo - (2.0 - 2.4841377)).abs() < 1e-6);
        assert!((hi - (2.0 + 2.4841377)).abs() < 1e-6);
        assert_eq!(mean_interval(&[1.0]), None);
    }

    #[test]
    fn test_aggregate_by_source() {
        let stats = aggregate(&report());

        let accuracy = find_stat(&stats, "human", METRIC_ACCURACY).unwrap();
        assert!((accuracy.value - 2.0 / 3.0).abs() < 1e-12);
        assert!(accuracy.confidence_interval().is_some());
        assert_eq!(find_stat(&stats, "human", METRIC_N).unwrap().value, 3.0);
        assert_eq!(find_stat(&stats, "human", METRIC_MEAN_SIMILARITY).unwrap().value, 0.5);

        assert_eq!(find_stat(&stats, "model:gpt", METRIC_ACCURACY).unwrap().value, 0.0);
        assert_eq!(find_stat(&stats, "model:gpt", METRIC_UNRECOGNIZED).unwrap().value, 2.0);
        assert!(find_stat(&stats, "model:gpt", METRIC_MEAN_SIMILARITY).is_none());

        let pair = find_stat(&stats, "human-unstructured|human", METRIC_N).unwrap();
        assert_eq!(pair.value, 3.0);
    }

    #[test]
    fn test_aggregate_is_permutation_invariant() {
        let forward = report();
        let mut reversed = report();
        reversed.rows.reverse();
        assert_eq!(aggregate(&forward), aggregate(&reversed));
    }

    #[test]
    fn test_only_unrecognized_group_has_no_accuracy() {
        let mut report = AlignmentReport::default();
        report
            .unrecognized
            .insert((PredictorSource::Human, DescriptionSource::HumanStructured), 1);
        let stats = aggregate(&report);
        assert!(find_stat(&stats, "human", METRIC_ACCURACY).is_none());
        assert_eq!(find_stat(&stats, "human", METRIC_UNRECOGNIZED).unwrap().value, 1.0);
    }

    #[test]
    fn test_similarity_matrix() {
        let description = |p: &str, source: DescriptionSource, text: &str| Description {
            participant_id: p.into(),
            gesture_id: "c1".into(),
            source,
            text: text.into(),
        };
        let descriptions = vec![
            description("p1", DescriptionSource::HumanStructured, "open palm"),
            description("p1", DescriptionSource::model("gpt"), "open palm"),
            description("p2", DescriptionSource::HumanStructured, "thumb up"),
            description("p2", DescriptionSource::model("gpt"), "fist"),
            description("p3", DescriptionSource::model("gpt"), "wave"),
        ];
        let stats = similarity_matrix(&descriptions, &TokenJaccard);

        let key = "human-structured|model:gpt";
        assert_eq!(find_stat(&stats, key, METRIC_N).unwrap().value, 2.0);
        assert_eq!(find_stat(&stats, key, METRIC_MEAN_SIMILARITY).unwrap().value, 0.5);
    }

    #[test]
    fn test_grouping_parse() {
        assert_eq!("pair".parse::<ScoreGrouping>().unwrap(), ScoreGrouping::Pair);
        assert_eq!(ScoreGrouping::DescriptionSource.to_string(), "description-source");
        assert!("gesture".parse::<ScoreGrouping>().is_err());
    }
}
