//! Alignment of predictions and descriptions to ground truth

use super::similarity::SimilarityMetric;
use crate::records::types::{
    Description, DescriptionSource, GestureRecord, PredictedCommand, Prediction, PredictorSource,
    RecordKey, ScoreRow,
};
use crate::records::vocabulary::normalize_command;
use crate::report::summary::{RunSummary, SkipCategory};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Scored rows plus what could not be scored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentReport {
    /// Sorted by key, then predictor source, then description source
    pub rows: Vec<ScoreRow>,
    /// Unrecognized predictions per (predictor source, description source)
    pub unrecognized: BTreeMap<(PredictorSource, DescriptionSource), usize>,
    /// Predictions whose key has no gesture record
    pub missing_record: usize,
}

impl AlignmentReport {
    /// Unrecognized predictions made by one predictor, over all description sources
    pub fn unrecognized_for(&self, source: &PredictorSource) -> usize {
        self.unrecognized
            .iter()
            .filter(|((s, _), _)| s == source)
            .map(|(_, count)| count)
            .sum()
    }
}

/// Whether a predicted label matches the ground truth
pub fn is_correct(predicted: &str, ground_truth: &str) -> bool {
    normalize_command(predicted) == normalize_command(ground_truth)
}

/// Description text per (key, source); the first description of a pair wins
pub struct DescriptionIndex<'a> {
    texts: HashMap<RecordKey, Vec<(&'a DescriptionSource, &'a str)>>,
}

impl<'a> DescriptionIndex<'a> {
    pub fn new(descriptions: &'a [Description]) -> Self {
        let mut texts: HashMap<RecordKey, Vec<(&'a DescriptionSource, &'a str)>> = HashMap::new();
        for description in descriptions {
            let entry = texts.entry(description.key()).or_default();
            if !entry.iter().any(|(source, _)| **source == description.source) {
                entry.push((&description.source, description.text.as_str()));
            }
        }
        Self { texts }
    }

    pub fn get(&self, key: &RecordKey, source: &DescriptionSource) -> Option<&'a str> {
        self.texts
            .get(key)?
            .iter()
            .find(|(s, _)| *s == source)
            .map(|(_, text)| *text)
    }
}

/// Alignment & Scoring Engine.
///
/// One [`ScoreRow`] per recognized prediction whose key joins a record.
/// `similarity_score` compares the prediction's description with the
/// `reference` source's description of the same gesture, and is undefined
/// when either is missing or the prediction was made from the reference.
pub fn align(
    records: &[GestureRecord],
    descriptions: &[Description],
    predictions: &[Prediction],
    metric: &dyn SimilarityMetric,
    reference: &DescriptionSource,
    summary: &mut RunSummary,
) -> AlignmentReport {
    let ground_truth: HashMap<RecordKey, &str> = records
        .iter()
        .map(|r| (r.key(), r.ground_truth_command.as_str()))
        .collect();
    let index = DescriptionIndex::new(descriptions);

    let mut report = AlignmentReport::default();
    for prediction in predictions {
        let key = prediction.key();
        let Some(truth) = ground_truth.get(&key) else {
            report.missing_record += 1;
            summary.record(SkipCategory::MissingRecord, format!("{} ({})", key, prediction.source));
            continue;
        };

        let label = match &prediction.predicted_command {
            PredictedCommand::Known(label) => label,
            PredictedCommand::Unrecognized(raw) => {
                debug!(key = %key, source = %prediction.source, raw = %raw, "Unrecognized prediction");
                *report
                    .unrecognized
                    .entry((prediction.source.clone(), prediction.description_source.clone()))
                    .or_insert(0) += 1;
                continue;
            }
        };

        let similarity_score = if prediction.description_source == *reference {
            None
        } else {
            index
                .get(&key, &prediction.description_source)
                .zip(index.get(&key, reference))
                .map(|(text, reference_text)| metric.similarity(text, reference_text))
        };

        report.rows.push(ScoreRow {
            participant_id: key.participant_id,
            gesture_id: key.gesture_id,
            source: prediction.source.clone(),
            description_source: prediction.description_source.clone(),
            is_correct: is_correct(label, truth),
            similarity_score,
        });
    }

    report.rows.sort_by(|a, b| {
        a.key()
            .cmp(&b.key())
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.description_source.cmp(&b.description_source))
    });

    info!(
        scored = report.rows.len(),
        unrecognized = report.unrecognized.values().sum::<usize>(),
        missing_record = report.missing_record,
        metric = metric.name(),
        "Aligned predictions to ground truth"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::similarity::TokenJaccard;

    fn record(p: &str, g: &str, command: &str) -> GestureRecord {
        GestureRecord {
            participant_id: p.into(),
            gesture_id: g.into(),
            modality: "camera".into(),
            ground_truth_command: command.into(),
        }
    }

    fn prediction(p: &str, g: &str, source: PredictorSource, ds: DescriptionSource, cmd: PredictedCommand) -> Prediction {
        Prediction {
            participant_id: p.into(),
            gesture_id: g.into(),
            source,
            description_source: ds,
            predicted_command: cmd,
        }
    }

    fn description(p: &str, g: &str, source: DescriptionSource, text: &str) -> Description {
        Description {
            participant_id: p.into(),
            gesture_id: g.into(),
            source,
            text: text.into(),
        }
    }

    #[test]
    fn test_is_correct_is_normalized_equality() {
        assert!(is_correct("swipe_left", "Swipe Left"));
        assert!(!is_correct("swipe_right", "swipe_left"));
    }

    #[test]
    fn test_human_correct_model_wrong() {
        let records = vec![record("p1", "g1", "swipe_left")];
        let predictions = vec![
            prediction(
                "p1",
                "g1",
                PredictorSource::Human,
                DescriptionSource::HumanUnstructured,
                PredictedCommand::Known("swipe_left".into()),
            ),
            prediction(
                "p1",
                "g1",
                PredictorSource::model("gpt"),
                DescriptionSource::HumanUnstructured,
                PredictedCommand::Known("swipe_right".into()),
            ),
        ];
        let mut summary = RunSummary::new();
        let report = align(
            &records,
            &[],
            &predictions,
            &TokenJaccard,
            &DescriptionSource::HumanStructured,
            &mut summary,
        );

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].source, PredictorSource::Human);
        assert!(report.rows[0].is_correct);
        assert!(!report.rows[1].is_correct);
        assert_eq!(report.rows[0].similarity_score, None);
    }

    #[test]
    fn test_similarity_against_reference() {
        let records = vec![record("p1", "g1", "End call")];
        let descriptions = vec![
            description("p1", "g1", DescriptionSource::HumanStructured, "open palm down"),
            description("p1", "g1", DescriptionSource::model("gpt"), "open palm up"),
        ];
        let predictions = vec![
            prediction(
                "p1",
                "g1",
                PredictorSource::Human,
                DescriptionSource::model("gpt"),
                PredictedCommand::Known("End call".into()),
            ),
            prediction(
                "p1",
                "g1",
                PredictorSource::Human,
                DescriptionSource::HumanStructured,
                PredictedCommand::Known("End call".into()),
            ),
        ];
        let report = align(
            &records,
            &descriptions,
            &predictions,
            &TokenJaccard,
            &DescriptionSource::HumanStructured,
            &mut RunSummary::new(),
        );

        assert_eq!(report.rows[0].description_source, DescriptionSource::HumanStructured);
        assert_eq!(report.rows[0].similarity_score, None);
        assert_eq!(report.rows[1].similarity_score, Some(0.5));
    }

    #[test]
    fn test_unrecognized_and_missing_record_are_tallied() {
        let records = vec![record("p1", "g1", "End call")];
        let predictions = vec![
            prediction(
                "p1",
                "g1",
                PredictorSource::model("gpt"),
                DescriptionSource::HumanStructured,
                PredictedCommand::Unrecognized("Wave".into()),
            ),
            prediction(
                "p9",
                "g1",
                PredictorSource::Human,
                DescriptionSource::HumanStructured,
                PredictedCommand::Known("End call".into()),
            ),
        ];
        let mut summary = RunSummary::new();
        let report = align(
            &records,
            &[],
            &predictions,
            &TokenJaccard,
            &DescriptionSource::HumanStructured,
            &mut summary,
        );

        assert!(report.rows.is_empty());
        assert_eq!(report.missing_record, 1);
        assert_eq!(report.unrecognized_for(&PredictorSource::model("gpt")), 1);
        assert_eq!(summary.count(SkipCategory::MissingRecord), 1);
    }
}
