//! Prediction Generator
//!
//! Maps descriptions onto the closed command vocabulary, either from
//! recorded human guesses or by asking the model to classify them.

use super::prompts::PredictionPrompt;
use crate::collaborator::cache::text_digest;
use crate::collaborator::{CacheKey, Collaborator, FetchJob, TextGenerator};
use crate::records::csv_input::read_wide_table;
use crate::records::types::{
    Description, DescriptionSource, PredictedCommand, Prediction, PredictorSource, RecordKey,
};
use crate::records::vocabulary::CommandVocabulary;
use crate::report::summary::{RunSummary, SkipCategory};
use std::path::Path;
use tracing::{info, warn};

/// Suffix of command columns in the wide layout
pub const COMMAND_SUFFIX: &str = "command";

/// Cache subject of a classification: the key, the description source and
/// a digest of the text that was classified
pub fn prediction_subject(description: &Description) -> String {
    format!(
        "{}/{}#{}",
        description.key(),
        description.source,
        text_digest(&description.text)
    )
}

fn snap_and_tally(
    vocabulary: &CommandVocabulary,
    raw: &str,
    min_similarity: f64,
    key: &RecordKey,
    summary: &mut RunSummary,
) -> PredictedCommand {
    let predicted = vocabulary.snap(raw, min_similarity);
    if !predicted.is_recognized() {
        summary.record(SkipCategory::OutOfVocabulary, format!("{} {:?}", key, raw.trim()));
    }
    predicted
}

/// Recorded human guesses from a wide `c<N>_command` table
pub fn read_human_predictions(
    path: &Path,
    source: PredictorSource,
    description_source: DescriptionSource,
    vocabulary: &CommandVocabulary,
    min_similarity: f64,
    summary: &mut RunSummary,
) -> crate::Result<Vec<Prediction>> {
    let cells = read_wide_table(path, COMMAND_SUFFIX, summary)?;
    let mut predictions = Vec::with_capacity(cells.len());
    for cell in cells {
        let predicted_command = snap_and_tally(vocabulary, &cell.value, min_similarity, &cell.key, summary);
        predictions.push(Prediction {
            participant_id: cell.key.participant_id,
            gesture_id: cell.key.gesture_id,
            source: source.clone(),
            description_source: description_source.clone(),
            predicted_command,
        });
    }
    predictions.sort_by(|a, b| a.key().cmp(&b.key()));
    info!(
        path = %path.display(),
        source = %source,
        description_source = %description_source,
        count = predictions.len(),
        "Read recorded predictions"
    );
    Ok(predictions)
}

/// Classify every description with the configured model.
///
/// Unmappable answers become `Unrecognized` predictions; collaborator
/// failures drop the description and are tallied.
pub fn predict_with_model<G: TextGenerator + 'static>(
    collaborator: &Collaborator<G>,
    descriptions: &[Description],
    prompt: &PredictionPrompt,
    vocabulary: &CommandVocabulary,
    min_similarity: f64,
    summary: &mut RunSummary,
) -> crate::Result<Vec<Prediction>> {
    let hash = prompt.template_hash();
    let jobs: Vec<FetchJob<usize>> = descriptions
        .iter()
        .enumerate()
        .map(|(idx, description)| FetchJob {
            id: idx,
            cache_key: CacheKey::new(prediction_subject(description), collaborator.model(), hash.as_str()),
            request: collaborator.settings.request(prompt.render(&description.text)),
        })
        .collect();

    let source = PredictorSource::model(collaborator.model());
    let results = collaborator.fetch_blocking(jobs)?;

    let mut predictions = Vec::with_capacity(results.len());
    for (idx, result) in results {
        let description = &descriptions[idx];
        let key = description.key();
        match result {
            Ok(raw) => {
                let predicted_command = snap_and_tally(vocabulary, &raw, min_similarity, &key, summary);
                predictions.push(Prediction {
                    participant_id: key.participant_id,
                    gesture_id: key.gesture_id,
                    source: source.clone(),
                    description_source: description.source.clone(),
                    predicted_command,
                });
            }
            Err(e) => {
                warn!(key = %key, description_source = %description.source, error = %e, "Prediction failed");
                summary.record(SkipCategory::Collaborator, format!("{} ({})", key, description.source));
            }
        }
    }

    predictions.sort_by(|a, b| {
        a.key()
            .cmp(&b.key())
            .then_with(|| a.description_source.cmp(&b.description_source))
    });
    info!(
        source = %source,
        requested = descriptions.len(),
        predicted = predictions.len(),
        unrecognized = predictions.iter().filter(|p| !p.predicted_command.is_recognized()).count(),
        "Model predictions finished"
    );
    Ok(predictions)
}

/// Re-check stored predictions against the vocabulary.
///
/// Tables written by an earlier run may carry labels the loaded records
/// never use. Those become `Unrecognized` and are tallied as out of
/// vocabulary; known labels are replaced by their canonical spelling.
pub fn restrict_to_vocabulary(
    predictions: &[Prediction],
    vocabulary: &CommandVocabulary,
    summary: &mut RunSummary,
) -> Vec<Prediction> {
    predictions
        .iter()
        .map(|prediction| {
            let PredictedCommand::Known(label) = &prediction.predicted_command else {
                return prediction.clone();
            };
            let predicted_command = match vocabulary.require(label) {
                Ok(canonical) => PredictedCommand::Known(canonical.to_string()),
                Err(err) => {
                    warn!(key = %prediction.key(), source = %prediction.source, "{}", err);
                    summary.record(
                        SkipCategory::OutOfVocabulary,
                        format!("{} {:?}", prediction.key(), label),
                    );
                    PredictedCommand::Unrecognized(label.clone())
                }
            };
            Prediction {
                predicted_command,
                ..prediction.clone()
            }
        })
        .collect()
}
