//! CSV tables written and read between stages
//!
//! Floats are written in shortest round-trip form, so every table reads
//! back to the exact values that were written.

use crate::records::csv_input::{open_reader, require_columns};
use crate::records::types::{
    AggregateStat, Description, DescriptionSource, PredictedCommand, Prediction, PredictorSource, ScoreRow,
};
use crate::report::summary::{RunSummary, SkipCategory};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

pub const DESCRIPTION_COLUMNS: [&str; 4] = ["participant_id", "gesture_id", "source", "text"];
pub const PREDICTION_COLUMNS: [&str; 6] = [
    "participant_id",
    "gesture_id",
    "source",
    "description_source",
    "predicted_command",
    "recognized",
];
pub const SCORE_COLUMNS: [&str; 6] = [
    "participant_id",
    "gesture_id",
    "source",
    "description_source",
    "is_correct",
    "similarity_score",
];
pub const AGGREGATE_COLUMNS: [&str; 5] = ["grouping_key", "metric_name", "value", "ci_lower", "ci_upper"];

/// Flat CSV form of a [`Prediction`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub participant_id: String,
    pub gesture_id: String,
    pub source: PredictorSource,
    pub description_source: DescriptionSource,
    /// Vocabulary label, or the raw response when unrecognized
    pub predicted_command: String,
    pub recognized: bool,
}

impl From<&Prediction> for PredictionRow {
    fn from(prediction: &Prediction) -> Self {
        let (predicted_command, recognized) = match &prediction.predicted_command {
            PredictedCommand::Known(label) => (label.clone(), true),
            PredictedCommand::Unrecognized(raw) => (raw.clone(), false),
        };
        Self {
            participant_id: prediction.participant_id.clone(),
            gesture_id: prediction.gesture_id.clone(),
            source: prediction.source.clone(),
            description_source: prediction.description_source.clone(),
            predicted_command,
            recognized,
        }
    }
}

impl From<PredictionRow> for Prediction {
    fn from(row: PredictionRow) -> Self {
        let predicted_command = if row.recognized {
            PredictedCommand::Known(row.predicted_command)
        } else {
            PredictedCommand::Unrecognized(row.predicted_command)
        };
        Self {
            participant_id: row.participant_id,
            gesture_id: row.gesture_id,
            source: row.source,
            description_source: row.description_source,
            predicted_command,
        }
    }
}

/// Write serializable rows with a header, creating parent directories.
///
/// `columns` is written as the header when there are no rows.
pub fn write_rows<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        writer.write_record(columns)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = rows.len(), "Wrote table");
    Ok(())
}

/// Read rows by header name; undecodable rows are skipped as schema errors
pub fn read_rows<T: DeserializeOwned>(
    path: &Path,
    required: &[&str],
    summary: &mut RunSummary,
) -> crate::Result<Vec<T>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    require_columns(&headers, required, path)?;

    let mut rows = Vec::new();
    for (idx, result) in reader.deserialize::<T>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                warn!(path = %path.display(), line = idx + 2, error = %e, "Skipping unreadable row");
                summary.record(SkipCategory::Schema, format!("{}:{}", path.display(), idx + 2));
            }
        }
    }
    Ok(rows)
}

pub fn write_descriptions(path: &Path, descriptions: &[Description]) -> crate::Result<()> {
    write_rows(path, &DESCRIPTION_COLUMNS, descriptions)
}

/// Read descriptions, dropping rows whose text is blank
pub fn read_descriptions(path: &Path, summary: &mut RunSummary) -> crate::Result<Vec<Description>> {
    let rows: Vec<Description> = read_rows(path, &DESCRIPTION_COLUMNS, summary)?;
    let mut descriptions = Vec::with_capacity(rows.len());
    for row in rows {
        if row.text.trim().is_empty() {
            summary.record(SkipCategory::EmptyText, row.key());
        } else {
            descriptions.push(row);
        }
    }
    Ok(descriptions)
}

pub fn write_predictions(path: &Path, predictions: &[Prediction]) -> crate::Result<()> {
    let rows: Vec<PredictionRow> = predictions.iter().map(PredictionRow::from).collect();
    write_rows(path, &PREDICTION_COLUMNS, &rows)
}

pub fn read_predictions(path: &Path, summary: &mut RunSummary) -> crate::Result<Vec<Prediction>> {
    let rows: Vec<PredictionRow> = read_rows(path, &PREDICTION_COLUMNS, summary)?;
    Ok(rows.into_iter().map(Prediction::from).collect())
}

pub fn write_scores(path: &Path, rows: &[ScoreRow]) -> crate::Result<()> {
    write_rows(path, &SCORE_COLUMNS, rows)
}

pub fn read_scores(path: &Path, summary: &mut RunSummary) -> crate::Result<Vec<ScoreRow>> {
    read_rows(path, &SCORE_COLUMNS, summary)
}

pub fn write_aggregates(path: &Path, stats: &[AggregateStat]) -> crate::Result<()> {
    write_rows(path, &AGGREGATE_COLUMNS, stats)
}

pub fn read_aggregates(path: &Path, summary: &mut RunSummary) -> crate::Result<Vec<AggregateStat>> {
    read_rows(path, &AGGREGATE_COLUMNS, summary)
}
