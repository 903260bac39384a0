//! Human descriptions from annotation tables

use super::cleaning::clean_annotation;
use crate::records::csv_input::{column_index, open_reader, read_wide_table, require_columns, WIDE_ID_COLUMN};
use crate::records::types::{Description, DescriptionSource, RecordKey};
use crate::report::summary::{RunSummary, SkipCategory};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Structured annotation fields, in the order they are concatenated
pub const STRUCTURED_FIELDS: [(&str, &str); 6] = [
    ("handedness", "Handedness"),
    ("hand_shape", "Hand shape"),
    ("palm_orientation", "Palm orientation"),
    ("motion", "Motion"),
    ("location", "Location"),
    ("repetition", "Repetition"),
];

/// Suffix of description columns in the wide layout
pub const DESCRIPTION_SUFFIX: &str = "description";

fn is_wide(path: &Path) -> crate::Result<bool> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?;
    Ok(column_index(headers, WIDE_ID_COLUMN).is_some())
}

/// Read descriptions from a wide table, cleaning every cell
fn read_wide_descriptions(
    path: &Path,
    source: DescriptionSource,
    summary: &mut RunSummary,
) -> crate::Result<Vec<Description>> {
    let cells = read_wide_table(path, DESCRIPTION_SUFFIX, summary)?;
    let mut descriptions = Vec::with_capacity(cells.len());
    for cell in cells {
        match clean_annotation(&cell.value) {
            Some(text) => descriptions.push(Description {
                participant_id: cell.key.participant_id,
                gesture_id: cell.key.gesture_id,
                source: source.clone(),
                text,
            }),
            None => summary.record(SkipCategory::EmptyText, &cell.key),
        }
    }
    Ok(descriptions)
}

/// Join the present structured fields as `Label: value; Label: value`
pub fn compose_structured<'a>(fields: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Option<String> {
    let parts: Vec<String> = fields
        .into_iter()
        .filter_map(|(label, value)| {
            let value = clean_annotation(value?)?;
            Some(format!("{}: {}", label, value))
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn read_long_structured(path: &Path, summary: &mut RunSummary) -> crate::Result<Vec<Description>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    require_columns(&headers, &["participant_id", "gesture_id"], path)?;
    let p_idx = column_index(&headers, "participant_id").unwrap_or(0);
    let g_idx = column_index(&headers, "gesture_id").unwrap_or(1);

    let field_columns: Vec<(&str, usize)> = STRUCTURED_FIELDS
        .iter()
        .filter_map(|(column, label)| column_index(&headers, column).map(|idx| (*label, idx)))
        .collect();
    if field_columns.is_empty() {
        let names: Vec<&str> = STRUCTURED_FIELDS.iter().map(|(c, _)| *c).collect();
        return Err(crate::Error::Schema(format!(
            "{} has none of the structured fields: {}",
            path.display(),
            names.join(", ")
        )));
    }

    let mut seen = BTreeSet::new();
    let mut descriptions = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let sample = format!("{}:{}", path.display(), row_idx + 2);
        let Ok(record) = result else {
            summary.record(SkipCategory::Schema, sample);
            continue;
        };
        let participant = record.get(p_idx).map(str::trim).unwrap_or_default();
        let gesture = record.get(g_idx).map(str::trim).unwrap_or_default();
        if participant.is_empty() || gesture.is_empty() {
            summary.record(SkipCategory::Schema, sample);
            continue;
        }
        let key = RecordKey::new(participant, gesture);
        if !seen.insert(key.clone()) {
            summary.record(SkipCategory::Schema, format!("duplicate {}", key));
            continue;
        }

        let fields = field_columns.iter().map(|(label, idx)| (*label, record.get(*idx)));
        match compose_structured(fields) {
            Some(text) => descriptions.push(Description {
                participant_id: key.participant_id,
                gesture_id: key.gesture_id,
                source: DescriptionSource::HumanStructured,
                text,
            }),
            None => summary.record(SkipCategory::EmptyText, &key),
        }
    }
    Ok(descriptions)
}

fn sorted(mut descriptions: Vec<Description>) -> Vec<Description> {
    descriptions.sort_by(|a, b| a.key().cmp(&b.key()));
    descriptions
}

/// Structured human descriptions.
///
/// Accepts the long layout (`participant_id,gesture_id` plus any of
/// [`STRUCTURED_FIELDS`]) or the wide layout whose cells already hold the
/// composed text.
pub fn extract_structured(path: &Path, summary: &mut RunSummary) -> crate::Result<Vec<Description>> {
    let descriptions = if is_wide(path)? {
        debug!(path = %path.display(), "Reading structured descriptions in wide layout");
        read_wide_descriptions(path, DescriptionSource::HumanStructured, summary)?
    } else {
        read_long_structured(path, summary)?
    };
    info!(path = %path.display(), count = descriptions.len(), "Extracted structured descriptions");
    Ok(sorted(descriptions))
}

/// Unstructured human descriptions from the wide layout
pub fn extract_unstructured(path: &Path, summary: &mut RunSummary) -> crate::Result<Vec<Description>> {
    let descriptions = read_wide_descriptions(path, DescriptionSource::HumanUnstructured, summary)?;
    info!(path = %path.display(), count = descriptions.len(), "Extracted unstructured descriptions");
    Ok(sorted(descriptions))
}
