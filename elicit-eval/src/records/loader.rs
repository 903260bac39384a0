//! Record Loader
//!
//! Joins raw elicitation records (who performed which gesture, through
//! which modality) with the ground-truth command table.

use super::csv_input::{column_index, open_reader, require_columns};
use super::types::{GestureRecord, RecordKey};
use crate::report::summary::{RunSummary, SkipCategory};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Modality used when neither the participant nor the gesture names one
pub const DEFAULT_MODALITY: &str = "unspecified";

/// Ground-truth table columns
pub const GROUND_TRUTH_COLUMNS: [&str; 3] = ["participant_id", "gesture_id", "command"];

/// Elicitation CSV columns
pub const ELICITATION_COLUMNS: [&str; 3] = ["participant_id", "gesture_id", "modality"];

/// One participant's raw elicitation record
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantRecord {
    pub participant_id: String,
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub gestures: Vec<GestureEntry>,
}

/// A gesture listed in a participant record, by id or with details
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GestureEntry {
    Id(String),
    Detailed {
        gesture_id: String,
        #[serde(default)]
        modality: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParticipantFile {
    Many(Vec<ParticipantRecord>),
    One(ParticipantRecord),
}

/// Elicited gesture before the ground-truth join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElicitedGesture {
    pub key: RecordKey,
    pub modality: String,
}

fn flatten_participant(record: ParticipantRecord, out: &mut Vec<ElicitedGesture>) {
    let participant_modality = record.modality.filter(|m| !m.trim().is_empty());
    for entry in record.gestures {
        let (gesture_id, modality) = match entry {
            GestureEntry::Id(id) => (id, None),
            GestureEntry::Detailed { gesture_id, modality } => (gesture_id, modality),
        };
        let modality = modality
            .filter(|m| !m.trim().is_empty())
            .or_else(|| participant_modality.clone())
            .unwrap_or_else(|| DEFAULT_MODALITY.to_string());
        out.push(ElicitedGesture {
            key: RecordKey::new(record.participant_id.trim(), gesture_id.trim()),
            modality: modality.trim().to_string(),
        });
    }
}

fn read_participant_json(path: &Path, out: &mut Vec<ElicitedGesture>) -> crate::Result<()> {
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str::<ParticipantFile>(&content)? {
        ParticipantFile::Many(records) => {
            for record in records {
                flatten_participant(record, out);
            }
        }
        ParticipantFile::One(record) => flatten_participant(record, out),
    }
    Ok(())
}

fn read_elicitation_csv(path: &Path, summary: &mut RunSummary, out: &mut Vec<ElicitedGesture>) -> crate::Result<()> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    require_columns(&headers, &ELICITATION_COLUMNS[..2], path)?;
    let p_idx = column_index(&headers, "participant_id").unwrap_or(0);
    let g_idx = column_index(&headers, "gesture_id").unwrap_or(1);
    let m_idx = column_index(&headers, "modality");

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
        let modality = m_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODALITY);
        out.push(ElicitedGesture {
            key: RecordKey::new(participant, gesture),
            modality: modality.to_string(),
        });
    }
    Ok(())
}

/// Read elicitation records from a JSON file, a directory of JSON files, or a CSV.
///
/// Duplicate keys keep the first occurrence and are counted as schema errors.
pub fn read_elicitation(path: &Path, summary: &mut RunSummary) -> crate::Result<Vec<ElicitedGesture>> {
    let mut raw = Vec::new();
    if path.is_dir() {
        let mut files: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        files.sort();
        for file in files {
            if let Err(e) = read_participant_json(&file, &mut raw) {
                warn!(file = %file.display(), error = %e, "Skipping unreadable participant record");
                summary.record(SkipCategory::Schema, file.display());
            }
        }
    } else if path.extension().map(|ext| ext == "csv").unwrap_or(false) {
        read_elicitation_csv(path, summary, &mut raw)?;
    } else {
        if !path.exists() {
            return Err(crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("elicitation records not found: {}", path.display()),
            )));
        }
        read_participant_json(path, &mut raw)?;
    }

    let mut seen = std::collections::HashSet::new();
    let mut gestures = Vec::with_capacity(raw.len());
    for gesture in raw {
        if gesture.key.participant_id.is_empty() || gesture.key.gesture_id.is_empty() {
            summary.record(SkipCategory::Schema, &gesture.key);
        } else if seen.insert(gesture.key.clone()) {
            gestures.push(gesture);
        } else {
            debug!(key = %gesture.key, "Duplicate elicitation record");
            summary.record(SkipCategory::Schema, format!("duplicate {}", gesture.key));
        }
    }
    Ok(gestures)
}

/// Read the ground-truth command table keyed by record.
///
/// A missing file is fatal. Rows with empty fields or duplicate keys are
/// skipped and counted.
pub fn read_ground_truth(path: &Path, summary: &mut RunSummary) -> crate::Result<BTreeMap<RecordKey, String>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    require_columns(&headers, &GROUND_TRUTH_COLUMNS, path)?;
    let p_idx = column_index(&headers, "participant_id").unwrap_or(0);
    let g_idx = column_index(&headers, "gesture_id").unwrap_or(1);
    let c_idx = column_index(&headers, "command").unwrap_or(2);

    let mut table = BTreeMap::new();
    for (row_idx, result) in reader.records().enumerate() {
        let sample = format!("{}:{}", path.display(), row_idx + 2);
        let Ok(record) = result else {
            summary.record(SkipCategory::Schema, sample);
            continue;
        };
        let field = |i: usize| record.get(i).map(str::trim).unwrap_or_default();
        let (participant, gesture, command) = (field(p_idx), field(g_idx), field(c_idx));
        if participant.is_empty() || gesture.is_empty() || command.is_empty() {
            summary.record(SkipCategory::Schema, sample);
            continue;
        }
        let key = RecordKey::new(participant, gesture);
        if table.contains_key(&key) {
            summary.record(SkipCategory::Schema, format!("duplicate {}", key));
            continue;
        }
        table.insert(key, command.to_string());
    }
    Ok(table)
}

/// Join elicitation records with ground truth.
///
/// Keys present on only one side are excluded as missing-key errors. The
/// run fails when the excluded share exceeds `max_exclusion_rate`, or when
/// nothing joins.
pub fn join_records(
    elicited: Vec<ElicitedGesture>,
    mut ground_truth: BTreeMap<RecordKey, String>,
    max_exclusion_rate: f64,
    summary: &mut RunSummary,
) -> crate::Result<Vec<GestureRecord>> {
    let mut records = Vec::with_capacity(elicited.len());
    let mut excluded = 0usize;

    for gesture in elicited {
        match ground_truth.remove(&gesture.key) {
            Some(command) => records.push(GestureRecord {
                participant_id: gesture.key.participant_id,
                gesture_id: gesture.key.gesture_id,
                modality: gesture.modality,
                ground_truth_command: command,
            }),
            None => {
                let err = crate::Error::MissingKey {
                    key: gesture.key.clone(),
                    detail: "no ground-truth command".to_string(),
                };
                warn!("{}", err);
                summary.record(SkipCategory::MissingKey, &gesture.key);
                excluded += 1;
            }
        }
    }
    for key in ground_truth.into_keys() {
        let err = crate::Error::MissingKey {
            key: key.clone(),
            detail: "no elicitation record".to_string(),
        };
        warn!("{}", err);
        summary.record(SkipCategory::MissingKey, &key);
        excluded += 1;
    }

    let total = records.len() + excluded;
    if total > 0 {
        let rate = excluded as f64 / total as f64;
        if rate > max_exclusion_rate {
            return Err(crate::Error::ExclusionThreshold {
                excluded,
                total,
                rate,
                limit: max_exclusion_rate,
            });
        }
    }
    if records.is_empty() {
        return Err(crate::Error::Schema("no gesture records after join".to_string()));
    }

    records.sort_by(|a, b| a.key().cmp(&b.key()));
    Ok(records)
}

/// Load and join records from both files
pub fn load_records(
    records_path: &Path,
    ground_truth_path: &Path,
    max_exclusion_rate: f64,
    summary: &mut RunSummary,
) -> crate::Result<Vec<GestureRecord>> {
    let ground_truth = read_ground_truth(ground_truth_path, summary)?;
    let elicited = read_elicitation(records_path, summary)?;
    let records = join_records(elicited, ground_truth, max_exclusion_rate, summary)?;
    info!(
        records = records.len(),
        excluded = summary.count(SkipCategory::MissingKey),
        "Loaded gesture records"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    const GROUND_TRUTH: &str = "participant_id,gesture_id,command\n\
        p1,c1,Increase volume\n\
        p1,c2,Decrease volume\n\
        p2,c1,Increase volume\n\
        p2,c2,Decrease volume\n";

    #[test]
    fn test_load_from_json_directory() {
        let dir = TempDir::new().unwrap();
        let participants = dir.path().join("participants");
        std::fs::create_dir(&participants).unwrap();
        std::fs::write(
            participants.join("p1.json"),
            r#"{"participant_id": "p1", "modality": "camera", "gestures": ["c1", {"gesture_id": "c2", "modality": "no-screen"}]}"#,
        )
        .unwrap();
        std::fs::write(
            participants.join("p2.json"),
            r#"{"participant_id": "p2", "gestures": ["c1", "c2"]}"#,
        )
        .unwrap();
        let gt = write(&dir, "gt.csv", GROUND_TRUTH);

        let mut summary = RunSummary::new();
        let records = load_records(&participants, &gt, 0.2, &mut summary).unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].modality, "camera");
        assert_eq!(records[1].modality, "no-screen");
        assert_eq!(records[2].modality, DEFAULT_MODALITY);
        assert_eq!(records[3].ground_truth_command, "Decrease volume");
        assert!(summary.is_clean());
    }

    #[test]
    fn test_load_from_json_array_and_csv() {
        let dir = TempDir::new().unwrap();
        let json = write(
            &dir,
            "all.json",
            r#"[{"participant_id": "p1", "gestures": ["c1", "c2"]},
                {"participant_id": "p2", "modality": "camera", "gestures": ["c1", "c2"]}]"#,
        );
        let csv = write(
            &dir,
            "all.csv",
            "participant_id,gesture_id,modality\np1,c1,camera\np1,c2,\np2,c1,camera\np2,c2,camera\n",
        );
        let gt = write(&dir, "gt.csv", GROUND_TRUTH);

        let mut summary = RunSummary::new();
        assert_eq!(load_records(&json, &gt, 0.0, &mut summary).unwrap().len(), 4);
        let from_csv = load_records(&csv, &gt, 0.0, &mut summary).unwrap();
        assert_eq!(from_csv.len(), 4);
        assert_eq!(from_csv[1].modality, DEFAULT_MODALITY);
    }

    #[test]
    fn test_missing_keys_excluded_under_threshold() {
        let dir = TempDir::new().unwrap();
        let json = write(
            &dir,
            "p.json",
            r#"[{"participant_id": "p1", "gestures": ["c1", "c2"]},
                {"participant_id": "p2", "gestures": ["c1", "c2", "c3"]}]"#,
        );
        let gt = write(&dir, "gt.csv", GROUND_TRUTH);

        let mut summary = RunSummary::new();
        let records = load_records(&json, &gt, 0.25, &mut summary).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(summary.count(SkipCategory::MissingKey), 1);
    }

    #[test]
    fn test_exclusion_threshold_is_fatal() {
        let dir = TempDir::new().unwrap();
        let json = write(&dir, "p.json", r#"{"participant_id": "p1", "gestures": ["c1"]}"#);
        let gt = write(&dir, "gt.csv", GROUND_TRUTH);

        let mut summary = RunSummary::new();
        let result = load_records(&json, &gt, 0.2, &mut summary);
        match result {
            Err(crate::Error::ExclusionThreshold { excluded, total, .. }) => {
                assert_eq!(excluded, 3);
                assert_eq!(total, 4);
            }
            other => panic!("expected exclusion threshold error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_ground_truth_is_fatal() {
        let dir = TempDir::new().unwrap();
        let json = write(&dir, "p.json", r#"{"participant_id": "p1", "gestures": ["c1"]}"#);
        let mut summary = RunSummary::new();
        let result = load_records(&json, &dir.path().join("missing.csv"), 0.2, &mut summary);
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }

    #[test]
    fn test_ground_truth_skips_malformed_and_duplicate_rows() {
        let dir = TempDir::new().unwrap();
        let gt = write(
            &dir,
            "gt.csv",
            "gesture_id,command,participant_id\nc1,End call,p1\nc1,Mute microphone,p1\nc2,,p1\n",
        );
        let mut summary = RunSummary::new();
        let table = read_ground_truth(&gt, &mut summary).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[&RecordKey::new("p1", "c1")], "End call");
        assert_eq!(summary.count(SkipCategory::Schema), 2);
    }

    #[test]
    fn test_ground_truth_requires_columns() {
        let dir = TempDir::new().unwrap();
        let gt = write(&dir, "gt.csv", "participant,gesture,command\np1,c1,End call\n");
        let mut summary = RunSummary::new();
        assert!(matches!(
            read_ground_truth(&gt, &mut summary),
            Err(crate::Error::Schema(_))
        ));
    }

    #[test]
    fn test_duplicate_elicitation_keys_counted() {
        let dir = TempDir::new().unwrap();
        let json = write(&dir, "p.json", r#"{"participant_id": "p1", "gestures": ["c1", "c1"]}"#);
        let mut summary = RunSummary::new();
        let gestures = read_elicitation(&json, &mut summary).unwrap();
        assert_eq!(gestures.len(), 1);
        assert_eq!(summary.count(SkipCategory::Schema), 1);
    }
}
