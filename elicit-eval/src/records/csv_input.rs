//! CSV input helpers
//!
//! Columns are always located by header name. The wide annotation layout
//! (`id_video`, `c1_description`, `c2_description`, ...) used by the
//! elicitation dataset is flattened to one cell per record key.

use super::types::RecordKey;
use crate::report::summary::{RunSummary, SkipCategory};
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;
use tracing::debug;

/// Participant column of the wide layout
pub const WIDE_ID_COLUMN: &str = "id_video";

/// Open a headered CSV reader, mapping a missing file to a clear IO error
pub fn open_reader(path: &Path) -> crate::Result<csv::Reader<std::fs::File>> {
    if !path.exists() {
        return Err(crate::Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input file not found: {}", path.display()),
        )));
    }
    let reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_path(path)?;
    Ok(reader)
}

/// Fail with a schema error unless every required column is present
pub fn require_columns(headers: &StringRecord, required: &[&str], path: &Path) -> crate::Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Schema(format!(
            "{} is missing column(s): {}",
            path.display(),
            missing.join(", ")
        )))
    }
}

/// Index of a named column
pub fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

/// One non-empty cell of a wide annotation table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideCell {
    pub key: RecordKey,
    pub value: String,
}

/// Read a wide table, keeping columns named `<gesture>_<suffix>`.
///
/// Empty cells are not returned (the dataset writes missing annotations as
/// empty fields). Rows without a participant id are skipped as schema errors.
pub fn read_wide_table(path: &Path, suffix: &str, summary: &mut RunSummary) -> crate::Result<Vec<WideCell>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    require_columns(&headers, &[WIDE_ID_COLUMN], path)?;
    let id_idx = column_index(&headers, WIDE_ID_COLUMN).unwrap_or(0);

    let column_suffix = format!("_{}", suffix);
    let gesture_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, h)| {
            h.strip_suffix(column_suffix.as_str())
                .filter(|g| !g.is_empty())
                .map(|g| (idx, g.to_string()))
        })
        .collect();
    if gesture_columns.is_empty() {
        return Err(crate::Error::Schema(format!(
            "{} has no *{} columns",
            path.display(),
            column_suffix
        )));
    }

    let mut cells = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let line = row_idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(path = %path.display(), line, error = %e, "Unreadable row");
                summary.record(SkipCategory::Schema, format!("{}:{}", path.display(), line));
                continue;
            }
        };
        let participant = record.get(id_idx).map(str::trim).unwrap_or_default();
        if participant.is_empty() {
            summary.record(SkipCategory::Schema, format!("{}:{}", path.display(), line));
            continue;
        }
        for (idx, gesture) in &gesture_columns {
            let value = record.get(*idx).map(str::trim).unwrap_or_default();
            if value.is_empty() {
                continue;
            }
            cells.push(WideCell {
                key: RecordKey::new(participant, gesture.as_str()),
                value: value.to_string(),
            });
        }
    }

    debug!(path = %path.display(), cells = cells.len(), "Read wide table");
    Ok(cells)
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

    #[test]
    fn test_read_wide_table_flattens_cells() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "d1.csv",
            "id_video,c1_description,c2_description,notes\n\
             v01,Open palm pushes forward,,x\n\
             v02,,Thumb up,y\n",
        );
        let mut summary = RunSummary::new();
        let cells = read_wide_table(&path, "description", &mut summary).unwrap();

        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].key, RecordKey::new("v01", "c1"));
        assert_eq!(cells[0].value, "Open palm pushes forward");
        assert_eq!(cells[1].key, RecordKey::new("v02", "c2"));
        assert!(summary.is_clean());
    }

    #[test]
    fn test_read_wide_table_requires_id_column() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.csv", "video,c1_description\nv1,a\n");
        let mut summary = RunSummary::new();
        assert!(matches!(
            read_wide_table(&path, "description", &mut summary),
            Err(crate::Error::Schema(_))
        ));
    }

    #[test]
    fn test_read_wide_table_skips_rows_without_id() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "p.csv", "id_video,c1_command\n,End call\nv1,Mute microphone\n");
        let mut summary = RunSummary::new();
        let cells = read_wide_table(&path, "command", &mut summary).unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(summary.count(SkipCategory::Schema), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut summary = RunSummary::new();
        let result = read_wide_table(Path::new("/nonexistent/x.csv"), "command", &mut summary);
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
