//! Report/Plot Emitter
//!
//! CSV tables, the statistics report, pgfplots figures and the run summary.

pub mod plots;
pub mod stats_report;
pub mod summary;
pub mod tables;

use crate::records::types::{AggregateStat, ScoreRow};
use crate::stats::runner::StudyTests;
use std::path::{Path, PathBuf};
use tracing::info;

pub use stats_report::{render_statistics, statistic_rows, StatisticRow, STATISTIC_COLUMNS};
pub use summary::{RunSummary, SkipCategory};

pub const SCORES_FILE: &str = "scores.csv";
pub const AGGREGATES_FILE: &str = "aggregates.csv";
pub const SIMILARITY_MATRIX_FILE: &str = "similarity_matrix.csv";
pub const STATISTICS_TEXT_FILE: &str = "statistics.txt";
pub const STATISTICS_CSV_FILE: &str = "statistics.csv";
pub const ACCURACY_FIGURE_FILE: &str = "accuracy_by_source.pgf";

/// Where the report files go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    pub outputs: PathBuf,
    pub figures: PathBuf,
}

impl OutputDirs {
    pub fn new(outputs: impl Into<PathBuf>, figures: impl Into<PathBuf>) -> Self {
        Self {
            outputs: outputs.into(),
            figures: figures.into(),
        }
    }

    /// `outputs/` and `pgf/` under one root
    pub fn under(root: &Path) -> Self {
        Self::new(root.join("outputs"), root.join("pgf"))
    }

    pub fn scores(&self) -> PathBuf {
        self.outputs.join(SCORES_FILE)
    }

    pub fn aggregates(&self) -> PathBuf {
        self.outputs.join(AGGREGATES_FILE)
    }

    pub fn similarity_matrix(&self) -> PathBuf {
        self.outputs.join(SIMILARITY_MATRIX_FILE)
    }

    pub fn statistics_text(&self) -> PathBuf {
        self.outputs.join(STATISTICS_TEXT_FILE)
    }

    pub fn statistics_csv(&self) -> PathBuf {
        self.outputs.join(STATISTICS_CSV_FILE)
    }

    pub fn accuracy_figure(&self) -> PathBuf {
        self.figures.join(ACCURACY_FIGURE_FILE)
    }
}

/// Write the scoring tables
pub fn write_score_tables(
    dirs: &OutputDirs,
    rows: &[ScoreRow],
    aggregates: &[AggregateStat],
    matrix: &[AggregateStat],
) -> crate::Result<()> {
    tables::write_scores(&dirs.scores(), rows)?;
    tables::write_aggregates(&dirs.aggregates(), aggregates)?;
    tables::write_aggregates(&dirs.similarity_matrix(), matrix)?;
    std::fs::create_dir_all(&dirs.figures)?;
    std::fs::write(dirs.accuracy_figure(), plots::accuracy_chart(aggregates))?;
    info!(dir = %dirs.outputs.display(), rows = rows.len(), "Wrote score tables");
    Ok(())
}

/// Write `statistics.txt` and `statistics.csv`
pub fn write_statistics(dirs: &OutputDirs, tests: &StudyTests) -> crate::Result<()> {
    std::fs::create_dir_all(&dirs.outputs)?;
    std::fs::write(dirs.statistics_text(), render_statistics(tests))?;
    tables::write_rows(&dirs.statistics_csv(), &STATISTIC_COLUMNS, &statistic_rows(tests))?;
    info!(dir = %dirs.outputs.display(), warnings = tests.warning_count(), "Wrote statistics report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::runner::{run_study_tests, StatsSettings};
    use tempfile::TempDir;

    #[test]
    fn test_output_paths() {
        let dirs = OutputDirs::under(Path::new("/study"));
        assert_eq!(dirs.scores(), PathBuf::from("/study/outputs/scores.csv"));
        assert_eq!(dirs.accuracy_figure(), PathBuf::from("/study/pgf/accuracy_by_source.pgf"));
    }

    #[test]
    fn test_write_everything() {
        let dir = TempDir::new().unwrap();
        let dirs = OutputDirs::under(dir.path());
        let aggregates = vec![AggregateStat::new("human", "accuracy", 1.0).with_interval(Some((0.2, 1.0)))];

        write_score_tables(&dirs, &[], &aggregates, &[]).unwrap();
        write_statistics(&dirs, &run_study_tests(&[], &StatsSettings::default())).unwrap();

        for path in [
            dirs.scores(),
            dirs.aggregates(),
            dirs.similarity_matrix(),
            dirs.statistics_text(),
            dirs.statistics_csv(),
            dirs.accuracy_figure(),
        ] {
            assert!(path.exists(), "missing {}", path.display());
        }
    }
}
