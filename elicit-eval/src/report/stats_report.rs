//! Human-readable and tabular reports of the statistical tests

use crate::stats::runner::{AnovaReport, ChiSquareReport, RepeatedMeasuresReport, StudyTests};
use crate::stats::tukey::TukeyResult;
use crate::stats::StatisticalPreconditionWarning;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

pub const STATISTIC_COLUMNS: [&str; 4] = ["test", "subject", "quantity", "value"];

/// One reported quantity of `statistics.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticRow {
    pub test: String,
    pub subject: String,
    pub quantity: String,
    /// Empty when the quantity is undefined
    pub value: Option<f64>,
}

impl StatisticRow {
    fn new(test: &str, subject: impl Into<String>, quantity: &str, value: Option<f64>) -> Self {
        Self {
            test: test.to_string(),
            subject: subject.into(),
            quantity: quantity.to_string(),
            value,
        }
    }
}

fn fmt_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v != 0.0 && v.abs() < 1e-4 => format!("{:.3e}", v),
        Some(v) => format!("{:.4}", v),
        None => "undefined".to_string(),
    }
}

/// Builder for `statistics.txt`
pub struct StatisticsReportBuilder {
    buffer: String,
}

impl Default for StatisticsReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsReportBuilder {
    pub fn new() -> Self {
        Self {
            buffer: String::with_capacity(4096),
        }
    }

    pub fn build(&mut self, tests: &StudyTests) -> String {
        self.buffer.clear();

        // Writing to a String is infallible, so these cannot fail
        self.write_header(tests).expect("write to String");
        self.write_anova(&tests.accuracy, tests.alpha).expect("write to String");
        self.write_repeated(&tests.accuracy_repeated).expect("write to String");
        self.write_chi_square(&tests.correctness).expect("write to String");
        if let Some(similarity) = &tests.similarity {
            self.write_anova(similarity, tests.alpha).expect("write to String");
        }

        std::mem::take(&mut self.buffer)
    }

    fn write_header(&mut self, tests: &StudyTests) -> std::fmt::Result {
        writeln!(self.buffer, "Statistical tests")?;
        writeln!(self.buffer, "=================")?;
        writeln!(self.buffer, "grouping: {}", tests.grouping)?;
        writeln!(self.buffer, "alpha: {}", tests.alpha)?;
        writeln!(self.buffer)?;
        Ok(())
    }

    fn write_warnings(&mut self, warnings: &[StatisticalPreconditionWarning]) -> std::fmt::Result {
        for warning in warnings {
            writeln!(self.buffer, "  WARNING {}", warning)?;
        }
        Ok(())
    }

    fn write_anova(&mut self, report: &AnovaReport, alpha: f64) -> std::fmt::Result {
        writeln!(self.buffer, "One-way ANOVA: {}", report.measure)?;
        writeln!(self.buffer, "-------------------------------")?;
        for group in &report.groups {
            writeln!(
                self.buffer,
                "  {:<32} n = {:>4}  mean = {}",
                group.name,
                group.n,
                fmt_value(group.mean)
            )?;
        }
        let anova = &report.anova;
        writeln!(
            self.buffer,
            "  F({}, {}) = {}, p = {}, eta^2 = {}",
            anova.df_between,
            anova.df_within,
            fmt_value(anova.f_statistic),
            fmt_value(anova.p_value),
            fmt_value(anova.eta_squared)
        )?;
        self.write_warnings(&anova.warnings)?;

        match &report.tukey {
            Some(tukey) => self.write_tukey(tukey)?,
            None if anova.p_value.is_some() => {
                writeln!(self.buffer, "  Not significant at alpha = {}; no post-hoc comparisons", alpha)?;
            }
            None => {}
        }
        writeln!(self.buffer)?;
        Ok(())
    }

    fn write_tukey(&mut self, tukey: &TukeyResult) -> std::fmt::Result {
        writeln!(
            self.buffer,
            "  Tukey HSD ({:.0}% CI, q crit = {}):",
            (1.0 - tukey.alpha) * 100.0,
            fmt_value(tukey.q_critical)
        )?;
        for c in &tukey.comparisons {
            writeln!(
                self.buffer,
                "    {} vs {}: diff = {}, CI [{}, {}], p adj = {}{}",
                c.group_a,
                c.group_b,
                fmt_value(Some(c.mean_diff)),
                fmt_value(Some(c.ci_lower)),
                fmt_value(Some(c.ci_upper)),
                fmt_value(Some(c.p_adjusted)),
                if c.reject { " *" } else { "" }
            )?;
        }
        self.write_warnings(&tukey.warnings)?;
        Ok(())
    }

    fn write_repeated(&mut self, report: &RepeatedMeasuresReport) -> std::fmt::Result {
        writeln!(self.buffer, "Repeated-measures ANOVA: {}", report.measure)?;
        writeln!(self.buffer, "-------------------------------")?;
        writeln!(self.buffer, "  conditions: {}", report.conditions.join(", "))?;
        let r = &report.result;
        writeln!(
            self.buffer,
            "  subjects: {} used, {} dropped",
            r.subjects_used, r.subjects_dropped
        )?;
        writeln!(
            self.buffer,
            "  F({}, {}) = {}, p = {}, partial eta^2 = {}",
            r.df_condition,
            r.df_error,
            fmt_value(r.f_statistic),
            fmt_value(r.p_value),
            fmt_value(r.partial_eta_squared)
        )?;
        self.write_warnings(&r.warnings)?;
        writeln!(self.buffer)?;
        Ok(())
    }

    fn write_chi_square(&mut self, report: &ChiSquareReport) -> std::fmt::Result {
        writeln!(self.buffer, "Chi-square test of independence: correctness")?;
        writeln!(self.buffer, "-------------------------------")?;
        writeln!(self.buffer, "  {:<32} {:>8} {:>10}", "", "correct", "incorrect")?;
        for (name, counts) in report.rows.iter().zip(&report.observed) {
            let correct = counts.first().copied().unwrap_or(0);
            let incorrect = counts.get(1).copied().unwrap_or(0);
            writeln!(self.buffer, "  {:<32} {:>8} {:>10}", name, correct, incorrect)?;
        }
        let r = &report.result;
        writeln!(
            self.buffer,
            "  chi^2({}) = {}, p = {}, Cramer's V = {}{}",
            r.df,
            fmt_value(r.statistic),
            fmt_value(r.p_value),
            fmt_value(r.cramers_v),
            if r.yates_applied { " (Yates corrected)" } else { "" }
        )?;
        self.write_warnings(&r.warnings)?;
        writeln!(self.buffer)?;
        Ok(())
    }
}

/// Render `statistics.txt`
pub fn render_statistics(tests: &StudyTests) -> String {
    StatisticsReportBuilder::new().build(tests)
}

fn anova_rows(report: &AnovaReport, out: &mut Vec<StatisticRow>) {
    let test = format!("anova:{}", report.measure);
    let a = &report.anova;
    out.push(StatisticRow::new(&test, "", "f_statistic", a.f_statistic));
    out.push(StatisticRow::new(&test, "", "df_between", Some(a.df_between as f64)));
    out.push(StatisticRow::new(&test, "", "df_within", Some(a.df_within as f64)));
    out.push(StatisticRow::new(&test, "", "p_value", a.p_value));
    out.push(StatisticRow::new(&test, "", "eta_squared", a.eta_squared));
    for group in &report.groups {
        out.push(StatisticRow::new(&test, &group.name, "mean", group.mean));
    }
    if let Some(tukey) = &report.tukey {
        let test = format!("tukey:{}", report.measure);
        for c in &tukey.comparisons {
            let subject = format!("{}|{}", c.group_a, c.group_b);
            out.push(StatisticRow::new(&test, &subject, "mean_diff", Some(c.mean_diff)));
            out.push(StatisticRow::new(&test, &subject, "ci_lower", Some(c.ci_lower)));
            out.push(StatisticRow::new(&test, &subject, "ci_upper", Some(c.ci_upper)));
            out.push(StatisticRow::new(&test, &subject, "p_adjusted", Some(c.p_adjusted)));
        }
    }
}

/// Rows of `statistics.csv`, one per reported quantity
pub fn statistic_rows(tests: &StudyTests) -> Vec<StatisticRow> {
    let mut out = Vec::new();
    anova_rows(&tests.accuracy, &mut out);

    let test = format!("rm_anova:{}", tests.accuracy_repeated.measure);
    let r = &tests.accuracy_repeated.result;
    out.push(StatisticRow::new(&test, "", "f_statistic", r.f_statistic));
    out.push(StatisticRow::new(&test, "", "df_condition", Some(r.df_condition as f64)));
    out.push(StatisticRow::new(&test, "", "df_error", Some(r.df_error as f64)));
    out.push(StatisticRow::new(&test, "", "p_value", r.p_value));
    out.push(StatisticRow::new(&test, "", "partial_eta_squared", r.partial_eta_squared));

    let c = &tests.correctness.result;
    out.push(StatisticRow::new("chi_square:correctness", "", "statistic", c.statistic));
    out.push(StatisticRow::new("chi_square:correctness", "", "df", Some(c.df as f64)));
    out.push(StatisticRow::new("chi_square:correctness", "", "p_value", c.p_value));
    out.push(StatisticRow::new("chi_square:correctness", "", "cramers_v", c.cramers_v));

    if let Some(similarity) = &tests.similarity {
        anova_rows(similarity, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::types::{DescriptionSource, PredictorSource, ScoreRow};
    use crate::stats::runner::{run_study_tests, StatsSettings};

    fn tests() -> StudyTests {
        let mut rows = Vec::new();
        for i in 0..6 {
            for (source, correct) in [
                (PredictorSource::Human, i != 0),
                (PredictorSource::model("gpt"), i == 0),
            ] {
                rows.push(ScoreRow {
                    participant_id: format!("p{}", i),
                    gesture_id: "c1".into(),
                    source,
                    description_source: DescriptionSource::HumanStructured,
                    is_correct: correct,
                    similarity_score: None,
                });
            }
        }
        run_study_tests(&rows, &StatsSettings::default())
    }

    #[test]
    fn test_text_report_sections() {
        let text = render_statistics(&tests());
        assert!(text.contains("One-way ANOVA: accuracy"));
        assert!(text.contains("Repeated-measures ANOVA: accuracy"));
        assert!(text.contains("Chi-square test of independence"));
        assert!(text.contains("model:gpt"));
        // 2x2 table with 6 rows per source has expected counts below 5
        assert!(text.contains("WARNING chi-square"));
    }

    #[test]
    fn test_statistic_rows() {
        let rows = statistic_rows(&tests());
        let chi = rows
            .iter()
            .find(|r| r.test == "chi_square:correctness" && r.quantity == "df")
            .unwrap();
        assert_eq!(chi.value, Some(1.0));
        assert!(rows.iter().any(|r| r.test == "rm_anova:accuracy" && r.quantity == "p_value"));
        assert!(rows.iter().any(|r| r.test == "anova:accuracy" && r.subject == "human"));
    }

    #[test]
    fn test_fmt_value() {
        assert_eq!(fmt_value(None), "undefined");
        assert_eq!(fmt_value(Some(0.5)), "0.5000");
        assert_eq!(fmt_value(Some(0.00001234)), "1.234e-5");
    }
}
