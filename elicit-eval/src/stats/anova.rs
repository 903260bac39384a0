//! One-way and repeated-measures ANOVA

use super::distributions::f_sf;
use super::{sorted_sum, StatisticalPreconditionWarning};
use serde::Serialize;
use std::collections::BTreeMap;

const ONE_WAY: &str = "one-way ANOVA";
const REPEATED: &str = "repeated-measures ANOVA";

/// Named group of observations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub name: String,
    pub values: Vec<f64>,
}

impl Group {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        sorted_sum(&self.values) / self.values.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnovaResult {
    pub f_statistic: Option<f64>,
    pub df_between: usize,
    pub df_within: usize,
    pub p_value: Option<f64>,
    pub eta_squared: Option<f64>,
    /// Within-group mean square, reused by Tukey HSD
    pub mse: Option<f64>,
    pub warnings: Vec<StatisticalPreconditionWarning>,
}

impl AnovaResult {
    fn undefined(df_between: usize, df_within: usize, warning: StatisticalPreconditionWarning) -> Self {
        Self {
            f_statistic: None,
            df_between,
            df_within,
            p_value: None,
            eta_squared: None,
            mse: None,
            warnings: vec![warning],
        }
    }

    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value.map(|p| p < alpha).unwrap_or(false)
    }
}

/// One-way ANOVA across groups.
///
/// Needs at least two groups of at least two observations each; otherwise
/// no statistic is computed and a warning explains why.
pub fn one_way_anova(groups: &[Group]) -> AnovaResult {
    let k = groups.len();
    let n: usize = groups.iter().map(Group::len).sum();
    let df_between = k.saturating_sub(1);
    let df_within = n.saturating_sub(k);

    if k < 2 {
        return AnovaResult::undefined(
            df_between,
            df_within,
            StatisticalPreconditionWarning::new(ONE_WAY, format!("needs at least 2 groups, got {}", k)),
        );
    }
    let small: Vec<&str> = groups
        .iter()
        .filter(|g| g.len() < 2)
        .map(|g| g.name.as_str())
        .collect();
    if !small.is_empty() {
        return AnovaResult::undefined(
            df_between,
            df_within,
            StatisticalPreconditionWarning::new(
                ONE_WAY,
                format!("groups with fewer than 2 observations: {}", small.join(", ")),
            ),
        );
    }

    let all: Vec<f64> = groups.iter().flat_map(|g| g.values.iter().copied()).collect();
    let grand_mean = sorted_sum(&all) / n as f64;

    let ss_between = sorted_sum(
        &groups
            .iter()
            .map(|g| g.len() as f64 * (g.mean() - grand_mean).powi(2))
            .collect::<Vec<_>>(),
    );
    let ss_within = sorted_sum(
        &groups
            .iter()
            .flat_map(|g| {
                let mean = g.mean();
                g.values.iter().map(move |v| (v - mean).powi(2))
            })
            .collect::<Vec<_>>(),
    );
    let ss_total = ss_between + ss_within;

    let mut result = AnovaResult {
        f_statistic: None,
        df_between,
        df_within,
        p_value: None,
        eta_squared: None,
        mse: Some(ss_within / df_within as f64),
        warnings: Vec::new(),
    };

    if ss_total <= f64::EPSILON * n as f64 {
        result.warnings.push(StatisticalPreconditionWarning::new(ONE_WAY, "all observations are equal"));
        return result;
    }
    result.eta_squared = Some(ss_between / ss_total);

    if ss_within <= f64::EPSILON * ss_total {
        result
            .warnings
            .push(StatisticalPreconditionWarning::new(ONE_WAY, "zero within-group variance"));
        return result;
    }

    let f = (ss_between / df_between as f64) / (ss_within / df_within as f64);
    result.f_statistic = Some(f);
    result.p_value = f_sf(f, df_between as f64, df_within as f64);
    result
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatedMeasuresResult {
    pub f_statistic: Option<f64>,
    pub df_condition: usize,
    pub df_error: usize,
    pub p_value: Option<f64>,
    pub partial_eta_squared: Option<f64>,
    pub subjects_used: usize,
    pub subjects_dropped: usize,
    pub warnings: Vec<StatisticalPreconditionWarning>,
}

/// Repeated-measures ANOVA over subject × condition measurements.
///
/// `data` maps subject -> condition -> value. Subjects missing any of
/// `conditions` are dropped with a warning.
pub fn repeated_measures_anova(
    conditions: &[String],
    data: &BTreeMap<String, BTreeMap<String, f64>>,
) -> RepeatedMeasuresResult {
    let k = conditions.len();
    let complete: Vec<Vec<f64>> = data
        .values()
        .filter_map(|by_condition| {
            conditions
                .iter()
                .map(|c| by_condition.get(c).copied())
                .collect::<Option<Vec<f64>>>()
        })
        .collect();
    let n = complete.len();
    let dropped = data.len() - n;

    let mut result = RepeatedMeasuresResult {
        f_statistic: None,
        df_condition: k.saturating_sub(1),
        df_error: k.saturating_sub(1) * n.saturating_sub(1),
        p_value: None,
        partial_eta_squared: None,
        subjects_used: n,
        subjects_dropped: dropped,
        warnings: Vec::new(),
    };

    if dropped > 0 {
        result.warnings.push(StatisticalPreconditionWarning::new(
            REPEATED,
            format!("dropped {} subject(s) without a value in every condition", dropped),
        ));
    }
    if k < 2 || n < 2 {
        result.warnings.push(StatisticalPreconditionWarning::new(
            REPEATED,
            format!("needs at least 2 conditions and 2 complete subjects, got {} and {}", k, n),
        ));
        return result;
    }

    let all: Vec<f64> = complete.iter().flatten().copied().collect();
    let grand_mean = sorted_sum(&all) / all.len() as f64;

    let condition_ss: Vec<f64> = (0..k)
        .map(|c| {
            let column: Vec<f64> = complete.iter().map(|row| row[c]).collect();
            n as f64 * (sorted_sum(&column) / n as f64 - grand_mean).powi(2)
        })
        .collect();
    let subject_ss: Vec<f64> = complete
        .iter()
        .map(|row| k as f64 * (sorted_sum(row) / k as f64 - grand_mean).powi(2))
        .collect();
    let total_ss: Vec<f64> = all.iter().map(|v| (v - grand_mean).powi(2)).collect();

    let ss_condition = sorted_sum(&condition_ss);
    let ss_subjects = sorted_sum(&subject_ss);
    let ss_total = sorted_sum(&total_ss);
    let ss_error = (ss_total - ss_condition - ss_subjects).max(0.0);

    if ss_total <= f64::EPSILON * all.len() as f64 {
        result.warnings.push(StatisticalPreconditionWarning::new(REPEATED, "all observations are equal"));
        return result;
    }
    result.partial_eta_squared = Some(ss_condition / (ss_condition + ss_error));

    if ss_error <= 1e-12 * ss_total {
        result.warnings.push(StatisticalPreconditionWarning::new(REPEATED, "zero residual variance"));
        return result;
    }

    let f = (ss_condition / result.df_condition as f64) / (ss_error / result.df_error as f64);
    result.f_statistic = Some(f);
    result.p_value = f_sf(f, result.df_condition as f64, result.df_error as f64);
    result
}
