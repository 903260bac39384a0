//! Tukey HSD post-hoc comparisons (Tukey-Kramer for unequal group sizes)

use super::anova::{AnovaResult, Group};
use super::distributions::{ptukey, qtukey};
use super::StatisticalPreconditionWarning;
use serde::Serialize;

const TEST: &str = "Tukey HSD";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TukeyComparison {
    pub group_a: String,
    pub group_b: String,
    /// mean(b) - mean(a)
    pub mean_diff: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub p_adjusted: f64,
    pub reject: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TukeyResult {
    pub alpha: f64,
    pub q_critical: Option<f64>,
    pub comparisons: Vec<TukeyComparison>,
    pub warnings: Vec<StatisticalPreconditionWarning>,
}

/// All pairwise comparisons between `groups`, using the ANOVA's
/// within-group mean square and degrees of freedom
pub fn tukey_hsd(groups: &[Group], anova: &AnovaResult, alpha: f64) -> TukeyResult {
    let mut result = TukeyResult {
        alpha,
        q_critical: None,
        comparisons: Vec::new(),
        warnings: Vec::new(),
    };

    let k = groups.len() as f64;
    let df = anova.df_within as f64;
    let mse = match anova.mse {
        Some(mse) if mse > 0.0 && mse.is_finite() => mse,
        _ => {
            result.warnings.push(StatisticalPreconditionWarning::new(
                TEST,
                "within-group mean square is zero or undefined",
            ));
            return result;
        }
    };
    if groups.len() < 2 || groups.iter().any(Group::is_empty) || anova.df_within < 2 {
        result.warnings.push(StatisticalPreconditionWarning::new(
            TEST,
            "needs at least 2 non-empty groups and 2 error degrees of freedom",
        ));
        return result;
    }

    let Some(q_critical) = qtukey(1.0 - alpha, k, df) else {
        result.warnings.push(StatisticalPreconditionWarning::new(
            TEST,
            format!("no critical value for alpha {}", alpha),
        ));
        return result;
    };
    result.q_critical = Some(q_critical);

    for (i, a) in groups.iter().enumerate() {
        for b in &groups[i + 1..] {
            let mean_diff = b.mean() - a.mean();
            let se = (mse / 2.0 * (1.0 / a.len() as f64 + 1.0 / b.len() as f64)).sqrt();
            let q = mean_diff.abs() / se;
            let p_adjusted = (1.0 - ptukey(q, k, df)).clamp(0.0, 1.0);
            let half_width = q_critical * se;
            result.comparisons.push(TukeyComparison {
                group_a: a.name.clone(),
                group_b: b.name.clone(),
                mean_diff,
                ci_lower: mean_diff - half_width,
                ci_upper: mean_diff + half_width,
                p_adjusted,
                reject: p_adjusted < alpha,
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::anova::one_way_anova;

    fn groups() -> Vec<Group> {
        vec![
            Group::new("a", vec![1.0, 2.0, 3.0]),
            Group::new("b", vec![4.0, 5.0, 6.0]),
            Group::new("c", vec![7.0, 8.0, 9.0]),
        ]
    }

    #[test]
    fn test_reference_comparisons() {
        let groups = groups();
        let anova = one_way_anova(&groups);
        let result = tukey_hsd(&groups, &anova, 0.05);

        assert!((result.q_critical.unwrap() - 4.339195476524765).abs() < 1e-5);
        assert_eq!(result.comparisons.len(), 3);

        let ab = &result.comparisons[0];
        assert_eq!((ab.group_a.as_str(), ab.group_b.as_str()), ("a", "b"));
        assert!((ab.mean_diff - 3.0).abs() < 1e-12);
        assert!((ab.p_adjusted - 0.024229053412602286).abs() < 1e-6);
        assert!((ab.ci_lower - (3.0 - 2.5052356764379793)).abs() < 1e-5);
        assert!((ab.ci_upper - (3.0 + 2.5052356764379793)).abs() < 1e-5);
        assert!(ab.reject);

        let ac = &result.comparisons[1];
        assert!((ac.mean_diff - 6.0).abs() < 1e-12);
        assert!((ac.p_adjusted - 0.0007942179057295329).abs() < 1e-6);
    }

    #[test]
    fn test_undefined_mse_warns() {
        let groups = vec![Group::new("a", vec![1.0, 1.0]), Group::new("b", vec![2.0, 2.0])];
        let anova = one_way_anova(&groups);
        let result = tukey_hsd(&groups, &anova, 0.05);
        assert!(result.comparisons.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }
}
