//! Chi-square test of independence

use super::distributions::chi_squared_sf;
use super::StatisticalPreconditionWarning;
use serde::Serialize;

const TEST: &str = "chi-square";

/// Smallest expected count considered reliable
pub const MIN_EXPECTED: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChiSquareResult {
    pub statistic: Option<f64>,
    pub df: usize,
    pub p_value: Option<f64>,
    /// Expected counts under independence, same shape as the observed table
    /// after empty rows and columns are removed
    pub expected: Vec<Vec<f64>>,
    pub cramers_v: Option<f64>,
    pub yates_applied: bool,
    pub warnings: Vec<StatisticalPreconditionWarning>,
}

/// Chi-square test of independence on a contingency table of counts.
///
/// All-zero rows and columns are removed with a warning. The Yates
/// continuity correction applies only to 2×2 tables. Expected counts below
/// [`MIN_EXPECTED`] add a warning but still produce a result.
pub fn chi_square_independence(table: &[Vec<u64>], yates_correction: bool) -> ChiSquareResult {
    let mut result = ChiSquareResult {
        statistic: None,
        df: 0,
        p_value: None,
        expected: Vec::new(),
        cramers_v: None,
        yates_applied: false,
        warnings: Vec::new(),
    };

    let width = table.iter().map(Vec::len).max().unwrap_or(0);
    if table.iter().any(|row| row.len() != width) {
        result
            .warnings
            .push(StatisticalPreconditionWarning::new(TEST, "rows have different lengths"));
        return result;
    }

    let total: u64 = table.iter().flatten().sum();
    if total == 0 {
        result
            .warnings
            .push(StatisticalPreconditionWarning::new(TEST, "table total is zero"));
        return result;
    }

    let keep_rows: Vec<usize> = (0..table.len())
        .filter(|&r| table[r].iter().sum::<u64>() > 0)
        .collect();
    let keep_cols: Vec<usize> = (0..width)
        .filter(|&c| table.iter().map(|row| row[c]).sum::<u64>() > 0)
        .collect();
    if keep_rows.len() < table.len() || keep_cols.len() < width {
        result.warnings.push(StatisticalPreconditionWarning::new(
            TEST,
            format!(
                "removed {} empty row(s) and {} empty column(s)",
                table.len() - keep_rows.len(),
                width - keep_cols.len()
            ),
        ));
    }
    let observed: Vec<Vec<f64>> = keep_rows
        .iter()
        .map(|&r| keep_cols.iter().map(|&c| table[r][c] as f64).collect())
        .collect();

    let rows = observed.len();
    let cols = keep_cols.len();
    if rows < 2 || cols < 2 {
        result.warnings.push(StatisticalPreconditionWarning::new(
            TEST,
            format!("needs at least a 2x2 table, got {}x{}", rows, cols),
        ));
        return result;
    }

    let n = total as f64;
    let row_totals: Vec<f64> = observed.iter().map(|row| row.iter().sum()).collect();
    let col_totals: Vec<f64> = (0..cols).map(|c| observed.iter().map(|row| row[c]).sum()).collect();
    let expected: Vec<Vec<f64>> = row_totals
        .iter()
        .map(|rt| col_totals.iter().map(|ct| rt * ct / n).collect())
        .collect();

    let df = (rows - 1) * (cols - 1);
    let yates = yates_correction && df == 1;

    let mut statistic = 0.0;
    let mut uncorrected = 0.0;
    for (obs_row, exp_row) in observed.iter().zip(&expected) {
        for (&o, &e) in obs_row.iter().zip(exp_row) {
            let diff = (o - e).abs();
            uncorrected += diff * diff / e;
            let diff = if yates { (diff - 0.5).max(0.0) } else { diff };
            statistic += diff * diff / e;
        }
    }

    let low_cells = expected.iter().flatten().filter(|&&e| e < MIN_EXPECTED).count();
    if low_cells > 0 {
        result.warnings.push(StatisticalPreconditionWarning::new(
            TEST,
            format!("{} expected cell(s) below {}", low_cells, MIN_EXPECTED),
        ));
    }

    let min_dim = rows.min(cols) as f64;
    result.statistic = Some(statistic);
    result.df = df;
    result.p_value = chi_squared_sf(statistic, df as f64);
    result.cramers_v = Some((uncorrected / (n * (min_dim - 1.0))).sqrt());
    result.expected = expected;
    result.yates_applied = yates;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<Vec<u64>> {
        vec![vec![10, 5], vec![3, 12]]
    }

    #[test]
    fn test_reference_values_without_correction() {
        let result = chi_square_independence(&table(), false);
        assert!((result.statistic.unwrap() - 6.651583710407239).abs() < 1e-9);
        assert!((result.p_value.unwrap() - 0.009906773011363754).abs() < 1e-9);
        assert_eq!(result.df, 1);
        assert!(!result.yates_applied);
        assert_eq!(result.expected, vec![vec![6.5, 8.5], vec![6.5, 8.5]]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_reference_values_with_yates() {
        let result = chi_square_independence(&table(), true);
        assert!((result.statistic.unwrap() - 4.886877828054299).abs() < 1e-9);
        assert!((result.p_value.unwrap() - 0.027061581911647137).abs() < 1e-9);
        assert!(result.yates_applied);
    }

    #[test]
    fn test_cramers_v() {
        let result = chi_square_independence(&table(), false);
        let expected = (6.651583710407239f64 / 30.0).sqrt();
        assert!((result.cramers_v.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_yates_only_for_two_by_two() {
        let result = chi_square_independence(&[vec![10, 5, 7], vec![3, 12, 9]], true);
        assert!(!result.yates_applied);
        assert_eq!(result.df, 2);
    }

    #[test]
    fn test_low_expected_counts_warn_but_compute() {
        let result = chi_square_independence(&[vec![3, 1], vec![1, 3]], false);
        assert!(result.statistic.is_some());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].message.contains("below 5"));
    }

    #[test]
    fn test_degenerate_tables() {
        let zero = chi_square_independence(&[vec![0, 0], vec![0, 0]], false);
        assert!(zero.statistic.is_none());
        assert!(zero.warnings[0].message.contains("zero"));

        let single_column = chi_square_independence(&[vec![4, 0], vec![6, 0]], false);
        assert!(single_column.statistic.is_none());
        assert_eq!(single_column.warnings.len(), 2);

        let ragged = chi_square_independence(&[vec![1, 2], vec![3]], false);
        assert!(ragged.statistic.is_none());
    }
}
