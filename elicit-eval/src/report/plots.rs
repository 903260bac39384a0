//! pgfplots figure files

use crate::records::types::AggregateStat;
use crate::scoring::aggregation::METRIC_ACCURACY;
use std::fmt::Write;

/// Escape characters TeX treats specially in tick labels
fn escape_tex(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '_' | '%' | '&' | '#' | '$' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Bar chart of accuracy per predictor source with Wilson error bars.
///
/// Only per-source groups are plotted (grouping keys without `|`).
pub fn accuracy_chart(stats: &[AggregateStat]) -> String {
    let mut bars: Vec<&AggregateStat> = stats
        .iter()
        .filter(|s| s.metric_name == METRIC_ACCURACY && !s.grouping_key.contains('|'))
        .collect();
    bars.sort_by(|a, b| a.grouping_key.cmp(&b.grouping_key));

    let mut out = String::new();
    let ticks: Vec<String> = (0..bars.len()).map(|i| i.to_string()).collect();
    let labels: Vec<String> = bars
        .iter()
        .map(|s| format!("{{{}}}", escape_tex(&s.grouping_key)))
        .collect();

    // Writing to a String is infallible
    let _ = writeln!(out, "\\begin{{tikzpicture}}");
    let _ = writeln!(out, "\\begin{{axis}}[");
    let _ = writeln!(out, "    ybar,");
    let _ = writeln!(out, "    ymin=0, ymax=1,");
    let _ = writeln!(out, "    ylabel={{Accuracy}},");
    let _ = writeln!(out, "    xtick={{{}}},", ticks.join(","));
    let _ = writeln!(out, "    xticklabels={{{}}},", labels.join(","));
    let _ = writeln!(out, "    x tick label style={{rotate=30, anchor=east}},");
    let _ = writeln!(out, "]");
    let _ = writeln!(out, "\\addplot+[error bars/.cd, y dir=both, y explicit] coordinates {{");
    for (i, stat) in bars.iter().enumerate() {
        match stat.confidence_interval() {
            Some((lower, upper)) => {
                let _ = writeln!(
                    out,
                    "    ({}, {}) += (0, {}) -= (0, {})",
                    i,
                    stat.value,
                    upper - stat.value,
                    stat.value - lower
                );
            }
            None => {
                let _ = writeln!(out, "    ({}, {})", i, stat.value);
            }
        }
    }
    let _ = writeln!(out, "}};");
    let _ = writeln!(out, "\\end{{axis}}");
    let _ = writeln!(out, "\\end{{tikzpicture}}");
    out
}
