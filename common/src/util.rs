use crate::plot::Series;

/// Turns a chart title into something usable as a file stem: no whitespace,
/// colons or commas.
pub fn file_stem_from_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            ':' => '-',
            ',' => '_',
            c => c,
        })
        .collect()
}

/// Largest per-category sum of `series`, the top of a stacked bar chart.
pub fn stacked_max(series: &[Series]) -> f64 {
    let len = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    (0..len)
        .map(|i| {
            series
                .iter()
                .filter_map(|s| s.values.get(i))
                .filter(|v| v.is_finite())
                .sum::<f64>()
        })
        .fold(0.0, f64::max)
}

/// Largest finite value over all `series`.
pub fn series_max(series: &[Series]) -> f64 {
    series
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max)
}

/// Smallest and largest strictly positive finite value, `None` if there is
/// none. Used as the bounds of a logarithmic axis.
pub fn positive_bounds(series: &[Series]) -> Option<(f64, f64)> {
    series
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
        })
}
