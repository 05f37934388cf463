//! Descriptive statistics: the shared numeric kernel plus the read-only
//! [`StatisticsAnalyzer`] surface (`info` / `describe` / `column-analysis`).
//!
//! Profiles are recomputed on demand against the current dataset and never
//! cached across mutations.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::CleaningResult;
use crate::types::{Column, Dataset, Value};

// ── numeric kernel ───────────────────────────────────────────────────────

/// Arithmetic mean. `None` on empty input.
pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Sample standard deviation (N−1 denominator). `None` when fewer than two
/// values.
pub fn sample_std(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs)?;
    let ss = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>();
    Some((ss / (xs.len() - 1) as f64).sqrt())
}

/// Population standard deviation (N denominator). `None` on empty input.
pub fn population_std(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    let m = mean(xs)?;
    let ss = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>();
    Some((ss / xs.len() as f64).sqrt())
}

/// Percentile with linear interpolation over a pre-sorted slice.
/// `p` in [0, 100].
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    if sorted.len() == 1 {
        return Some(sorted[0]);
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Sort a copy and take a percentile.
pub fn percentile(xs: &[f64], p: f64) -> Option<f64> {
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_sorted(&sorted, p)
}

/// Median (50th percentile, linear interpolation).
pub fn median(xs: &[f64]) -> Option<f64> {
    percentile(xs, 50.0)
}

/// Median absolute deviation.
pub fn mad(xs: &[f64]) -> Option<f64> {
    let med = median(xs)?;
    let devs: Vec<f64> = xs.iter().map(|x| (x - med).abs()).collect();
    median(&devs)
}

/// Fisher–Pearson skewness (third standardized moment, population form).
/// `None` when variance is zero or fewer than two values.
pub fn skewness(xs: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 2 {
        return None;
    }
    let m = mean(xs)?;
    let m2 = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n as f64;
    if m2 <= f64::EPSILON {
        return None;
    }
    let m3 = xs.iter().map(|x| (x - m).powi(3)).sum::<f64>() / n as f64;
    Some(m3 / m2.powf(1.5))
}

/// Excess kurtosis (fourth standardized moment minus 3, population form).
pub fn kurtosis(xs: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 2 {
        return None;
    }
    let m = mean(xs)?;
    let m2 = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n as f64;
    if m2 <= f64::EPSILON {
        return None;
    }
    let m4 = xs.iter().map(|x| (x - m).powi(4)).sum::<f64>() / n as f64;
    Some(m4 / (m2 * m2) - 3.0)
}

/// Pearson product-moment correlation. `None` when either side has zero
/// variance or the slices are empty/mismatched.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        cov += (x - mx) * (y - my);
        vx += (x - mx) * (x - mx);
        vy += (y - my) * (y - my);
    }
    if vx <= f64::EPSILON || vy <= f64::EPSILON {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

// ── analyzer response shapes ─────────────────────────────────────────────

/// Top-level dataset summary (the `info` operation).
#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    /// Original upload filename.
    pub filename: String,
    /// (rows, columns).
    pub shape: (usize, usize),
    /// Column names in order.
    pub columns: Vec<String>,
    /// Column → dtype wire name.
    pub data_types: BTreeMap<String, String>,
    /// Column → missing-cell count; only columns with at least one missing
    /// cell appear.
    pub missing_values: BTreeMap<String, usize>,
    /// Names of numeric columns.
    pub numeric_columns: Vec<String>,
    /// Rough in-memory footprint of the cells, in bytes.
    pub memory_usage_bytes: usize,
}

/// Descriptive statistics for one numeric column (the `describe` operation).
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDescription {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (N−1); 0 for single-value columns.
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
}

/// One entry of a column's top-frequency table.
#[derive(Debug, Clone, Serialize)]
pub struct FrequentValue {
    pub value: String,
    pub count: usize,
    /// count / total rows × 100, at full precision.
    pub percentage: f64,
}

/// Per-column analysis (the `column-analysis` operation).
#[derive(Debug, Clone, Serialize)]
pub struct ColumnAnalysis {
    pub column: String,
    pub data_type: String,
    pub non_null_count: usize,
    pub null_count: usize,
    pub unique_count: usize,
    pub is_numeric: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Up to ten most frequent values, ties broken by first occurrence.
    pub top_frequent_values: Vec<FrequentValue>,
    /// Up to ten raw sample values.
    pub sample_values: Vec<Value>,
}

// ── analyzer ─────────────────────────────────────────────────────────────

/// Read-only statistics over a dataset snapshot.
pub struct StatisticsAnalyzer;

impl StatisticsAnalyzer {
    /// Dataset-level summary.
    pub fn info(dataset: &Dataset, filename: &str) -> DatasetInfo {
        let mut data_types = BTreeMap::new();
        let mut missing_values = BTreeMap::new();
        for col in dataset.columns() {
            data_types.insert(col.name.clone(), col.dtype.as_str().to_owned());
            let nulls = col.null_count();
            if nulls > 0 {
                missing_values.insert(col.name.clone(), nulls);
            }
        }
        DatasetInfo {
            filename: filename.to_owned(),
            shape: dataset.shape(),
            columns: dataset.column_names(),
            data_types,
            missing_values,
            numeric_columns: dataset.numeric_column_names(),
            memory_usage_bytes: estimate_memory(dataset),
        }
    }

    /// Column → missing-cell count for every column (including zeros).
    pub fn missing_counts(dataset: &Dataset) -> BTreeMap<String, usize> {
        dataset
            .columns()
            .iter()
            .map(|c| (c.name.clone(), c.null_count()))
            .collect()
    }

    /// Descriptive statistics for every numeric column.
    pub fn describe(dataset: &Dataset) -> Vec<ColumnDescription> {
        dataset
            .columns()
            .iter()
            .filter(|c| c.dtype.is_numeric())
            .filter_map(|c| Self::describe_column(c))
            .collect()
    }

    fn describe_column(col: &Column) -> Option<ColumnDescription> {
        let mut xs = col.numeric_values();
        if xs.is_empty() {
            return None;
        }
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Some(ColumnDescription {
            column: col.name.clone(),
            count: xs.len(),
            mean: mean(&xs)?,
            std: sample_std(&xs).unwrap_or(0.0),
            min: xs[0],
            q25: percentile_sorted(&xs, 25.0)?,
            q50: percentile_sorted(&xs, 50.0)?,
            q75: percentile_sorted(&xs, 75.0)?,
            max: xs[xs.len() - 1],
        })
    }

    /// Full analysis of one column.
    pub fn column_analysis(dataset: &Dataset, column: &str) -> CleaningResult<ColumnAnalysis> {
        let col = dataset.require(column)?;
        let total = col.len();
        let null_count = col.null_count();
        let non_null_count = total - null_count;

        let mut counts: Vec<(String, usize)> = Vec::new();
        for v in col.values().iter().filter(|v| !v.is_null()) {
            let key = v.to_field();
            match counts.iter_mut().find(|(k, _)| *k == key) {
                Some((_, n)) => *n += 1,
                None => counts.push((key, 1)),
            }
        }
        let unique_count = counts.len();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        let top_frequent_values = counts
            .into_iter()
            .take(10)
            .map(|(value, count)| FrequentValue {
                value,
                count,
                percentage: count as f64 / total.max(1) as f64 * 100.0,
            })
            .collect();

        let sample_values = col
            .values()
            .iter()
            .filter(|v| !v.is_null())
            .take(10)
            .cloned()
            .collect();

        let is_numeric = col.dtype.is_numeric();
        let (mut mean_v, mut median_v, mut std_v, mut min_v, mut max_v) =
            (None, None, None, None, None);
        if is_numeric {
            let xs = col.numeric_values();
            if !xs.is_empty() {
                mean_v = mean(&xs);
                median_v = median(&xs);
                std_v = sample_std(&xs).or(Some(0.0));
                min_v = xs.iter().copied().reduce(f64::min);
                max_v = xs.iter().copied().reduce(f64::max);
            }
        }

        Ok(ColumnAnalysis {
            column: column.to_owned(),
            data_type: col.dtype.as_str().to_owned(),
            non_null_count,
            null_count,
            unique_count,
            is_numeric,
            mean: mean_v,
            median: median_v,
            std: std_v,
            min: min_v,
            max: max_v,
            top_frequent_values,
            sample_values,
        })
    }
}

/// Rough in-memory footprint of the dataset's cells, in bytes.
pub fn estimate_memory(dataset: &Dataset) -> usize {
    dataset
        .columns()
        .iter()
        .map(|c| {
            c.values()
                .iter()
                .map(|v| match v {
                    Value::Text(s) => std::mem::size_of::<Value>() + s.len(),
                    _ => std::mem::size_of::<Value>(),
                })
                .sum::<usize>()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;

    fn near(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        near(sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap(), 2.138089935299395);
    }

    #[test]
    fn percentile_linear_interpolation() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        near(percentile(&xs, 25.0).unwrap(), 1.75);
        near(percentile(&xs, 50.0).unwrap(), 2.5);
        near(percentile(&xs, 75.0).unwrap(), 3.25);
    }

    #[test]
    fn skewness_of_symmetric_column_is_zero() {
        near(skewness(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap(), 0.0);
    }

    #[test]
    fn skewness_sign_follows_tail() {
        assert!(skewness(&[1.0, 1.0, 1.0, 2.0, 10.0]).unwrap() > 0.0);
        assert!(skewness(&[-10.0, -2.0, -1.0, -1.0, -1.0]).unwrap() < 0.0);
    }

    #[test]
    fn pearson_perfect_and_inverse() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 6.0, 8.0, 10.0];
        let z = [5.0, 4.0, 3.0, 2.0, 1.0];
        near(pearson(&x, &y).unwrap(), 1.0);
        near(pearson(&x, &z).unwrap(), -1.0);
    }

    #[test]
    fn info_reports_missing_only_where_present() {
        let ds = Dataset::new(vec![
            Column::new("a", vec![Value::Int(1), Value::Null]),
            Column::new("b", vec![Value::Int(1), Value::Int(2)]),
        ])
        .unwrap();
        let info = StatisticsAnalyzer::info(&ds, "data.csv");
        assert_eq!(info.missing_values.get("a"), Some(&1));
        assert!(!info.missing_values.contains_key("b"));
        assert_eq!(info.numeric_columns, vec!["a", "b"]);
    }

    #[test]
    fn column_analysis_top_values_and_percentage() {
        let ds = Dataset::new(vec![Column::new(
            "city",
            vec![
                Value::Text("NY".into()),
                Value::Text("LA".into()),
                Value::Text("NY".into()),
                Value::Null,
            ],
        )])
        .unwrap();
        let a = StatisticsAnalyzer::column_analysis(&ds, "city").unwrap();
        assert_eq!(a.null_count, 1);
        assert_eq!(a.unique_count, 2);
        assert_eq!(a.top_frequent_values[0].value, "NY");
        assert_eq!(a.top_frequent_values[0].count, 2);
        near(a.top_frequent_values[0].percentage, 50.0);
        assert!(!a.is_numeric);
    }

    #[test]
    fn column_analysis_unknown_column() {
        let ds = Dataset::new(vec![Column::new("a", vec![Value::Int(1)])]).unwrap();
        assert!(StatisticsAnalyzer::column_analysis(&ds, "zzz").is_err());
    }
}
