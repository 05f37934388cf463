//! Visualization data: axis compatibility, plot-kind eligibility, plot data
//! series, and the Pearson correlation matrix.
//!
//! This component's contract ends at numeric data an external renderer can
//! rasterize; no image generation happens here. Large datasets are sampled
//! deterministically (fixed row stride) and the response says so.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CleaningError, CleaningResult};
use crate::ops::skewness::{histogram, Histogram};
use crate::stats::{pearson, percentile};
use crate::types::{detect_datetime_format, parse_datetime, Column, DataType, Dataset, Value};

/// Row count above which plots and correlation sample the dataset.
pub const SAMPLE_THRESHOLD: usize = 5_000;

/// Plot kinds the renderer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotKind {
    Scatter,
    Line,
    Bar,
    Histogram,
    Box,
}

/// The `valid-y-columns` response.
#[derive(Debug, Clone, Serialize)]
pub struct ValidYColumns {
    pub valid_columns: Vec<String>,
}

/// The `plot-options` response.
#[derive(Debug, Clone, Serialize)]
pub struct PlotOptions {
    pub options: Vec<PlotKind>,
}

/// Numeric plot data for one render request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlotData {
    Scatter { x: Vec<f64>, y: Vec<f64> },
    Line { x: Vec<f64>, y: Vec<f64> },
    /// Category labels with aggregated values (mean of Y, or counts when no Y
    /// was requested).
    Bar { categories: Vec<String>, values: Vec<f64> },
    Histogram { bins: Histogram },
    /// Five-number summary plus the points beyond the IQR whiskers.
    Box { min: f64, q1: f64, median: f64, q3: f64, max: f64, outliers: Vec<f64> },
}

/// The `plot` response.
#[derive(Debug, Clone, Serialize)]
pub struct PlotResponse {
    pub x_axis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_axis: Option<String>,
    pub data: PlotData,
    /// Whether rows were sampled before computing.
    pub sampled: bool,
    /// Rows actually used.
    pub sample_size: usize,
}

/// The `correlation` response.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// Row-major Pearson coefficients; zero-variance pairs report 0.
    pub matrix: Vec<Vec<f64>>,
    pub sampled: bool,
    pub sample_size: usize,
}

fn axis_class(col: &Column) -> AxisClass {
    match col.dtype {
        DataType::Integer | DataType::Float => AxisClass::Numeric,
        DataType::Datetime => AxisClass::Datetime,
        DataType::Text | DataType::Categorical | DataType::Boolean => AxisClass::Categorical,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisClass {
    Numeric,
    Categorical,
    Datetime,
}

/// Columns that form a sensible Y axis for the chosen X.
pub fn valid_y_columns(dataset: &Dataset, x_axis: &str) -> CleaningResult<ValidYColumns> {
    let x = dataset.require(x_axis)?;
    let numeric_others: Vec<String> = dataset
        .columns()
        .iter()
        .filter(|c| c.dtype.is_numeric() && c.name != x_axis)
        .map(|c| c.name.clone())
        .collect();
    let valid_columns = match axis_class(x) {
        AxisClass::Numeric | AxisClass::Datetime => numeric_others,
        AxisClass::Categorical => {
            // numeric Y for aggregation plots, or the column itself for counts
            let mut cols = numeric_others;
            cols.push(x_axis.to_owned());
            cols
        }
    };
    Ok(ValidYColumns { valid_columns })
}

/// Applicable plot kinds for an axis combination.
pub fn plot_options(
    dataset: &Dataset,
    x_axis: &str,
    y_axis: Option<&str>,
) -> CleaningResult<PlotOptions> {
    let x = dataset.require(x_axis)?;
    let y = y_axis.map(|name| dataset.require(name)).transpose()?;

    let mut options = Vec::new();
    match axis_class(x) {
        AxisClass::Numeric => {
            options.push(PlotKind::Histogram);
            options.push(PlotKind::Box);
            if y.map(|c| c.dtype.is_numeric()).unwrap_or(false) {
                options.push(PlotKind::Scatter);
                options.push(PlotKind::Line);
            }
        }
        AxisClass::Datetime => {
            if y.map(|c| c.dtype.is_numeric()).unwrap_or(false) {
                options.push(PlotKind::Scatter);
                options.push(PlotKind::Line);
            }
        }
        AxisClass::Categorical => {
            options.push(PlotKind::Bar);
        }
    }
    Ok(PlotOptions { options })
}

/// Deterministic row sample: every k-th row so results are reproducible and
/// idempotent across retried requests.
fn sample_rows(n: usize) -> (Vec<usize>, bool) {
    if n <= SAMPLE_THRESHOLD {
        return ((0..n).collect(), false);
    }
    let stride = n.div_ceil(SAMPLE_THRESHOLD);
    ((0..n).step_by(stride).collect(), true)
}

fn numeric_axis(col: &Column, rows: &[usize]) -> Vec<Option<f64>> {
    rows.iter()
        .map(|&r| {
            let v = &col.values()[r];
            match col.dtype {
                DataType::Datetime => v.as_text().and_then(|s| {
                    detect_datetime_format(s)
                        .and_then(|f| parse_datetime(s, f))
                        .map(|d| d.and_utc().timestamp() as f64)
                }),
                _ => v.as_f64(),
            }
        })
        .collect()
}

/// Build plot data for the requested kind.
pub fn plot(
    dataset: &Dataset,
    x_axis: &str,
    y_axis: Option<&str>,
    kind: PlotKind,
) -> CleaningResult<PlotResponse> {
    let x_col = dataset.require(x_axis)?;
    let (rows, sampled) = sample_rows(dataset.row_count());
    let sample_size = rows.len();

    let eligible = plot_options(dataset, x_axis, y_axis)?.options;
    if !eligible.contains(&kind) {
        return Err(CleaningError::InvalidOperation {
            message: format!(
                "plot kind '{kind:?}' is not applicable to x='{x_axis}' y={y_axis:?}"
            ),
        });
    }

    let data = match kind {
        PlotKind::Histogram => {
            let xs: Vec<f64> = numeric_axis(x_col, &rows).into_iter().flatten().collect();
            PlotData::Histogram { bins: histogram(&xs) }
        }
        PlotKind::Box => {
            let mut xs: Vec<f64> = numeric_axis(x_col, &rows).into_iter().flatten().collect();
            xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            if xs.is_empty() {
                return Err(CleaningError::InvalidOperation {
                    message: format!("column '{x_axis}' has no numeric values to plot"),
                });
            }
            let q1 = percentile(&xs, 25.0).unwrap_or(xs[0]);
            let q3 = percentile(&xs, 75.0).unwrap_or(xs[xs.len() - 1]);
            let iqr = q3 - q1;
            let (lo, hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
            let outliers: Vec<f64> =
                xs.iter().copied().filter(|&v| v < lo || v > hi).collect();
            PlotData::Box {
                min: xs[0],
                q1,
                median: percentile(&xs, 50.0).unwrap_or(xs[0]),
                q3,
                max: xs[xs.len() - 1],
                outliers,
            }
        }
        PlotKind::Scatter | PlotKind::Line => {
            let y_name = y_axis.ok_or_else(|| CleaningError::InvalidOperation {
                message: "scatter/line plots need a Y axis".to_owned(),
            })?;
            let y_col = dataset.require(y_name)?;
            let xs = numeric_axis(x_col, &rows);
            let ys = numeric_axis(y_col, &rows);
            let mut pairs: Vec<(f64, f64)> = xs
                .into_iter()
                .zip(ys)
                .filter_map(|(x, y)| Some((x?, y?)))
                .collect();
            if kind == PlotKind::Line {
                pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            }
            let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            if kind == PlotKind::Scatter {
                PlotData::Scatter { x, y }
            } else {
                PlotData::Line { x, y }
            }
        }
        PlotKind::Bar => {
            let y_col = y_axis
                .filter(|name| *name != x_axis)
                .map(|name| dataset.require(name))
                .transpose()?;
            let mut categories: Vec<String> = Vec::new();
            let mut sums: Vec<(f64, usize)> = Vec::new();
            for &r in &rows {
                let cat = match &x_col.values()[r] {
                    Value::Null => continue,
                    v => v.to_field(),
                };
                let idx = match categories.iter().position(|c| *c == cat) {
                    Some(i) => i,
                    None => {
                        categories.push(cat);
                        sums.push((0.0, 0));
                        categories.len() - 1
                    }
                };
                match y_col {
                    Some(yc) => {
                        if let Some(y) = yc.values()[r].as_f64() {
                            sums[idx].0 += y;
                            sums[idx].1 += 1;
                        }
                    }
                    None => {
                        sums[idx].0 += 1.0;
                        sums[idx].1 += 1;
                    }
                }
            }
            let values: Vec<f64> = sums
                .iter()
                .map(|(sum, n)| match y_col {
                    Some(_) if *n > 0 => sum / *n as f64,
                    Some(_) => 0.0,
                    None => *sum,
                })
                .collect();
            PlotData::Bar { categories, values }
        }
    };

    Ok(PlotResponse {
        x_axis: x_axis.to_owned(),
        y_axis: y_axis.map(str::to_owned),
        data,
        sampled,
        sample_size,
    })
}

/// Pearson correlation matrix over all numeric columns, cells computed in
/// parallel. Zero-variance pairs report 0.
pub fn correlation(dataset: &Dataset) -> CorrelationMatrix {
    let (rows, sampled) = sample_rows(dataset.row_count());
    let numeric: Vec<&Column> = dataset
        .columns()
        .iter()
        .filter(|c| c.dtype.is_numeric())
        .collect();
    let columns: Vec<String> = numeric.iter().map(|c| c.name.clone()).collect();

    let series: Vec<Vec<Option<f64>>> = numeric
        .iter()
        .map(|c| rows.iter().map(|&r| c.values()[r].as_f64()).collect())
        .collect();

    let matrix: Vec<Vec<f64>> = (0..numeric.len())
        .into_par_iter()
        .map(|i| {
            (0..numeric.len())
                .map(|j| {
                    if i == j {
                        return 1.0;
                    }
                    // pairwise-complete observations
                    let (xs, ys): (Vec<f64>, Vec<f64>) = series[i]
                        .iter()
                        .zip(series[j].iter())
                        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
                        .unzip();
                    pearson(&xs, &ys).unwrap_or(0.0)
                })
                .collect()
        })
        .collect();

    CorrelationMatrix {
        columns,
        matrix,
        sampled,
        sample_size: rows.len(),
    }
}
