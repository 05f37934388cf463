//! Outlier detection and remediation over numeric columns.
//!
//! Callers describe rules with optional thresholds ([`OutlierRuleSpec`]);
//! validation converts them into the closed [`OutlierMethod`] form so every
//! detection path is matched exhaustively at compile time.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CleaningError, CleaningResult};
use crate::session::{details, OperationRecord, OperationType};
use crate::stats::{mad, mean, median, percentile, sample_std};
use crate::types::{Column, DataType, Dataset, Value};

use super::isolation_forest::{anomaly_flags, IsolationForestOptions};

/// Z-score cutoff used by the read-only [`detect`] summary.
const DETECT_ZSCORE_THRESHOLD: f64 = 3.0;
/// Fixed IQR multiplier (not caller-configurable).
const IQR_MULTIPLIER: f64 = 1.5;

/// Remediation applied to flagged values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierAction {
    /// Drop flagged rows entirely (a row flagged by several rules in one
    /// batch is removed once).
    Remove,
    /// Clamp flagged values to the nearest non-outlier boundary.
    Cap,
    /// Natural-log transform of the whole column.
    Transform,
}

/// Wire-level method tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethodKind {
    Zscore,
    Iqr,
    ModifiedZscore,
    Percentile,
    IsolationForest,
}

impl OutlierMethodKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Zscore => "zscore",
            Self::Iqr => "iqr",
            Self::ModifiedZscore => "modified_zscore",
            Self::Percentile => "percentile",
            Self::IsolationForest => "isolation_forest",
        }
    }
}

/// One caller-supplied rule, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierRuleSpec {
    pub column: String,
    pub method: OutlierMethodKind,
    /// Required for `zscore` and `modified_zscore`; doubles as the lower
    /// percentile when only one percentile bound is given.
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub lower_percentile: Option<f64>,
    #[serde(default)]
    pub upper_percentile: Option<f64>,
    /// Isolation-forest contamination; defaults to 0.1.
    #[serde(default)]
    pub contamination: Option<f64>,
    pub action: OutlierAction,
}

/// Closed detection-method form. No implicit defaults for caller-required
/// thresholds: conversion from [`OutlierRuleSpec`] fails instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutlierMethod {
    ZScore { threshold: f64 },
    Iqr,
    ModifiedZScore { threshold: f64 },
    Percentile { lower: f64, upper: f64 },
    IsolationForest { contamination: f64 },
}

struct OutlierRule {
    column: String,
    method: OutlierMethod,
    action: OutlierAction,
}

fn validate_spec(dataset: &Dataset, spec: &OutlierRuleSpec) -> CleaningResult<OutlierRule> {
    let col = dataset.require(&spec.column)?;
    if !col.dtype.is_numeric() {
        return Err(CleaningError::IncompatibleMethod {
            method: spec.method.as_str().to_owned(),
            column: spec.column.clone(),
            dtype: col.dtype.as_str().to_owned(),
        });
    }
    let method = match spec.method {
        OutlierMethodKind::Zscore => OutlierMethod::ZScore {
            threshold: spec.threshold.ok_or(CleaningError::MissingThreshold {
                method: "zscore".to_owned(),
            })?,
        },
        OutlierMethodKind::Iqr => OutlierMethod::Iqr,
        OutlierMethodKind::ModifiedZscore => OutlierMethod::ModifiedZScore {
            threshold: spec.threshold.ok_or(CleaningError::MissingThreshold {
                method: "modified_zscore".to_owned(),
            })?,
        },
        OutlierMethodKind::Percentile => {
            let lower = spec
                .lower_percentile
                .or(spec.threshold)
                .ok_or(CleaningError::MissingThreshold { method: "percentile".to_owned() })?;
            let upper = spec.upper_percentile.unwrap_or(100.0 - lower);
            OutlierMethod::Percentile { lower, upper }
        }
        OutlierMethodKind::IsolationForest => OutlierMethod::IsolationForest {
            contamination: spec.contamination.unwrap_or(0.1),
        },
    };
    if spec.action == OutlierAction::Transform {
        let has_nonpositive = col.numeric_values().iter().any(|&x| x <= 0.0);
        if has_nonpositive {
            return Err(CleaningError::DomainError {
                column: spec.column.clone(),
                message: "log transform requires strictly positive values".to_owned(),
            });
        }
    }
    Ok(OutlierRule {
        column: spec.column.clone(),
        method,
        action: spec.action,
    })
}

/// Per-row outlier flags (nulls never flag) and, for cap, the clamp bounds.
fn detect_flags(col: &Column, method: OutlierMethod) -> (Vec<bool>, Option<(f64, f64)>) {
    let xs = col.numeric_values();
    let no_flags = vec![false; col.len()];
    if xs.len() < 2 {
        return (no_flags, None);
    }

    let bounds: Option<(f64, f64)> = match method {
        OutlierMethod::ZScore { threshold } => {
            let m = mean(&xs);
            let sd = sample_std(&xs);
            match (m, sd) {
                (Some(m), Some(sd)) if sd > 0.0 => Some((m - threshold * sd, m + threshold * sd)),
                _ => None,
            }
        }
        OutlierMethod::Iqr => {
            let q1 = percentile(&xs, 25.0);
            let q3 = percentile(&xs, 75.0);
            match (q1, q3) {
                (Some(q1), Some(q3)) => {
                    let iqr = q3 - q1;
                    Some((q1 - IQR_MULTIPLIER * iqr, q3 + IQR_MULTIPLIER * iqr))
                }
                _ => None,
            }
        }
        OutlierMethod::ModifiedZScore { threshold } => {
            let med = median(&xs);
            let mad_v = mad(&xs);
            match (med, mad_v) {
                (Some(med), Some(mad_v)) if mad_v > 0.0 => {
                    let span = threshold * mad_v / 0.6745;
                    Some((med - span, med + span))
                }
                _ => None,
            }
        }
        OutlierMethod::Percentile { lower, upper } => {
            match (percentile(&xs, lower), percentile(&xs, upper)) {
                (Some(lo), Some(hi)) => Some((lo, hi)),
                _ => None,
            }
        }
        OutlierMethod::IsolationForest { .. } => None,
    };

    match method {
        OutlierMethod::IsolationForest { contamination } => {
            let opts = IsolationForestOptions { contamination, ..Default::default() };
            let flags_non_null = anomaly_flags(&xs, &opts);
            let mut flags = Vec::with_capacity(col.len());
            let mut i = 0;
            for v in col.values() {
                if v.as_f64().is_some() {
                    flags.push(flags_non_null[i]);
                    i += 1;
                } else {
                    flags.push(false);
                }
            }
            // Cap bounds for forest-flagged values: the inlier envelope.
            let inliers: Vec<f64> = xs
                .iter()
                .zip(flags_non_null.iter())
                .filter(|(_, f)| !**f)
                .map(|(x, _)| *x)
                .collect();
            let bounds = if inliers.is_empty() {
                None
            } else {
                let lo = inliers.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = inliers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Some((lo, hi))
            };
            (flags, bounds)
        }
        _ => {
            let flags = match bounds {
                Some((lo, hi)) => col
                    .values()
                    .iter()
                    .map(|v| v.as_f64().map(|x| x < lo || x > hi).unwrap_or(false))
                    .collect(),
                None => no_flags,
            };
            (flags, bounds)
        }
    }
}

/// Per-column counts reported by the read-only [`detect`] pass.
#[derive(Debug, Clone, Serialize)]
pub struct OutlierColumnSummary {
    pub total_values: usize,
    pub zscore_outliers: usize,
    pub iqr_outliers: usize,
}

/// Read-only detection over the named numeric columns: z-score (|z| > 3) and
/// IQR counts side by side, to drive severity display. Never mutates state.
pub fn detect(
    dataset: &Dataset,
    columns: &[String],
) -> CleaningResult<BTreeMap<String, OutlierColumnSummary>> {
    for name in columns {
        dataset.require(name)?;
    }
    let summaries: Vec<(String, OutlierColumnSummary)> = columns
        .par_iter()
        .filter_map(|name| {
            let col = dataset.column(name)?;
            if !col.dtype.is_numeric() {
                return None;
            }
            let (z_flags, _) =
                detect_flags(col, OutlierMethod::ZScore { threshold: DETECT_ZSCORE_THRESHOLD });
            let (iqr_flags, _) = detect_flags(col, OutlierMethod::Iqr);
            Some((
                name.clone(),
                OutlierColumnSummary {
                    total_values: col.len() - col.null_count(),
                    zscore_outliers: z_flags.iter().filter(|&&f| f).count(),
                    iqr_outliers: iqr_flags.iter().filter(|&&f| f).count(),
                },
            ))
        })
        .collect();
    Ok(summaries.into_iter().collect())
}

/// Apply a batch of outlier rules atomically.
pub fn remove_outliers(
    dataset: &Dataset,
    specs: &[OutlierRuleSpec],
) -> CleaningResult<(Dataset, OperationRecord)> {
    if specs.is_empty() {
        return Err(CleaningError::EmptySelection {
            message: "no outlier rules supplied".to_owned(),
        });
    }
    let rules = specs
        .iter()
        .map(|spec| validate_spec(dataset, spec))
        .collect::<CleaningResult<Vec<_>>>()?;

    let mut out = dataset.clone();
    let mut rows_to_remove = vec![false; dataset.row_count()];
    let mut capped_cells = 0usize;
    let mut transformed_columns: Vec<&str> = Vec::new();

    for rule in &rules {
        // Detection always runs against the original snapshot so rules in one
        // batch see the same data.
        let col = dataset.require(&rule.column)?;
        let (flags, bounds) = detect_flags(col, rule.method);
        match rule.action {
            OutlierAction::Remove => {
                for (row, flagged) in flags.iter().enumerate() {
                    if *flagged {
                        rows_to_remove[row] = true;
                    }
                }
            }
            OutlierAction::Cap => {
                if let Some((lo, hi)) = bounds {
                    let values: Vec<Value> = col
                        .values()
                        .iter()
                        .zip(flags.iter())
                        .map(|(v, flagged)| match (v.as_f64(), flagged) {
                            (Some(x), true) => {
                                capped_cells += 1;
                                Value::Float(x.clamp(lo, hi))
                            }
                            _ => v.clone(),
                        })
                        .collect();
                    out = out.with_column_replaced(
                        &rule.column,
                        Column::with_dtype(rule.column.clone(), DataType::Float, values),
                    )?;
                }
            }
            OutlierAction::Transform => {
                let values: Vec<Value> = col
                    .values()
                    .iter()
                    .map(|v| match v.as_f64() {
                        Some(x) => Value::Float(x.ln()),
                        None => v.clone(),
                    })
                    .collect();
                transformed_columns.push(&rule.column);
                out = out.with_column_replaced(
                    &rule.column,
                    Column::with_dtype(rule.column.clone(), DataType::Float, values),
                )?;
            }
        }
    }

    let removed_rows = rows_to_remove.iter().filter(|&&r| r).count();
    if removed_rows > 0 {
        let keep: Vec<bool> = rows_to_remove.iter().map(|r| !r).collect();
        out = out.retain_rows(&keep)?;
    }

    let columns: Vec<&str> = specs.iter().map(|s| s.column.as_str()).collect();
    let methods: Vec<&str> = specs.iter().map(|s| s.method.as_str()).collect();
    let record = OperationRecord::new(
        OperationType::RemoveOutliers,
        format!(
            "Applied {} outlier rule(s): removed {removed_rows} row(s), capped {capped_cells} value(s)",
            specs.len()
        ),
        details(vec![
            ("columns", json!(columns)),
            ("methods", json!(methods)),
            ("removed_rows", json!(removed_rows)),
            ("capped_cells", json!(capped_cells)),
            ("transformed_columns", json!(transformed_columns)),
        ]),
    );
    Ok((out, record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(xs: &[f64]) -> Dataset {
        Dataset::new(vec![Column::new(
            "x",
            xs.iter().map(|&x| Value::Float(x)).collect(),
        )])
        .unwrap()
    }

    fn spec(method: OutlierMethodKind, action: OutlierAction) -> OutlierRuleSpec {
        OutlierRuleSpec {
            column: "x".to_string(),
            method,
            threshold: None,
            lower_percentile: None,
            upper_percentile: None,
            contamination: None,
            action,
        }
    }

    #[test]
    fn iqr_flags_match_hand_computation() {
        // [1,2,3,4,100]: Q1=2, Q3=4, IQR=2 -> bounds [-1, 7]; only 100 flags.
        let ds = column(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        let (flags, bounds) = detect_flags(ds.column("x").unwrap(), OutlierMethod::Iqr);
        assert_eq!(flags, vec![false, false, false, false, true]);
        let (lo, hi) = bounds.unwrap();
        assert!((lo - -1.0).abs() < 1e-9);
        assert!((hi - 7.0).abs() < 1e-9);
    }

    #[test]
    fn zscore_requires_threshold() {
        let ds = column(&[1.0, 2.0, 3.0]);
        let err = remove_outliers(&ds, &[spec(OutlierMethodKind::Zscore, OutlierAction::Remove)]);
        assert!(matches!(err, Err(CleaningError::MissingThreshold { .. })));
    }

    #[test]
    fn remove_drops_flagged_rows_once() {
        let ds = column(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        let mut iqr = spec(OutlierMethodKind::Iqr, OutlierAction::Remove);
        iqr.column = "x".to_string();
        let mut z = spec(OutlierMethodKind::Zscore, OutlierAction::Remove);
        z.threshold = Some(1.5);
        // Both rules flag row 4; it must be removed exactly once.
        let (out, record) = remove_outliers(&ds, &[iqr, z]).unwrap();
        assert_eq!(out.row_count(), 4);
        assert_eq!(record.details["removed_rows"], json!(1));
    }

    #[test]
    fn cap_clamps_to_method_bounds() {
        let ds = column(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        let (out, _) =
            remove_outliers(&ds, &[spec(OutlierMethodKind::Iqr, OutlierAction::Cap)]).unwrap();
        let xs = out.column("x").unwrap().numeric_values();
        assert_eq!(xs, vec![1.0, 2.0, 3.0, 4.0, 7.0]);
    }

    #[test]
    fn percentile_uses_caller_bounds() {
        let xs: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let ds = column(&xs);
        let mut s = spec(OutlierMethodKind::Percentile, OutlierAction::Remove);
        s.lower_percentile = Some(5.0);
        s.upper_percentile = Some(95.0);
        let (out, _) = remove_outliers(&ds, &[s]).unwrap();
        assert!(out.row_count() < 100);
        let kept = out.column("x").unwrap().numeric_values();
        assert!(kept.iter().all(|&x| (5.95..=95.05).contains(&x)));
    }

    #[test]
    fn transform_rejects_nonpositive_values() {
        let ds = column(&[0.0, 1.0, 2.0]);
        let err = remove_outliers(&ds, &[spec(OutlierMethodKind::Iqr, OutlierAction::Transform)]);
        assert!(matches!(err, Err(CleaningError::DomainError { .. })));
    }

    #[test]
    fn transform_takes_natural_log() {
        let ds = column(&[1.0, std::f64::consts::E]);
        let (out, _) =
            remove_outliers(&ds, &[spec(OutlierMethodKind::Iqr, OutlierAction::Transform)]).unwrap();
        let xs = out.column("x").unwrap().numeric_values();
        assert!((xs[0] - 0.0).abs() < 1e-9);
        assert!((xs[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rule_on_text_column_fails_batch() {
        let ds = Dataset::new(vec![Column::new("t", vec![Value::Text("a".into())])]).unwrap();
        let mut s = spec(OutlierMethodKind::Iqr, OutlierAction::Remove);
        s.column = "t".to_string();
        assert!(matches!(
            remove_outliers(&ds, &[s]),
            Err(CleaningError::IncompatibleMethod { .. })
        ));
    }

    #[test]
    fn detect_reports_zscore_and_iqr_counts() {
        let mut xs: Vec<f64> = (0..30).map(|i| 10.0 + (i % 5) as f64).collect();
        xs.push(1000.0);
        let ds = column(&xs);
        let summary = detect(&ds, &["x".to_string()]).unwrap();
        let s = &summary["x"];
        assert_eq!(s.total_values, 31);
        assert!(s.iqr_outliers >= 1);
        assert!(s.zscore_outliers >= 1);
    }

    #[test]
    fn detect_is_read_only_and_deterministic() {
        let ds = column(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        let a = detect(&ds, &["x".to_string()]).unwrap();
        let b = detect(&ds, &["x".to_string()]).unwrap();
        assert_eq!(a["x"].iqr_outliers, b["x"].iqr_outliers);
        assert_eq!(ds.row_count(), 5);
    }

    #[test]
    fn isolation_forest_remove_is_deterministic() {
        let mut xs: Vec<f64> = (0..50).map(|i| 5.0 + (i % 7) as f64 * 0.1).collect();
        xs.push(900.0);
        let ds = column(&xs);
        let mut s = spec(OutlierMethodKind::IsolationForest, OutlierAction::Remove);
        s.contamination = Some(0.05);
        let (out1, _) = remove_outliers(&ds, &[s.clone()]).unwrap();
        let (out2, _) = remove_outliers(&ds, &[s]).unwrap();
        assert_eq!(out1.row_count(), out2.row_count());
        assert!(!out1
            .column("x")
            .unwrap()
            .numeric_values()
            .contains(&900.0));
    }
}
