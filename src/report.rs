//! Report generation: aggregates the operation log and current statistics
//! into a quality report with heuristic insights, plus the final preview.
//!
//! Everything here is derivable from the current dataset and the log alone;
//! no hidden state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ops::duplicates;
use crate::ops::skewness::SKEW_HIGH;
use crate::session::{OperationRecord, OperationType};
use crate::stats::{estimate_memory, skewness};
use crate::types::{Dataset, Value};

const PREVIEW_ROWS: usize = 10;

/// Quality metrics over the current dataset.
#[derive(Debug, Clone, Serialize)]
pub struct QualityMetrics {
    pub total_rows: usize,
    pub total_columns: usize,
    pub total_cells: usize,
    pub missing_cells: usize,
    /// (total − missing) / total × 100.
    pub completeness_percentage: f64,
    pub duplicate_rows: usize,
    pub memory_usage_bytes: usize,
}

/// Operations grouped for the report timeline.
#[derive(Debug, Clone, Serialize)]
pub struct CleaningSummary {
    pub total_operations: usize,
    pub operations_by_type: BTreeMap<String, usize>,
    /// Every record verbatim, in commit order.
    pub detailed_operations: Vec<OperationRecord>,
}

/// Severity coding for an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    Success,
    Warning,
    Error,
    Info,
}

/// One generated insight with a remediation recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    pub recommendation: String,
}

/// Dataset identification block.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub filename: String,
    pub original_shape: (usize, usize),
    pub current_shape: (usize, usize),
    pub columns: Vec<String>,
}

/// The `generate-report` response.
#[derive(Debug, Clone, Serialize)]
pub struct CleaningReport {
    pub generated_at: DateTime<Utc>,
    pub dataset_summary: DatasetSummary,
    pub cleaning_summary: CleaningSummary,
    pub quality_metrics: QualityMetrics,
    pub insights: Vec<Insight>,
}

/// The `final-preview` response: the first rows plus the quality summary.
#[derive(Debug, Clone, Serialize)]
pub struct FinalPreview {
    pub columns: Vec<String>,
    pub preview_data: Vec<Vec<Value>>,
    pub summary: QualityMetrics,
}

/// Compute the quality metrics for a dataset snapshot.
pub fn quality_metrics(dataset: &Dataset) -> QualityMetrics {
    let (rows, cols) = dataset.shape();
    let total_cells = rows * cols;
    let missing_cells: usize = dataset.columns().iter().map(|c| c.null_count()).sum();
    let completeness_percentage = if total_cells == 0 {
        100.0
    } else {
        (total_cells - missing_cells) as f64 / total_cells as f64 * 100.0
    };
    QualityMetrics {
        total_rows: rows,
        total_columns: cols,
        total_cells,
        missing_cells,
        completeness_percentage,
        duplicate_rows: duplicates::check(dataset).duplicate_count,
        memory_usage_bytes: estimate_memory(dataset),
    }
}

/// Assemble the full report.
pub fn generate(
    dataset: &Dataset,
    log: &[OperationRecord],
    filename: &str,
    original_shape: (usize, usize),
) -> CleaningReport {
    let mut operations_by_type: BTreeMap<String, usize> = BTreeMap::new();
    for record in log {
        *operations_by_type
            .entry(record.op_type.as_str().to_owned())
            .or_insert(0) += 1;
    }
    let metrics = quality_metrics(dataset);
    let insights = build_insights(dataset, log, &metrics);

    CleaningReport {
        generated_at: Utc::now(),
        dataset_summary: DatasetSummary {
            filename: filename.to_owned(),
            original_shape,
            current_shape: dataset.shape(),
            columns: dataset.column_names(),
        },
        cleaning_summary: CleaningSummary {
            total_operations: log.len(),
            operations_by_type,
            detailed_operations: log.to_vec(),
        },
        quality_metrics: metrics,
        insights,
    }
}

/// First rows of the current dataset plus its quality summary.
pub fn final_preview(dataset: &Dataset) -> FinalPreview {
    let preview_data = (0..dataset.row_count().min(PREVIEW_ROWS))
        .map(|r| dataset.row(r))
        .collect();
    FinalPreview {
        columns: dataset.column_names(),
        preview_data,
        summary: quality_metrics(dataset),
    }
}

fn build_insights(
    dataset: &Dataset,
    log: &[OperationRecord],
    metrics: &QualityMetrics,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    let missing_columns: Vec<String> = dataset
        .columns()
        .iter()
        .filter(|c| c.null_count() > 0)
        .map(|c| c.name.clone())
        .collect();
    if missing_columns.is_empty() {
        insights.push(Insight {
            insight_type: InsightType::Success,
            title: "Dataset is complete".to_owned(),
            description: "Every cell has a value; no imputation is pending.".to_owned(),
            recommendation: "The dataset is ready for export or modeling.".to_owned(),
        });
    } else {
        insights.push(Insight {
            insight_type: InsightType::Warning,
            title: "Columns still contain missing values".to_owned(),
            description: format!(
                "{} column(s) still have missing cells: {}.",
                missing_columns.len(),
                missing_columns.join(", ")
            ),
            recommendation: "Run missing-value imputation on the listed columns.".to_owned(),
        });
    }

    let fully_null: Vec<String> = dataset
        .columns()
        .iter()
        .filter(|c| !c.is_empty() && c.null_count() == c.len())
        .map(|c| c.name.clone())
        .collect();
    if !fully_null.is_empty() {
        insights.push(Insight {
            insight_type: InsightType::Error,
            title: "Entirely empty columns".to_owned(),
            description: format!("No values present in: {}.", fully_null.join(", ")),
            recommendation: "Drop these columns; they carry no information.".to_owned(),
        });
    }

    let transformed = transformed_columns(log);
    let skewed_untransformed: Vec<String> = dataset
        .columns()
        .iter()
        .filter(|c| c.dtype.is_numeric() && !transformed.contains(&c.name))
        .filter(|c| {
            skewness(&c.numeric_values())
                .map(|s| s.abs() >= SKEW_HIGH)
                .unwrap_or(false)
        })
        .map(|c| c.name.clone())
        .collect();
    if !skewed_untransformed.is_empty() {
        insights.push(Insight {
            insight_type: InsightType::Warning,
            title: "Highly skewed columns not yet transformed".to_owned(),
            description: format!(
                "|skewness| ≥ {SKEW_HIGH} in: {}.",
                skewed_untransformed.join(", ")
            ),
            recommendation: "Apply a log or power transformation to reduce skew.".to_owned(),
        });
    }

    if metrics.duplicate_rows > 0 {
        insights.push(Insight {
            insight_type: InsightType::Warning,
            title: "Duplicate rows present".to_owned(),
            description: format!("{} duplicate row(s) remain.", metrics.duplicate_rows),
            recommendation: "Run duplicate removal with keep=first.".to_owned(),
        });
    }

    insights.push(Insight {
        insight_type: InsightType::Info,
        title: "Cleaning activity".to_owned(),
        description: format!("{} operation(s) applied this session.", log.len()),
        recommendation: "Review the operations timeline before saving.".to_owned(),
    });

    insights
}

/// Column names already covered by an `apply_transformations` record.
fn transformed_columns(log: &[OperationRecord]) -> Vec<String> {
    log.iter()
        .filter(|r| r.op_type == OperationType::ApplyTransformations)
        .filter_map(|r| r.details.get("transformations"))
        .filter_map(|v| v.as_object())
        .flat_map(|m| m.keys().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::details;
    use crate::types::Column;
    use serde_json::json;

    fn dataset_with_gap() -> Dataset {
        Dataset::new(vec![
            Column::new("a", vec![Value::Int(1), Value::Null, Value::Int(1)]),
            Column::new(
                "b",
                vec![Value::Text("x".into()), Value::Text("y".into()), Value::Text("x".into())],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn completeness_percentage_counts_cells() {
        let m = quality_metrics(&dataset_with_gap());
        assert_eq!(m.total_cells, 6);
        assert_eq!(m.missing_cells, 1);
        assert!((m.completeness_percentage - 5.0 / 6.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn report_groups_operations_by_type() {
        let ds = dataset_with_gap();
        let log = vec![
            OperationRecord::new(OperationType::ImputeMissing, "a", details(vec![])),
            OperationRecord::new(OperationType::ImputeMissing, "b", details(vec![])),
            OperationRecord::new(OperationType::DropColumns, "c", details(vec![])),
        ];
        let report = generate(&ds, &log, "data.csv", (5, 3));
        assert_eq!(report.cleaning_summary.total_operations, 3);
        assert_eq!(report.cleaning_summary.operations_by_type["impute_missing"], 2);
        assert_eq!(report.cleaning_summary.operations_by_type["drop_columns"], 1);
        assert_eq!(report.dataset_summary.original_shape, (5, 3));
        assert_eq!(report.dataset_summary.current_shape, (3, 2));
    }

    #[test]
    fn missing_data_produces_warning_insight() {
        let ds = dataset_with_gap();
        let report = generate(&ds, &[], "data.csv", ds.shape());
        assert!(report
            .insights
            .iter()
            .any(|i| i.insight_type == InsightType::Warning && i.title.contains("missing")));
    }

    #[test]
    fn complete_dataset_produces_success_insight() {
        let ds = Dataset::new(vec![Column::new("a", vec![Value::Int(1), Value::Int(2)])]).unwrap();
        let report = generate(&ds, &[], "data.csv", ds.shape());
        assert!(report
            .insights
            .iter()
            .any(|i| i.insight_type == InsightType::Success));
    }

    #[test]
    fn transformed_columns_suppress_skew_warning() {
        let mut xs: Vec<Value> = vec![Value::Float(1.0); 30];
        xs.extend([Value::Float(500.0), Value::Float(900.0)]);
        let ds = Dataset::new(vec![Column::new("x", xs)]).unwrap();

        let untreated = generate(&ds, &[], "d.csv", ds.shape());
        assert!(untreated.insights.iter().any(|i| i.title.contains("skewed")));

        let log = vec![OperationRecord::new(
            OperationType::ApplyTransformations,
            "log x",
            details(vec![("transformations", json!({"x": "log"}))]),
        )];
        let treated = generate(&ds, &log, "d.csv", ds.shape());
        assert!(!treated.insights.iter().any(|i| i.title.contains("skewed")));
    }

    #[test]
    fn final_preview_caps_rows() {
        let values: Vec<Value> = (0..50i64).map(Value::Int).collect();
        let ds = Dataset::new(vec![Column::new("a", values)]).unwrap();
        let preview = final_preview(&ds);
        assert_eq!(preview.preview_data.len(), 10);
        assert_eq!(preview.columns, vec!["a"]);
        assert_eq!(preview.summary.total_rows, 50);
    }
}
