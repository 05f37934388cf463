//! Data-integrity validation: pattern detectors that flag values deviating
//! from a column's dominant pattern, plus replace/remove remediation.
//!
//! Detectors run independently per column against current values. Issues are
//! derived, never persisted; each validation request recomputes them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CleaningError, CleaningResult};
use crate::session::{details, OperationRecord, OperationType};
use crate::types::{detect_datetime_format, Column, DataType, Dataset, Value};

/// Fraction of non-null values above which an anomaly is high severity.
const SEVERITY_HIGH_RATIO: f64 = 0.10;
/// Fraction above which it is medium severity.
const SEVERITY_MEDIUM_RATIO: f64 = 0.02;
/// Rare-category cutoff for `categorical_outlier`.
const RARE_CATEGORY_RATIO: f64 = 0.05;
/// Dominant categories must cover at least this much for rare ones to flag.
const DOMINANT_COVERAGE: f64 = 0.80;

/// Known binary literal pairs.
const BINARY_PAIRS: &[(&str, &str)] = &[
    ("yes", "no"),
    ("true", "false"),
    ("y", "n"),
    ("t", "f"),
    ("0", "1"),
];

/// Issue severity, assigned by the relative frequency of the anomalous
/// pattern among the column's non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

fn severity_for(affected: usize, non_null: usize) -> Severity {
    let ratio = affected as f64 / non_null.max(1) as f64;
    if ratio > SEVERITY_HIGH_RATIO {
        Severity::High
    } else if ratio > SEVERITY_MEDIUM_RATIO {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Detector kinds, with their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuePattern {
    Binary,
    CategoricalOutlier,
    NumericInText,
    TextInNumeric,
    DateFormat,
    CaseInconsistency,
    WhitespaceIssues,
    SpecialCharacters,
    EncodingIssues,
}

/// One distinct problematic value and its occurrence count.
#[derive(Debug, Clone, Serialize)]
pub struct ProblematicValue {
    pub value: String,
    pub count: usize,
}

/// A detected deviation from a column's dominant value pattern.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub column: String,
    pub pattern: IssuePattern,
    pub severity: Severity,
    pub expected_pattern: String,
    pub problematic_values: Vec<ProblematicValue>,
    pub total_affected_rows: usize,
    pub suggestions: Vec<String>,
}

/// The `analyze-data-integrity` response.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub total_columns: usize,
    pub columns_with_issues: usize,
    pub total_issues: usize,
    pub issues: Vec<Issue>,
}

/// Run every detector over every column.
pub fn analyze(dataset: &Dataset) -> IntegrityReport {
    let mut issues = Vec::new();
    for col in dataset.columns() {
        issues.extend(column_issues(col));
    }
    let mut columns_seen: Vec<&str> = issues.iter().map(|i| i.column.as_str()).collect();
    columns_seen.dedup();
    IntegrityReport {
        total_columns: dataset.column_count(),
        columns_with_issues: columns_seen.len(),
        total_issues: issues.len(),
        issues,
    }
}

fn column_issues(col: &Column) -> Vec<Issue> {
    let texts: Vec<&str> = col.values().iter().filter_map(Value::as_text).collect();
    let non_null = col.len() - col.null_count();
    let mut issues = Vec::new();

    if let Some(issue) = detect_binary(col, &texts, non_null) {
        issues.push(issue);
    }
    if let Some(issue) = detect_categorical_outlier(col, &texts, non_null) {
        issues.push(issue);
    }
    if let Some(issue) = detect_type_mixture(col, &texts, non_null) {
        issues.push(issue);
    }
    if let Some(issue) = detect_date_format(col, &texts, non_null) {
        issues.push(issue);
    }
    if let Some(issue) = detect_case_inconsistency(col, &texts, non_null) {
        issues.push(issue);
    }
    if let Some(issue) = detect_whitespace(col, &texts, non_null) {
        issues.push(issue);
    }
    if let Some(issue) = detect_special_characters(col, &texts, non_null) {
        issues.push(issue);
    }
    if let Some(issue) = detect_encoding_artifacts(col, &texts, non_null) {
        issues.push(issue);
    }
    issues
}

fn counted(values: Vec<&str>) -> Vec<ProblematicValue> {
    let mut out: Vec<ProblematicValue> = Vec::new();
    for v in values {
        match out.iter_mut().find(|p| p.value == v) {
            Some(p) => p.count += 1,
            None => out.push(ProblematicValue { value: v.to_owned(), count: 1 }),
        }
    }
    out
}

fn issue_from(
    col: &Column,
    pattern: IssuePattern,
    expected: String,
    problematic: Vec<ProblematicValue>,
    non_null: usize,
    suggestions: Vec<String>,
) -> Option<Issue> {
    if problematic.is_empty() {
        return None;
    }
    let total_affected_rows: usize = problematic.iter().map(|p| p.count).sum();
    Some(Issue {
        column: col.name.clone(),
        pattern,
        severity: severity_for(total_affected_rows, non_null),
        expected_pattern: expected,
        problematic_values: problematic,
        total_affected_rows,
        suggestions,
    })
}

/// Binary-expected columns containing values outside the detected pair.
fn detect_binary(col: &Column, texts: &[&str], non_null: usize) -> Option<Issue> {
    if texts.len() < 4 {
        return None;
    }
    let lower: Vec<String> = texts.iter().map(|s| s.to_lowercase()).collect();
    for (a, b) in BINARY_PAIRS {
        let pair_count = lower.iter().filter(|s| s.as_str() == *a || s.as_str() == *b).count();
        if pair_count == 0 || (pair_count as f64) < lower.len() as f64 * DOMINANT_COVERAGE {
            continue;
        }
        if pair_count == lower.len() {
            return None;
        }
        let offenders: Vec<&str> = texts
            .iter()
            .zip(lower.iter())
            .filter(|(_, l)| l.as_str() != *a && l.as_str() != *b)
            .map(|(t, _)| *t)
            .collect();
        return issue_from(
            col,
            IssuePattern::Binary,
            format!("{a}/{b}"),
            counted(offenders),
            non_null,
            vec![
                format!("Replace stray values with '{a}' or '{b}'"),
                "Remove rows that do not fit the binary pair".to_owned(),
            ],
        );
    }
    None
}

/// Low-frequency categories inconsistent with the dominant set.
fn detect_categorical_outlier(col: &Column, texts: &[&str], non_null: usize) -> Option<Issue> {
    if col.dtype != DataType::Categorical || texts.len() < 8 {
        return None;
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for t in texts {
        *counts.entry(t).or_insert(0) += 1;
    }
    let total = texts.len() as f64;
    let rare_cutoff = (total * RARE_CATEGORY_RATIO).ceil() as usize;
    let dominant_total: usize =
        counts.values().filter(|&&n| n > rare_cutoff).sum();
    if (dominant_total as f64) < total * DOMINANT_COVERAGE {
        return None;
    }
    let dominant: Vec<&str> = counts
        .iter()
        .filter(|(_, &n)| n > rare_cutoff)
        .map(|(k, _)| *k)
        .collect();
    let rare: Vec<&str> = counts
        .iter()
        .filter(|(_, &n)| n <= rare_cutoff)
        .map(|(k, _)| *k)
        .collect();
    if rare.is_empty() {
        return None;
    }
    let offenders: Vec<&str> = texts.iter().filter(|t| rare.contains(t)).copied().collect();
    issue_from(
        col,
        IssuePattern::CategoricalOutlier,
        format!("one of: {}", dominant.join(", ")),
        counted(offenders),
        non_null,
        vec![
            "Map rare categories onto one of the dominant values".to_owned(),
            "Remove rows with unexpected categories".to_owned(),
        ],
    )
}

/// Numeric tokens inside a text column, or text inside a numeric-looking one.
fn detect_type_mixture(col: &Column, texts: &[&str], non_null: usize) -> Option<Issue> {
    if !matches!(col.dtype, DataType::Text | DataType::Categorical) || texts.len() < 4 {
        return None;
    }
    let numeric_count = texts.iter().filter(|s| s.trim().parse::<f64>().is_ok()).count();
    let ratio = numeric_count as f64 / texts.len() as f64;
    if numeric_count > 0 && ratio < 0.5 {
        let offenders: Vec<&str> = texts
            .iter()
            .filter(|s| s.trim().parse::<f64>().is_ok())
            .copied()
            .collect();
        return issue_from(
            col,
            IssuePattern::NumericInText,
            "textual values".to_owned(),
            counted(offenders),
            non_null,
            vec!["Replace numeric tokens with their textual equivalent".to_owned()],
        );
    }
    if ratio >= 0.5 && numeric_count < texts.len() {
        let offenders: Vec<&str> = texts
            .iter()
            .filter(|s| s.trim().parse::<f64>().is_err())
            .copied()
            .collect();
        return issue_from(
            col,
            IssuePattern::TextInNumeric,
            "numeric values".to_owned(),
            counted(offenders),
            non_null,
            vec![
                "Replace text tokens with a numeric value".to_owned(),
                "Remove rows with non-numeric entries".to_owned(),
            ],
        );
    }
    None
}

/// Inconsistent date formats within a datetime-classified column.
fn detect_date_format(col: &Column, texts: &[&str], non_null: usize) -> Option<Issue> {
    if col.dtype != DataType::Datetime || texts.is_empty() {
        return None;
    }
    let mut format_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for t in texts {
        if let Some(fmt) = detect_datetime_format(t) {
            *format_counts.entry(fmt).or_insert(0) += 1;
        }
    }
    if format_counts.len() <= 1 {
        return None;
    }
    let majority = *format_counts.iter().max_by_key(|(_, &n)| n).map(|(k, _)| k)?;
    let offenders: Vec<&str> = texts
        .iter()
        .filter(|t| detect_datetime_format(t) != Some(majority))
        .copied()
        .collect();
    issue_from(
        col,
        IssuePattern::DateFormat,
        majority.to_owned(),
        counted(offenders),
        non_null,
        vec![format!("Rewrite dates using the dominant format '{majority}'")],
    )
}

/// Values whose casing differs from the dominant casing of the same word.
fn detect_case_inconsistency(col: &Column, texts: &[&str], non_null: usize) -> Option<Issue> {
    if !matches!(col.dtype, DataType::Text | DataType::Categorical) {
        return None;
    }
    // casing groups keyed by lowercase form, counting each exact spelling
    let mut groups: BTreeMap<String, Vec<(String, usize)>> = BTreeMap::new();
    for t in texts {
        let key = t.to_lowercase();
        let variants = groups.entry(key).or_default();
        match variants.iter_mut().find(|(v, _)| v == t) {
            Some((_, n)) => *n += 1,
            None => variants.push((t.to_string(), 1)),
        }
    }
    let mut offenders: Vec<&str> = Vec::new();
    let mut expected: Vec<String> = Vec::new();
    for variants in groups.values() {
        if variants.len() < 2 {
            continue;
        }
        // dominant casing, ties broken by first occurrence
        let mut dominant = &variants[0];
        for v in &variants[1..] {
            if v.1 > dominant.1 {
                dominant = v;
            }
        }
        let dominant = dominant.0.clone();
        expected.push(dominant.clone());
        for t in texts {
            if t.to_lowercase() == dominant.to_lowercase() && *t != dominant {
                offenders.push(*t);
            }
        }
    }
    issue_from(
        col,
        IssuePattern::CaseInconsistency,
        format!("consistent casing (e.g. {})", expected.join(", ")),
        counted(offenders),
        non_null,
        vec!["Replace variant spellings with the dominant casing".to_owned()],
    )
}

/// Leading/trailing whitespace or internal runs of two or more spaces.
fn detect_whitespace(col: &Column, texts: &[&str], non_null: usize) -> Option<Issue> {
    let offenders: Vec<&str> = texts
        .iter()
        .filter(|s| s.trim() != **s || s.contains("  "))
        .copied()
        .collect();
    issue_from(
        col,
        IssuePattern::WhitespaceIssues,
        "no surrounding or repeated whitespace".to_owned(),
        counted(offenders),
        non_null,
        vec!["Trim and collapse whitespace via value standardization".to_owned()],
    )
}

/// Characters outside the column's usual alphanumeric/punctuation set.
fn detect_special_characters(col: &Column, texts: &[&str], non_null: usize) -> Option<Issue> {
    if !matches!(col.dtype, DataType::Text | DataType::Categorical) {
        return None;
    }
    let is_expected = |c: char| {
        c.is_alphanumeric() || c.is_whitespace() || matches!(c, '.' | ',' | '-' | '_' | '\'' | '/' | '@' | ':' | '(' | ')')
    };
    let offenders: Vec<&str> = texts
        .iter()
        .filter(|s| s.chars().any(|c| !is_expected(c)))
        .copied()
        .collect();
    if offenders.len() == texts.len() {
        // every value carries the character; treat it as the column's pattern
        return None;
    }
    issue_from(
        col,
        IssuePattern::SpecialCharacters,
        "alphanumeric text".to_owned(),
        counted(offenders),
        non_null,
        vec!["Strip unexpected special characters".to_owned()],
    )
}

/// Mojibake-style byte-sequence artifacts.
fn detect_encoding_artifacts(col: &Column, texts: &[&str], non_null: usize) -> Option<Issue> {
    const MARKERS: &[&str] = &["Ã", "â€", "Â", "\u{FFFD}"];
    let offenders: Vec<&str> = texts
        .iter()
        .filter(|s| MARKERS.iter().any(|m| s.contains(m)))
        .copied()
        .collect();
    issue_from(
        col,
        IssuePattern::EncodingIssues,
        "clean UTF-8 text".to_owned(),
        counted(offenders),
        non_null,
        vec!["Re-import the source with the correct character encoding".to_owned()],
    )
}

/// Remediation action for one column's problematic values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityAction {
    /// Substitute every problematic value with a caller-given literal.
    Replace,
    /// Drop every row containing any problematic value for the column.
    Remove,
}

/// Apply a fix for one column: collect the column's problematic values from a
/// fresh detection pass, then replace or remove them atomically.
pub fn fix(
    dataset: &Dataset,
    column: &str,
    action: IntegrityAction,
    replacement_value: Option<&str>,
) -> CleaningResult<(Dataset, OperationRecord)> {
    let col = dataset.require(column)?;
    if action == IntegrityAction::Replace && replacement_value.is_none() {
        return Err(CleaningError::MissingReplacementValue);
    }

    let problematic: std::collections::HashSet<String> = column_issues(col)
        .into_iter()
        .flat_map(|i| i.problematic_values)
        .map(|p| p.value)
        .collect();

    let (out, affected) = match action {
        IntegrityAction::Replace => {
            let replacement = replacement_value.unwrap_or_default();
            let mut affected = 0usize;
            let values: Vec<Value> = col
                .values()
                .iter()
                .map(|v| match v.as_text() {
                    Some(s) if problematic.contains(s) => {
                        affected += 1;
                        Value::Text(replacement.to_owned())
                    }
                    _ => v.clone(),
                })
                .collect();
            (
                dataset.with_column_replaced(column, Column::new(column.to_owned(), values))?,
                affected,
            )
        }
        IntegrityAction::Remove => {
            let keep: Vec<bool> = col
                .values()
                .iter()
                .map(|v| !v.as_text().map(|s| problematic.contains(s)).unwrap_or(false))
                .collect();
            let affected = keep.iter().filter(|&&k| !k).count();
            (dataset.retain_rows(&keep)?, affected)
        }
    };

    let record = OperationRecord::new(
        OperationType::FixDataIntegrity,
        format!(
            "{} {affected} problematic value(s) in '{column}'",
            match action {
                IntegrityAction::Replace => "Replaced",
                IntegrityAction::Remove => "Removed rows for",
            }
        ),
        details(vec![
            ("column", json!(column)),
            ("action", json!(action)),
            ("affected", json!(affected)),
            ("replacement_value", json!(replacement_value)),
        ]),
    );
    Ok((out, record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_column(name: &str, dtype: DataType, values: &[&str]) -> Column {
        Column::with_dtype(
            name,
            dtype,
            values.iter().map(|s| Value::Text(s.to_string())).collect(),
        )
    }

    #[test]
    fn binary_detector_flags_stray_values() {
        let col = text_column(
            "active",
            DataType::Categorical,
            &["yes", "no", "yes", "yes", "no", "maybe"],
        );
        let issues = column_issues(&col);
        let binary = issues.iter().find(|i| i.pattern == IssuePattern::Binary).unwrap();
        assert_eq!(binary.problematic_values.len(), 1);
        assert_eq!(binary.problematic_values[0].value, "maybe");
        assert_eq!(binary.expected_pattern, "yes/no");
    }

    #[test]
    fn case_inconsistency_flags_minority_casing() {
        let col = text_column("city", DataType::Categorical, &["NY", "LA", "ny"]);
        let issues = column_issues(&col);
        let case = issues
            .iter()
            .find(|i| i.pattern == IssuePattern::CaseInconsistency)
            .unwrap();
        assert_eq!(case.total_affected_rows, 1);
        assert_eq!(case.problematic_values[0].value, "ny");
    }

    #[test]
    fn date_format_detector_needs_two_formats() {
        let uniform = text_column(
            "day",
            DataType::Datetime,
            &["2024-01-01", "2024-01-02", "2024-01-03"],
        );
        assert!(column_issues(&uniform)
            .iter()
            .all(|i| i.pattern != IssuePattern::DateFormat));

        let mixed = text_column(
            "day",
            DataType::Datetime,
            &["2024-01-01", "2024-01-02", "01/15/2024"],
        );
        let issues = column_issues(&mixed);
        let fmt = issues.iter().find(|i| i.pattern == IssuePattern::DateFormat).unwrap();
        assert_eq!(fmt.expected_pattern, "%Y-%m-%d");
        assert_eq!(fmt.total_affected_rows, 1);
    }

    #[test]
    fn whitespace_and_encoding_detectors() {
        let col = text_column(
            "name",
            DataType::Text,
            &["ada lovelace note", " grace  hopper story", "katherine Ã© johnson tale", "alan turing memo"],
        );
        let issues = column_issues(&col);
        assert!(issues.iter().any(|i| i.pattern == IssuePattern::WhitespaceIssues));
        assert!(issues.iter().any(|i| i.pattern == IssuePattern::EncodingIssues));
    }

    #[test]
    fn severity_scales_with_affected_fraction() {
        assert_eq!(severity_for(1, 100), Severity::Low);
        assert_eq!(severity_for(5, 100), Severity::Medium);
        assert_eq!(severity_for(30, 100), Severity::High);
    }

    #[test]
    fn replace_requires_replacement_value() {
        let ds = Dataset::new(vec![text_column("city", DataType::Categorical, &["NY", "ny"])])
            .unwrap();
        assert!(matches!(
            fix(&ds, "city", IntegrityAction::Replace, None),
            Err(CleaningError::MissingReplacementValue)
        ));
    }

    #[test]
    fn replace_substitutes_problematic_values() {
        let ds = Dataset::new(vec![text_column(
            "city",
            DataType::Categorical,
            &["NY", "LA", "ny"],
        )])
        .unwrap();
        let (out, record) = fix(&ds, "city", IntegrityAction::Replace, Some("NY")).unwrap();
        let vals: Vec<String> = out
            .column("city")
            .unwrap()
            .values()
            .iter()
            .map(Value::to_field)
            .collect();
        assert_eq!(vals, vec!["NY", "LA", "NY"]);
        assert_eq!(record.details["affected"], json!(1));
    }

    #[test]
    fn remove_drops_rows_with_problematic_values() {
        let ds = Dataset::new(vec![
            text_column("city", DataType::Categorical, &["NY", "LA", "ny"]),
            Column::new("id", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        ])
        .unwrap();
        let (out, _) = fix(&ds, "city", IntegrityAction::Remove, None).unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(
            out.column("id").unwrap().values().to_vec(),
            vec![Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn analyze_aggregates_counts() {
        let ds = Dataset::new(vec![
            text_column("city", DataType::Categorical, &["NY", "LA", "ny"]),
            Column::new("id", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        ])
        .unwrap();
        let report = analyze(&ds);
        assert_eq!(report.total_columns, 2);
        assert_eq!(report.columns_with_issues, 1);
        assert!(report.total_issues >= 1);
    }
}
