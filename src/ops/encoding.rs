//! Column encoding: classification of encodable columns and application of
//! categorical/text/datetime encodings, which may change the column set.

use std::collections::{BTreeMap, HashSet};

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CleaningError, CleaningResult};
use crate::session::{details, OperationRecord, OperationType};
use crate::types::{
    detect_datetime_format, parse_datetime, Column, DataType, Dataset, Value,
};

const DEFAULT_MAX_FEATURES: usize = 10;
const DEFAULT_HASH_BUCKETS: usize = 8;
const SAMPLE_LIMIT: usize = 5;

/// Encoding-purpose classification (distinct from the dtype tag: numeric
/// columns are excluded from encoding entirely).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncodingClass {
    Categorical,
    Text,
    Datetime,
}

fn classify(col: &Column) -> Option<EncodingClass> {
    match col.dtype {
        DataType::Categorical | DataType::Boolean => Some(EncodingClass::Categorical),
        DataType::Text => Some(EncodingClass::Text),
        DataType::Datetime => Some(EncodingClass::Datetime),
        DataType::Integer | DataType::Float => None,
    }
}

/// A categorical encoding candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CategoricalColumnInfo {
    pub column: String,
    pub unique_count: usize,
    pub most_frequent: String,
    /// Occurrence count of `most_frequent`.
    pub frequency: usize,
    pub sample_values: Vec<String>,
}

/// A free-text encoding candidate.
#[derive(Debug, Clone, Serialize)]
pub struct TextColumnInfo {
    pub column: String,
    pub avg_length: f64,
    pub max_length: usize,
    pub sample_values: Vec<String>,
}

/// A datetime encoding candidate.
#[derive(Debug, Clone, Serialize)]
pub struct DatetimeColumnInfo {
    pub column: String,
    /// Detected format string of the first parseable value.
    pub format: String,
    /// "earliest .. latest" over parseable values.
    pub date_range: String,
}

/// The `analyze-encoding` response.
#[derive(Debug, Clone, Serialize)]
pub struct EncodingReport {
    pub categorical_columns: Vec<CategoricalColumnInfo>,
    pub text_columns: Vec<TextColumnInfo>,
    pub datetime_columns: Vec<DatetimeColumnInfo>,
}

/// Classify every column and describe the encoding candidates.
pub fn analyze(dataset: &Dataset) -> EncodingReport {
    let mut report = EncodingReport {
        categorical_columns: Vec::new(),
        text_columns: Vec::new(),
        datetime_columns: Vec::new(),
    };
    for col in dataset.columns() {
        match classify(col) {
            Some(EncodingClass::Categorical) => {
                let mut counts: Vec<(String, usize)> = Vec::new();
                for v in col.values().iter().filter(|v| !v.is_null()) {
                    let key = v.to_field();
                    match counts.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, n)) => *n += 1,
                        None => counts.push((key, 1)),
                    }
                }
                let (most_frequent, frequency) = counts
                    .iter()
                    .max_by_key(|(_, n)| *n)
                    .map(|(k, n)| (k.clone(), *n))
                    .unwrap_or_default();
                report.categorical_columns.push(CategoricalColumnInfo {
                    column: col.name.clone(),
                    unique_count: counts.len(),
                    most_frequent,
                    frequency,
                    sample_values: counts.iter().take(SAMPLE_LIMIT).map(|(k, _)| k.clone()).collect(),
                });
            }
            Some(EncodingClass::Text) => {
                let texts: Vec<&str> =
                    col.values().iter().filter_map(Value::as_text).collect();
                let total_len: usize = texts.iter().map(|s| s.chars().count()).sum();
                report.text_columns.push(TextColumnInfo {
                    column: col.name.clone(),
                    avg_length: total_len as f64 / texts.len().max(1) as f64,
                    max_length: texts.iter().map(|s| s.chars().count()).max().unwrap_or(0),
                    sample_values: texts.iter().take(SAMPLE_LIMIT).map(|s| s.to_string()).collect(),
                });
            }
            Some(EncodingClass::Datetime) => {
                let texts: Vec<&str> =
                    col.values().iter().filter_map(Value::as_text).collect();
                let format = texts
                    .first()
                    .and_then(|s| detect_datetime_format(s))
                    .unwrap_or("")
                    .to_owned();
                let mut parsed: Vec<chrono::NaiveDateTime> = texts
                    .iter()
                    .filter_map(|s| detect_datetime_format(s).and_then(|f| parse_datetime(s, f)))
                    .collect();
                parsed.sort();
                let date_range = match (parsed.first(), parsed.last()) {
                    (Some(a), Some(b)) => format!("{} .. {}", a.date(), b.date()),
                    _ => String::new(),
                };
                report.datetime_columns.push(DatetimeColumnInfo {
                    column: col.name.clone(),
                    format,
                    date_range,
                });
            }
            None => {}
        }
    }
    report
}

/// Wire-level encoding method tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMethodKind {
    Label,
    Onehot,
    Ordinal,
    Binary,
    Target,
    Tfidf,
    Count,
    Hash,
    DatetimeFeatures,
    UnixTimestamp,
    OrdinalDate,
}

impl EncodingMethodKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Onehot => "onehot",
            Self::Ordinal => "ordinal",
            Self::Binary => "binary",
            Self::Target => "target",
            Self::Tfidf => "tfidf",
            Self::Count => "count",
            Self::Hash => "hash",
            Self::DatetimeFeatures => "datetime_features",
            Self::UnixTimestamp => "unix_timestamp",
            Self::OrdinalDate => "ordinal_date",
        }
    }
}

/// One caller-supplied encoding operation, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingOperation {
    pub column: String,
    pub method: EncodingMethodKind,
    /// Category order for `ordinal`.
    #[serde(default)]
    pub order: Option<Vec<String>>,
    /// Numeric target column for `target`.
    #[serde(default)]
    pub target_column: Option<String>,
    /// Vocabulary size for `tfidf`/`count`.
    #[serde(default)]
    pub max_features: Option<usize>,
    /// Bucket count for `hash`.
    #[serde(default)]
    pub n_buckets: Option<usize>,
}

/// Validated, closed form of an encoding operation.
enum EncodingMethod {
    Label,
    OneHot,
    Ordinal(Vec<String>),
    Binary,
    Target(String),
    TfIdf(usize),
    Count(usize),
    Hash(usize),
    DatetimeFeatures,
    UnixTimestamp,
    OrdinalDate,
}

fn validate_operation(
    dataset: &Dataset,
    op: &EncodingOperation,
) -> CleaningResult<EncodingMethod> {
    let col = dataset.require(&op.column).map_err(|_| CleaningError::InvalidOperation {
        message: format!("unknown column '{}'", op.column),
    })?;
    let class = classify(col).ok_or_else(|| CleaningError::InvalidOperation {
        message: format!("column '{}' is numeric and not an encoding candidate", op.column),
    })?;

    let mismatch = || CleaningError::InvalidOperation {
        message: format!(
            "method '{}' is not available for column '{}'",
            op.method.as_str(),
            op.column
        ),
    };

    match op.method {
        EncodingMethodKind::Label
        | EncodingMethodKind::Onehot
        | EncodingMethodKind::Ordinal
        | EncodingMethodKind::Binary
        | EncodingMethodKind::Target
            if class != EncodingClass::Categorical =>
        {
            return Err(mismatch());
        }
        EncodingMethodKind::Tfidf | EncodingMethodKind::Count | EncodingMethodKind::Hash
            if class != EncodingClass::Text =>
        {
            return Err(mismatch());
        }
        EncodingMethodKind::DatetimeFeatures
        | EncodingMethodKind::UnixTimestamp
        | EncodingMethodKind::OrdinalDate
            if class != EncodingClass::Datetime =>
        {
            return Err(mismatch());
        }
        _ => {}
    }

    match op.method {
        EncodingMethodKind::Label => Ok(EncodingMethod::Label),
        EncodingMethodKind::Onehot => Ok(EncodingMethod::OneHot),
        EncodingMethodKind::Ordinal => {
            let order = op.order.clone().ok_or_else(|| CleaningError::InvalidOperation {
                message: format!("ordinal encoding of '{}' needs a category order", op.column),
            })?;
            let allowed: HashSet<&str> = order.iter().map(String::as_str).collect();
            for v in col.values().iter().filter(|v| !v.is_null()) {
                let key = v.to_field();
                if !allowed.contains(key.as_str()) {
                    return Err(CleaningError::InvalidOperation {
                        message: format!(
                            "value '{key}' in column '{}' is missing from the ordinal order",
                            op.column
                        ),
                    });
                }
            }
            Ok(EncodingMethod::Ordinal(order))
        }
        EncodingMethodKind::Binary => Ok(EncodingMethod::Binary),
        EncodingMethodKind::Target => {
            let target = op
                .target_column
                .clone()
                .ok_or(CleaningError::MissingTargetColumn)?;
            let target_col = dataset.require(&target)?;
            if !target_col.dtype.is_numeric() {
                return Err(CleaningError::IncompatibleMethod {
                    method: "target".to_owned(),
                    column: target,
                    dtype: target_col.dtype.as_str().to_owned(),
                });
            }
            Ok(EncodingMethod::Target(target))
        }
        EncodingMethodKind::Tfidf => {
            Ok(EncodingMethod::TfIdf(op.max_features.unwrap_or(DEFAULT_MAX_FEATURES)))
        }
        EncodingMethodKind::Count => {
            Ok(EncodingMethod::Count(op.max_features.unwrap_or(DEFAULT_MAX_FEATURES)))
        }
        EncodingMethodKind::Hash => {
            Ok(EncodingMethod::Hash(op.n_buckets.unwrap_or(DEFAULT_HASH_BUCKETS)))
        }
        EncodingMethodKind::DatetimeFeatures => Ok(EncodingMethod::DatetimeFeatures),
        EncodingMethodKind::UnixTimestamp => Ok(EncodingMethod::UnixTimestamp),
        EncodingMethodKind::OrdinalDate => Ok(EncodingMethod::OrdinalDate),
    }
}

/// Apply a batch of encoding operations atomically. Operations must target
/// distinct columns; any invalid entry fails the whole batch.
pub fn apply_encoding(
    dataset: &Dataset,
    operations: &[EncodingOperation],
) -> CleaningResult<(Dataset, OperationRecord)> {
    if operations.is_empty() {
        return Err(CleaningError::EmptySelection {
            message: "no encoding operations supplied".to_owned(),
        });
    }
    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(operations.len());
    for op in operations {
        if !seen.insert(op.column.as_str()) {
            return Err(CleaningError::InvalidOperation {
                message: format!("column '{}' appears in more than one operation", op.column),
            });
        }
        validated.push(validate_operation(dataset, op)?);
    }

    let mut out = dataset.clone();
    for (op, method) in operations.iter().zip(validated.iter()) {
        out = apply_one(&out, dataset, &op.column, method)?;
    }

    let summary: BTreeMap<&str, &'static str> = operations
        .iter()
        .map(|op| (op.column.as_str(), op.method.as_str()))
        .collect();
    let record = OperationRecord::new(
        OperationType::ApplyEncoding,
        format!("Applied {} encoding operation(s)", operations.len()),
        details(vec![
            ("operations", json!(summary)),
            ("resulting_columns", json!(out.column_count())),
        ]),
    );
    Ok((out, record))
}

fn apply_one(
    current: &Dataset,
    original: &Dataset,
    column: &str,
    method: &EncodingMethod,
) -> CleaningResult<Dataset> {
    let col = current.require(column)?.clone();
    match method {
        EncodingMethod::Label => {
            let mapping = first_seen_categories(&col);
            let values = col
                .values()
                .iter()
                .map(|v| {
                    if v.is_null() {
                        Value::Null
                    } else {
                        Value::Int(mapping.iter().position(|c| *c == v.to_field()).unwrap_or(0) as i64)
                    }
                })
                .collect();
            current.with_column_replaced(
                column,
                Column::with_dtype(column.to_owned(), DataType::Integer, values),
            )
        }
        EncodingMethod::Ordinal(order) => {
            let values = col
                .values()
                .iter()
                .map(|v| {
                    if v.is_null() {
                        Value::Null
                    } else {
                        // Membership validated up front.
                        Value::Int(
                            order.iter().position(|c| *c == v.to_field()).unwrap_or(0) as i64
                        )
                    }
                })
                .collect();
            current.with_column_replaced(
                column,
                Column::with_dtype(column.to_owned(), DataType::Integer, values),
            )
        }
        EncodingMethod::OneHot => {
            let categories = first_seen_categories(&col);
            let replacements = categories
                .iter()
                .map(|cat| {
                    let values = col
                        .values()
                        .iter()
                        .map(|v| Value::Bool(!v.is_null() && v.to_field() == *cat))
                        .collect();
                    Column::with_dtype(
                        format!("{column}_{cat}"),
                        DataType::Boolean,
                        values,
                    )
                })
                .collect();
            current.with_column_expanded(column, replacements)
        }
        EncodingMethod::Binary => {
            let categories = first_seen_categories(&col);
            let width = bits_needed(categories.len());
            let replacements = (0..width)
                .map(|bit| {
                    let values = col
                        .values()
                        .iter()
                        .map(|v| {
                            if v.is_null() {
                                Value::Null
                            } else {
                                let code = categories
                                    .iter()
                                    .position(|c| *c == v.to_field())
                                    .unwrap_or(0);
                                Value::Int(((code >> bit) & 1) as i64)
                            }
                        })
                        .collect();
                    Column::with_dtype(format!("{column}_bin{bit}"), DataType::Integer, values)
                })
                .collect();
            current.with_column_expanded(column, replacements)
        }
        EncodingMethod::Target(target) => {
            // Group means come from the pre-batch snapshot so operation order
            // within a batch cannot change them.
            let target_col = original.require(target)?;
            let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
            let cat_col = original.require(column)?;
            for (cat, val) in cat_col.values().iter().zip(target_col.values()) {
                if let (false, Some(x)) = (cat.is_null(), val.as_f64()) {
                    let entry = sums.entry(cat.to_field()).or_insert((0.0, 0));
                    entry.0 += x;
                    entry.1 += 1;
                }
            }
            let values = col
                .values()
                .iter()
                .map(|v| {
                    if v.is_null() {
                        Value::Null
                    } else {
                        match sums.get(&v.to_field()) {
                            Some((sum, n)) if *n > 0 => Value::Float(sum / *n as f64),
                            _ => Value::Null,
                        }
                    }
                })
                .collect();
            current.with_column_replaced(
                column,
                Column::with_dtype(column.to_owned(), DataType::Float, values),
            )
        }
        EncodingMethod::TfIdf(max_features) => {
            let docs = tokenized_documents(&col);
            let vocab = build_vocabulary(&docs, *max_features);
            let n_docs = docs.iter().filter(|d| d.is_some()).count().max(1);
            let replacements = vocab
                .iter()
                .map(|(term, df)| {
                    let idf = (n_docs as f64 / (1.0 + *df as f64)).ln() + 1.0;
                    let values = docs
                        .iter()
                        .map(|doc| match doc {
                            Some(tokens) => {
                                let tf = tokens.iter().filter(|t| *t == term).count();
                                Value::Float(tf as f64 * idf)
                            }
                            None => Value::Null,
                        })
                        .collect();
                    Column::with_dtype(
                        format!("{column}_tfidf_{term}"),
                        DataType::Float,
                        values,
                    )
                })
                .collect();
            current.with_column_expanded(column, replacements)
        }
        EncodingMethod::Count(max_features) => {
            let docs = tokenized_documents(&col);
            let vocab = build_vocabulary(&docs, *max_features);
            let replacements = vocab
                .iter()
                .map(|(term, _)| {
                    let values = docs
                        .iter()
                        .map(|doc| match doc {
                            Some(tokens) => {
                                Value::Int(tokens.iter().filter(|t| *t == term).count() as i64)
                            }
                            None => Value::Null,
                        })
                        .collect();
                    Column::with_dtype(
                        format!("{column}_count_{term}"),
                        DataType::Integer,
                        values,
                    )
                })
                .collect();
            current.with_column_expanded(column, replacements)
        }
        EncodingMethod::Hash(n_buckets) => {
            let docs = tokenized_documents(&col);
            let n = (*n_buckets).max(1);
            let replacements = (0..n)
                .map(|bucket| {
                    let values = docs
                        .iter()
                        .map(|doc| match doc {
                            Some(tokens) => Value::Int(
                                tokens
                                    .iter()
                                    .filter(|t| fnv1a(t) as usize % n == bucket)
                                    .count() as i64,
                            ),
                            None => Value::Null,
                        })
                        .collect();
                    Column::with_dtype(format!("{column}_hash{bucket}"), DataType::Integer, values)
                })
                .collect();
            current.with_column_expanded(column, replacements)
        }
        EncodingMethod::DatetimeFeatures => {
            let parsed = parsed_datetimes(&col);
            let features: [(&str, fn(&chrono::NaiveDateTime) -> i64); 4] = [
                ("year", |d| d.year() as i64),
                ("month", |d| d.month() as i64),
                ("day", |d| d.day() as i64),
                ("weekday", |d| d.weekday().num_days_from_monday() as i64),
            ];
            let replacements = features
                .iter()
                .map(|(suffix, extract)| {
                    let values = parsed
                        .iter()
                        .map(|p| p.as_ref().map(|d| Value::Int(extract(d))).unwrap_or(Value::Null))
                        .collect();
                    Column::with_dtype(
                        format!("{column}_{suffix}"),
                        DataType::Integer,
                        values,
                    )
                })
                .collect();
            current.with_column_expanded(column, replacements)
        }
        EncodingMethod::UnixTimestamp => {
            let parsed = parsed_datetimes(&col);
            let values = parsed
                .iter()
                .map(|p| {
                    p.as_ref()
                        .map(|d| Value::Int(d.and_utc().timestamp()))
                        .unwrap_or(Value::Null)
                })
                .collect();
            current.with_column_replaced(
                column,
                Column::with_dtype(column.to_owned(), DataType::Integer, values),
            )
        }
        EncodingMethod::OrdinalDate => {
            let parsed = parsed_datetimes(&col);
            let values = parsed
                .iter()
                .map(|p| {
                    p.as_ref()
                        .map(|d| Value::Int(d.date().num_days_from_ce() as i64))
                        .unwrap_or(Value::Null)
                })
                .collect();
            current.with_column_replaced(
                column,
                Column::with_dtype(column.to_owned(), DataType::Integer, values),
            )
        }
    }
}

/// Distinct non-null rendered values in first-seen order.
fn first_seen_categories(col: &Column) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in col.values().iter().filter(|v| !v.is_null()) {
        let key = v.to_field();
        if !out.contains(&key) {
            out.push(key);
        }
    }
    out
}

fn bits_needed(k: usize) -> usize {
    if k <= 1 {
        return 1;
    }
    (usize::BITS - (k - 1).leading_zeros()) as usize
}

fn tokenized_documents(col: &Column) -> Vec<Option<Vec<String>>> {
    col.values()
        .iter()
        .map(|v| {
            v.as_text().map(|s| {
                s.to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
        })
        .collect()
}

/// Top `max_features` terms by document frequency; ties resolved
/// alphabetically so vocabularies are deterministic.
fn build_vocabulary(docs: &[Option<Vec<String>>], max_features: usize) -> Vec<(String, usize)> {
    let mut df: BTreeMap<String, usize> = BTreeMap::new();
    for doc in docs.iter().flatten() {
        let unique: HashSet<&String> = doc.iter().collect();
        for term in unique {
            *df.entry(term.clone()).or_insert(0) += 1;
        }
    }
    let mut terms: Vec<(String, usize)> = df.into_iter().collect();
    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    terms.truncate(max_features.max(1));
    terms
}

fn parsed_datetimes(col: &Column) -> Vec<Option<chrono::NaiveDateTime>> {
    col.values()
        .iter()
        .map(|v| {
            v.as_text()
                .and_then(|s| detect_datetime_format(s).and_then(|f| parse_datetime(s, f)))
        })
        .collect()
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categorical(name: &str, values: &[&str]) -> Column {
        Column::with_dtype(
            name,
            DataType::Categorical,
            values.iter().map(|s| Value::Text(s.to_string())).collect(),
        )
    }

    fn op(column: &str, method: EncodingMethodKind) -> EncodingOperation {
        EncodingOperation {
            column: column.to_string(),
            method,
            order: None,
            target_column: None,
            max_features: None,
            n_buckets: None,
        }
    }

    #[test]
    fn analyze_splits_candidates_by_class() {
        let ds = Dataset::new(vec![
            categorical("color", &["red", "blue"]),
            Column::with_dtype(
                "note",
                DataType::Text,
                vec![Value::Text("a long sentence".into()), Value::Text("short".into())],
            ),
            Column::with_dtype(
                "day",
                DataType::Datetime,
                vec![Value::Text("2024-01-01".into()), Value::Text("2024-03-01".into())],
            ),
            Column::new("n", vec![Value::Int(1), Value::Int(2)]),
        ])
        .unwrap();

        let report = analyze(&ds);
        assert_eq!(report.categorical_columns.len(), 1);
        assert_eq!(report.text_columns.len(), 1);
        assert_eq!(report.datetime_columns.len(), 1);
        assert_eq!(report.datetime_columns[0].format, "%Y-%m-%d");
        assert!(report.datetime_columns[0].date_range.contains("2024-01-01"));
    }

    #[test]
    fn label_encoding_maps_first_seen_order() {
        let ds = Dataset::new(vec![categorical("c", &["b", "a", "b", "c"])]).unwrap();
        let (out, _) = apply_encoding(&ds, &[op("c", EncodingMethodKind::Label)]).unwrap();
        let vals = out.column("c").unwrap().values().to_vec();
        assert_eq!(vals, vec![Value::Int(0), Value::Int(1), Value::Int(0), Value::Int(2)]);
    }

    #[test]
    fn onehot_replaces_column_and_rows_sum_to_one() {
        let ds = Dataset::new(vec![categorical("c", &["x", "y", "x", "z"])]).unwrap();
        let (out, _) = apply_encoding(&ds, &[op("c", EncodingMethodKind::Onehot)]).unwrap();
        assert!(out.column("c").is_none());
        assert_eq!(out.column_count(), 3);
        for row in 0..out.row_count() {
            let ones = out
                .columns()
                .iter()
                .filter(|col| matches!(col.values()[row], Value::Bool(true)))
                .count();
            assert_eq!(ones, 1);
        }
    }

    #[test]
    fn ordinal_uses_caller_order_and_validates_membership() {
        let ds = Dataset::new(vec![categorical("size", &["small", "large", "medium"])]).unwrap();
        let mut o = op("size", EncodingMethodKind::Ordinal);
        o.order = Some(vec!["small".into(), "medium".into(), "large".into()]);
        let (out, _) = apply_encoding(&ds, &[o]).unwrap();
        assert_eq!(
            out.column("size").unwrap().values().to_vec(),
            vec![Value::Int(0), Value::Int(2), Value::Int(1)]
        );

        let mut bad = op("size", EncodingMethodKind::Ordinal);
        bad.order = Some(vec!["small".into()]);
        assert!(apply_encoding(&ds, &[bad]).is_err());
    }

    #[test]
    fn binary_encoding_uses_ceil_log2_columns() {
        let ds = Dataset::new(vec![categorical("c", &["a", "b", "c", "d", "e"])]).unwrap();
        let (out, _) = apply_encoding(&ds, &[op("c", EncodingMethodKind::Binary)]).unwrap();
        // 5 categories -> 3 bit columns
        assert_eq!(out.column_count(), 3);
        assert!(out.column("c_bin0").is_some());
        assert!(out.column("c_bin2").is_some());
    }

    #[test]
    fn target_encoding_needs_target_column() {
        let ds = Dataset::new(vec![
            categorical("c", &["a", "b", "a"]),
            Column::new("y", vec![Value::Float(1.0), Value::Float(5.0), Value::Float(3.0)]),
        ])
        .unwrap();
        assert!(matches!(
            apply_encoding(&ds, &[op("c", EncodingMethodKind::Target)]),
            Err(CleaningError::MissingTargetColumn)
        ));

        let mut o = op("c", EncodingMethodKind::Target);
        o.target_column = Some("y".into());
        let (out, _) = apply_encoding(&ds, &[o]).unwrap();
        let vals = out.column("c").unwrap().numeric_values();
        assert_eq!(vals, vec![2.0, 5.0, 2.0]);
    }

    #[test]
    fn tfidf_produces_fixed_width_and_removes_original() {
        let ds = Dataset::new(vec![Column::with_dtype(
            "note",
            DataType::Text,
            vec![
                Value::Text("red apple".into()),
                Value::Text("green apple pie".into()),
                Value::Text("red pie".into()),
            ],
        )])
        .unwrap();
        let mut o = op("note", EncodingMethodKind::Tfidf);
        o.max_features = Some(2);
        let (out, _) = apply_encoding(&ds, &[o]).unwrap();
        assert!(out.column("note").is_none());
        assert_eq!(out.column_count(), 2);
        // vocabulary by document frequency: apple(2), pie(2) beat red(2)? ties
        // break alphabetically: apple, pie, red -> apple & pie selected
        assert!(out.column("note_tfidf_apple").is_some());
        assert!(out.column("note_tfidf_pie").is_some());
    }

    #[test]
    fn hash_encoding_bucket_counts_preserve_token_total() {
        let ds = Dataset::new(vec![Column::with_dtype(
            "note",
            DataType::Text,
            vec![Value::Text("one two three".into()), Value::Text("four".into())],
        )])
        .unwrap();
        let mut o = op("note", EncodingMethodKind::Hash);
        o.n_buckets = Some(4);
        let (out, _) = apply_encoding(&ds, &[o]).unwrap();
        assert_eq!(out.column_count(), 4);
        let row0_total: i64 = out
            .columns()
            .iter()
            .map(|c| match c.values()[0] {
                Value::Int(n) => n,
                _ => 0,
            })
            .sum();
        assert_eq!(row0_total, 3);
    }

    #[test]
    fn datetime_features_extract_components() {
        let ds = Dataset::new(vec![Column::with_dtype(
            "day",
            DataType::Datetime,
            vec![Value::Text("2024-02-29".into()), Value::Null],
        )])
        .unwrap();
        let (out, _) =
            apply_encoding(&ds, &[op("day", EncodingMethodKind::DatetimeFeatures)]).unwrap();
        assert_eq!(out.column("day_year").unwrap().values()[0], Value::Int(2024));
        assert_eq!(out.column("day_month").unwrap().values()[0], Value::Int(2));
        assert_eq!(out.column("day_day").unwrap().values()[0], Value::Int(29));
        // 2024-02-29 is a Thursday
        assert_eq!(out.column("day_weekday").unwrap().values()[0], Value::Int(3));
        assert_eq!(out.column("day_year").unwrap().values()[1], Value::Null);
    }

    #[test]
    fn unix_timestamp_overwrites_in_place() {
        let ds = Dataset::new(vec![Column::with_dtype(
            "day",
            DataType::Datetime,
            vec![Value::Text("1970-01-02".into())],
        )])
        .unwrap();
        let (out, _) =
            apply_encoding(&ds, &[op("day", EncodingMethodKind::UnixTimestamp)]).unwrap();
        assert_eq!(out.column("day").unwrap().values()[0], Value::Int(86_400));
    }

    #[test]
    fn method_for_wrong_class_fails_batch() {
        let ds = Dataset::new(vec![categorical("c", &["a", "b"])]).unwrap();
        assert!(matches!(
            apply_encoding(&ds, &[op("c", EncodingMethodKind::Tfidf)]),
            Err(CleaningError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn numeric_column_is_not_a_candidate() {
        let ds = Dataset::new(vec![Column::new("n", vec![Value::Int(1), Value::Int(2)])]).unwrap();
        assert!(apply_encoding(&ds, &[op("n", EncodingMethodKind::Label)]).is_err());
    }
}
