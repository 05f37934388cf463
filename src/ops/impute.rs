//! Missing-value imputation: per-column fill strategies applied as one
//! atomic batch.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CleaningError, CleaningResult};
use crate::session::{details, OperationRecord, OperationType};
use crate::stats::{mean, median};
use crate::types::{Column, Dataset, Value};

/// Fill strategy for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeMethod {
    /// Column mean (numeric only).
    Mean,
    /// Column median (numeric only).
    Median,
    /// Most frequent value, ties broken by first occurrence.
    Mode,
    /// Propagate the last non-null value forward; leading nulls stay null.
    ForwardFill,
    /// Mirror of forward-fill.
    BackwardFill,
    /// Caller-supplied literal, parsed to the column dtype when possible.
    Custom,
}

impl ImputeMethod {
    fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::ForwardFill => "forward_fill",
            Self::BackwardFill => "backward_fill",
            Self::Custom => "custom",
        }
    }
}

/// One imputation rule. Rules in a batch must target disjoint columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImputeRule {
    pub column: String,
    pub method: ImputeMethod,
    /// Required when `method` is [`ImputeMethod::Custom`].
    #[serde(default)]
    pub custom_value: Option<String>,
}

/// Apply a batch of imputation rules. The whole batch validates before any
/// column is touched; each rule affects only its own column.
pub fn impute_missing(
    dataset: &Dataset,
    rules: &[ImputeRule],
) -> CleaningResult<(Dataset, OperationRecord)> {
    if rules.is_empty() {
        return Err(CleaningError::EmptySelection {
            message: "no imputation rules supplied".to_owned(),
        });
    }
    let mut seen = std::collections::HashSet::new();
    for rule in rules {
        let col = dataset.require(&rule.column)?;
        if !seen.insert(rule.column.as_str()) {
            return Err(CleaningError::InvalidOperation {
                message: format!("column '{}' appears in more than one rule", rule.column),
            });
        }
        match rule.method {
            ImputeMethod::Mean | ImputeMethod::Median if !col.dtype.is_numeric() => {
                return Err(CleaningError::IncompatibleMethod {
                    method: rule.method.as_str().to_owned(),
                    column: rule.column.clone(),
                    dtype: col.dtype.as_str().to_owned(),
                });
            }
            ImputeMethod::Custom if rule.custom_value.is_none() => {
                return Err(CleaningError::InvalidOperation {
                    message: format!("rule for column '{}' needs a custom value", rule.column),
                });
            }
            _ => {}
        }
    }

    let mut out = dataset.clone();
    let mut filled_total = 0usize;
    for rule in rules {
        let col = out.require(&rule.column)?.clone();
        let before = col.null_count();
        let values = apply_rule(&col, rule);
        let new_col = Column::new(col.name.clone(), values);
        filled_total += before - new_col.null_count();
        out = out.with_column_replaced(&rule.column, new_col)?;
    }

    let columns: Vec<&str> = rules.iter().map(|r| r.column.as_str()).collect();
    let methods: Vec<&str> = rules.iter().map(|r| r.method.as_str()).collect();
    let record = OperationRecord::new(
        OperationType::ImputeMissing,
        format!("Imputed {filled_total} missing value(s) across {} column(s)", rules.len()),
        details(vec![
            ("columns", json!(columns)),
            ("methods", json!(methods)),
            ("filled_cells", json!(filled_total)),
        ]),
    );
    Ok((out, record))
}

fn apply_rule(col: &Column, rule: &ImputeRule) -> Vec<Value> {
    let mut values = col.values().to_vec();
    match rule.method {
        ImputeMethod::Mean => {
            if let Some(m) = mean(&col.numeric_values()) {
                fill_nulls(&mut values, &Value::Float(m));
            }
        }
        ImputeMethod::Median => {
            if let Some(m) = median(&col.numeric_values()) {
                fill_nulls(&mut values, &Value::Float(m));
            }
        }
        ImputeMethod::Mode => {
            if let Some(m) = mode_value(&values) {
                fill_nulls(&mut values, &m);
            }
        }
        ImputeMethod::ForwardFill => {
            let mut last: Option<Value> = None;
            for v in values.iter_mut() {
                if v.is_null() {
                    if let Some(prev) = &last {
                        *v = prev.clone();
                    }
                } else {
                    last = Some(v.clone());
                }
            }
        }
        ImputeMethod::BackwardFill => {
            let mut next: Option<Value> = None;
            for v in values.iter_mut().rev() {
                if v.is_null() {
                    if let Some(succ) = &next {
                        *v = succ.clone();
                    }
                } else {
                    next = Some(v.clone());
                }
            }
        }
        ImputeMethod::Custom => {
            // Presence validated up front.
            if let Some(raw) = &rule.custom_value {
                fill_nulls(&mut values, &Value::parse_as(col.dtype, raw));
            }
        }
    }
    values
}

fn fill_nulls(values: &mut [Value], fill: &Value) {
    for v in values.iter_mut() {
        if v.is_null() {
            *v = fill.clone();
        }
    }
}

fn mode_value(values: &[Value]) -> Option<Value> {
    let mut counts: Vec<(String, &Value, usize)> = Vec::new();
    for v in values.iter().filter(|v| !v.is_null()) {
        let key = v.canonical_key();
        match counts.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, n)) => *n += 1,
            None => counts.push((key, v, 1)),
        }
    }
    counts
        .iter()
        .max_by_key(|(_, _, n)| *n)
        .map(|(_, v, _)| (*v).clone())
}
