//! Column-level operations: drop, rename (standardize identifiers), and
//! value-level standardization.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CleaningError, CleaningResult};
use crate::session::{details, OperationRecord, OperationType};
use crate::stats::{mean, sample_std};
use crate::types::{Column, DataType, Dataset, Value};

/// Identifier rule for column names.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The standardization heuristic used to propose column names: lowercase,
/// whitespace runs to `_`, non-`[a-z0-9_]` to `_`, collapse repeats, trim,
/// `col_` prefix for digit-leading names, `col_<index>` for empty results.
pub fn standardize_name(original: &str, index: usize) -> String {
    let mut out = String::with_capacity(original.len());
    for c in original.to_lowercase().chars() {
        if c.is_whitespace() {
            out.push('_');
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    let mut collapsed = String::with_capacity(out.len());
    let mut prev_underscore = false;
    for c in out.chars() {
        if c == '_' {
            if !prev_underscore {
                collapsed.push('_');
            }
            prev_underscore = true;
        } else {
            collapsed.push(c);
            prev_underscore = false;
        }
    }
    let trimmed = collapsed.trim_matches('_').to_string();
    if trimmed.is_empty() {
        return format!("col_{index}");
    }
    if trimmed.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return format!("col_{trimmed}");
    }
    trimmed
}

/// Drop the named columns. Row count is unchanged.
pub fn drop_columns(
    dataset: &Dataset,
    names: &[String],
) -> CleaningResult<(Dataset, OperationRecord)> {
    if names.is_empty() {
        return Err(CleaningError::EmptySelection {
            message: "no columns selected to drop".to_owned(),
        });
    }
    for name in names {
        dataset.require(name)?;
    }
    let out = dataset.without_columns(names)?;
    let record = OperationRecord::new(
        OperationType::DropColumns,
        format!("Dropped {} column(s): {}", names.len(), names.join(", ")),
        details(vec![
            ("columns", json!(names)),
            ("remaining_columns", json!(out.column_count())),
        ]),
    );
    Ok((out, record))
}

/// Independent value-standardization flags for one column. When several are
/// set they compose in field order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueStandardization {
    pub lowercase: bool,
    pub uppercase: bool,
    pub title_case: bool,
    pub trim_whitespace: bool,
    pub remove_special_chars: bool,
    pub normalize_spaces: bool,
    pub z_score_normalize: bool,
    pub min_max_scale: bool,
}

impl ValueStandardization {
    /// Whether any flag is set.
    pub fn is_any(&self) -> bool {
        *self != Self::default()
    }

    fn needs_numeric(&self) -> bool {
        self.z_score_normalize || self.min_max_scale
    }
}

/// The combined `standardize-columns` operation: a rename mapping plus
/// per-column value standardization, applied as one atomic mutation.
///
/// Rename validation happens against the full post-rename name set (including
/// unrenamed columns); any invalid or colliding name fails the whole batch.
pub fn standardize_columns(
    dataset: &Dataset,
    rename: &BTreeMap<String, String>,
    value_ops: &BTreeMap<String, ValueStandardization>,
) -> CleaningResult<(Dataset, OperationRecord)> {
    for old in rename.keys() {
        dataset.require(old)?;
    }
    for column in value_ops.keys() {
        dataset.require(column)?;
    }
    for new in rename.values() {
        if !is_valid_identifier(new) {
            return Err(CleaningError::InvalidColumnName { name: new.clone() });
        }
    }
    let mut post_rename = HashSet::new();
    for col in dataset.columns() {
        let name = rename.get(&col.name).unwrap_or(&col.name);
        if !post_rename.insert(name.clone()) {
            return Err(CleaningError::DuplicateColumnName { name: name.clone() });
        }
    }
    // Validate numeric flags before touching anything.
    for (name, ops) in value_ops {
        let col = dataset.require(name)?;
        if ops.needs_numeric() && !col.dtype.is_numeric() {
            return Err(CleaningError::IncompatibleMethod {
                method: if ops.z_score_normalize { "z_score_normalize" } else { "min_max_scale" }
                    .to_owned(),
                column: name.clone(),
                dtype: col.dtype.as_str().to_owned(),
            });
        }
        if ops.min_max_scale {
            let xs = col.numeric_values();
            let (min, max) = min_max(&xs);
            if !xs.is_empty() && (max - min).abs() <= f64::EPSILON {
                return Err(CleaningError::DegenerateColumn { column: name.clone() });
            }
        }
        if ops.z_score_normalize {
            let xs = col.numeric_values();
            if xs.len() >= 2 && sample_std(&xs).unwrap_or(0.0) <= f64::EPSILON {
                return Err(CleaningError::DegenerateColumn { column: name.clone() });
            }
        }
    }

    let columns = dataset
        .columns()
        .iter()
        .map(|col| {
            let new_name = rename.get(&col.name).unwrap_or(&col.name).clone();
            match value_ops.get(&col.name) {
                Some(ops) if ops.is_any() => standardize_column_values(col, new_name, ops),
                _ => Ok(Column::with_dtype(new_name, col.dtype, col.values().to_vec())),
            }
        })
        .collect::<CleaningResult<Vec<_>>>()?;

    let out = Dataset::new(columns)?;
    let standardized: Vec<&String> =
        value_ops.iter().filter(|(_, ops)| ops.is_any()).map(|(k, _)| k).collect();
    let record = OperationRecord::new(
        OperationType::StandardizeColumns,
        format!(
            "Renamed {} column(s), standardized values in {}",
            rename.len(),
            standardized.len()
        ),
        details(vec![
            ("renamed", json!(rename)),
            ("standardized_columns", json!(standardized)),
        ]),
    );
    Ok((out, record))
}

fn min_max(xs: &[f64]) -> (f64, f64) {
    let min = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (min, max)
}

fn standardize_column_values(
    col: &Column,
    new_name: String,
    ops: &ValueStandardization,
) -> CleaningResult<Column> {
    let mut values = col.values().to_vec();

    if ops.lowercase {
        text_pass(&mut values, &|s| s.to_lowercase());
    }
    if ops.uppercase {
        text_pass(&mut values, &|s| s.to_uppercase());
    }
    if ops.title_case {
        text_pass(&mut values, &title_case);
    }
    if ops.trim_whitespace {
        text_pass(&mut values, &|s| s.trim().to_string());
    }
    if ops.remove_special_chars {
        text_pass(&mut values, &|s| {
            s.chars().filter(|c| c.is_alphanumeric() || *c == ' ').collect()
        });
    }
    if ops.normalize_spaces {
        text_pass(&mut values, &|s| s.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    if ops.z_score_normalize {
        let xs: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
        let m = mean(&xs).unwrap_or(0.0);
        let sd = sample_std(&xs).unwrap_or(0.0);
        for v in values.iter_mut() {
            if let Some(x) = v.as_f64() {
                *v = Value::Float(if sd > 0.0 { (x - m) / sd } else { 0.0 });
            }
        }
    }
    if ops.min_max_scale {
        let xs: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
        let (min, max) = min_max(&xs);
        let span = max - min;
        for v in values.iter_mut() {
            if let Some(x) = v.as_f64() {
                *v = Value::Float((x - min) / span);
            }
        }
    }

    if ops.needs_numeric() {
        Ok(Column::with_dtype(new_name, DataType::Float, values))
    } else {
        Ok(Column::new(new_name, values))
    }
}

fn text_pass(values: &mut [Value], f: &dyn Fn(&str) -> String) {
    for v in values.iter_mut() {
        if let Value::Text(s) = v {
            *s = f(s);
        }
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn people() -> Dataset {
        Dataset::new(vec![
            Column::new("Full Name", vec![Value::Text("  ada  lovelace ".into())]),
            Column::new("score", vec![Value::Float(1.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn standardize_name_heuristic() {
        assert_eq!(standardize_name("Full Name", 0), "full_name");
        assert_eq!(standardize_name("Qty (kg)", 1), "qty_kg");
        assert_eq!(standardize_name("2024 sales", 2), "col_2024_sales");
        assert_eq!(standardize_name("___", 3), "col_3");
    }

    #[test]
    fn drop_columns_keeps_rows() {
        let ds = people();
        let (out, _) = drop_columns(&ds, &["score".to_string()]).unwrap();
        assert_eq!(out.shape(), (1, 1));
        assert!(out.column("score").is_none());
    }

    #[test]
    fn drop_columns_rejects_empty_and_unknown() {
        let ds = people();
        assert!(matches!(
            drop_columns(&ds, &[]),
            Err(CleaningError::EmptySelection { .. })
        ));
        assert!(matches!(
            drop_columns(&ds, &["nope".to_string()]),
            Err(CleaningError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn rename_is_atomic_on_collision() {
        let ds = people();
        let mut rename = BTreeMap::new();
        rename.insert("Full Name".to_string(), "score".to_string());
        let err = standardize_columns(&ds, &rename, &BTreeMap::new());
        assert!(matches!(err, Err(CleaningError::DuplicateColumnName { .. })));
    }

    #[test]
    fn rename_rejects_invalid_identifier() {
        let ds = people();
        let mut rename = BTreeMap::new();
        rename.insert("Full Name".to_string(), "1bad name".to_string());
        assert!(matches!(
            standardize_columns(&ds, &rename, &BTreeMap::new()),
            Err(CleaningError::InvalidColumnName { .. })
        ));
    }

    #[test]
    fn value_flags_compose_in_order() {
        let ds = people();
        let mut ops = BTreeMap::new();
        ops.insert(
            "Full Name".to_string(),
            ValueStandardization {
                title_case: true,
                trim_whitespace: true,
                normalize_spaces: true,
                ..Default::default()
            },
        );
        let (out, _) = standardize_columns(&ds, &BTreeMap::new(), &ops).unwrap();
        assert_eq!(
            out.column("Full Name").unwrap().values()[0],
            Value::Text("Ada Lovelace".into())
        );
    }

    #[test]
    fn min_max_scale_maps_to_unit_interval() {
        let ds = Dataset::new(vec![Column::new(
            "x",
            vec![Value::Float(2.0), Value::Float(4.0), Value::Float(6.0)],
        )])
        .unwrap();
        let mut ops = BTreeMap::new();
        ops.insert(
            "x".to_string(),
            ValueStandardization { min_max_scale: true, ..Default::default() },
        );
        let (out, _) = standardize_columns(&ds, &BTreeMap::new(), &ops).unwrap();
        let xs = out.column("x").unwrap().numeric_values();
        assert_eq!(xs, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn min_max_scale_rejects_degenerate_column() {
        let ds = Dataset::new(vec![Column::new(
            "x",
            vec![Value::Float(3.0), Value::Float(3.0)],
        )])
        .unwrap();
        let mut ops = BTreeMap::new();
        ops.insert(
            "x".to_string(),
            ValueStandardization { min_max_scale: true, ..Default::default() },
        );
        assert!(matches!(
            standardize_columns(&ds, &BTreeMap::new(), &ops),
            Err(CleaningError::DegenerateColumn { .. })
        ));
    }

    #[test]
    fn z_score_produces_zero_mean_unit_std() {
        let ds = Dataset::new(vec![Column::new(
            "x",
            vec![Value::Float(1.0), Value::Float(2.0), Value::Float(3.0), Value::Float(4.0)],
        )])
        .unwrap();
        let mut ops = BTreeMap::new();
        ops.insert(
            "x".to_string(),
            ValueStandardization { z_score_normalize: true, ..Default::default() },
        );
        let (out, _) = standardize_columns(&ds, &BTreeMap::new(), &ops).unwrap();
        let xs = out.column("x").unwrap().numeric_values();
        assert!(mean(&xs).unwrap().abs() < 1e-9);
        assert!((sample_std(&xs).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn numeric_scaling_rejected_for_text_column() {
        let ds = people();
        let mut ops = BTreeMap::new();
        ops.insert(
            "Full Name".to_string(),
            ValueStandardization { z_score_normalize: true, ..Default::default() },
        );
        assert!(matches!(
            standardize_columns(&ds, &BTreeMap::new(), &ops),
            Err(CleaningError::IncompatibleMethod { .. })
        ));
    }
}
