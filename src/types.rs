//! Core data model: typed values, columns, and the in-memory [`Dataset`].
//!
//! The engine stores data column-major. Each [`Column`] owns its cells behind
//! an `Arc`, so cloning a [`Dataset`] (and therefore every operation that
//! leaves a column untouched) shares storage instead of copying it. Mutating
//! operations build a new `Dataset` value; they never edit one in place.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::{CleaningError, CleaningResult};

/// Unique-value ratio at or below which a text column is tagged categorical.
pub const CATEGORICAL_UNIQUE_RATIO: f64 = 0.5;
/// Distinct-value count above which a text column is never tagged categorical.
pub const CATEGORICAL_MAX_UNIQUE: usize = 50;

/// Datetime formats recognized by inference, in match order.
pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Inferred classification tag for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit signed integers.
    Integer,
    /// 64-bit floats.
    Float,
    /// Free-form text (high unique-value ratio).
    Text,
    /// Boolean literal pairs (true/false, yes/no, 0/1).
    Boolean,
    /// Text cells parseable under a single known date format family.
    Datetime,
    /// Low-cardinality text (unique-value ratio below threshold).
    Categorical,
}

impl DataType {
    /// Whether values of this type participate in numeric statistics.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Stable wire name, as reported in `data_types` maps.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::Categorical => "categorical",
        }
    }
}

/// A single cell in a [`Dataset`].
///
/// Datetime and categorical columns store their cells as [`Value::Text`]; the
/// classification lives on the column's [`DataType`] tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing/empty cell.
    Null,
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Text(String),
}

impl Value {
    /// Whether this cell is missing.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the cell, when it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view of the cell, when it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Render the cell the way the CSV export writes it (null becomes the
    /// empty field).
    pub fn to_field(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => format_float(*v),
            Self::Bool(v) => v.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Exact comparison key: encodes the variant and, for floats, the bit
    /// pattern, so rows hash consistently for duplicate detection.
    pub fn canonical_key(&self) -> String {
        match self {
            Self::Null => "n:".to_string(),
            Self::Int(v) => format!("i:{v}"),
            Self::Float(v) => format!("f:{:016x}", v.to_bits()),
            Self::Bool(v) => format!("b:{v}"),
            Self::Text(s) => format!("t:{s}"),
        }
    }

    /// Parse a raw literal into the given column type, falling back to text
    /// when the literal does not fit.
    pub fn parse_as(dtype: DataType, raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match dtype {
            DataType::Integer => trimmed
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(trimmed.to_owned())),
            DataType::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::Text(trimmed.to_owned())),
            DataType::Boolean => parse_bool_literal(trimmed)
                .map(Value::Bool)
                .unwrap_or_else(|| Value::Text(trimmed.to_owned())),
            DataType::Text | DataType::Datetime | DataType::Categorical => {
                Value::Text(trimmed.to_owned())
            }
        }
    }
}

fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

/// Parse the boolean literal set accepted at inference time.
pub fn parse_bool_literal(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Some(true),
        "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Try each known datetime format against a literal.
pub fn detect_datetime_format(s: &str) -> Option<&'static str> {
    DATETIME_FORMATS.iter().copied().find(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt).is_ok() || NaiveDate::parse_from_str(s, fmt).is_ok()
    })
}

/// Parse a literal with a known datetime format, date-only formats mapping to
/// midnight.
pub fn parse_datetime(s: &str, fmt: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, fmt)
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s, fmt).ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// A named, typed column with shared cell storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name (unique within a dataset).
    pub name: String,
    /// Inferred classification tag.
    pub dtype: DataType,
    values: Arc<Vec<Value>>,
}

impl Column {
    /// Create a column, inferring its [`DataType`] from the cells.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        let dtype = infer_dtype(&values);
        Self {
            name: name.into(),
            dtype,
            values: Arc::new(values),
        }
    }

    /// Create a column with an explicit type tag (used by operations that
    /// know the output type, e.g. encodings).
    pub fn with_dtype(name: impl Into<String>, dtype: DataType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            dtype,
            values: Arc::new(values),
        }
    }

    /// Cell slice.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the column has no cells.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Count of null cells.
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Non-null numeric cells in order. Empty for non-numeric columns.
    pub fn numeric_values(&self) -> Vec<f64> {
        if !self.dtype.is_numeric() {
            return Vec::new();
        }
        self.values.iter().filter_map(Value::as_f64).collect()
    }

}

/// In-memory tabular dataset: ordered columns with uniform row count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    /// Create a dataset from columns, validating the invariants: uniform row
    /// count across columns, no duplicate column names.
    pub fn new(columns: Vec<Column>) -> CleaningResult<Self> {
        if let Some(first) = columns.first() {
            let n = first.len();
            for col in &columns {
                if col.len() != n {
                    return Err(CleaningError::InvalidOperation {
                        message: format!(
                            "column '{}' has {} rows, expected {}",
                            col.name,
                            col.len(),
                            n
                        ),
                    });
                }
            }
        }
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(CleaningError::DuplicateColumnName {
                    name: col.name.clone(),
                });
            }
        }
        Ok(Self { columns })
    }

    /// Build a dataset from the upload collaborator's parsed tabular form:
    /// column names plus row-major cells of optional raw strings. Performs
    /// per-column type inference.
    pub fn from_raw(
        names: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    ) -> CleaningResult<Self> {
        let width = names.len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(CleaningError::InvalidOperation {
                    message: format!("row {i} has {} cells, expected {width}", row.len()),
                });
            }
        }
        let columns = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let raw: Vec<Option<&str>> = rows
                    .iter()
                    .map(|row| row[idx].as_deref().map(str::trim).filter(|s| !s.is_empty()))
                    .collect();
                build_column(name, &raw)
            })
            .collect();
        Self::new(columns)
    }

    /// Column accessors.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Ordered column names.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// (rows, columns) pair.
    pub fn shape(&self) -> (usize, usize) {
        (self.row_count(), self.column_count())
    }

    /// Index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column by name, or [`CleaningError::UnknownColumn`].
    pub fn require(&self, name: &str) -> CleaningResult<&Column> {
        self.column(name).ok_or_else(|| CleaningError::UnknownColumn {
            column: name.to_owned(),
        })
    }

    /// Names of numeric columns, in dataset order.
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.dtype.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }

    /// A new dataset with one column's cells swapped out (other columns share
    /// storage with `self`).
    pub fn with_column_replaced(&self, name: &str, column: Column) -> CleaningResult<Self> {
        let idx = self.index_of(name).ok_or_else(|| CleaningError::UnknownColumn {
            column: name.to_owned(),
        })?;
        let mut columns = self.columns.clone();
        columns[idx] = column;
        Self::new(columns)
    }

    /// A new dataset where the column at `name` is replaced by `replacements`
    /// (one or more derived columns spliced in at its position).
    pub fn with_column_expanded(
        &self,
        name: &str,
        replacements: Vec<Column>,
    ) -> CleaningResult<Self> {
        let idx = self.index_of(name).ok_or_else(|| CleaningError::UnknownColumn {
            column: name.to_owned(),
        })?;
        let mut columns = Vec::with_capacity(self.columns.len() - 1 + replacements.len());
        columns.extend_from_slice(&self.columns[..idx]);
        columns.extend(replacements);
        columns.extend_from_slice(&self.columns[idx + 1..]);
        Self::new(columns)
    }

    /// A new dataset without the named columns.
    pub fn without_columns(&self, names: &[String]) -> CleaningResult<Self> {
        let drop: HashSet<&str> = names.iter().map(String::as_str).collect();
        let columns = self
            .columns
            .iter()
            .filter(|c| !drop.contains(c.name.as_str()))
            .cloned()
            .collect();
        Self::new(columns)
    }

    /// A new dataset keeping only rows where `mask[row]` is true. Every
    /// column is rebuilt.
    pub fn retain_rows(&self, mask: &[bool]) -> CleaningResult<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let values = c
                    .values()
                    .iter()
                    .zip(mask.iter())
                    .filter(|(_, keep)| **keep)
                    .map(|(v, _)| v.clone())
                    .collect();
                Column::with_dtype(c.name.clone(), c.dtype, values)
            })
            .collect();
        Self::new(columns)
    }

    /// Row-major view of a row's cells, cloning each cell.
    pub fn row(&self, idx: usize) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| c.values().get(idx).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Exact per-row comparison key (duplicate detection).
    pub fn row_key(&self, idx: usize) -> String {
        let mut key = String::new();
        for col in &self.columns {
            if let Some(v) = col.values().get(idx) {
                key.push_str(&v.canonical_key());
            }
            key.push('\u{1f}');
        }
        key
    }
}

fn build_column(name: String, raw: &[Option<&str>]) -> Column {
    let non_null: Vec<&str> = raw.iter().flatten().copied().collect();

    if !non_null.is_empty() && non_null.iter().all(|s| s.parse::<i64>().is_ok()) {
        let values = raw
            .iter()
            .map(|c| c.map(|s| Value::Int(s.parse().unwrap_or(0))).unwrap_or(Value::Null))
            .collect();
        return Column::with_dtype(name, DataType::Integer, values);
    }

    if !non_null.is_empty() && non_null.iter().all(|s| s.parse::<f64>().is_ok()) {
        let values = raw
            .iter()
            .map(|c| c.map(|s| Value::Float(s.parse().unwrap_or(f64::NAN))).unwrap_or(Value::Null))
            .collect();
        return Column::with_dtype(name, DataType::Float, values);
    }

    let all_bool = !non_null.is_empty()
        && non_null.iter().all(|s| parse_bool_literal(s).is_some())
        && non_null.iter().any(|s| s.chars().any(|c| c.is_alphabetic()));
    if all_bool {
        let values = raw
            .iter()
            .map(|c| {
                c.and_then(parse_bool_literal).map(Value::Bool).unwrap_or(Value::Null)
            })
            .collect();
        return Column::with_dtype(name, DataType::Boolean, values);
    }

    let values: Vec<Value> = raw
        .iter()
        .map(|c| c.map(|s| Value::Text(s.to_owned())).unwrap_or(Value::Null))
        .collect();

    if !non_null.is_empty() && non_null.iter().all(|s| detect_datetime_format(s).is_some()) {
        return Column::with_dtype(name, DataType::Datetime, values);
    }

    let unique: HashSet<&str> = non_null.iter().copied().collect();
    let ratio = unique.len() as f64 / non_null.len().max(1) as f64;
    let dtype = if !non_null.is_empty()
        && ratio <= CATEGORICAL_UNIQUE_RATIO
        && unique.len() <= CATEGORICAL_MAX_UNIQUE
    {
        DataType::Categorical
    } else {
        DataType::Text
    };
    Column::with_dtype(name, dtype, values)
}

/// Infer a [`DataType`] tag from already-typed cells (used after value-level
/// mutations).
pub fn infer_dtype(values: &[Value]) -> DataType {
    let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return DataType::Text;
    }
    if non_null.iter().all(|v| matches!(v, Value::Int(_))) {
        return DataType::Integer;
    }
    if non_null.iter().all(|v| matches!(v, Value::Int(_) | Value::Float(_))) {
        return DataType::Float;
    }
    if non_null.iter().all(|v| matches!(v, Value::Bool(_))) {
        return DataType::Boolean;
    }
    let texts: Vec<&str> = non_null.iter().filter_map(|v| v.as_text()).collect();
    if texts.len() == non_null.len() {
        if texts.iter().all(|s| detect_datetime_format(s).is_some()) {
            return DataType::Datetime;
        }
        let unique: HashSet<&str> = texts.iter().copied().collect();
        let ratio = unique.len() as f64 / texts.len() as f64;
        if ratio <= CATEGORICAL_UNIQUE_RATIO && unique.len() <= CATEGORICAL_MAX_UNIQUE {
            return DataType::Categorical;
        }
    }
    DataType::Text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(rows: &[&[Option<&str>]]) -> Vec<Vec<Option<String>>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.map(str::to_owned)).collect())
            .collect()
    }

    #[test]
    fn from_raw_infers_integer_and_float() {
        let ds = Dataset::from_raw(
            vec!["id".into(), "score".into()],
            raw(&[
                &[Some("1"), Some("9.5")],
                &[Some("2"), Some("8.0")],
                &[Some("3"), None],
            ]),
        )
        .unwrap();

        assert_eq!(ds.shape(), (3, 2));
        assert_eq!(ds.column("id").unwrap().dtype, DataType::Integer);
        assert_eq!(ds.column("score").unwrap().dtype, DataType::Float);
        assert_eq!(ds.column("score").unwrap().null_count(), 1);
    }

    #[test]
    fn from_raw_infers_boolean_datetime_categorical_text() {
        let ds = Dataset::from_raw(
            vec!["flag".into(), "day".into(), "city".into(), "note".into()],
            raw(&[
                &[Some("yes"), Some("2024-01-01"), Some("NY"), Some("alpha one")],
                &[Some("no"), Some("2024-01-02"), Some("LA"), Some("beta two")],
                &[Some("yes"), Some("2024-01-03"), Some("NY"), Some("gamma three")],
                &[Some("no"), Some("2024-01-04"), Some("LA"), Some("delta four")],
            ]),
        )
        .unwrap();

        assert_eq!(ds.column("flag").unwrap().dtype, DataType::Boolean);
        assert_eq!(ds.column("day").unwrap().dtype, DataType::Datetime);
        assert_eq!(ds.column("city").unwrap().dtype, DataType::Categorical);
        assert_eq!(ds.column("note").unwrap().dtype, DataType::Text);
    }

    #[test]
    fn numeric_zero_one_stays_integer_not_boolean() {
        let ds = Dataset::from_raw(
            vec!["bit".into()],
            raw(&[&[Some("0")], &[Some("1")], &[Some("1")]]),
        )
        .unwrap();
        assert_eq!(ds.column("bit").unwrap().dtype, DataType::Integer);
    }

    #[test]
    fn new_rejects_ragged_columns_and_duplicate_names() {
        let a = Column::new("a", vec![Value::Int(1), Value::Int(2)]);
        let b = Column::new("b", vec![Value::Int(1)]);
        assert!(Dataset::new(vec![a.clone(), b]).is_err());

        let a2 = Column::new("a", vec![Value::Int(3), Value::Int(4)]);
        assert!(matches!(
            Dataset::new(vec![a, a2]),
            Err(CleaningError::DuplicateColumnName { .. })
        ));
    }

    #[test]
    fn retain_rows_rebuilds_every_column() {
        let ds = Dataset::new(vec![
            Column::new("id", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            Column::new(
                "name",
                vec![
                    Value::Text("a".into()),
                    Value::Text("b".into()),
                    Value::Text("c".into()),
                ],
            ),
        ])
        .unwrap();

        let kept = ds.retain_rows(&[true, false, true]).unwrap();
        assert_eq!(kept.row_count(), 2);
        assert_eq!(kept.row(1), vec![Value::Int(3), Value::Text("c".into())]);
    }

    #[test]
    fn row_key_distinguishes_types() {
        let ds = Dataset::new(vec![Column::new(
            "x",
            vec![Value::Int(1), Value::Text("1".into())],
        )])
        .unwrap();
        assert_ne!(ds.row_key(0), ds.row_key(1));
    }

    #[test]
    fn structural_sharing_on_column_replace() {
        let ds = Dataset::new(vec![
            Column::new("a", vec![Value::Int(1)]),
            Column::new("b", vec![Value::Int(2)]),
        ])
        .unwrap();
        let out = ds
            .with_column_replaced("a", Column::new("a", vec![Value::Int(9)]))
            .unwrap();
        // untouched column shares its Arc-backed cells
        assert!(std::ptr::eq(
            ds.column("b").unwrap().values().as_ptr(),
            out.column("b").unwrap().values().as_ptr()
        ));
    }
}
