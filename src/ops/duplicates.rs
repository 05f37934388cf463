//! Whole-row duplicate detection and removal.
//!
//! Two rows are duplicates when every column matches exactly (type-aware
//! comparison, float bit patterns included). Multiplicity counts: a row
//! appearing three times is one unique row plus two duplicates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CleaningError, CleaningResult};
use crate::session::{details, OperationRecord, OperationType};
use crate::types::{Dataset, Value};

/// Maximum number of example duplicate groups reported by [`check`].
const MAX_EXAMPLE_GROUPS: usize = 5;

/// Which occurrence survives when removing a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeepStrategy {
    First,
    Last,
}

/// One group of identical rows.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    /// Row indices of every occurrence, in dataset order.
    pub row_indices: Vec<usize>,
    /// The shared row, rendered cell by cell.
    pub values: Vec<Value>,
}

/// Result of the read-only duplicate check.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCheck {
    pub total_rows: usize,
    pub unique_count: usize,
    pub duplicate_count: usize,
    /// duplicate_count / total_rows × 100.
    pub duplicate_percentage: f64,
    /// Up to five example groups.
    pub duplicate_examples: Vec<DuplicateGroup>,
}

fn group_rows(dataset: &Dataset) -> Vec<Vec<usize>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for row in 0..dataset.row_count() {
        let key = dataset.row_key(row);
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }
    order.into_iter().map(|key| groups.remove(&key).unwrap_or_default()).collect()
}

/// Count duplicates without mutating anything.
pub fn check(dataset: &Dataset) -> DuplicateCheck {
    let total_rows = dataset.row_count();
    let groups = group_rows(dataset);
    let unique_count = groups.len();
    let duplicate_count = total_rows - unique_count;
    let duplicate_examples = groups
        .iter()
        .filter(|g| g.len() > 1)
        .take(MAX_EXAMPLE_GROUPS)
        .map(|g| DuplicateGroup {
            row_indices: g.clone(),
            values: dataset.row(g[0]),
        })
        .collect();
    DuplicateCheck {
        total_rows,
        unique_count,
        duplicate_count,
        duplicate_percentage: if total_rows == 0 {
            0.0
        } else {
            duplicate_count as f64 / total_rows as f64 * 100.0
        },
        duplicate_examples,
    }
}

/// Remove duplicate rows, keeping the first or last occurrence per group.
pub fn remove(
    dataset: &Dataset,
    keep: KeepStrategy,
) -> CleaningResult<(Dataset, OperationRecord)> {
    let groups = group_rows(dataset);
    let mut keep_mask = vec![false; dataset.row_count()];
    for group in &groups {
        let survivor = match keep {
            KeepStrategy::First => group[0],
            KeepStrategy::Last => group[group.len() - 1],
        };
        keep_mask[survivor] = true;
    }
    let removed = keep_mask.iter().filter(|&&k| !k).count();
    let out = dataset.retain_rows(&keep_mask)?;
    let record = OperationRecord::new(
        OperationType::RemoveDuplicates,
        format!(
            "Removed {removed} duplicate row(s), keeping the {} occurrence",
            match keep {
                KeepStrategy::First => "first",
                KeepStrategy::Last => "last",
            }
        ),
        details(vec![
            ("keep", json!(keep)),
            ("removed_rows", json!(removed)),
            ("remaining_rows", json!(out.row_count())),
        ]),
    );
    Ok((out, record))
}
