//! Skewness/kurtosis analysis, transformation recommendation, and power/log
//! transform application.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CleaningError, CleaningResult};
use crate::session::{details, OperationRecord, OperationType};
use crate::stats::{kurtosis, mean, skewness};
use crate::types::{Column, DataType, Dataset, Value};

/// |skew| below this is treated as symmetric.
pub const SKEW_LOW: f64 = 0.5;
/// |skew| at or above this is classified high.
pub const SKEW_HIGH: f64 = 1.0;

const HISTOGRAM_BINS: usize = 10;

/// Transform applicable to a numeric column. Each overwrites the column's
/// values in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformMethod {
    /// Natural log; requires strictly positive values.
    Log,
    /// Square root; requires non-negative values.
    Sqrt,
    /// 1/x; requires non-zero values.
    Reciprocal,
    /// x².
    Square,
    /// Fitted single-parameter power transform; requires strictly positive
    /// values.
    Boxcox,
    /// Generalized power transform, tolerant of zero/negative values.
    Yeojohnson,
}

impl TransformMethod {
    /// Stable wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Sqrt => "sqrt",
            Self::Reciprocal => "reciprocal",
            Self::Square => "square",
            Self::Boxcox => "boxcox",
            Self::Yeojohnson => "yeojohnson",
        }
    }
}

/// Histogram bin data for an external renderer.
#[derive(Debug, Clone, Serialize)]
pub struct Histogram {
    pub bin_edges: Vec<f64>,
    pub counts: Vec<usize>,
}

/// Analysis of one numeric column.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSkewness {
    pub column: String,
    pub skewness: f64,
    /// Excess kurtosis.
    pub kurtosis: f64,
    /// "normal" | "moderate" | "high".
    pub classification: String,
    /// "symmetric" | "right_skewed" | "left_skewed".
    pub direction: String,
    /// Wire name of the recommended transform, or "none".
    pub recommended_transformation: String,
    pub histogram: Histogram,
}

/// The `analyze-skewness` response.
#[derive(Debug, Clone, Serialize)]
pub struct SkewnessReport {
    pub columns: Vec<ColumnSkewness>,
}

/// Compute skewness/kurtosis for every numeric column and recommend a
/// transform per the heuristic:
/// symmetric → none; zero/negative values present → yeojohnson; high positive
/// skew → log; moderate positive → sqrt; otherwise → boxcox.
pub fn analyze(dataset: &Dataset) -> SkewnessReport {
    let columns = dataset
        .columns()
        .iter()
        .filter(|c| c.dtype.is_numeric())
        .map(|col| {
            let xs = col.numeric_values();
            let skew = skewness(&xs).unwrap_or(0.0);
            let kurt = kurtosis(&xs).unwrap_or(0.0);
            ColumnSkewness {
                column: col.name.clone(),
                skewness: skew,
                kurtosis: kurt,
                classification: classify(skew).to_owned(),
                direction: direction(skew).to_owned(),
                recommended_transformation: recommend(skew, &xs)
                    .map(TransformMethod::as_str)
                    .unwrap_or("none")
                    .to_owned(),
                histogram: histogram(&xs),
            }
        })
        .collect();
    SkewnessReport { columns }
}

fn classify(skew: f64) -> &'static str {
    let a = skew.abs();
    if a < SKEW_LOW {
        "normal"
    } else if a < SKEW_HIGH {
        "moderate"
    } else {
        "high"
    }
}

fn direction(skew: f64) -> &'static str {
    if skew > SKEW_LOW {
        "right_skewed"
    } else if skew < -SKEW_LOW {
        "left_skewed"
    } else {
        "symmetric"
    }
}

fn recommend(skew: f64, xs: &[f64]) -> Option<TransformMethod> {
    if skew.abs() < SKEW_LOW || xs.is_empty() {
        return None;
    }
    let all_positive = xs.iter().all(|&x| x > 0.0);
    if !all_positive {
        return Some(TransformMethod::Yeojohnson);
    }
    if skew >= SKEW_HIGH {
        return Some(TransformMethod::Log);
    }
    if skew >= SKEW_LOW {
        return Some(TransformMethod::Sqrt);
    }
    Some(TransformMethod::Boxcox)
}

/// Equal-width histogram bins over the values (renderer input data).
pub fn histogram(xs: &[f64]) -> Histogram {
    if xs.is_empty() {
        return Histogram { bin_edges: Vec::new(), counts: Vec::new() };
    }
    let min = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() <= f64::EPSILON {
        return Histogram { bin_edges: vec![min, max], counts: vec![xs.len()] };
    }
    let width = (max - min) / HISTOGRAM_BINS as f64;
    let bin_edges: Vec<f64> = (0..=HISTOGRAM_BINS).map(|i| min + width * i as f64).collect();
    let mut counts = vec![0usize; HISTOGRAM_BINS];
    for &x in xs {
        let idx = (((x - min) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[idx] += 1;
    }
    Histogram { bin_edges, counts }
}

/// Apply a batch of transforms, one per column, atomically. Every entry is
/// domain-checked before any column changes.
pub fn apply_transformations(
    dataset: &Dataset,
    transformations: &BTreeMap<String, TransformMethod>,
) -> CleaningResult<(Dataset, OperationRecord)> {
    if transformations.is_empty() {
        return Err(CleaningError::EmptySelection {
            message: "no transformations selected".to_owned(),
        });
    }
    for (name, method) in transformations {
        let col = dataset.require(name)?;
        if !col.dtype.is_numeric() {
            return Err(CleaningError::IncompatibleMethod {
                method: method.as_str().to_owned(),
                column: name.clone(),
                dtype: col.dtype.as_str().to_owned(),
            });
        }
        check_domain(name, *method, &col.numeric_values())?;
    }

    let mut out = dataset.clone();
    for (name, method) in transformations {
        let col = out.require(name)?;
        let transform = column_transform(*method, &col.numeric_values());
        let values: Vec<Value> = col
            .values()
            .iter()
            .map(|v| match v.as_f64() {
                Some(x) => Value::Float(transform(x)),
                None => v.clone(),
            })
            .collect();
        out = out.with_column_replaced(
            name,
            Column::with_dtype(name.clone(), DataType::Float, values),
        )?;
    }

    let applied: BTreeMap<&String, &'static str> =
        transformations.iter().map(|(k, m)| (k, m.as_str())).collect();
    let record = OperationRecord::new(
        OperationType::ApplyTransformations,
        format!("Applied {} skewness transformation(s)", transformations.len()),
        details(vec![("transformations", json!(applied))]),
    );
    Ok((out, record))
}

fn check_domain(column: &str, method: TransformMethod, xs: &[f64]) -> CleaningResult<()> {
    let fail = |message: &str| {
        Err(CleaningError::DomainError {
            column: column.to_owned(),
            message: message.to_owned(),
        })
    };
    match method {
        TransformMethod::Log | TransformMethod::Boxcox if xs.iter().any(|&x| x <= 0.0) => {
            fail("requires strictly positive values; use yeojohnson instead")
        }
        TransformMethod::Sqrt if xs.iter().any(|&x| x < 0.0) => {
            fail("requires non-negative values")
        }
        TransformMethod::Reciprocal if xs.iter().any(|&x| x == 0.0) => {
            fail("requires non-zero values")
        }
        _ => Ok(()),
    }
}

/// Build the per-value transform, fitting λ once per column for the power
/// transforms.
fn column_transform(method: TransformMethod, xs: &[f64]) -> Box<dyn Fn(f64) -> f64> {
    match method {
        TransformMethod::Log => Box::new(f64::ln),
        TransformMethod::Sqrt => Box::new(f64::sqrt),
        TransformMethod::Reciprocal => Box::new(|x| 1.0 / x),
        TransformMethod::Square => Box::new(|x| x * x),
        TransformMethod::Boxcox => {
            let lambda = fit_box_cox_lambda(xs);
            Box::new(move |x| box_cox(x, lambda))
        }
        TransformMethod::Yeojohnson => {
            let lambda = fit_yeo_johnson_lambda(xs);
            Box::new(move |x| yeo_johnson(x, lambda))
        }
    }
}

fn box_cox(x: f64, lambda: f64) -> f64 {
    if lambda.abs() < 1e-12 {
        x.ln()
    } else {
        (x.powf(lambda) - 1.0) / lambda
    }
}

fn yeo_johnson(x: f64, lambda: f64) -> f64 {
    if x >= 0.0 {
        if lambda.abs() < 1e-12 {
            (x + 1.0).ln()
        } else {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        }
    } else if (lambda - 2.0).abs() < 1e-12 {
        -(-x + 1.0).ln()
    } else {
        -((-x + 1.0).powf(2.0 - lambda) - 1.0) / (2.0 - lambda)
    }
}

/// Maximize the Box-Cox log-likelihood over a λ grid.
fn fit_box_cox_lambda(xs: &[f64]) -> f64 {
    fit_lambda(xs, |xs, lambda| {
        let y: Vec<f64> = xs.iter().map(|&x| box_cox(x, lambda)).collect();
        let log_jacobian: f64 = xs.iter().map(|&x| x.ln()).sum();
        log_likelihood(&y, lambda, log_jacobian)
    })
}

fn fit_yeo_johnson_lambda(xs: &[f64]) -> f64 {
    fit_lambda(xs, |xs, lambda| {
        let y: Vec<f64> = xs.iter().map(|&x| yeo_johnson(x, lambda)).collect();
        let log_jacobian: f64 = xs.iter().map(|&x| x.signum() * (x.abs() + 1.0).ln()).sum();
        log_likelihood(&y, lambda, log_jacobian)
    })
}

fn log_likelihood(y: &[f64], lambda: f64, log_jacobian: f64) -> f64 {
    let n = y.len() as f64;
    let m = mean(y).unwrap_or(0.0);
    let var = y.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n;
    if var <= 0.0 {
        return f64::NEG_INFINITY;
    }
    -n / 2.0 * var.ln() + (lambda - 1.0) * log_jacobian
}

fn fit_lambda(xs: &[f64], llf: impl Fn(&[f64], f64) -> f64) -> f64 {
    if xs.len() < 2 {
        return 1.0;
    }
    let mut best_lambda = 1.0;
    let mut best = f64::NEG_INFINITY;
    let mut lambda = -2.0;
    while lambda <= 2.0 + 1e-9 {
        let score = llf(xs, lambda);
        if score > best {
            best = score;
            best_lambda = lambda;
        }
        lambda += 0.01;
    }
    best_lambda
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(name: &str, xs: &[f64]) -> Column {
        Column::new(name, xs.iter().map(|&x| Value::Float(x)).collect())
    }

    #[test]
    fn symmetric_column_classified_normal_no_transform() {
        let ds = Dataset::new(vec![numeric("x", &[1.0, 2.0, 3.0, 4.0, 5.0])]).unwrap();
        let report = analyze(&ds);
        let col = &report.columns[0];
        assert!(col.skewness.abs() < 1e-9);
        assert_eq!(col.classification, "normal");
        assert_eq!(col.direction, "symmetric");
        assert_eq!(col.recommended_transformation, "none");
    }

    #[test]
    fn high_positive_skew_recommends_log() {
        let mut xs: Vec<f64> = vec![1.0; 30];
        xs.extend([50.0, 80.0, 120.0]);
        let ds = Dataset::new(vec![numeric("x", &xs)]).unwrap();
        let report = analyze(&ds);
        assert_eq!(report.columns[0].classification, "high");
        assert_eq!(report.columns[0].recommended_transformation, "log");
    }

    #[test]
    fn negative_values_recommend_yeojohnson() {
        let mut xs: Vec<f64> = vec![-1.0, 0.0, 0.5, 1.0];
        xs.extend(vec![0.1; 20]);
        xs.extend([40.0, 90.0]);
        let ds = Dataset::new(vec![numeric("x", &xs)]).unwrap();
        let report = analyze(&ds);
        assert_eq!(report.columns[0].recommended_transformation, "yeojohnson");
    }

    #[test]
    fn log_reduces_right_skew() {
        let xs: Vec<f64> = (0..50).map(|i| (i as f64 / 5.0).exp()).collect();
        let ds = Dataset::new(vec![numeric("x", &xs)]).unwrap();
        let before = analyze(&ds).columns[0].skewness;

        let mut req = BTreeMap::new();
        req.insert("x".to_string(), TransformMethod::Log);
        let (out, _) = apply_transformations(&ds, &req).unwrap();
        let after = analyze(&out).columns[0].skewness;
        assert!(after.abs() < before.abs());
    }

    #[test]
    fn log_rejects_nonpositive_column() {
        let ds = Dataset::new(vec![numeric("x", &[0.0, 1.0, 2.0])]).unwrap();
        let mut req = BTreeMap::new();
        req.insert("x".to_string(), TransformMethod::Log);
        assert!(matches!(
            apply_transformations(&ds, &req),
            Err(CleaningError::DomainError { .. })
        ));
    }

    #[test]
    fn sqrt_rejects_negative_reciprocal_rejects_zero() {
        let ds = Dataset::new(vec![numeric("x", &[-1.0, 4.0])]).unwrap();
        let mut req = BTreeMap::new();
        req.insert("x".to_string(), TransformMethod::Sqrt);
        assert!(apply_transformations(&ds, &req).is_err());

        let ds = Dataset::new(vec![numeric("x", &[0.0, 4.0])]).unwrap();
        let mut req = BTreeMap::new();
        req.insert("x".to_string(), TransformMethod::Reciprocal);
        assert!(apply_transformations(&ds, &req).is_err());
    }

    #[test]
    fn square_overwrites_in_place() {
        let ds = Dataset::new(vec![numeric("x", &[2.0, 3.0]), numeric("y", &[1.0, 1.0])]).unwrap();
        let mut req = BTreeMap::new();
        req.insert("x".to_string(), TransformMethod::Square);
        let (out, _) = apply_transformations(&ds, &req).unwrap();
        assert_eq!(out.column_count(), 2);
        assert_eq!(out.column("x").unwrap().numeric_values(), vec![4.0, 9.0]);
    }

    #[test]
    fn batch_with_one_bad_entry_changes_nothing() {
        let ds = Dataset::new(vec![numeric("x", &[1.0, 2.0]), numeric("y", &[0.0, 1.0])]).unwrap();
        let mut req = BTreeMap::new();
        req.insert("x".to_string(), TransformMethod::Log);
        req.insert("y".to_string(), TransformMethod::Log); // 0.0 is out of domain
        assert!(apply_transformations(&ds, &req).is_err());
    }

    #[test]
    fn boxcox_handles_skewed_positive_data() {
        let xs: Vec<f64> = (1..=60).map(|i| (i as f64 / 8.0).exp()).collect();
        let ds = Dataset::new(vec![numeric("x", &xs)]).unwrap();
        let before = analyze(&ds).columns[0].skewness;
        let mut req = BTreeMap::new();
        req.insert("x".to_string(), TransformMethod::Boxcox);
        let (out, _) = apply_transformations(&ds, &req).unwrap();
        let after = analyze(&out).columns[0].skewness;
        assert!(after.abs() < before.abs());
    }

    #[test]
    fn yeojohnson_tolerates_negative_values() {
        let xs: Vec<f64> = vec![-3.0, -1.0, 0.0, 1.0, 2.0, 50.0, 80.0];
        let ds = Dataset::new(vec![numeric("x", &xs)]).unwrap();
        let mut req = BTreeMap::new();
        req.insert("x".to_string(), TransformMethod::Yeojohnson);
        let (out, _) = apply_transformations(&ds, &req).unwrap();
        assert_eq!(out.column("x").unwrap().numeric_values().len(), xs.len());
    }

    #[test]
    fn histogram_covers_all_values() {
        let xs: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let h = histogram(&xs);
        assert_eq!(h.counts.iter().sum::<usize>(), 100);
        assert_eq!(h.bin_edges.len(), h.counts.len() + 1);
    }
}
