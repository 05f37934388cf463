//! The engine facade: one method per catalogue operation, all routed through
//! a shared [`SessionStore`].
//!
//! Analysis methods read a snapshot and never log; each mutating method
//! appends exactly one [`crate::session::OperationRecord`] and swaps the
//! dataset atomically. A transport layer maps these methods 1:1 onto its
//! routes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::error::CleaningResult;
use crate::export::{self, CsvDownload, SaveOutcome};
use crate::ops::columns::{self, ValueStandardization};
use crate::ops::duplicates::{self, DuplicateCheck, KeepStrategy};
use crate::ops::encoding::{self, EncodingOperation, EncodingReport};
use crate::ops::impute::{self, ImputeRule};
use crate::ops::integrity::{self, IntegrityAction, IntegrityReport};
use crate::ops::outliers::{self, OutlierColumnSummary, OutlierRuleSpec};
use crate::ops::skewness::{self, SkewnessReport, TransformMethod};
use crate::report::{self, CleaningReport, FinalPreview};
use crate::session::{details, OperationRecord, OperationType, SessionStore, SessionToken};
use crate::stats::{ColumnAnalysis, ColumnDescription, DatasetInfo, StatisticsAnalyzer};
use crate::types::Dataset;
use crate::visualization::{
    self, CorrelationMatrix, PlotKind, PlotOptions, PlotResponse, ValidYColumns,
};

/// Response common to every mutating operation.
#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    pub message: String,
    pub shape: (usize, usize),
    pub columns: Vec<String>,
}

/// Outcome of an upload handoff.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub filename: String,
    pub shape: (usize, usize),
    pub columns: Vec<String>,
}

/// Row-major view of the current dataset.
#[derive(Debug, Clone, Serialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub data: Vec<Vec<crate::types::Value>>,
}

/// Session-scoped data-cleaning engine.
pub struct Engine {
    store: Arc<SessionStore>,
    export_dir: PathBuf,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with a fresh store, exporting to the working directory.
    pub fn new() -> Self {
        Self {
            store: Arc::new(SessionStore::new()),
            export_dir: PathBuf::from("."),
        }
    }

    /// Engine over an existing store (e.g. one carrying an observer).
    pub fn with_store(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            export_dir: PathBuf::from("."),
        }
    }

    /// Set the directory save-changes writes into.
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    /// Shared store handle.
    pub fn store(&self) -> Arc<SessionStore> {
        Arc::clone(&self.store)
    }

    // ── upload handoff ───────────────────────────────────────────────

    /// Accept the upload collaborator's parsed tabular form and start (or
    /// reset) the session.
    pub fn upload_raw(
        &self,
        token: &SessionToken,
        filename: &str,
        column_names: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    ) -> CleaningResult<UploadOutcome> {
        let dataset = Dataset::from_raw(column_names, rows)?;
        self.upload_dataset(token, filename, dataset)
    }

    /// Accept an already-typed dataset.
    pub fn upload_dataset(
        &self,
        token: &SessionToken,
        filename: &str,
        dataset: Dataset,
    ) -> CleaningResult<UploadOutcome> {
        let outcome = UploadOutcome {
            filename: filename.to_owned(),
            shape: dataset.shape(),
            columns: dataset.column_names(),
        };
        self.store.initialize(token, dataset, filename);
        Ok(outcome)
    }

    // ── analysis (read-only, never logged) ───────────────────────────

    /// Dataset info summary.
    pub fn info(&self, token: &SessionToken) -> CleaningResult<DatasetInfo> {
        let ds = self.store.current(token)?;
        let filename = self.store.source_filename(token)?;
        Ok(StatisticsAnalyzer::info(&ds, &filename))
    }

    /// Descriptive statistics per numeric column.
    pub fn describe(&self, token: &SessionToken) -> CleaningResult<Vec<ColumnDescription>> {
        Ok(StatisticsAnalyzer::describe(&self.store.current(token)?))
    }

    /// Full analysis of one column.
    pub fn column_analysis(
        &self,
        token: &SessionToken,
        column: &str,
    ) -> CleaningResult<ColumnAnalysis> {
        StatisticsAnalyzer::column_analysis(&self.store.current(token)?, column)
    }

    /// Row-major data view, optionally capped.
    pub fn data(&self, token: &SessionToken, limit: Option<usize>) -> CleaningResult<TableData> {
        let ds = self.store.current(token)?;
        let rows = limit.unwrap_or(ds.row_count()).min(ds.row_count());
        Ok(TableData {
            columns: ds.column_names(),
            data: (0..rows).map(|r| ds.row(r)).collect(),
        })
    }

    /// Read-only outlier scan (z-score + IQR counts per numeric column).
    pub fn detect_outliers(
        &self,
        token: &SessionToken,
        columns: &[String],
    ) -> CleaningResult<BTreeMap<String, OutlierColumnSummary>> {
        outliers::detect(&self.store.current(token)?, columns)
    }

    /// Duplicate check.
    pub fn check_duplicates(&self, token: &SessionToken) -> CleaningResult<DuplicateCheck> {
        Ok(duplicates::check(&self.store.current(token)?))
    }

    /// Skewness analysis over numeric columns.
    pub fn analyze_skewness(&self, token: &SessionToken) -> CleaningResult<SkewnessReport> {
        Ok(skewness::analyze(&self.store.current(token)?))
    }

    /// Encoding candidates per classification.
    pub fn analyze_encoding(&self, token: &SessionToken) -> CleaningResult<EncodingReport> {
        Ok(encoding::analyze(&self.store.current(token)?))
    }

    /// Integrity issues over every column.
    pub fn analyze_data_integrity(
        &self,
        token: &SessionToken,
    ) -> CleaningResult<IntegrityReport> {
        Ok(integrity::analyze(&self.store.current(token)?))
    }

    /// Valid Y-axis columns for a chosen X.
    pub fn valid_y_columns(
        &self,
        token: &SessionToken,
        x_axis: &str,
    ) -> CleaningResult<ValidYColumns> {
        visualization::valid_y_columns(&self.store.current(token)?, x_axis)
    }

    /// Applicable plot kinds for an axis combination.
    pub fn plot_options(
        &self,
        token: &SessionToken,
        x_axis: &str,
        y_axis: Option<&str>,
    ) -> CleaningResult<PlotOptions> {
        visualization::plot_options(&self.store.current(token)?, x_axis, y_axis)
    }

    /// Plot data for the renderer.
    pub fn plot(
        &self,
        token: &SessionToken,
        x_axis: &str,
        y_axis: Option<&str>,
        kind: PlotKind,
    ) -> CleaningResult<PlotResponse> {
        visualization::plot(&self.store.current(token)?, x_axis, y_axis, kind)
    }

    /// Pearson correlation matrix (sampled when large).
    pub fn correlation(&self, token: &SessionToken) -> CleaningResult<CorrelationMatrix> {
        Ok(visualization::correlation(&self.store.current(token)?))
    }

    /// Final preview rows plus quality summary.
    pub fn final_preview(&self, token: &SessionToken) -> CleaningResult<FinalPreview> {
        Ok(report::final_preview(&self.store.current(token)?))
    }

    /// Full cleaning report.
    pub fn generate_report(&self, token: &SessionToken) -> CleaningResult<CleaningReport> {
        let ds = self.store.current(token)?;
        let log = self.store.log(token)?;
        let filename = self.store.source_filename(token)?;
        let original_shape = self.store.original_shape(token)?;
        Ok(report::generate(&ds, &log, &filename, original_shape))
    }

    // ── mutations (one log record each) ──────────────────────────────

    /// Drop the named columns.
    pub fn drop_columns(
        &self,
        token: &SessionToken,
        names: &[String],
    ) -> CleaningResult<MutationOutcome> {
        self.run_mutation(token, |ds| columns::drop_columns(ds, names))
    }

    /// Rename columns and standardize values, atomically.
    pub fn standardize_columns(
        &self,
        token: &SessionToken,
        rename: &BTreeMap<String, String>,
        value_ops: &BTreeMap<String, ValueStandardization>,
    ) -> CleaningResult<MutationOutcome> {
        self.run_mutation(token, |ds| columns::standardize_columns(ds, rename, value_ops))
    }

    /// Impute missing values.
    pub fn impute_missing(
        &self,
        token: &SessionToken,
        rules: &[ImputeRule],
    ) -> CleaningResult<MutationOutcome> {
        self.run_mutation(token, |ds| impute::impute_missing(ds, rules))
    }

    /// Apply outlier rules.
    pub fn remove_outliers(
        &self,
        token: &SessionToken,
        rules: &[OutlierRuleSpec],
    ) -> CleaningResult<MutationOutcome> {
        self.run_mutation(token, |ds| outliers::remove_outliers(ds, rules))
    }

    /// Remove duplicate rows.
    pub fn remove_duplicates(
        &self,
        token: &SessionToken,
        keep: KeepStrategy,
    ) -> CleaningResult<MutationOutcome> {
        self.run_mutation(token, |ds| duplicates::remove(ds, keep))
    }

    /// Apply skewness transformations.
    pub fn apply_transformations(
        &self,
        token: &SessionToken,
        transformations: &BTreeMap<String, TransformMethod>,
    ) -> CleaningResult<MutationOutcome> {
        self.run_mutation(token, |ds| skewness::apply_transformations(ds, transformations))
    }

    /// Apply encoding operations.
    pub fn apply_encoding(
        &self,
        token: &SessionToken,
        operations: &[EncodingOperation],
    ) -> CleaningResult<MutationOutcome> {
        self.run_mutation(token, |ds| encoding::apply_encoding(ds, operations))
    }

    /// Fix one column's integrity issues.
    pub fn fix_data_integrity(
        &self,
        token: &SessionToken,
        column: &str,
        action: IntegrityAction,
        replacement_value: Option<&str>,
    ) -> CleaningResult<MutationOutcome> {
        self.run_mutation(token, |ds| integrity::fix(ds, column, action, replacement_value))
    }

    fn run_mutation<F>(&self, token: &SessionToken, compute: F) -> CleaningResult<MutationOutcome>
    where
        F: FnOnce(&Dataset) -> CleaningResult<(Dataset, OperationRecord)>,
    {
        let mut message = String::new();
        let shape = self.store.mutate(token, |ds| {
            let (out, record) = compute(ds)?;
            message = record.description.clone();
            Ok((out, record))
        })?;
        let columns = self.store.current(token)?.column_names();
        Ok(MutationOutcome { message, shape, columns })
    }

    // ── export ───────────────────────────────────────────────────────

    /// Serialize the current dataset for download. Read-only.
    pub fn download_csv(&self, token: &SessionToken) -> CleaningResult<CsvDownload> {
        let ds = self.store.current(token)?;
        let filename = self.store.source_filename(token)?;
        export::download_csv(&ds, &filename)
    }

    /// Persist the current dataset under a name, logging the save.
    pub fn save_changes(
        &self,
        token: &SessionToken,
        filename: Option<&str>,
    ) -> CleaningResult<SaveOutcome> {
        let ds = self.store.current(token)?;
        let original = self.store.source_filename(token)?;
        let outcome = export::save(&ds, &self.export_dir, filename, &original)?;
        self.store.append_record(
            token,
            OperationRecord::new(
                OperationType::SaveChanges,
                outcome.message.clone(),
                details(vec![
                    ("filename", json!(outcome.filename)),
                    ("file_size_bytes", json!(outcome.file_size_bytes)),
                    ("rows", json!(outcome.shape.0)),
                    ("columns", json!(outcome.shape.1)),
                ]),
            ),
        )?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CleaningError;

    fn upload(engine: &Engine, token: &SessionToken) {
        engine
            .upload_raw(
                token,
                "people.csv",
                vec!["id".into(), "age".into(), "city".into()],
                vec![
                    vec![Some("1".into()), Some("25".into()), Some("NY".into())],
                    vec![Some("2".into()), None, Some("LA".into())],
                    vec![Some("3".into()), Some("25".into()), Some("ny".into())],
                ],
            )
            .unwrap();
    }

    #[test]
    fn operations_before_upload_fail_with_no_active_session() {
        let engine = Engine::new();
        let token = SessionToken::default();
        assert!(matches!(engine.info(&token), Err(CleaningError::NoActiveSession)));
        assert!(matches!(
            engine.check_duplicates(&token),
            Err(CleaningError::NoActiveSession)
        ));
    }

    #[test]
    fn upload_then_info_round_trip() {
        let engine = Engine::new();
        let token = SessionToken::default();
        upload(&engine, &token);
        let info = engine.info(&token).unwrap();
        assert_eq!(info.shape, (3, 3));
        assert_eq!(info.missing_values.get("age"), Some(&1));
        assert_eq!(info.filename, "people.csv");
    }

    #[test]
    fn mutation_returns_outcome_and_logs_once() {
        let engine = Engine::new();
        let token = SessionToken::default();
        upload(&engine, &token);
        let outcome = engine.drop_columns(&token, &["city".to_string()]).unwrap();
        assert_eq!(outcome.shape, (3, 2));
        assert_eq!(outcome.columns, vec!["id", "age"]);
        assert_eq!(engine.store().log(&token).unwrap().len(), 1);
    }

    #[test]
    fn analysis_does_not_log() {
        let engine = Engine::new();
        let token = SessionToken::default();
        upload(&engine, &token);
        let _ = engine.info(&token).unwrap();
        let _ = engine.check_duplicates(&token).unwrap();
        let _ = engine.analyze_skewness(&token).unwrap();
        assert!(engine.store().log(&token).unwrap().is_empty());
    }

    #[test]
    fn download_never_mutates() {
        let engine = Engine::new();
        let token = SessionToken::default();
        upload(&engine, &token);
        let dl = engine.download_csv(&token).unwrap();
        assert_eq!(dl.filename, "people_cleaned.csv");
        assert_eq!(engine.info(&token).unwrap().shape, (3, 3));
        assert!(engine.store().log(&token).unwrap().is_empty());
    }
}
