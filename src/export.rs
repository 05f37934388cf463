//! Export surface: CSV serialization of the current dataset, as a byte
//! stream for download or written to a file for save-changes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CleaningResult;
use crate::types::Dataset;

/// Result of a save-changes request.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub filename: String,
    pub path: PathBuf,
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    pub file_size_bytes: u64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// A CSV byte stream plus its suggested download filename.
#[derive(Debug, Clone)]
pub struct CsvDownload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Serialize the dataset to CSV. Null cells become empty fields.
pub fn to_csv_bytes(dataset: &Dataset) -> CleaningResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(dataset.column_names())?;
    for row in 0..dataset.row_count() {
        let record: Vec<String> = dataset
            .columns()
            .iter()
            .map(|c| c.values()[row].to_field())
            .collect();
        writer.write_record(&record)?;
    }
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

/// `<stem>_cleaned.csv` from the original upload name.
pub fn cleaned_filename(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("dataset");
    format!("{stem}_cleaned.csv")
}

/// CSV bytes plus the suggested download name. Never mutates the session.
pub fn download_csv(dataset: &Dataset, original_filename: &str) -> CleaningResult<CsvDownload> {
    Ok(CsvDownload {
        filename: cleaned_filename(original_filename),
        bytes: to_csv_bytes(dataset)?,
    })
}

/// Write the dataset to `dir`, defaulting the name to the cleaned form of the
/// original upload name.
pub fn save(
    dataset: &Dataset,
    dir: &Path,
    filename: Option<&str>,
    original_filename: &str,
) -> CleaningResult<SaveOutcome> {
    let filename = filename
        .filter(|s| !s.trim().is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| cleaned_filename(original_filename));
    let path = dir.join(&filename);
    let bytes = to_csv_bytes(dataset)?;
    std::fs::write(&path, &bytes)?;
    Ok(SaveOutcome {
        shape: dataset.shape(),
        columns: dataset.column_names(),
        file_size_bytes: bytes.len() as u64,
        timestamp: Utc::now(),
        message: format!("Saved {} row(s) to {filename}", dataset.row_count()),
        filename,
        path,
    })
}
