//! `rust-data-cleaning` is a session-scoped tabular data-cleaning and
//! transformation engine: it holds one working [`types::Dataset`] per
//! session, applies a sequence of stateful cleaning operations to it, and
//! produces derived artifacts (statistics, plot data, correlation matrices,
//! a quality report, a CSV export).
//!
//! The primary entrypoint is [`engine::Engine`], which exposes one method per
//! operation in the catalogue. Transport (HTTP, CLI) and file parsing are
//! external collaborators: an upload hands the engine a parsed tabular
//! structure and everything else happens against the in-memory dataset.
//!
//! ## What the engine does
//!
//! **Mutations** (each swaps in a new dataset and appends one
//! [`session::OperationRecord`]):
//!
//! - drop / rename / standardize columns ([`ops::columns`])
//! - missing-value imputation ([`ops::impute`])
//! - outlier removal, capping, and transforms ([`ops::outliers`])
//! - duplicate-row removal ([`ops::duplicates`])
//! - skewness transforms, Box-Cox and Yeo-Johnson included ([`ops::skewness`])
//! - categorical/text/datetime encoding ([`ops::encoding`])
//! - integrity fixes ([`ops::integrity`])
//!
//! **Analysis** (read-only, recomputed per call, never cached):
//!
//! - shape, dtypes, missing counts, descriptive statistics ([`stats`])
//! - duplicate and outlier scans, skewness and encoding candidates
//! - integrity issues with severity and suggestions
//! - plot data and Pearson correlation ([`visualization`])
//! - the final report with generated insights ([`report`])
//!
//! ## Quick example
//!
//! ```
//! use rust_data_cleaning::engine::Engine;
//! use rust_data_cleaning::ops::impute::{ImputeMethod, ImputeRule};
//! use rust_data_cleaning::session::SessionToken;
//!
//! # fn main() -> Result<(), rust_data_cleaning::CleaningError> {
//! let engine = Engine::new();
//! let token = SessionToken::default();
//!
//! // The upload collaborator hands over parsed tabular text.
//! engine.upload_raw(
//!     &token,
//!     "ages.csv",
//!     vec!["age".into()],
//!     vec![vec![Some("25".into())], vec![None], vec![Some("35".into())]],
//! )?;
//!
//! engine.impute_missing(
//!     &token,
//!     &[ImputeRule {
//!         column: "age".into(),
//!         method: ImputeMethod::Mean,
//!         custom_value: None,
//!     }],
//! )?;
//!
//! assert_eq!(engine.info(&token)?.missing_values.len(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Sessions and concurrency
//!
//! A [`session::SessionStore`] owns every live session, keyed by an opaque
//! [`session::SessionToken`] (single-user deployments just use the default
//! token). Mutations run read-compute-swap under a single writer lock;
//! readers clone the Arc-backed dataset and always observe a consistent
//! snapshot. Every mutating batch validates fully before applying, so a
//! failed request leaves the session unchanged.
//!
//! ## Modules
//!
//! - [`engine`]: the operation-catalogue facade
//! - [`types`]: values, columns, dataset, type inference
//! - [`session`]: session store, operation log, observers
//! - [`stats`]: numeric kernel + statistics analyzer
//! - [`ops`]: the mutating operation engines
//! - [`visualization`]: plot data and correlation
//! - [`report`]: quality report and insights
//! - [`export`]: CSV download and save-changes
//! - [`error`]: the crate-wide error taxonomy

pub mod engine;
pub mod error;
pub mod export;
pub mod ops;
pub mod report;
pub mod session;
pub mod stats;
pub mod types;
pub mod visualization;

pub use error::{CleaningError, CleaningResult};
