//! Mutating operation engines.
//!
//! Every engine follows the same shape: validate the whole request against a
//! dataset snapshot, then produce `(new Dataset, OperationRecord)` for the
//! session store to swap in atomically. A validation error means nothing was
//! applied.

pub mod columns;
pub mod duplicates;
pub mod encoding;
pub mod impute;
pub mod integrity;
pub mod isolation_forest;
pub mod outliers;
pub mod skewness;
