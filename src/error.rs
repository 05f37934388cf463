use thiserror::Error;

/// Convenience result type for cleaning operations.
pub type CleaningResult<T> = Result<T, CleaningError>;

/// Error type returned by every engine operation.
///
/// This is a single error enum shared across the session store, the analysis
/// components, and the mutating operation engines. Every mutating batch
/// validates all of its entries before applying any of them, so an error
/// always means the session dataset is unchanged.
#[derive(Debug, Error)]
pub enum CleaningError {
    /// An operation was attempted before any dataset was uploaded.
    #[error("no active session: upload a dataset first")]
    NoActiveSession,

    /// A named column does not exist in the current dataset.
    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },

    /// A selection-based operation received an empty selection.
    #[error("empty selection: {message}")]
    EmptySelection { message: String },

    /// A proposed column name is not a valid identifier.
    #[error("invalid column name '{name}': must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidColumnName { name: String },

    /// A rename would produce a duplicate column name.
    #[error("duplicate column name '{name}' after rename")]
    DuplicateColumnName { name: String },

    /// A method is not applicable to the column's data type.
    #[error("method '{method}' is not valid for column '{column}' ({dtype})")]
    IncompatibleMethod {
        method: String,
        column: String,
        dtype: String,
    },

    /// A detection method requires a caller-supplied threshold.
    #[error("method '{method}' requires an explicit threshold")]
    MissingThreshold { method: String },

    /// A replace remediation was requested without a replacement value.
    #[error("replace action requires a replacement value")]
    MissingReplacementValue,

    /// Target encoding was requested without a target column.
    #[error("target encoding requires a target column")]
    MissingTargetColumn,

    /// A transform is mathematically undefined for the values present.
    #[error("domain error on column '{column}': {message}")]
    DomainError { column: String, message: String },

    /// A zero-variance column cannot be scaled.
    #[error("column '{column}' is degenerate (zero variance)")]
    DegenerateColumn { column: String },

    /// A batch entry is malformed or names a method invalid for its column.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Underlying I/O error (e.g. export target not writable).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization error during export.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl CleaningError {
    /// Short machine-readable kind tag, used by transports for structured
    /// error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoActiveSession => "no_active_session",
            Self::UnknownColumn { .. } => "unknown_column",
            Self::EmptySelection { .. } => "empty_selection",
            Self::InvalidColumnName { .. } => "invalid_column_name",
            Self::DuplicateColumnName { .. } => "duplicate_column_name",
            Self::IncompatibleMethod { .. } => "incompatible_method",
            Self::MissingThreshold { .. } => "missing_threshold",
            Self::MissingReplacementValue => "missing_replacement_value",
            Self::MissingTargetColumn => "missing_target_column",
            Self::DomainError { .. } => "domain_error",
            Self::DegenerateColumn { .. } => "degenerate_column",
            Self::InvalidOperation { .. } => "invalid_operation",
            Self::Io(_) => "io_error",
            Self::Csv(_) => "csv_error",
        }
    }
}
