//! Session ownership: the live [`Dataset`], its append-only operation log,
//! and observer hooks for committed/failed operations.
//!
//! A [`SessionStore`] is keyed by an opaque [`SessionToken`]. Single-user
//! deployments use [`SessionToken::default`], which selects one implicit
//! session; the token exists so a transport can layer isolation on top
//! without the engine hard-coding global state.
//!
//! Concurrency discipline: one `RwLock` guards the session map. Mutations run
//! read-compute-swap entirely under the write lock; readers clone the
//! Arc-backed dataset under the read lock and compute on a consistent
//! snapshot.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CleaningError, CleaningResult};
use crate::types::Dataset;

/// Opaque session identifier supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionToken(String);

impl SessionToken {
    /// Create a token from a caller-supplied string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionToken {
    /// The single implicit session used by single-user deployments.
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kinds of mutating operations, as recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    DropColumns,
    StandardizeColumns,
    ImputeMissing,
    RemoveOutliers,
    RemoveDuplicates,
    ApplyTransformations,
    ApplyEncoding,
    FixDataIntegrity,
    SaveChanges,
}

impl OperationType {
    /// Stable wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DropColumns => "drop_columns",
            Self::StandardizeColumns => "standardize_columns",
            Self::ImputeMissing => "impute_missing",
            Self::RemoveOutliers => "remove_outliers",
            Self::RemoveDuplicates => "remove_duplicates",
            Self::ApplyTransformations => "apply_transformations",
            Self::ApplyEncoding => "apply_encoding",
            Self::FixDataIntegrity => "fix_data_integrity",
            Self::SaveChanges => "save_changes",
        }
    }
}

/// One committed operation. Never mutated once appended.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    /// Operation kind.
    pub op_type: OperationType,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
    /// Human-readable one-liner for the report timeline.
    pub description: String,
    /// Structured parameters/outcomes for reporting.
    pub details: BTreeMap<String, serde_json::Value>,
}

impl OperationRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        op_type: OperationType,
        description: impl Into<String>,
        details: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            op_type,
            timestamp: Utc::now(),
            description: description.into(),
            details,
        }
    }
}

/// Build a details map from literal pairs.
pub fn details(pairs: Vec<(&str, serde_json::Value)>) -> BTreeMap<String, serde_json::Value> {
    pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
}

/// Observer interface for session lifecycle events.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait SessionObserver: Send + Sync {
    /// Called when a session is (re)initialized from an upload.
    fn on_initialized(&self, _filename: &str, _shape: (usize, usize)) {}

    /// Called after a mutation commits.
    fn on_operation(&self, _record: &OperationRecord, _shape: (usize, usize)) {}

    /// Called when a mutating batch fails validation or application.
    fn on_failure(&self, _operation: &str, _error: &CleaningError) {}
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeSessionObserver {
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl CompositeSessionObserver {
    /// Create a composite from a list of observers.
    pub fn new(observers: Vec<Arc<dyn SessionObserver>>) -> Self {
        Self { observers }
    }
}

impl SessionObserver for CompositeSessionObserver {
    fn on_initialized(&self, filename: &str, shape: (usize, usize)) {
        for o in &self.observers {
            o.on_initialized(filename, shape);
        }
    }

    fn on_operation(&self, record: &OperationRecord, shape: (usize, usize)) {
        for o in &self.observers {
            o.on_operation(record, shape);
        }
    }

    fn on_failure(&self, operation: &str, error: &CleaningError) {
        for o in &self.observers {
            o.on_failure(operation, error);
        }
    }
}

/// Logs session events to stderr.
#[derive(Debug, Default)]
pub struct StdErrSessionObserver;

impl SessionObserver for StdErrSessionObserver {
    fn on_initialized(&self, filename: &str, shape: (usize, usize)) {
        eprintln!("[session][init] file={filename} rows={} cols={}", shape.0, shape.1);
    }

    fn on_operation(&self, record: &OperationRecord, shape: (usize, usize)) {
        eprintln!(
            "[session][op] type={} rows={} cols={} desc={}",
            record.op_type.as_str(),
            shape.0,
            shape.1,
            record.description
        );
    }

    fn on_failure(&self, operation: &str, error: &CleaningError) {
        eprintln!("[session][fail] op={operation} err={error}");
    }
}

struct Session {
    dataset: Dataset,
    log: Vec<OperationRecord>,
    source_filename: String,
    original_shape: (usize, usize),
}

/// Owns every live session. All mutating operations are expressed as
/// "compute a new dataset from the current one, then swap it in and append a
/// record" — see [`SessionStore::mutate`].
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionToken, Session>>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            observer: None,
        }
    }

    /// Attach an observer for session events.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Create (or wholesale reset) the session for `token` from an uploaded
    /// dataset. Clears any previous log.
    pub fn initialize(&self, token: &SessionToken, dataset: Dataset, filename: &str) {
        let shape = dataset.shape();
        let session = Session {
            dataset,
            log: Vec::new(),
            source_filename: filename.to_owned(),
            original_shape: shape,
        };
        self.sessions
            .write()
            .expect("session lock poisoned")
            .insert(token.clone(), session);
        if let Some(obs) = &self.observer {
            obs.on_initialized(filename, shape);
        }
    }

    /// Snapshot of the live dataset (cheap: shares column storage).
    pub fn current(&self, token: &SessionToken) -> CleaningResult<Dataset> {
        let sessions = self.sessions.read().expect("session lock poisoned");
        sessions
            .get(token)
            .map(|s| s.dataset.clone())
            .ok_or(CleaningError::NoActiveSession)
    }

    /// Original upload filename.
    pub fn source_filename(&self, token: &SessionToken) -> CleaningResult<String> {
        let sessions = self.sessions.read().expect("session lock poisoned");
        sessions
            .get(token)
            .map(|s| s.source_filename.clone())
            .ok_or(CleaningError::NoActiveSession)
    }

    /// Shape at upload time.
    pub fn original_shape(&self, token: &SessionToken) -> CleaningResult<(usize, usize)> {
        let sessions = self.sessions.read().expect("session lock poisoned");
        sessions
            .get(token)
            .map(|s| s.original_shape)
            .ok_or(CleaningError::NoActiveSession)
    }

    /// Copy of the operation log.
    pub fn log(&self, token: &SessionToken) -> CleaningResult<Vec<OperationRecord>> {
        let sessions = self.sessions.read().expect("session lock poisoned");
        sessions
            .get(token)
            .map(|s| s.log.clone())
            .ok_or(CleaningError::NoActiveSession)
    }

    /// Run a mutation: `compute` receives the current dataset and returns the
    /// replacement plus its log record. The swap and the append happen
    /// atomically under the write lock; on error nothing changes.
    ///
    /// Returns the post-mutation shape.
    pub fn mutate<F>(&self, token: &SessionToken, compute: F) -> CleaningResult<(usize, usize)>
    where
        F: FnOnce(&Dataset) -> CleaningResult<(Dataset, OperationRecord)>,
    {
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        let session = sessions.get_mut(token).ok_or(CleaningError::NoActiveSession)?;
        match compute(&session.dataset) {
            Ok((dataset, record)) => {
                let shape = dataset.shape();
                session.dataset = dataset;
                if let Some(obs) = &self.observer {
                    obs.on_operation(&record, shape);
                }
                session.log.push(record);
                Ok(shape)
            }
            Err(err) => {
                if let Some(obs) = &self.observer {
                    obs.on_failure("mutate", &err);
                }
                Err(err)
            }
        }
    }

    /// Append a record without touching the dataset (used by `save-changes`).
    pub fn append_record(&self, token: &SessionToken, record: OperationRecord) -> CleaningResult<()> {
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        let session = sessions.get_mut(token).ok_or(CleaningError::NoActiveSession)?;
        if let Some(obs) = &self.observer {
            obs.on_operation(&record, session.dataset.shape());
        }
        session.log.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tiny() -> Dataset {
        Dataset::new(vec![Column::new("a", vec![Value::Int(1), Value::Int(2)])]).unwrap()
    }

    #[test]
    fn current_before_initialize_fails() {
        let store = SessionStore::new();
        assert!(matches!(
            store.current(&SessionToken::default()),
            Err(CleaningError::NoActiveSession)
        ));
    }

    #[test]
    fn mutate_swaps_and_logs_atomically() {
        let store = SessionStore::new();
        let token = SessionToken::default();
        store.initialize(&token, tiny(), "t.csv");

        let shape = store
            .mutate(&token, |ds| {
                let out = ds.retain_rows(&[true, false])?;
                Ok((
                    out,
                    OperationRecord::new(OperationType::RemoveDuplicates, "kept 1 row", details(vec![])),
                ))
            })
            .unwrap();

        assert_eq!(shape, (1, 1));
        assert_eq!(store.log(&token).unwrap().len(), 1);
    }

    #[test]
    fn failed_mutation_leaves_session_unchanged() {
        let store = SessionStore::new();
        let token = SessionToken::default();
        store.initialize(&token, tiny(), "t.csv");

        let err = store.mutate(&token, |ds| {
            ds.require("missing")?;
            unreachable!()
        });
        assert!(err.is_err());
        assert_eq!(store.current(&token).unwrap().shape(), (2, 1));
        assert!(store.log(&token).unwrap().is_empty());
    }

    #[test]
    fn tokens_are_isolated() {
        let store = SessionStore::new();
        let a = SessionToken::new("a");
        let b = SessionToken::new("b");
        store.initialize(&a, tiny(), "a.csv");
        assert!(store.current(&b).is_err());
        store.initialize(&b, tiny(), "b.csv");
        assert_eq!(store.source_filename(&a).unwrap(), "a.csv");
        assert_eq!(store.source_filename(&b).unwrap(), "b.csv");
    }

    struct CountingObserver {
        ops: AtomicUsize,
    }

    impl SessionObserver for CountingObserver {
        fn on_operation(&self, _record: &OperationRecord, _shape: (usize, usize)) {
            self.ops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn observer_sees_each_committed_operation() {
        let counter = Arc::new(CountingObserver { ops: AtomicUsize::new(0) });
        let store = SessionStore::new().with_observer(counter.clone());
        let token = SessionToken::default();
        store.initialize(&token, tiny(), "t.csv");

        for _ in 0..3 {
            store
                .mutate(&token, |ds| {
                    Ok((
                        ds.clone(),
                        OperationRecord::new(OperationType::ImputeMissing, "noop", details(vec![])),
                    ))
                })
                .unwrap();
        }
        assert_eq!(counter.ops.load(Ordering::SeqCst), 3);
    }
}
