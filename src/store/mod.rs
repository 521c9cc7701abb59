//! Document store seam.
//!
//! The allocator only needs two capabilities from persistence: a
//! serializable read-modify-write over the scheme record (with transparent
//! retry on conflicting commits) and plain single-record creates. Records
//! cross this boundary as typed values; a stored document that does not
//! parse is reported as [`StoreError::Malformed`] rather than handed on.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::model::{IdScheme, Student, StudentDraft};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent writer committed first. Retried inside
    /// [`DocumentStore::run_transaction`]; never surfaced from it directly.
    #[error("transaction conflict")]
    Conflict,

    #[error("transaction gave up after {attempts} conflicting attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("malformed {record} record: {reason}")]
    Malformed { record: &'static str, reason: String },

    #[error("store error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => Self::Conflict,
            _ => Self::Sqlite(e),
        }
    }
}

impl StoreError {
    /// Whether the same write may succeed if the caller simply tries again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Malformed { .. })
    }
}

/// Errors a transaction body may return. Conflicts trigger a rerun of the
/// body; anything else aborts the transaction.
pub trait TxError: From<StoreError> {
    fn is_conflict(&self) -> bool;
}

impl TxError for StoreError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

/// Operations available inside a transaction body.
pub trait StoreTransaction {
    /// Consistent read of the scheme record as of this transaction.
    fn id_scheme(&mut self) -> Result<Option<IdScheme>, StoreError>;

    /// Conditional write: fails with [`StoreError::Conflict`] if the record
    /// changed since this transaction read it.
    fn put_id_scheme(&mut self, scheme: &IdScheme) -> Result<(), StoreError>;

    fn insert_student(
        &mut self,
        draft: &StudentDraft,
        student_id: &str,
    ) -> Result<Student, StoreError>;
}

pub trait DocumentStore {
    /// Run `f` atomically. `f` may run more than once; it must not have side
    /// effects outside the transaction handle.
    fn run_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn StoreTransaction) -> Result<T, E>,
        E: TxError;

    /// Non-transactional read of the scheme record.
    fn id_scheme(&self) -> Result<Option<IdScheme>, StoreError>;

    /// Non-transactional create.
    fn insert_student(&self, draft: &StudentDraft, student_id: &str)
        -> Result<Student, StoreError>;
}

pub(crate) fn parse_scheme_doc(doc: &str) -> Result<IdScheme, StoreError> {
    serde_json::from_str(doc).map_err(|e| StoreError::Malformed {
        record: crate::model::ID_SCHEME_KEY,
        reason: e.to_string(),
    })
}
