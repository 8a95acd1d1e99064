//! Entity store: persistence and change notification for the hierarchy.
//!
//! # Responsibility
//! - Own the four record collections and their parent/child links.
//! - Emit a snapshot of the affected child collection after every commit.
//! - Keep SQL details inside the repository boundary.
//!
//! # Invariants
//! - Write paths normalize and validate records before SQL mutations.
//! - Derived averages are written only through `GradeStore::write_average`.
//! - Purge removes a whole subtree in one transaction.

pub mod changes;
pub mod grade_repo;
pub mod tables;

use crate::db::DbError;
use crate::model::entity::{EntityKind, RecordId};
use crate::model::validation::ValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by entity store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from entity store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Command input rejected before any write.
    Validation(ValidationError),
    /// No record with this id exists.
    NotFound(RecordId),
    /// Referenced parent does not exist, was purged, or is pending delete.
    ParentNotFound(RecordId),
    /// Record exists but is of another kind than requested.
    KindMismatch {
        id: RecordId,
        expected: EntityKind,
        actual: EntityKind,
    },
    /// Operation needs a record that holds a derived average.
    NotAggregate(EntityKind),
    /// Propagation target was purged while the recompute was in flight.
    StalePropagationTarget { kind: EntityKind, id: RecordId },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent record not found: {id}"),
            Self::KindMismatch {
                id,
                expected,
                actual,
            } => write!(f, "record {id} is a {actual}, expected a {expected}"),
            Self::NotAggregate(kind) => write!(f, "{kind} records hold no derived average"),
            Self::StalePropagationTarget { kind, id } => {
                write!(f, "propagation target {kind} {id} no longer exists")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "grade store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "grade store requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted grade data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}
