//! Soft delete with undo, followed by deferred purge.
//!
//! # Responsibility
//! - Flag a record as pending delete and hand out a one-shot undo token.
//! - Purge the pending records of one collection when that collection's
//!   scope moves on: a new create begins or the scope is closed.
//!
//! # Invariants
//! - A pending record is excluded from every aggregate immediately.
//! - Each delete yields at most one undo; the token is consumed.
//! - Undo after the purge already happened is a silent no-op.
//! - Purge cascades to every descendant of the purged record.

use crate::model::entity::{EntityKind, RecordId};
use crate::repo::grade_repo::GradeStore;
use crate::repo::{StoreError, StoreResult};
use log::{debug, info};
use std::fmt::{Display, Formatter};

/// Where a record sits in the delete lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteState {
    Active,
    PendingDelete,
    /// Gone from storage. Unknown ids also report this state.
    Purged,
}

/// Reads the lifecycle state of `id`.
pub fn state_of(store: &GradeStore, id: RecordId) -> StoreResult<DeleteState> {
    Ok(match store.locate(id)? {
        None => DeleteState::Purged,
        Some(location) if location.is_deleted => DeleteState::PendingDelete,
        Some(_) => DeleteState::Active,
    })
}

/// Single-use right to revert one soft delete.
///
/// Not `Clone`: undoing consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct UndoToken {
    id: RecordId,
    kind: EntityKind,
}

impl UndoToken {
    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }
}

/// Flags `id` as pending delete.
///
/// Returns `None` when the record was already pending, since only the
/// first delete owns the undo.
pub fn soft_delete(store: &GradeStore, id: RecordId) -> StoreResult<Option<UndoToken>> {
    let location = store.locate(id)?.ok_or(StoreError::NotFound(id))?;
    if !store.soft_delete(id)? {
        return Ok(None);
    }
    debug!(
        "event=soft_delete module=lifecycle status=ok kind={} id={id}",
        location.kind
    );
    Ok(Some(UndoToken {
        id,
        kind: location.kind,
    }))
}

/// Reverts the delete behind `token`.
///
/// Returns `false` when nothing changed, including after a purge.
pub fn undo(store: &GradeStore, token: UndoToken) -> StoreResult<bool> {
    match store.undo_soft_delete(token.id) {
        Ok(changed) => {
            debug!(
                "event=undo_delete module=lifecycle status=ok kind={} id={} changed={changed}",
                token.kind, token.id
            );
            Ok(changed)
        }
        Err(StoreError::NotFound(_)) => {
            debug!(
                "event=undo_delete module=lifecycle status=skipped kind={} id={} reason=purged",
                token.kind, token.id
            );
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Errors of [`DeleteScope`] operations.
#[derive(Debug)]
pub enum LifecycleError {
    /// The record does not belong to the scope's collection.
    OutOfScope {
        id: RecordId,
        kind: EntityKind,
        parent_id: Option<RecordId>,
    },
    Store(StoreError),
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfScope {
                id,
                kind,
                parent_id,
            } => match parent_id {
                Some(parent_id) => write!(
                    f,
                    "record {id} is not a {kind} under parent {parent_id}"
                ),
                None => write!(f, "record {id} is not a top-level {kind}"),
            },
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LifecycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::OutOfScope { .. } => None,
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// One collection's delete session, e.g. the exams of one module.
///
/// Deletes are soft until the session moves on. [`DeleteScope::begin_create`]
/// and [`DeleteScope::close`] purge everything still pending in the
/// collection.
#[derive(Debug)]
pub struct DeleteScope {
    kind: EntityKind,
    parent_id: Option<RecordId>,
    pending: Vec<RecordId>,
}

impl DeleteScope {
    pub fn new(kind: EntityKind, parent_id: Option<RecordId>) -> Self {
        Self {
            kind,
            parent_id,
            pending: Vec::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn parent_id(&self) -> Option<RecordId> {
        self.parent_id
    }

    /// Ids deleted through this scope and not yet undone or purged.
    pub fn pending(&self) -> &[RecordId] {
        &self.pending
    }

    /// Soft-deletes a member of this collection.
    pub fn delete(
        &mut self,
        store: &GradeStore,
        id: RecordId,
    ) -> Result<Option<UndoToken>, LifecycleError> {
        let location = store.locate(id)?.ok_or(StoreError::NotFound(id))?;
        if location.kind != self.kind || location.parent_id != self.parent_id {
            return Err(LifecycleError::OutOfScope {
                id,
                kind: self.kind,
                parent_id: self.parent_id,
            });
        }
        let token = soft_delete(store, id)?;
        if token.is_some() {
            self.pending.push(id);
        }
        Ok(token)
    }

    pub fn undo(&mut self, store: &GradeStore, token: UndoToken) -> Result<bool, LifecycleError> {
        self.pending.retain(|id| *id != token.id);
        Ok(undo(store, token)?)
    }

    /// Purges pending records before a new record is created here.
    pub fn begin_create(&mut self, store: &GradeStore) -> Result<usize, LifecycleError> {
        self.flush(store, "begin_create")
    }

    /// Purges pending records and ends the session.
    pub fn close(mut self, store: &GradeStore) -> Result<usize, LifecycleError> {
        self.flush(store, "close")
    }

    fn flush(&mut self, store: &GradeStore, trigger: &str) -> Result<usize, LifecycleError> {
        let purged = store.purge_pending(self.kind, self.parent_id)?;
        self.pending.clear();
        if !purged.is_empty() {
            info!(
                "event=scope_purge module=lifecycle status=ok kind={} trigger={trigger} purged={}",
                self.kind,
                purged.len()
            );
        }
        Ok(purged.len())
    }
}
