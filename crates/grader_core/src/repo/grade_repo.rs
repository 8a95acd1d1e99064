//! SQLite-backed entity store for the grade hierarchy.
//!
//! # Responsibility
//! - Provide CRUD, soft-delete and purge over schools, divisions, modules
//!   and exams.
//! - Emit child-collection snapshots after every committed mutation.
//!
//! # Invariants
//! - Child listing is deterministic: `sort_order ASC, id ASC` (insertion
//!   order within one parent).
//! - Pending-delete records, and everything below them, are hidden from
//!   default listings but stay retrievable by id.
//! - A create or reparent only succeeds under an active parent.
//! - Purge is atomic: the whole subtree is removed or nothing is.

use crate::aggregate::Average;
use crate::db::migrations::latest_version;
use crate::db::{open_db, open_db_in_memory};
use crate::model::division::Division;
use crate::model::entity::{EntityKind, RecordId};
use crate::model::exam::Exam;
use crate::model::module::Module;
use crate::model::school::School;
use crate::repo::changes::{ChangeHub, ChildSnapshot, CollectionSubscription, Subscription};
use crate::repo::tables::{bool_to_int, parse_flag, parse_uuid, StoredEntity};
use crate::repo::{StoreError, StoreResult};
use log::{debug, error, info};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;

/// Where a record lives in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub kind: EntityKind,
    /// Owning record, `None` for schools.
    pub parent_id: Option<RecordId>,
    pub is_deleted: bool,
}

/// Rows removed by one purge, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub schools: usize,
    pub divisions: usize,
    pub modules: usize,
    pub exams: usize,
}

impl PurgeSummary {
    pub fn total(&self) -> usize {
        self.schools + self.divisions + self.modules + self.exams
    }

    fn record(&mut self, kind: EntityKind, removed: usize) {
        match kind {
            EntityKind::School => self.schools += removed,
            EntityKind::Division => self.divisions += removed,
            EntityKind::Module => self.modules += removed,
            EntityKind::Exam => self.exams += removed,
        }
    }
}

/// Entity store over one migrated SQLite connection.
///
/// Constructed explicitly and passed to its collaborators; dropping the store
/// closes the connection and ends every subscription stream.
pub struct GradeStore {
    conn: Connection,
    hub: ChangeHub,
}

impl GradeStore {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        ensure_store_connection_ready(&conn)?;
        Ok(Self {
            conn,
            hub: ChangeHub::default(),
        })
    }

    /// Opens (or creates) a database file and wraps it in a store.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens a fresh in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    /// Underlying connection, for diagnostics and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Persists a new record under its parent.
    ///
    /// The record is normalized and validated first. It is stored active,
    /// and non-leaf records start with an undefined average.
    ///
    /// # Errors
    /// - `Validation` when a field check fails.
    /// - `ParentNotFound` when the parent is missing or pending delete.
    pub fn create<T: StoredEntity>(&self, mut record: T) -> StoreResult<T> {
        record.normalize();
        record.validate()?;
        record.reset_for_insert();
        let parent_id = record.parent_id();

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        if let Some(parent_id) = parent_id {
            ensure_parent_active(&tx, T::KIND, parent_id)?;
        }
        let sort_order = next_sort_order(&tx, T::KIND, parent_id)?;
        record.insert_row(&tx, sort_order)?;
        tx.commit()?;

        debug!(
            "event=record_create module=repo status=ok kind={} id={}",
            T::KIND,
            record.id()
        );
        self.emit(T::KIND, parent_id);
        Ok(record)
    }

    /// Loads one record by id, whether or not it is pending delete.
    pub fn find<T: StoredEntity>(&self, id: RecordId) -> StoreResult<Option<T>> {
        load_record::<T>(&self.conn, id)
    }

    /// Loads one record by id.
    ///
    /// # Errors
    /// - `NotFound` for unknown ids.
    /// - `KindMismatch` when the id belongs to another kind.
    pub fn get<T: StoredEntity>(&self, id: RecordId) -> StoreResult<T> {
        match self.find::<T>(id)? {
            Some(record) => Ok(record),
            None => Err(self.missing(T::KIND, id)),
        }
    }

    /// Replaces the user-editable fields of an existing record.
    ///
    /// Derived averages and the soft-delete flag are never written here.
    /// Changing the parent reference moves the record; both the old and the
    /// new collection are notified.
    pub fn update<T: StoredEntity>(&self, record: &T) -> StoreResult<T> {
        let mut record = record.clone();
        record.normalize();
        record.validate()?;
        let id = record.id();

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let Some(previous) = load_record::<T>(&tx, id)? else {
            return Err(self.missing(T::KIND, id));
        };
        let moved = previous.parent_id() != record.parent_id();
        if moved {
            if let Some(parent_id) = record.parent_id() {
                ensure_parent_active(&tx, T::KIND, parent_id)?;
            }
        }
        record.update_row(&tx)?;
        tx.commit()?;

        debug!(
            "event=record_update module=repo status=ok kind={} id={} moved={}",
            T::KIND,
            id,
            moved
        );
        self.emit(T::KIND, previous.parent_id());
        if moved {
            self.emit(T::KIND, record.parent_id());
        }
        self.get::<T>(id)
    }

    /// Lists the children of `parent_id` in insertion order.
    ///
    /// Schools are listed with `parent_id = None`. Without `include_deleted`
    /// the list is empty while `parent_id` or any record above it is pending
    /// delete; the children themselves keep their own flags.
    pub fn list_children<T: StoredEntity>(
        &self,
        parent_id: Option<RecordId>,
        include_deleted: bool,
    ) -> StoreResult<Vec<T>> {
        load_children::<T>(&self.conn, parent_id, include_deleted)
    }

    /// Ids of every record of `kind`, pending delete or not.
    pub fn record_ids(&self, kind: EntityKind) -> StoreResult<Vec<RecordId>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id FROM {} ORDER BY sort_order ASC, id ASC;",
            kind.table()
        ))?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.push(parse_uuid(&value, "id")?);
        }
        Ok(ids)
    }

    /// Resolves kind, parent and delete flag of any id.
    pub fn locate(&self, id: RecordId) -> StoreResult<Option<Location>> {
        locate_record(&self.conn, id)
    }

    /// Sets the "is selected" flag. Returns whether the value changed.
    pub fn set_included(&self, id: RecordId, included: bool) -> StoreResult<bool> {
        self.set_flag(id, "is_selected", included, "record_included")
    }

    /// Reads the "is selected" flag of any record.
    pub fn is_included(&self, id: RecordId) -> StoreResult<bool> {
        let location = self.require(id)?;
        let value: i64 = self.conn.query_row(
            &format!(
                "SELECT is_selected FROM {} WHERE id = ?1;",
                location.kind.table()
            ),
            [id.to_string()],
            |row| row.get(0),
        )?;
        parse_flag(value, "is_selected")
    }

    /// Flags a record as pending delete.
    ///
    /// Returns `false` without emitting anything when the record already is
    /// pending delete.
    pub fn soft_delete(&self, id: RecordId) -> StoreResult<bool> {
        self.set_flag(id, "on_delete", true, "record_soft_delete")
    }

    /// Clears the pending-delete flag. Returns `false` when it was not set.
    pub fn undo_soft_delete(&self, id: RecordId) -> StoreResult<bool> {
        self.set_flag(id, "on_delete", false, "record_undo_delete")
    }

    /// Physically removes a record and its whole subtree.
    ///
    /// # Side effects
    /// - Subscriptions scoped to a purged parent receive an empty snapshot
    ///   and end.
    /// - The collection the record lived in is notified.
    pub fn purge(&self, id: RecordId) -> StoreResult<PurgeSummary> {
        let location = self.require(id)?;

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let closed_scopes = collect_subtree_parents(&tx, location.kind, id)?;
        let mut summary = PurgeSummary::default();
        for kind in EntityKind::ALL
            .into_iter()
            .rev()
            .filter(|kind| *kind >= location.kind)
        {
            let removed = tx.execute(
                &format!(
                    "DELETE FROM {} WHERE {};",
                    kind.table(),
                    subtree_filter(kind, location.kind)
                ),
                [id.to_string()],
            )?;
            summary.record(kind, removed);
        }
        tx.commit()?;

        info!(
            "event=record_purge module=repo status=ok kind={} id={} removed={}",
            location.kind,
            id,
            summary.total()
        );
        for (child_kind, parent_id) in closed_scopes {
            self.hub.close_scope(child_kind, parent_id);
        }
        self.emit(location.kind, location.parent_id);
        Ok(summary)
    }

    /// Purges every pending-delete record of one collection.
    ///
    /// Returns the ids that were purged.
    pub fn purge_pending(
        &self,
        kind: EntityKind,
        parent_id: Option<RecordId>,
    ) -> StoreResult<Vec<RecordId>> {
        let pending = pending_ids(&self.conn, kind, parent_id)?;
        for id in &pending {
            self.purge(*id)?;
        }
        Ok(pending)
    }

    /// Reads the derived average cached on a non-leaf record.
    pub fn stored_average(&self, kind: EntityKind, id: RecordId) -> StoreResult<Average> {
        if !kind.is_aggregate() {
            return Err(StoreError::NotAggregate(kind));
        }
        let row: Option<(f64, i64)> = self
            .conn
            .query_row(
                &format!(
                    "SELECT grade, grade_defined FROM {} WHERE id = ?1;",
                    kind.table()
                ),
                [id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (value, defined) = row.ok_or(StoreError::NotFound(id))?;
        Ok(Average::from_stored(
            value,
            parse_flag(defined, "grade_defined")?,
        ))
    }

    /// Writes a recomputed average when it differs from the cached one.
    ///
    /// Returns whether a write happened. An unchanged average writes and
    /// emits nothing, which keeps recompute cycles from feeding themselves.
    ///
    /// # Errors
    /// - `StalePropagationTarget` when the record no longer exists.
    pub fn write_average(
        &self,
        kind: EntityKind,
        id: RecordId,
        average: Average,
    ) -> StoreResult<bool> {
        if !kind.is_aggregate() {
            return Err(StoreError::NotAggregate(kind));
        }
        let changed = self.conn.execute(
            &format!(
                "UPDATE {}
                 SET grade = ?2,
                     grade_defined = ?3,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND (grade != ?2 OR grade_defined != ?3);",
                kind.table()
            ),
            params![
                id.to_string(),
                average.value(),
                bool_to_int(average.is_defined())
            ],
        )?;

        if changed == 0 {
            return match locate_record(&self.conn, id)? {
                Some(_) => Ok(false),
                None => Err(StoreError::StalePropagationTarget { kind, id }),
            };
        }

        let parent_id = locate_record(&self.conn, id)?.and_then(|location| location.parent_id);
        self.emit(kind, parent_id);
        Ok(true)
    }

    /// Subscribes to the visible children of `parent_id`.
    ///
    /// The stream starts with the current collection and receives a new
    /// snapshot after every mutation of it.
    pub fn subscribe<T: StoredEntity>(
        &self,
        parent_id: Option<RecordId>,
    ) -> StoreResult<Subscription<T>> {
        self.subscribe_with::<T>(parent_id, false)
    }

    /// Like [`Self::subscribe`], but snapshots include pending-delete records.
    pub fn subscribe_including_deleted<T: StoredEntity>(
        &self,
        parent_id: Option<RecordId>,
    ) -> StoreResult<Subscription<T>> {
        self.subscribe_with::<T>(parent_id, true)
    }

    /// Subscribes to every parent's collection of `kind`.
    ///
    /// Events include pending-delete records and carry their parent id.
    /// No initial snapshot is sent.
    pub fn subscribe_collection(&self, kind: EntityKind) -> CollectionSubscription {
        CollectionSubscription::new(kind, self.hub.register_collection(kind))
    }

    /// Number of live subscriptions registered for `kind`.
    pub fn subscriber_count(&self, kind: EntityKind) -> usize {
        self.hub.subscriber_count(kind)
    }

    /// Loads the children of `parent_id` as an untyped snapshot.
    pub fn snapshot(
        &self,
        kind: EntityKind,
        parent_id: Option<RecordId>,
        include_deleted: bool,
    ) -> StoreResult<ChildSnapshot> {
        load_snapshot(&self.conn, kind, parent_id, include_deleted)
    }

    fn subscribe_with<T: StoredEntity>(
        &self,
        parent_id: Option<RecordId>,
        include_deleted: bool,
    ) -> StoreResult<Subscription<T>> {
        let current = load_children::<T>(&self.conn, parent_id, include_deleted)?;
        let receiver =
            self.hub
                .register(T::KIND, parent_id, include_deleted, T::into_snapshot(current));
        Ok(Subscription::new(receiver))
    }

    fn set_flag(
        &self,
        id: RecordId,
        column: &'static str,
        value: bool,
        event: &'static str,
    ) -> StoreResult<bool> {
        let location = self.require(id)?;
        let changed = self.conn.execute(
            &format!(
                "UPDATE {}
                 SET {column} = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND {column} != ?2;",
                location.kind.table()
            ),
            params![id.to_string(), bool_to_int(value)],
        )?;

        debug!(
            "event={event} module=repo status=ok kind={} id={} changed={}",
            location.kind,
            id,
            changed > 0
        );
        if changed > 0 {
            self.emit(location.kind, location.parent_id);
            if column == "on_delete" {
                self.emit_descendant_views(location.kind, id);
            }
        }
        Ok(changed > 0)
    }

    /// Refreshes visible subscriptions below a record whose delete flag
    /// changed, since their children appear or vanish with it.
    fn emit_descendant_views(&self, kind: EntityKind, id: RecordId) {
        let scopes = match collect_subtree_parents(&self.conn, kind, id) {
            Ok(scopes) => scopes,
            Err(err) => {
                error!(
                    "event=change_emit module=repo status=error kind={} id={} error={}",
                    kind, id, err
                );
                return;
            }
        };
        for (child_kind, parent_id) in scopes {
            if !self.hub.interest(child_kind, Some(parent_id)).visible {
                continue;
            }
            match load_snapshot(&self.conn, child_kind, Some(parent_id), false) {
                Ok(snapshot) => {
                    self.hub
                        .deliver(child_kind, Some(parent_id), Some(&snapshot), None);
                }
                Err(err) => error!(
                    "event=change_emit module=repo status=error kind={} error={}",
                    child_kind, err
                ),
            }
        }
    }

    fn require(&self, id: RecordId) -> StoreResult<Location> {
        self.locate(id)?.ok_or(StoreError::NotFound(id))
    }

    fn missing(&self, expected: EntityKind, id: RecordId) -> StoreError {
        match locate_record(&self.conn, id) {
            Ok(Some(location)) => StoreError::KindMismatch {
                id,
                expected,
                actual: location.kind,
            },
            Ok(None) => StoreError::NotFound(id),
            Err(err) => err,
        }
    }

    /// Sends the committed state of one collection to its subscribers.
    ///
    /// Failures are logged and not surfaced: the write already committed, and
    /// the next mutation of the collection re-emits a full snapshot.
    fn emit(&self, kind: EntityKind, parent_id: Option<RecordId>) {
        let interest = self.hub.interest(kind, parent_id);
        if interest.is_empty() {
            return;
        }

        let load = |include_deleted: bool| {
            load_snapshot(&self.conn, kind, parent_id, include_deleted).map_err(|err| {
                error!(
                    "event=change_emit module=repo status=error kind={} error={}",
                    kind, err
                );
            })
        };
        let visible = match interest.visible.then(|| load(false)).transpose() {
            Ok(snapshot) => snapshot,
            Err(()) => return,
        };
        let with_deleted = match interest.with_deleted.then(|| load(true)).transpose() {
            Ok(snapshot) => snapshot,
            Err(()) => return,
        };
        self.hub
            .deliver(kind, parent_id, visible.as_ref(), with_deleted.as_ref());
    }
}

fn load_record<T: StoredEntity>(conn: &Connection, id: RecordId) -> StoreResult<Option<T>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} WHERE id = ?1;",
        T::COLUMNS,
        T::KIND.table()
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(T::from_row(row)?));
    }
    Ok(None)
}

fn load_children<T: StoredEntity>(
    conn: &Connection,
    parent_id: Option<RecordId>,
    include_deleted: bool,
) -> StoreResult<Vec<T>> {
    if !include_deleted && has_pending_ancestor(conn, T::KIND, parent_id)? {
        return Ok(Vec::new());
    }
    let mut sql = format!("SELECT {} FROM {} WHERE 1 = 1", T::COLUMNS, T::KIND.table());
    if let Some(parent_column) = T::KIND.parent_column() {
        sql.push_str(&format!(" AND {parent_column} = ?1"));
    }
    if !include_deleted {
        sql.push_str(" AND on_delete = 0");
    }
    sql.push_str(" ORDER BY sort_order ASC, id ASC;");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = if T::KIND.parent_column().is_some() {
        stmt.query([parent_id.map(|id| id.to_string())])?
    } else {
        stmt.query([])?
    };

    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(T::from_row(row)?);
    }
    Ok(records)
}

fn load_snapshot(
    conn: &Connection,
    kind: EntityKind,
    parent_id: Option<RecordId>,
    include_deleted: bool,
) -> StoreResult<ChildSnapshot> {
    let snapshot = match kind {
        EntityKind::School => {
            School::into_snapshot(load_children(conn, parent_id, include_deleted)?)
        }
        EntityKind::Division => {
            Division::into_snapshot(load_children(conn, parent_id, include_deleted)?)
        }
        EntityKind::Module => {
            Module::into_snapshot(load_children(conn, parent_id, include_deleted)?)
        }
        EntityKind::Exam => Exam::into_snapshot(load_children(conn, parent_id, include_deleted)?),
    };
    Ok(snapshot)
}

fn locate_record(conn: &Connection, id: RecordId) -> StoreResult<Option<Location>> {
    for kind in EntityKind::ALL {
        let parent_expr = kind.parent_column().unwrap_or("NULL");
        let row: Option<(Option<String>, i64)> = conn
            .query_row(
                &format!(
                    "SELECT {parent_expr}, on_delete FROM {} WHERE id = ?1;",
                    kind.table()
                ),
                [id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((parent_text, on_delete)) = row {
            let parent_id = parent_text
                .map(|value| parse_uuid(&value, "parent reference"))
                .transpose()?;
            return Ok(Some(Location {
                kind,
                parent_id,
                is_deleted: parse_flag(on_delete, "on_delete")?,
            }));
        }
    }
    Ok(None)
}

/// Whether `parent_id` or any record above it is pending delete.
fn has_pending_ancestor(
    conn: &Connection,
    child_kind: EntityKind,
    parent_id: Option<RecordId>,
) -> StoreResult<bool> {
    let (Some(mut kind), Some(mut id)) = (child_kind.parent_kind(), parent_id) else {
        return Ok(false);
    };
    loop {
        let parent_expr = kind.parent_column().unwrap_or("NULL");
        let row: Option<(Option<String>, i64)> = conn
            .query_row(
                &format!(
                    "SELECT {parent_expr}, on_delete FROM {} WHERE id = ?1;",
                    kind.table()
                ),
                [id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((parent_text, on_delete)) = row else {
            return Ok(false);
        };
        if parse_flag(on_delete, "on_delete")? {
            return Ok(true);
        }
        match (kind.parent_kind(), parent_text) {
            (Some(next_kind), Some(text)) => {
                kind = next_kind;
                id = parse_uuid(&text, "parent reference")?;
            }
            _ => return Ok(false),
        }
    }
}

fn ensure_parent_active(
    conn: &Connection,
    child_kind: EntityKind,
    parent_id: RecordId,
) -> StoreResult<()> {
    let Some(parent_kind) = child_kind.parent_kind() else {
        return Ok(());
    };
    let on_delete: Option<i64> = conn
        .query_row(
            &format!("SELECT on_delete FROM {} WHERE id = ?1;", parent_kind.table()),
            [parent_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    match on_delete {
        Some(0) => Ok(()),
        _ => Err(StoreError::ParentNotFound(parent_id)),
    }
}

fn next_sort_order(
    conn: &Connection,
    kind: EntityKind,
    parent_id: Option<RecordId>,
) -> StoreResult<i64> {
    let next = match kind.parent_column() {
        Some(parent_column) => conn.query_row(
            &format!(
                "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM {} WHERE {parent_column} = ?1;",
                kind.table()
            ),
            [parent_id.map(|id| id.to_string())],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            &format!(
                "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM {};",
                kind.table()
            ),
            [],
            |row| row.get(0),
        )?,
    };
    Ok(next)
}

fn pending_ids(
    conn: &Connection,
    kind: EntityKind,
    parent_id: Option<RecordId>,
) -> StoreResult<Vec<RecordId>> {
    let mut sql = format!("SELECT id FROM {} WHERE on_delete = 1", kind.table());
    if let Some(parent_column) = kind.parent_column() {
        sql.push_str(&format!(" AND {parent_column} = ?1"));
    }
    sql.push_str(" ORDER BY sort_order ASC, id ASC;");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = if kind.parent_column().is_some() {
        stmt.query([parent_id.map(|id| id.to_string())])?
    } else {
        stmt.query([])?
    };

    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "id")?);
    }
    Ok(ids)
}

/// SQL predicate selecting the rows of `kind` inside the subtree rooted at
/// the `root` record bound as `?1`.
fn subtree_filter(kind: EntityKind, root: EntityKind) -> String {
    match (kind == root, kind.parent_kind(), kind.parent_column()) {
        (false, Some(parent_kind), Some(parent_column)) => format!(
            "{parent_column} IN (SELECT id FROM {} WHERE {})",
            parent_kind.table(),
            subtree_filter(parent_kind, root)
        ),
        _ => "id = ?1".to_string(),
    }
}

/// Non-leaf records inside a subtree, as `(child kind, parent id)` scopes.
fn collect_subtree_parents(
    conn: &Connection,
    root_kind: EntityKind,
    root_id: RecordId,
) -> StoreResult<Vec<(EntityKind, RecordId)>> {
    let mut scopes = Vec::new();
    for kind in EntityKind::ALL
        .into_iter()
        .filter(|kind| *kind >= root_kind && kind.is_aggregate())
    {
        let Some(child_kind) = kind.child_kind() else {
            continue;
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT id FROM {} WHERE {};",
            kind.table(),
            subtree_filter(kind, root_kind)
        ))?;
        let mut rows = stmt.query([root_id.to_string()])?;
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            scopes.push((child_kind, parse_uuid(&value, "id")?));
        }
    }
    Ok(scopes)
}

fn ensure_store_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for kind in EntityKind::ALL {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [kind.table()],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(StoreError::MissingRequiredTable(kind.table()));
        }
    }
    Ok(())
}
