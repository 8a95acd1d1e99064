//! Change notification for child collections.
//!
//! # Responsibility
//! - Track subscribers per collection, scoped to one parent or to all parents.
//! - Fan committed snapshots out to subscribers over unbounded channels.
//!
//! # Invariants
//! - Events for one collection are sent in commit order.
//! - Senders whose receiver was dropped are pruned on the next emission.
//! - Emission never blocks the writer.

use crate::aggregate::{weighted_average, Average};
use crate::model::division::Division;
use crate::model::entity::{EntityKind, GradeEntity, RecordId};
use crate::model::exam::Exam;
use crate::model::module::Module;
use crate::model::school::School;
use crate::repo::tables::StoredEntity;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;

/// Children of one parent, as committed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildSnapshot {
    Schools(Vec<School>),
    Divisions(Vec<Division>),
    Modules(Vec<Module>),
    Exams(Vec<Exam>),
}

impl ChildSnapshot {
    /// Empty snapshot for a collection of `kind`.
    pub fn empty(kind: EntityKind) -> Self {
        match kind {
            EntityKind::School => Self::Schools(Vec::new()),
            EntityKind::Division => Self::Divisions(Vec::new()),
            EntityKind::Module => Self::Modules(Vec::new()),
            EntityKind::Exam => Self::Exams(Vec::new()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Schools(_) => EntityKind::School,
            Self::Divisions(_) => EntityKind::Division,
            Self::Modules(_) => EntityKind::Module,
            Self::Exams(_) => EntityKind::Exam,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Schools(records) => records.len(),
            Self::Divisions(records) => records.len(),
            Self::Modules(records) => records.len(),
            Self::Exams(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregates the records that are included and not pending delete.
    pub fn aggregate(&self) -> Average {
        match self {
            Self::Schools(records) => aggregate_records(records),
            Self::Divisions(records) => aggregate_records(records),
            Self::Modules(records) => aggregate_records(records),
            Self::Exams(records) => aggregate_records(records),
        }
    }
}

fn aggregate_records<T: GradeEntity>(records: &[T]) -> Average {
    weighted_average(
        records
            .iter()
            .filter(|record| record.counts_toward_parent())
            .map(GradeEntity::contribution),
    )
}

/// One committed change to a child collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Kind of the records in the collection.
    pub kind: EntityKind,
    /// Owner of the collection, `None` for the school list.
    pub parent_id: Option<RecordId>,
    /// Full collection contents after the change.
    pub snapshot: ChildSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Parent(Option<RecordId>),
    Collection,
}

struct Subscriber {
    scope: Scope,
    include_deleted: bool,
    sender: Sender<ChangeEvent>,
}

/// Which snapshots an emission has to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) visible: bool,
    pub(crate) with_deleted: bool,
}

impl Interest {
    pub(crate) fn is_empty(self) -> bool {
        !self.visible && !self.with_deleted
    }
}

/// Subscriber registry shared by one store.
#[derive(Default)]
pub(crate) struct ChangeHub {
    subscribers: Mutex<HashMap<EntityKind, Vec<Subscriber>>>,
}

impl ChangeHub {
    /// Registers a parent-scoped subscriber whose stream starts with `initial`.
    pub(crate) fn register(
        &self,
        kind: EntityKind,
        parent_id: Option<RecordId>,
        include_deleted: bool,
        initial: ChildSnapshot,
    ) -> Receiver<ChangeEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let _ = sender.send(ChangeEvent {
            kind,
            parent_id,
            snapshot: initial,
        });
        self.push(kind, Scope::Parent(parent_id), include_deleted, sender);
        receiver
    }

    pub(crate) fn register_collection(&self, kind: EntityKind) -> Receiver<ChangeEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.push(kind, Scope::Collection, true, sender);
        receiver
    }

    fn push(
        &self,
        kind: EntityKind,
        scope: Scope,
        include_deleted: bool,
        sender: Sender<ChangeEvent>,
    ) {
        self.subscribers
            .lock()
            .entry(kind)
            .or_default()
            .push(Subscriber {
                scope,
                include_deleted,
                sender,
            });
    }

    pub(crate) fn interest(&self, kind: EntityKind, parent_id: Option<RecordId>) -> Interest {
        let guard = self.subscribers.lock();
        let mut interest = Interest::default();
        for subscriber in guard.get(&kind).into_iter().flatten() {
            if !subscriber.matches(parent_id) {
                continue;
            }
            if subscriber.include_deleted {
                interest.with_deleted = true;
            } else {
                interest.visible = true;
            }
        }
        interest
    }

    /// Sends the loaded snapshots to every matching subscriber.
    pub(crate) fn deliver(
        &self,
        kind: EntityKind,
        parent_id: Option<RecordId>,
        visible: Option<&ChildSnapshot>,
        with_deleted: Option<&ChildSnapshot>,
    ) {
        let mut guard = self.subscribers.lock();
        let Some(subscribers) = guard.get_mut(&kind) else {
            return;
        };
        subscribers.retain(|subscriber| {
            if !subscriber.matches(parent_id) {
                return true;
            }
            let snapshot = if subscriber.include_deleted {
                with_deleted
            } else {
                visible
            };
            let Some(snapshot) = snapshot else {
                return true;
            };
            subscriber
                .sender
                .send(ChangeEvent {
                    kind,
                    parent_id,
                    snapshot: snapshot.clone(),
                })
                .is_ok()
        });
    }

    /// Sends a final empty snapshot to subscribers of a purged parent and
    /// drops them, ending their streams.
    pub(crate) fn close_scope(&self, kind: EntityKind, parent_id: RecordId) {
        let mut guard = self.subscribers.lock();
        let Some(subscribers) = guard.get_mut(&kind) else {
            return;
        };
        subscribers.retain(|subscriber| {
            if subscriber.scope != Scope::Parent(Some(parent_id)) {
                return true;
            }
            let _ = subscriber.sender.send(ChangeEvent {
                kind,
                parent_id: Some(parent_id),
                snapshot: ChildSnapshot::empty(kind),
            });
            false
        });
    }

    pub(crate) fn subscriber_count(&self, kind: EntityKind) -> usize {
        self.subscribers
            .lock()
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

impl Subscriber {
    fn matches(&self, parent_id: Option<RecordId>) -> bool {
        match self.scope {
            Scope::Collection => true,
            Scope::Parent(scoped) => scoped == parent_id,
        }
    }
}

/// Typed stream of snapshots for one parent's children.
///
/// The first item is the collection as it was at subscription time. Dropping
/// the subscription unsubscribes.
pub struct Subscription<T> {
    receiver: Receiver<ChangeEvent>,
    closed: Cell<bool>,
    _records: PhantomData<fn() -> T>,
}

impl<T: StoredEntity> Subscription<T> {
    pub(crate) fn new(receiver: Receiver<ChangeEvent>) -> Self {
        Self {
            receiver,
            closed: Cell::new(false),
            _records: PhantomData,
        }
    }

    /// Returns the next queued snapshot without blocking.
    ///
    /// `None` when nothing is queued or the stream has ended.
    pub fn try_next(&self) -> Option<Vec<T>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if let Some(records) = T::from_snapshot(event.snapshot) {
                        return Some(records);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    self.closed.set(true);
                    return None;
                }
            }
        }
    }

    /// Waits up to `timeout` for the next snapshot.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Vec<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => T::from_snapshot(event.snapshot),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.closed.set(true);
                None
            }
        }
    }

    /// Drains the queue and returns only the most recent snapshot.
    pub fn latest(&self) -> Option<Vec<T>> {
        let mut latest = None;
        while let Some(records) = self.try_next() {
            latest = Some(records);
        }
        latest
    }

    /// Whether a read found the stream ended: the parent was purged or the
    /// store was dropped, and every queued snapshot was consumed.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// Untyped stream of change events for every parent of one collection.
pub struct CollectionSubscription {
    kind: EntityKind,
    receiver: Receiver<ChangeEvent>,
}

impl CollectionSubscription {
    pub(crate) fn new(kind: EntityKind, receiver: Receiver<ChangeEvent>) -> Self {
        Self { kind, receiver }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns every queued event without blocking.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
