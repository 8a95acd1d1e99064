//! Propagation of child changes into parent averages.
//!
//! # Responsibility
//! - Listen to the exam, module and division collections of one store.
//! - Recompute the owning parent's average from each emitted snapshot.
//! - Persist the result through the store, level by level up to schools.
//!
//! # Invariants
//! - Only records that are included and not pending delete contribute.
//! - Unchanged averages are never written (compare-before-write), so a
//!   parent write cannot re-trigger its own recompute forever.
//! - Queued snapshots for one parent coalesce to the most recent one.
//! - A parent purged mid-flight is skipped and logged, never surfaced.

use crate::aggregate::Average;
use crate::model::entity::{EntityKind, RecordId};
use crate::repo::changes::{ChildSnapshot, CollectionSubscription};
use crate::repo::grade_repo::GradeStore;
use crate::repo::{StoreError, StoreResult};
use log::{debug, error, warn};
use std::collections::HashMap;

/// Default bound on drain rounds per pump.
pub const DEFAULT_MAX_ROUNDS: usize = 16;

/// Child collections watched by the pipeline, leaves first.
const WATCHED_KINDS: [EntityKind; 3] = [EntityKind::Exam, EntityKind::Module, EntityKind::Division];

/// Counters of one propagation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Change events drained from the store.
    pub events: usize,
    /// Parent averages recomputed after coalescing.
    pub recomputed: usize,
    /// Recomputes that changed a stored average.
    pub written: usize,
    /// Recomputes whose parent no longer existed.
    pub stale: usize,
    /// Recomputes that failed and wait for the next change.
    pub failed: usize,
    /// Drain rounds used.
    pub rounds: usize,
}

impl PropagationReport {
    fn absorb(&mut self, other: PropagationReport) {
        self.events += other.events;
        self.recomputed += other.recomputed;
        self.written += other.written;
        self.stale += other.stale;
        self.failed += other.failed;
        self.rounds += other.rounds;
    }
}

/// Keeps every non-leaf average consistent with its live children.
pub struct PropagationPipeline {
    links: Vec<CollectionSubscription>,
    max_rounds: usize,
}

impl PropagationPipeline {
    /// Subscribes to every child collection of `store`.
    pub fn attach(store: &GradeStore) -> Self {
        Self::with_max_rounds(store, DEFAULT_MAX_ROUNDS)
    }

    pub fn with_max_rounds(store: &GradeStore, max_rounds: usize) -> Self {
        let links = WATCHED_KINDS
            .into_iter()
            .map(|kind| store.subscribe_collection(kind))
            .collect();
        Self {
            links,
            max_rounds: max_rounds.max(1),
        }
    }

    /// Number of change events waiting to be processed.
    pub fn pending(&self) -> usize {
        self.links.iter().map(CollectionSubscription::pending).sum()
    }

    /// Drains queued change events until no recompute produces new ones.
    ///
    /// Each round processes exams, then modules, then divisions, so a leaf
    /// change usually reaches its school within one round.
    pub fn pump(&self, store: &GradeStore) -> PropagationReport {
        let mut report = PropagationReport::default();
        while report.rounds < self.max_rounds {
            let mut drained = 0;
            for link in &self.links {
                let events = link.drain();
                drained += events.len();

                let mut latest: HashMap<RecordId, ChildSnapshot> = HashMap::new();
                let mut order: Vec<RecordId> = Vec::new();
                for event in events {
                    let Some(parent_id) = event.parent_id else {
                        continue;
                    };
                    if latest.insert(parent_id, event.snapshot).is_none() {
                        order.push(parent_id);
                    }
                }
                for parent_id in order {
                    if let Some(snapshot) = latest.remove(&parent_id) {
                        self.apply(store, link.kind(), parent_id, &snapshot, &mut report);
                    }
                }
            }

            if drained == 0 {
                break;
            }
            report.events += drained;
            report.rounds += 1;
        }

        let leftover = self.pending();
        if leftover > 0 {
            warn!(
                "event=propagate module=service status=incomplete rounds={} pending={}",
                report.rounds, leftover
            );
        }
        if report.events > 0 {
            debug!(
                "event=propagate module=service status=ok events={} recomputed={} written={} stale={} failed={}",
                report.events, report.recomputed, report.written, report.stale, report.failed
            );
        }
        report
    }

    /// Recomputes one parent from its current children.
    ///
    /// Returns whether the stored average changed.
    pub fn recompute(
        &self,
        store: &GradeStore,
        parent_kind: EntityKind,
        parent_id: RecordId,
    ) -> StoreResult<bool> {
        let child_kind = parent_kind
            .child_kind()
            .ok_or(StoreError::NotAggregate(parent_kind))?;
        let snapshot = store.snapshot(child_kind, Some(parent_id), true)?;
        store.write_average(parent_kind, parent_id, snapshot.aggregate())
    }

    /// Recomputes every non-leaf record bottom-up, then drains the
    /// resulting events.
    ///
    /// Repairs caches written by an older binary or edited by hand.
    pub fn reconcile(&self, store: &GradeStore) -> StoreResult<PropagationReport> {
        let mut report = PropagationReport::default();
        for parent_kind in [EntityKind::Module, EntityKind::Division, EntityKind::School] {
            for parent_id in store.record_ids(parent_kind)? {
                report.recomputed += 1;
                if self.recompute(store, parent_kind, parent_id)? {
                    report.written += 1;
                }
            }
        }
        report.absorb(self.pump(store));
        Ok(report)
    }

    /// Runs a final drain and releases the subscriptions.
    pub fn shutdown(self, store: &GradeStore) -> PropagationReport {
        self.pump(store)
    }

    fn apply(
        &self,
        store: &GradeStore,
        child_kind: EntityKind,
        parent_id: RecordId,
        snapshot: &ChildSnapshot,
        report: &mut PropagationReport,
    ) {
        let Some(parent_kind) = child_kind.parent_kind() else {
            return;
        };
        report.recomputed += 1;
        match store.write_average(parent_kind, parent_id, snapshot.aggregate()) {
            Ok(true) => report.written += 1,
            Ok(false) => {}
            Err(StoreError::StalePropagationTarget { kind, id }) => {
                report.stale += 1;
                warn!("event=propagate module=service status=stale kind={kind} id={id}");
            }
            Err(err) => {
                report.failed += 1;
                error!(
                    "event=propagate module=service status=error kind={parent_kind} id={parent_id} error={err}"
                );
            }
        }
    }
}

impl Drop for PropagationPipeline {
    fn drop(&mut self) {
        let pending = self.pending();
        if pending > 0 {
            warn!("event=propagate_teardown module=service status=dropped pending={pending}");
        }
    }
}

/// Overall average of included, active schools.
///
/// Schools have no parent to cache this on, so it is computed on read.
pub fn root_average(store: &GradeStore) -> StoreResult<Average> {
    Ok(store.snapshot(EntityKind::School, None, true)?.aggregate())
}
