//! Gradebook use-case service.
//!
//! # Responsibility
//! - Offer the command and query surface over one store.
//! - Settle parent averages after each command when auto-propagation is on.
//!
//! # Invariants
//! - Commands never write averages directly; only the pipeline does.
//! - With auto-propagation on, every command returns with all averages
//!   consistent with live children.

use crate::aggregate::Average;
use crate::config::{ConfigError, GraderConfig};
use crate::logging::{init_logging, LoggingError};
use crate::model::entity::{EntityKind, RecordId};
use crate::repo::changes::Subscription;
use crate::repo::grade_repo::{GradeStore, PurgeSummary};
use crate::repo::tables::StoredEntity;
use crate::repo::{StoreError, StoreResult};
use crate::service::lifecycle::{self, DeleteScope, DeleteState, LifecycleError, UndoToken};
use crate::service::propagation::{root_average, PropagationPipeline, PropagationReport};
use log::info;
use std::fmt::{Display, Formatter};

/// Startup failures of [`GradebookService::open`].
#[derive(Debug)]
pub enum ServiceError {
    Config(ConfigError),
    Logging(LoggingError),
    Store(StoreError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<ConfigError> for ServiceError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for ServiceError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Store plus propagation pipeline behind one API.
pub struct GradebookService {
    store: GradeStore,
    pipeline: PropagationPipeline,
    auto_propagate: bool,
}

impl GradebookService {
    /// Opens the configured database and repairs stale averages.
    pub fn open(config: &GraderConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        if let Some(log_dir) = &config.log_dir {
            init_logging(&config.log_level, log_dir)?;
        }

        let store = match &config.db_path {
            Some(path) => GradeStore::open(path)?,
            None => GradeStore::open_in_memory()?,
        };
        let service = Self::with_store(store, config);
        let report = service.pipeline.reconcile(&service.store)?;
        info!(
            "event=service_open module=service status=ok in_memory={} auto_propagate={} repaired={}",
            config.db_path.is_none(),
            service.auto_propagate,
            report.written
        );
        Ok(service)
    }

    /// In-memory service with default settings.
    pub fn open_in_memory() -> Result<Self, ServiceError> {
        Self::open(&GraderConfig::default())
    }

    /// Wraps an existing store without reconciling it.
    pub fn with_store(store: GradeStore, config: &GraderConfig) -> Self {
        let pipeline = PropagationPipeline::with_max_rounds(&store, config.max_propagation_rounds);
        Self {
            store,
            pipeline,
            auto_propagate: config.auto_propagate,
        }
    }

    pub fn store(&self) -> &GradeStore {
        &self.store
    }

    pub fn auto_propagate(&self) -> bool {
        self.auto_propagate
    }

    /// Drains queued changes into parent averages now.
    ///
    /// Needed only when auto-propagation is off.
    pub fn propagate(&self) -> PropagationReport {
        self.pipeline.pump(&self.store)
    }

    /// Recomputes every cached average from scratch.
    pub fn reconcile(&self) -> StoreResult<PropagationReport> {
        self.pipeline.reconcile(&self.store)
    }

    pub fn create<T: StoredEntity>(&self, record: T) -> StoreResult<T> {
        let created = self.store.create(record)?;
        self.settle();
        Ok(created)
    }

    /// Creates `record` after purging what `scope` still holds pending.
    pub fn create_in_scope<T: StoredEntity>(
        &self,
        scope: &mut DeleteScope,
        record: T,
    ) -> Result<T, LifecycleError> {
        if scope.kind() != T::KIND || scope.parent_id() != record.parent_id() {
            return Err(LifecycleError::OutOfScope {
                id: record.id(),
                kind: scope.kind(),
                parent_id: scope.parent_id(),
            });
        }
        scope.begin_create(&self.store)?;
        Ok(self.create(record)?)
    }

    /// Saves edited fields. Reparenting moves the record and its subtree.
    pub fn update<T: StoredEntity>(&self, record: &T) -> StoreResult<T> {
        let updated = self.store.update(record)?;
        self.settle();
        Ok(updated)
    }

    /// Flips whether a record counts toward its parent.
    pub fn set_included(&self, id: RecordId, included: bool) -> StoreResult<bool> {
        let changed = self.store.set_included(id, included)?;
        self.settle();
        Ok(changed)
    }

    /// Inverts the include flag and returns the new value.
    pub fn toggle_included(&self, id: RecordId) -> StoreResult<bool> {
        let included = self.store.is_included(id)?;
        self.set_included(id, !included)?;
        Ok(!included)
    }

    pub fn soft_delete(&self, id: RecordId) -> StoreResult<Option<UndoToken>> {
        let token = lifecycle::soft_delete(&self.store, id)?;
        self.settle();
        Ok(token)
    }

    pub fn undo_soft_delete(&self, token: UndoToken) -> StoreResult<bool> {
        let changed = lifecycle::undo(&self.store, token)?;
        self.settle();
        Ok(changed)
    }

    /// Removes a record and its subtree for good.
    pub fn purge(&self, id: RecordId) -> StoreResult<PurgeSummary> {
        let summary = self.store.purge(id)?;
        self.settle();
        Ok(summary)
    }

    /// Starts a delete session over the children of `parent_id`.
    pub fn open_scope(&self, kind: EntityKind, parent_id: Option<RecordId>) -> DeleteScope {
        DeleteScope::new(kind, parent_id)
    }

    pub fn delete_in_scope(
        &self,
        scope: &mut DeleteScope,
        id: RecordId,
    ) -> Result<Option<UndoToken>, LifecycleError> {
        let token = scope.delete(&self.store, id)?;
        self.settle();
        Ok(token)
    }

    pub fn undo_in_scope(
        &self,
        scope: &mut DeleteScope,
        token: UndoToken,
    ) -> Result<bool, LifecycleError> {
        let changed = scope.undo(&self.store, token)?;
        self.settle();
        Ok(changed)
    }

    /// Ends a delete session, purging whatever is still pending.
    pub fn close_scope(&self, scope: DeleteScope) -> Result<usize, LifecycleError> {
        let purged = scope.close(&self.store)?;
        self.settle();
        Ok(purged)
    }

    pub fn get<T: StoredEntity>(&self, id: RecordId) -> StoreResult<T> {
        self.store.get(id)
    }

    /// Visible children of `parent_id` in insertion order.
    pub fn list_children<T: StoredEntity>(&self, parent_id: Option<RecordId>) -> StoreResult<Vec<T>> {
        self.store.list_children(parent_id, false)
    }

    /// Live stream of the visible children of `parent_id`.
    pub fn observe_children<T: StoredEntity>(
        &self,
        parent_id: Option<RecordId>,
    ) -> StoreResult<Subscription<T>> {
        self.store.subscribe(parent_id)
    }

    /// Average of `parent_id`, or across all schools for `None`.
    pub fn current_average(&self, parent_id: Option<RecordId>) -> StoreResult<Average> {
        let Some(id) = parent_id else {
            return root_average(&self.store);
        };
        let location = self.store.locate(id)?.ok_or(StoreError::NotFound(id))?;
        self.store.stored_average(location.kind, id)
    }

    pub fn state_of(&self, id: RecordId) -> StoreResult<DeleteState> {
        lifecycle::state_of(&self.store, id)
    }

    /// Final drain of queued changes, then release of the store.
    pub fn shutdown(self) -> PropagationReport {
        let Self {
            store, pipeline, ..
        } = self;
        let report = pipeline.shutdown(&store);
        info!(
            "event=service_shutdown module=service status=ok recomputed={} written={}",
            report.recomputed, report.written
        );
        report
    }

    fn settle(&self) {
        if self.auto_propagate {
            self.pipeline.pump(&self.store);
        }
    }
}
