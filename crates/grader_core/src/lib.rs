//! Weighted grade aggregation over a school hierarchy.
//!
//! Schools own divisions, divisions own modules, modules own exams. Every
//! non-leaf record caches the weighted average of its included, active
//! children; the propagation pipeline keeps those caches current.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use aggregate::{
    round_half_even, unweighted_average, weighted_average, Average, AVERAGE_DECIMALS,
};
pub use config::{ConfigError, GraderConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::division::Division;
pub use model::entity::{EntityKind, GradeEntity, RecordId};
pub use model::exam::Exam;
pub use model::module::Module;
pub use model::school::School;
pub use model::validation::ValidationError;
pub use repo::changes::{ChangeEvent, ChildSnapshot, CollectionSubscription, Subscription};
pub use repo::grade_repo::{GradeStore, Location, PurgeSummary};
pub use repo::tables::StoredEntity;
pub use repo::{StoreError, StoreResult};
pub use service::gradebook_service::{GradebookService, ServiceError};
pub use service::lifecycle::{DeleteScope, DeleteState, LifecycleError, UndoToken};
pub use service::propagation::{root_average, PropagationPipeline, PropagationReport};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
