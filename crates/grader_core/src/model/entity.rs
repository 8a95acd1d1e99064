//! Shared shape of hierarchy records.

use crate::aggregate::Average;
use crate::model::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of any record in the hierarchy.
///
/// Ids are unique across all four kinds, so an id alone locates a record.
pub type RecordId = Uuid;

/// Level of a record in the school → division → module → exam hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    School,
    Division,
    Module,
    Exam,
}

impl EntityKind {
    /// All kinds, root first.
    pub const ALL: [EntityKind; 4] = [Self::School, Self::Division, Self::Module, Self::Exam];

    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            Self::School => "schools",
            Self::Division => "divisions",
            Self::Module => "modules",
            Self::Exam => "exams",
        }
    }

    /// Column holding the parent id, `None` for the root level.
    pub fn parent_column(self) -> Option<&'static str> {
        match self {
            Self::School => None,
            Self::Division => Some("school_id"),
            Self::Module => Some("division_id"),
            Self::Exam => Some("module_id"),
        }
    }

    pub fn parent_kind(self) -> Option<EntityKind> {
        match self {
            Self::School => None,
            Self::Division => Some(Self::School),
            Self::Module => Some(Self::Division),
            Self::Exam => Some(Self::Module),
        }
    }

    pub fn child_kind(self) -> Option<EntityKind> {
        match self {
            Self::School => Some(Self::Division),
            Self::Division => Some(Self::Module),
            Self::Module => Some(Self::Exam),
            Self::Exam => None,
        }
    }

    /// Whether records of this kind hold a derived average.
    pub fn is_aggregate(self) -> bool {
        self.child_kind().is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::School => "school",
            Self::Division => "division",
            Self::Module => "module",
            Self::Exam => "exam",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common contract of the four record kinds.
pub trait GradeEntity: Clone + std::fmt::Debug + Send + 'static {
    /// Level this record type lives on.
    const KIND: EntityKind;

    fn id(&self) -> RecordId;
    /// Owning record, `None` for schools.
    fn parent_id(&self) -> Option<RecordId>;
    fn name(&self) -> &str;
    /// "Is selected" flag: whether the record counts toward its parent.
    fn is_included(&self) -> bool;
    /// Soft-delete flag.
    fn is_deleted(&self) -> bool;
    /// `(value, weight)` this record contributes to its parent's average.
    fn contribution(&self) -> (f64, f64);
    /// Derived average for non-leaf records, `None` for exams.
    fn stored_average(&self) -> Option<Average>;
    /// Trims user-entered text fields in place.
    fn normalize(&mut self);
    /// Checks field-level invariants.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Whether this record is an input of its parent's aggregation.
    fn counts_toward_parent(&self) -> bool {
        self.is_included() && !self.is_deleted()
    }
}

pub(crate) fn trim_optional(value: &mut Option<String>) {
    if let Some(text) = value.as_mut() {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            *value = None;
        } else if trimmed.len() != text.len() {
            *text = trimmed.to_string();
        }
    }
}

pub(crate) fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}
