//! Modules collect the exams of one subject.

use crate::aggregate::Average;
use crate::model::entity::{trim_in_place, trim_optional, EntityKind, GradeEntity, RecordId};
use crate::model::validation::{check_description, check_name, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A module inside one division.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: RecordId,
    pub division_id: RecordId,
    pub name: String,
    pub description: Option<String>,
    pub included: bool,
    /// Weighted average of included, active exams. Written by propagation only.
    pub stored_average: Average,
    pub is_deleted: bool,
}

impl Module {
    pub fn new(division_id: RecordId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            division_id,
            name: name.into(),
            description: None,
            included: false,
            stored_average: Average::UNDEFINED,
            is_deleted: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the module as counting toward its parent's average.
    pub fn selected(mut self) -> Self {
        self.included = true;
        self
    }
}

impl GradeEntity for Module {
    const KIND: EntityKind = EntityKind::Module;

    fn id(&self) -> RecordId {
        self.id
    }

    fn parent_id(&self) -> Option<RecordId> {
        Some(self.division_id)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_included(&self) -> bool {
        self.included
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn contribution(&self) -> (f64, f64) {
        (self.stored_average.value(), 1.0)
    }

    fn stored_average(&self) -> Option<Average> {
        Some(self.stored_average)
    }

    fn normalize(&mut self) {
        trim_in_place(&mut self.name);
        trim_optional(&mut self.description);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        check_name(&self.name)?;
        check_description(self.description.as_deref())
    }
}
