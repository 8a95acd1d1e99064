//! Divisions group the modules of one school year.

use crate::aggregate::Average;
use crate::model::entity::{trim_in_place, trim_optional, EntityKind, GradeEntity, RecordId};
use crate::model::validation::{check_description, check_name, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A division inside one school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Division {
    pub id: RecordId,
    pub school_id: RecordId,
    pub name: String,
    pub description: Option<String>,
    pub school_year: i32,
    pub included: bool,
    /// Derived from included, active modules. Written by propagation only.
    pub stored_average: Average,
    pub is_deleted: bool,
}

impl Division {
    pub fn new(school_id: RecordId, name: impl Into<String>, school_year: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            school_id,
            name: name.into(),
            description: None,
            school_year,
            included: false,
            stored_average: Average::UNDEFINED,
            is_deleted: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the division as counting toward its parent's average.
    pub fn selected(mut self) -> Self {
        self.included = true;
        self
    }
}

impl GradeEntity for Division {
    const KIND: EntityKind = EntityKind::Division;

    fn id(&self) -> RecordId {
        self.id
    }

    fn parent_id(&self) -> Option<RecordId> {
        Some(self.school_id)
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
        if self.school_year < 0 {
            return Err(ValidationError::InvalidSchoolYear(self.school_year));
        }
        check_description(self.description.as_deref())
    }
}
