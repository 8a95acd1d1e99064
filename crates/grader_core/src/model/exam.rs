//! Exams are the graded leaves of the hierarchy.

use crate::aggregate::Average;
use crate::model::entity::{trim_in_place, trim_optional, EntityKind, GradeEntity, RecordId};
use crate::model::validation::{
    check_description, check_grade, check_name, check_weight, ValidationError,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single graded exam inside one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub id: RecordId,
    pub module_id: RecordId,
    pub name: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub grade: f64,
    /// Relative weight inside the module. Must be strictly positive.
    pub weight: f64,
    pub included: bool,
    pub is_deleted: bool,
}

impl Exam {
    pub fn new(
        module_id: RecordId,
        name: impl Into<String>,
        grade: f64,
        weight: f64,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            module_id,
            name: name.into(),
            description: None,
            date,
            grade,
            weight,
            included: false,
            is_deleted: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the exam as counting toward its module.
    pub fn selected(mut self) -> Self {
        self.included = true;
        self
    }
}

impl GradeEntity for Exam {
    const KIND: EntityKind = EntityKind::Exam;

    fn id(&self) -> RecordId {
        self.id
    }

    fn parent_id(&self) -> Option<RecordId> {
        Some(self.module_id)
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
        (self.grade, self.weight)
    }

    fn stored_average(&self) -> Option<Average> {
        None
    }

    fn normalize(&mut self) {
        trim_in_place(&mut self.name);
        trim_optional(&mut self.description);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        check_name(&self.name)?;
        check_grade(self.grade)?;
        check_weight(self.weight)?;
        check_description(self.description.as_deref())
    }
}
