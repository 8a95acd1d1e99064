//! School records, the root of the hierarchy.

use crate::aggregate::Average;
use crate::model::entity::{trim_in_place, trim_optional, EntityKind, GradeEntity, RecordId};
use crate::model::validation::{check_description, check_name, check_zip, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A school owning divisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub id: RecordId,
    pub name: String,
    pub address: String,
    pub zip_code: String,
    pub city: String,
    pub description: Option<String>,
    /// Counts toward the overall average when set.
    pub included: bool,
    /// Derived from included, active divisions. Written by propagation only.
    pub stored_average: Average,
    pub is_deleted: bool,
}

impl School {
    /// Creates a new active, unselected school with a generated id.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        zip_code: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            address: address.into(),
            zip_code: zip_code.into(),
            city: city.into(),
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

    /// Marks the school as counting toward its parent's average.
    pub fn selected(mut self) -> Self {
        self.included = true;
        self
    }
}

impl GradeEntity for School {
    const KIND: EntityKind = EntityKind::School;

    fn id(&self) -> RecordId {
        self.id
    }

    fn parent_id(&self) -> Option<RecordId> {
        None
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
        trim_in_place(&mut self.address);
        trim_in_place(&mut self.zip_code);
        trim_in_place(&mut self.city);
        trim_optional(&mut self.description);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        check_name(&self.name)?;
        if self.address.trim().is_empty() {
            return Err(ValidationError::BlankAddress);
        }
        check_zip(&self.zip_code)?;
        if self.city.trim().is_empty() {
            return Err(ValidationError::BlankCity);
        }
        check_description(self.description.as_deref())
    }
}
