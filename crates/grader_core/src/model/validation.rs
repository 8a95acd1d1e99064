//! Field validation for hierarchy commands.
//!
//! # Invariants
//! - Every check runs before any write; a failed check leaves storage untouched.
//! - Weight and grade checks live here, never inside the aggregator.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Maximum name length in characters.
pub const MAX_NAME_CHARS: usize = 100;
/// Maximum description length in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;
/// Largest accepted exam grade.
pub const MAX_GRADE: f64 = 1_000.0;
/// Largest accepted exam weight.
pub const MAX_WEIGHT: f64 = 1_000.0;

const ZIP_MIN_CHARS: usize = 4;
const ZIP_MAX_CHARS: usize = 10;

/// Structured reason a command was rejected at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Name is blank after trim.
    BlankName,
    /// Name exceeds [`MAX_NAME_CHARS`].
    NameTooLong { max: usize },
    /// Description exceeds [`MAX_DESCRIPTION_CHARS`].
    DescriptionTooLong { max: usize },
    /// School address is blank.
    BlankAddress,
    /// School city is blank.
    BlankCity,
    /// Zip code is not 4-10 ASCII digits.
    InvalidZip(String),
    /// School year is negative.
    InvalidSchoolYear(i32),
    /// Grade is not a finite, non-negative number.
    InvalidGrade(f64),
    /// Weight is not a finite, strictly positive number.
    InvalidWeight(f64),
    /// Grade exceeds [`MAX_GRADE`].
    GradeTooLarge { max: f64 },
    /// Weight exceeds [`MAX_WEIGHT`].
    WeightTooLarge { max: f64 },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "name must not be blank"),
            Self::NameTooLong { max } => write!(f, "name must be at most {max} characters"),
            Self::DescriptionTooLong { max } => {
                write!(f, "description must be at most {max} characters")
            }
            Self::BlankAddress => write!(f, "address must not be blank"),
            Self::BlankCity => write!(f, "city must not be blank"),
            Self::InvalidZip(zip) => write!(f, "zip code `{zip}` must be 4-10 digits"),
            Self::InvalidSchoolYear(year) => {
                write!(f, "school year must not be negative, got {year}")
            }
            Self::InvalidGrade(grade) => {
                write!(f, "grade must be a finite non-negative number, got {grade}")
            }
            Self::InvalidWeight(weight) => {
                write!(f, "weight must be strictly positive, got {weight}")
            }
            Self::GradeTooLarge { max } => write!(f, "grade must be at most {max}"),
            Self::WeightTooLarge { max } => write!(f, "weight must be at most {max}"),
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn check_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankName);
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::NameTooLong {
            max: MAX_NAME_CHARS,
        });
    }
    Ok(())
}

pub(crate) fn check_description(description: Option<&str>) -> Result<(), ValidationError> {
    match description {
        Some(text) if text.trim().chars().count() > MAX_DESCRIPTION_CHARS => {
            Err(ValidationError::DescriptionTooLong {
                max: MAX_DESCRIPTION_CHARS,
            })
        }
        _ => Ok(()),
    }
}

pub(crate) fn check_zip(zip: &str) -> Result<(), ValidationError> {
    let trimmed = zip.trim();
    let length_ok = (ZIP_MIN_CHARS..=ZIP_MAX_CHARS).contains(&trimmed.len());
    if !length_ok || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(ValidationError::InvalidZip(zip.to_string()));
    }
    Ok(())
}

pub(crate) fn check_grade(grade: f64) -> Result<(), ValidationError> {
    if !grade.is_finite() || grade < 0.0 {
        return Err(ValidationError::InvalidGrade(grade));
    }
    if grade > MAX_GRADE {
        return Err(ValidationError::GradeTooLarge { max: MAX_GRADE });
    }
    Ok(())
}

/// Rejects zero, negative, non-finite and oversized weights.
pub fn check_weight(weight: f64) -> Result<(), ValidationError> {
    if !weight.is_finite() || weight <= 0.0 {
        return Err(ValidationError::InvalidWeight(weight));
    }
    if weight > MAX_WEIGHT {
        return Err(ValidationError::WeightTooLarge { max: MAX_WEIGHT });
    }
    Ok(())
}
