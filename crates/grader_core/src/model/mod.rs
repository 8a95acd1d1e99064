//! Grade hierarchy domain model.
//!
//! # Responsibility
//! - Define the four record kinds (school, division, module, exam).
//! - Describe the parent/child shape shared by every level.
//! - Validate command input before it reaches storage or aggregation.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - Deletion is first a soft-delete flag; physical removal is a purge.
//! - Only exams carry their own grade; every other level stores a derived
//!   average of its children.

pub mod division;
pub mod entity;
pub mod exam;
pub mod module;
pub mod school;
pub mod validation;
