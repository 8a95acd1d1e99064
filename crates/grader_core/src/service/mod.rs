//! Use-case services on top of the entity store.
//!
//! # Responsibility
//! - Keep cached parent averages consistent with child changes.
//! - Run the soft-delete, undo and purge lifecycle.
//! - Expose one command/query facade to callers.

pub mod gradebook_service;
pub mod lifecycle;
pub mod propagation;
