//! Constraint validation.
//!
//! # Responsibility
//! - Check proposed todo states against graph-position invariants.
//! - Stage pending changes as a read-only overlay for validation.
//!
//! # Invariants
//! - Nothing in this module writes to a `GraphStore`.

pub mod proposed;
pub mod validator;
