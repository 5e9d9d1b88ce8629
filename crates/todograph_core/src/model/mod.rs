//! Domain model for schedulable todos and their relations.
//!
//! # Responsibility
//! - Define the node shape, its interval and attribute payloads.
//! - Define the four edge relations and edge deltas.
//!
//! # Invariants
//! - Every todo is identified by a stable `TodoId`.
//! - Precedence and hierarchy are independent axes.

pub mod edges;
pub mod todo;
