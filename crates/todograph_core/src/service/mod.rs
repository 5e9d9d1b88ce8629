//! Mutation services over the todo graph.
//!
//! # Responsibility
//! - Orchestrate validation, store writes and cascades into use-case APIs.
//! - Report cascade outcomes as structured values instead of log output.

pub mod report;
pub mod update_coordinator;
