//! Graph storage abstractions.
//!
//! # Responsibility
//! - Define the read (`GraphView`) and write (`GraphStore`) contracts used by
//!   validation and orchestration.
//! - Provide the in-memory implementation.
//!
//! # Invariants
//! - Store writes enforce `Todo::validate()` and referential integrity.
//! - Graph-position rules are not checked here; see `rules::validator`.

pub mod graph_store;
