//! Todo graph engine.
//! Keeps a graph of todos linked by precedence and hierarchy edges, validates
//! every mutation against graph invariants and cascades interval changes to
//! related todos.

pub mod config;
pub mod logging;
pub mod model;
pub mod repo;
pub mod rules;
pub mod service;
pub mod timeline;

pub use config::{ConfigError, EngineConfig, TransitiveCheck};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::edges::{EdgeChangeError, EdgeChanges, EdgeDelta, Relation, TodoEdges};
pub use model::todo::{
    Interval, NewTodo, ProjectId, RepeatPeriod, Todo, TodoId, TodoPatch, TodoValidationError,
};
pub use repo::graph_store::{
    GraphStore, GraphView, InMemoryGraphStore, StoreError, StoreResult, TodoListQuery, TodoShape,
};
pub use rules::validator::{
    ConstraintValidator, MutationKind, ValidationInput, ValidationResult, Violation,
    ViolationField,
};
pub use service::report::{
    CascadeFailure, CascadeFailureReason, CascadeTrace, PropagationReport, StepOutcome,
};
pub use service::update_coordinator::{CreateOutcome, MutationError, UpdateCoordinator};
pub use timeline::propagator::{CascadeRule, GateReason, IntervalChange, TimelinePropagator};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
