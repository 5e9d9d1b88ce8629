//! Structured outcome of one update and its cascade.
//!
//! # Responsibility
//! - Record which todos were committed, in commit order.
//! - Record every cascade step the coordinator looked at, including gated and
//!   skipped ones, and the step that stopped the cascade.
//!
//! # Invariants
//! - `updated_todo_ids` holds each id at most once.
//! - At most one failure is recorded per run; nothing after it is applied.

use crate::model::todo::{Interval, TodoId};
use crate::rules::validator::Violation;
use crate::timeline::propagator::{CascadeRule, CascadeStep, GateReason};
use serde::{Deserialize, Serialize};

/// What happened to one cascade step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied { before: Interval, after: Interval },
    Gated { reason: GateReason },
    /// The target was already moved by the same rule from the same source in
    /// this run.
    AlreadyVisited,
    Failed,
}

/// One line of the cascade trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeTrace {
    pub rule: CascadeRule,
    pub source: TodoId,
    pub target: TodoId,
    pub delta_secs: i64,
    pub outcome: StepOutcome,
}

impl CascadeTrace {
    pub(crate) fn new(step: &CascadeStep, outcome: StepOutcome) -> Self {
        Self {
            rule: step.rule,
            source: step.source,
            target: step.target,
            delta_secs: step.delta.whole_seconds(),
            outcome,
        }
    }
}

/// Why a cascade step could not be committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CascadeFailureReason {
    /// The shifted todo failed validation.
    Rejected { violations: Vec<Violation> },
    /// The store refused the write.
    Store { message: String },
    /// The shifted interval falls outside the representable date range.
    OutOfRange,
}

/// The cascade step that stopped propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeFailure {
    pub todo_id: TodoId,
    pub source: TodoId,
    pub rule: CascadeRule,
    pub reason: CascadeFailureReason,
}

impl CascadeFailure {
    /// Violations behind the failure; empty for store failures.
    pub fn violations(&self) -> &[Violation] {
        match &self.reason {
            CascadeFailureReason::Rejected { violations } => violations,
            CascadeFailureReason::Store { .. } | CascadeFailureReason::OutOfRange => &[],
        }
    }
}

/// Result of `UpdateCoordinator::update_todo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationReport {
    /// Todo the caller updated.
    pub root: TodoId,
    /// Committed todos in commit order, root first when it changed.
    pub updated_todo_ids: Vec<TodoId>,
    pub failures: Vec<CascadeFailure>,
    pub trace: Vec<CascadeTrace>,
}

impl PropagationReport {
    pub fn new(root: TodoId) -> Self {
        Self {
            root,
            updated_todo_ids: Vec::new(),
            failures: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// True when the cascade ran to the end.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// True when nothing was written and no step was considered.
    pub fn is_noop(&self) -> bool {
        self.updated_todo_ids.is_empty() && self.trace.is_empty()
    }

    /// Todos moved by the cascade, excluding the root.
    pub fn cascaded_ids(&self) -> impl Iterator<Item = TodoId> + '_ {
        self.updated_todo_ids
            .iter()
            .copied()
            .filter(move |id| *id != self.root)
    }

    pub(crate) fn record_update(&mut self, id: TodoId) {
        if !self.updated_todo_ids.contains(&id) {
            self.updated_todo_ids.push(id);
        }
    }
}
