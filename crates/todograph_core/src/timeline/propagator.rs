//! Interval propagation rules.
//!
//! # Responsibility
//! - Compute the start-date self-shift of a staged todo.
//! - Plan the cascade steps implied by one committed interval change.
//! - Resolve a planned step against the current graph into a shifted todo.
//!
//! # Invariants
//! - Every function is a pure function of its inputs.
//! - Deltas below the debounce threshold never produce work.
//! - Parents are only ever pulled later, never earlier.

use crate::config::EngineConfig;
use crate::model::edges::Relation;
use crate::model::todo::{Interval, Todo, TodoId};
use crate::repo::graph_store::GraphView;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Interval of one todo immediately before and after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalChange {
    pub before: Interval,
    pub after: Interval,
}

impl IntervalChange {
    pub fn new(before: Interval, after: Interval) -> Self {
        Self { before, after }
    }

    pub fn start_delta(&self) -> Duration {
        self.after.start_date - self.before.start_date
    }

    pub fn end_delta(&self) -> Duration {
        self.after.end_date - self.before.end_date
    }
}

/// Cascade rule that produced a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeRule {
    /// Child moves with its parent's start date.
    ShiftChild,
    /// Dependent moves after its latest dependency's end date.
    ShiftDependent,
    /// Parent end date follows its latest child.
    PullParentEnd,
}

impl CascadeRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShiftChild => "shift_child",
            Self::ShiftDependent => "shift_dependent",
            Self::PullParentEnd => "pull_parent_end",
        }
    }
}

/// One pending cascade step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeStep {
    pub rule: CascadeRule,
    /// Todo whose change triggered the step.
    pub source: TodoId,
    pub target: TodoId,
    /// Start delta for `ShiftChild`, end delta otherwise.
    pub delta: Duration,
}

/// Why a planned step left its target untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    /// Another dependency of the dependent ends later than the source.
    NotLatestDependency,
    /// The dependent already starts after the source's new end date.
    NoOverlap,
    /// Another child of the parent ends later than the source.
    NotLatestChild,
    /// The parent already ends at or after the source's end date.
    ParentEndsLater,
    /// Source or target disappeared from the graph.
    MissingTodo,
}

/// Result of resolving one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResolution {
    /// The target with its new interval, ready for validation.
    Apply(Todo),
    Gated(GateReason),
    /// The shifted interval leaves the representable date range.
    OutOfRange,
}

/// Date propagation planner.
#[derive(Debug, Clone)]
pub struct TimelinePropagator {
    debounce: Duration,
}

impl TimelinePropagator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            debounce: config.debounce(),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn exceeds_debounce(&self, delta: Duration) -> bool {
        delta.abs() >= self.debounce
    }

    /// Applies the start-date self-shift to a requested interval.
    ///
    /// When the start moves past the threshold and the end was not moved past
    /// it independently, the end moves by the same delta. `None` when the
    /// shifted end leaves the representable date range.
    pub fn stage_interval(&self, before: Interval, requested: Interval) -> Option<Interval> {
        let start_delta = requested.start_date - before.start_date;
        let end_delta = requested.end_date - before.end_date;
        if self.exceeds_debounce(start_delta) && !self.exceeds_debounce(end_delta) {
            let end_date = requested.end_date.checked_add(start_delta)?;
            return Some(Interval::new(requested.start_date, end_date));
        }
        Some(requested)
    }

    /// Delta every child moves by, when the start moved past the threshold.
    pub fn child_shift(&self, change: &IntervalChange) -> Option<Duration> {
        let delta = change.start_delta();
        self.exceeds_debounce(delta).then_some(delta)
    }

    /// Delta the whole subtree under a todo moves by, when the todo itself
    /// moved as a block: the start past the threshold and the end along with
    /// it. Children then end up at their positions shifted by the same delta.
    pub fn subtree_shift(&self, change: &IntervalChange) -> Option<Duration> {
        let delta = self.child_shift(change)?;
        let drift = change.end_delta() - delta;
        (!self.exceeds_debounce(drift)).then_some(delta)
    }

    /// Steps implied by `change` on `source`, in discovery order: children,
    /// then dependents, then parents, each in edge order.
    pub fn plan<V: GraphView + ?Sized>(
        &self,
        view: &V,
        source: TodoId,
        change: &IntervalChange,
    ) -> Vec<CascadeStep> {
        let mut steps = Vec::new();
        let step = |rule, target, delta| CascadeStep {
            rule,
            source,
            target,
            delta,
        };

        if let Some(delta) = self.child_shift(change) {
            for child in view.related(source, Relation::Children) {
                steps.push(step(CascadeRule::ShiftChild, *child, delta));
            }
        }

        let end_delta = change.end_delta();
        if end_delta >= self.debounce {
            for dependent in view.related(source, Relation::Dependents) {
                steps.push(step(CascadeRule::ShiftDependent, *dependent, end_delta));
            }
        }
        if self.exceeds_debounce(end_delta) {
            for parent in view.related(source, Relation::Parents) {
                steps.push(step(CascadeRule::PullParentEnd, *parent, end_delta));
            }
        }

        steps
    }

    /// Evaluates the step's gate against the current graph.
    pub fn resolve<V: GraphView + ?Sized>(&self, view: &V, step: &CascadeStep) -> StepResolution {
        let (Some(source), Some(target)) = (view.todo(step.source), view.todo(step.target)) else {
            return StepResolution::Gated(GateReason::MissingTodo);
        };

        match step.rule {
            CascadeRule::ShiftChild => shifted(target, step.delta),
            CascadeRule::ShiftDependent => {
                if !is_latest(view, step.target, Relation::Dependencies, source) {
                    return StepResolution::Gated(GateReason::NotLatestDependency);
                }
                if target.start_date >= source.end_date {
                    return StepResolution::Gated(GateReason::NoOverlap);
                }
                shifted(target, step.delta)
            }
            CascadeRule::PullParentEnd => {
                if !is_latest(view, step.target, Relation::Children, source) {
                    return StepResolution::Gated(GateReason::NotLatestChild);
                }
                if target.end_date >= source.end_date {
                    return StepResolution::Gated(GateReason::ParentEndsLater);
                }
                let mut pulled = target.clone();
                pulled.end_date = source.end_date;
                StepResolution::Apply(pulled)
            }
        }
    }
}

fn shifted(todo: &Todo, delta: Duration) -> StepResolution {
    let Some(interval) = todo.interval().checked_shift(delta) else {
        return StepResolution::OutOfRange;
    };
    let mut next = todo.clone();
    next.set_interval(interval);
    StepResolution::Apply(next)
}

/// Whether `candidate` belongs to `owner`'s relation and no member of it ends
/// strictly later. Ties count as latest.
fn is_latest<V: GraphView + ?Sized>(
    view: &V,
    owner: TodoId,
    relation: Relation,
    candidate: &Todo,
) -> bool {
    let members = view.related(owner, relation);
    if !members.contains(&candidate.id) {
        return false;
    }
    let latest: Option<OffsetDateTime> = members
        .iter()
        .filter_map(|id| view.todo(*id))
        .map(|todo| todo.end_date)
        .max();
    latest.map_or(true, |end_date| candidate.end_date >= end_date)
}
