//! Mutation orchestration for the todo graph.
//!
//! # Responsibility
//! - Run one logical mutation: stage, validate, commit, then cascade.
//! - Re-validate the other endpoint of every edge the mutation adds or removes.
//! - Drive cascades from an explicit worklist and report what happened.
//!
//! # Invariants
//! - A rejected mutation writes nothing.
//! - Every committed todo, root or cascaded, passed validation first.
//! - Cascade writes happen in discovery order; the first failing step stops
//!   the cascade and earlier commits stay.
//! - Each `(target, rule, source)` step is applied at most once per run.
//! - A parent gaining a child carries `repeat = true`.

use crate::config::{ConfigError, EngineConfig};
use crate::model::edges::{EdgeChanges, Relation, TodoEdges};
use crate::model::todo::{NewTodo, Todo, TodoId, TodoPatch};
use crate::repo::graph_store::{GraphStore, GraphView, StoreError, TodoListQuery};
use crate::rules::proposed::ProposedGraph;
use crate::rules::validator::{
    ConstraintValidator, MutationKind, ValidationInput, ValidationResult, Violation,
    ViolationField,
};
use crate::service::report::{
    CascadeFailure, CascadeFailureReason, CascadeTrace, PropagationReport, StepOutcome,
};
use crate::timeline::propagator::{
    CascadeRule, CascadeStep, IntervalChange, StepResolution, TimelinePropagator,
};
use crate::timeline::repeat::seed_children;
use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use time::Duration;

/// Lifecycle phase of one mutation, as written to logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Staged,
    Validated,
    Rejected,
    Committed,
    Propagating,
    Done,
}

impl MutationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
            Self::Committed => "committed",
            Self::Propagating => "propagating",
            Self::Done => "done",
        }
    }
}

/// Errors returned to the caller of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// Target todo does not exist.
    NotFound(TodoId),
    /// Edge payload references missing todos or edges; checked before
    /// validation.
    Referential(StoreError),
    /// The proposed state breaks graph invariants. Nothing was written.
    Rejected(ValidationResult),
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "todo not found: {id}"),
            Self::Referential(err) => write!(f, "{err}"),
            Self::Rejected(result) => write!(f, "validation failed: {result}"),
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Referential(err) => Some(err),
            Self::Rejected(result) => Some(result),
            Self::NotFound(_) => None,
        }
    }
}

impl From<StoreError> for MutationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Referential(other),
        }
    }
}

/// Result of `UpdateCoordinator::create_todo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    pub id: TodoId,
    /// Children generated from repeat metadata, in start order.
    pub seeded_children: Vec<TodoId>,
}

/// Single-writer facade over a `GraphStore`.
pub struct UpdateCoordinator<S: GraphStore> {
    store: S,
    validator: ConstraintValidator,
    propagator: TimelinePropagator,
}

impl<S: GraphStore> UpdateCoordinator<S> {
    /// Creates a coordinator with the default engine configuration.
    pub fn new(store: S) -> Self {
        let config = EngineConfig::default();
        Self {
            store,
            validator: ConstraintValidator::new(&config),
            propagator: TimelinePropagator::new(&config),
        }
    }

    pub fn with_config(store: S, config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            validator: ConstraintValidator::new(config),
            propagator: TimelinePropagator::new(config),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Creates one todo with its initial edges, then seeds repeat children.
    ///
    /// # Errors
    /// - `Referential` when an edge points at a missing todo or repeats an id.
    /// - `Rejected` when the todo or any edge counterpart fails validation.
    pub fn create_todo(
        &mut self,
        payload: NewTodo,
        edges: TodoEdges,
    ) -> Result<CreateOutcome, MutationError> {
        let mut todo = payload.into_todo();
        if todo.repeat_times > 0 {
            todo.repeat = true;
        }
        let seeds = seed_children(&todo);
        let id = self.insert_checked(todo, edges)?;

        let mut seeded_children = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let child = self.insert_checked(
                seed.into_todo(),
                TodoEdges::default().with(Relation::Parents, id),
            )?;
            seeded_children.push(child);
        }
        if !seeded_children.is_empty() {
            info!(
                "event=todo_seed module=coordinator status=ok todo_id={} children={}",
                id,
                seeded_children.len()
            );
        }

        Ok(CreateOutcome {
            id,
            seeded_children,
        })
    }

    /// Applies an attribute patch and edge changes, then cascades interval
    /// changes to related todos.
    ///
    /// A cascade failure is not an error: the root and earlier cascade steps
    /// stay committed and the failure is listed in the report.
    ///
    /// # Errors
    /// - `NotFound` when `id` is unknown.
    /// - `Referential` when edge changes add an unknown id, add an existing
    ///   edge or remove a missing one.
    /// - `Rejected` when the staged state fails validation.
    pub fn update_todo(
        &mut self,
        id: TodoId,
        patch: &TodoPatch,
        changes: &EdgeChanges,
    ) -> Result<PropagationReport, MutationError> {
        let current = self.store.get_todo(id)?.clone();
        let current_edges = self
            .store
            .edges(id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;
        let next_edges = changes
            .apply_to(&current_edges)
            .map_err(StoreError::from)?;
        self.store.check_references(id, &next_edges)?;

        let mut staged = patch.apply_to(&current);
        if !changes.get(Relation::Children).add.is_empty() {
            staged.repeat = true;
        }
        let Some(interval) = self
            .propagator
            .stage_interval(current.interval(), staged.interval())
        else {
            let result = ValidationResult::from_violations(vec![Violation::new(
                ViolationField::EndDate,
                "shifted end date is out of range",
            )]);
            return Err(rejected("todo_update", id, result));
        };
        staged.set_interval(interval);
        let change = IntervalChange::new(current.interval(), staged.interval());
        let marked = self.parents_marked_repeat(&changes.get(Relation::Parents).add);
        let mut companions = marked.clone();
        companions.extend(
            self.projected_children(&next_edges, self.propagator.subtree_shift(&change)),
        );
        debug!(
            "event=todo_update module=coordinator phase={} todo_id={} edge_changes={}",
            MutationPhase::Staged.as_str(),
            id,
            !changes.is_empty()
        );

        let result = self.validate_staged(
            &staged,
            &next_edges,
            MutationKind::Update,
            Some(current.status),
            &companions,
        );
        if !result.ok {
            return Err(rejected("todo_update", id, result));
        }
        debug!(
            "event=todo_update module=coordinator phase={} todo_id={}",
            MutationPhase::Validated.as_str(),
            id
        );

        let mut report = PropagationReport::new(id);
        let attributes_changed = staged != current;
        if !changes.is_empty() {
            self.store.apply_edge_changes(id, changes)?;
        }
        if attributes_changed {
            self.store.replace_todo(staged)?;
        }
        if attributes_changed || !changes.is_empty() {
            report.record_update(id);
            info!(
                "event=todo_update module=coordinator phase={} todo_id={}",
                MutationPhase::Committed.as_str(),
                id
            );
        }
        for parent in marked {
            let parent_id = parent.id;
            self.store.replace_todo(parent)?;
            report.record_update(parent_id);
        }

        self.propagate(id, &change, &mut report);
        debug!(
            "event=todo_update module=coordinator phase={} todo_id={} updated={} failures={}",
            MutationPhase::Done.as_str(),
            id,
            report.updated_todo_ids.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Deletes one todo and every edge that references it.
    pub fn delete_todo(&mut self, id: TodoId) -> Result<(), MutationError> {
        self.store.delete_todo(id)?;
        info!("event=todo_delete module=coordinator status=ok todo_id={id}");
        Ok(())
    }

    pub fn list_todos(&self, query: &TodoListQuery) -> Vec<Todo> {
        self.store.list_todos(query)
    }

    fn insert_checked(
        &mut self,
        mut todo: Todo,
        edges: TodoEdges,
    ) -> Result<TodoId, MutationError> {
        let id = todo.id;
        if self.store.todo(id).is_some() {
            return Err(StoreError::AlreadyExists(id).into());
        }
        self.store.check_references(id, &edges)?;
        if !edges.get(Relation::Children).is_empty() {
            todo.repeat = true;
        }
        let marked = self.parents_marked_repeat(edges.get(Relation::Parents));

        let result = self.validate_staged(&todo, &edges, MutationKind::Create, None, &marked);
        if !result.ok {
            return Err(rejected("todo_create", id, result));
        }

        self.store.insert_todo(todo, edges)?;
        for parent in marked {
            self.store.replace_todo(parent)?;
        }
        info!(
            "event=todo_create module=coordinator phase={} todo_id={}",
            MutationPhase::Committed.as_str(),
            id
        );
        Ok(id)
    }

    /// Parents in `added_parents` that don't carry the repeat flag yet, with
    /// the flag set.
    fn parents_marked_repeat(&self, added_parents: &[TodoId]) -> Vec<Todo> {
        added_parents
            .iter()
            .filter_map(|id| self.store.todo(*id))
            .filter(|parent| !parent.repeat)
            .map(|parent| Todo {
                repeat: true,
                ..parent.clone()
            })
            .collect()
    }

    /// Children listed in `edges` at the positions the cascade will move them
    /// to. Empty when the subtree does not move.
    fn projected_children(&self, edges: &TodoEdges, shift: Option<Duration>) -> Vec<Todo> {
        let Some(delta) = shift else {
            return Vec::new();
        };
        edges
            .get(Relation::Children)
            .iter()
            .filter_map(|id| self.store.todo(*id))
            .filter_map(|child| {
                let interval = child.interval().checked_shift(delta)?;
                let mut projected = child.clone();
                projected.set_interval(interval);
                Some(projected)
            })
            .collect()
    }

    /// Validates `todo` and every counterpart whose edges change, against a
    /// view with the pending state applied. `companions` are other todos whose
    /// attributes change along with `todo`.
    fn validate_staged(
        &self,
        todo: &Todo,
        edges: &TodoEdges,
        kind: MutationKind,
        previous_status: Option<bool>,
        companions: &[Todo],
    ) -> ValidationResult {
        let mut proposed = ProposedGraph::new(&self.store);
        for companion in companions {
            proposed.stage_todo(companion.clone());
        }
        proposed.stage_todo(todo.clone());
        let touched = proposed.stage_edges(todo.id, edges.clone());

        let mut result = self.validator.validate(
            &proposed,
            &ValidationInput {
                todo,
                edges,
                kind,
                previous_status,
            },
        );
        result.extend(self.counterpart_violations(&proposed, &touched));
        result
    }

    /// Violations on the other endpoints of changed edges, reported against
    /// the relation field of the todo being mutated.
    fn counterpart_violations<V: GraphView + ?Sized>(
        &self,
        view: &V,
        touched: &[(Relation, TodoId)],
    ) -> Vec<Violation> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (relation, other) in touched {
            if !seen.insert(*other) {
                continue;
            }
            let (Some(todo), Some(edges)) = (view.todo(*other), view.edges(*other)) else {
                continue;
            };
            let result = self.validator.validate(
                view,
                &ValidationInput {
                    todo,
                    edges,
                    kind: MutationKind::Update,
                    previous_status: Some(todo.status),
                },
            );
            out.extend(result.violations.into_iter().map(|violation| {
                Violation::new(
                    ViolationField::from(*relation),
                    format!(
                        "{} {}: {}",
                        relation.member_name(),
                        todo.name,
                        violation.message
                    ),
                )
            }));
        }
        out
    }

    /// Runs the cascade for `change` on `root` from a FIFO worklist.
    fn propagate(&mut self, root: TodoId, change: &IntervalChange, report: &mut PropagationReport) {
        let mut queue: VecDeque<_> = self.propagator.plan(&self.store, root, change).into();
        if queue.is_empty() {
            return;
        }
        debug!(
            "event=todo_update module=coordinator phase={} todo_id={} steps={}",
            MutationPhase::Propagating.as_str(),
            root,
            queue.len()
        );

        let mut visited: HashSet<(TodoId, CascadeRule, TodoId)> = HashSet::new();
        while let Some(step) = queue.pop_front() {
            if visited.contains(&(step.target, step.rule, step.source)) {
                report
                    .trace
                    .push(CascadeTrace::new(&step, StepOutcome::AlreadyVisited));
                continue;
            }

            let next = match self.propagator.resolve(&self.store, &step) {
                StepResolution::Apply(next) => next,
                StepResolution::Gated(reason) => {
                    debug!(
                        "event=cascade_step module=coordinator status=gated rule={} source={} target={} reason={:?}",
                        step.rule.as_str(),
                        step.source,
                        step.target,
                        reason
                    );
                    report
                        .trace
                        .push(CascadeTrace::new(&step, StepOutcome::Gated { reason }));
                    continue;
                }
                StepResolution::OutOfRange => {
                    record_failure(report, &step, CascadeFailureReason::OutOfRange);
                    return;
                }
            };
            let Some(current) = self.store.todo(step.target).cloned() else {
                continue;
            };
            let edges = self.store.edges(step.target).cloned().unwrap_or_default();
            let applied = IntervalChange::new(current.interval(), next.interval());
            let companions =
                self.projected_children(&edges, self.propagator.subtree_shift(&applied));

            let result = self.validate_staged(
                &next,
                &edges,
                MutationKind::Update,
                Some(current.status),
                &companions,
            );
            let reason = if result.ok {
                self.store
                    .replace_todo(next)
                    .err()
                    .map(|err| CascadeFailureReason::Store {
                        message: err.to_string(),
                    })
            } else {
                Some(CascadeFailureReason::Rejected {
                    violations: result.violations,
                })
            };
            if let Some(reason) = reason {
                record_failure(report, &step, reason);
                return;
            }

            visited.insert((step.target, step.rule, step.source));
            report.record_update(step.target);
            info!(
                "event=cascade_step module=coordinator status=ok rule={} source={} target={} delta_secs={}",
                step.rule.as_str(),
                step.source,
                step.target,
                step.delta.whole_seconds()
            );
            report.trace.push(CascadeTrace::new(
                &step,
                StepOutcome::Applied {
                    before: applied.before,
                    after: applied.after,
                },
            ));
            queue.extend(self.propagator.plan(&self.store, step.target, &applied));
        }
    }
}

fn rejected(event: &str, id: TodoId, result: ValidationResult) -> MutationError {
    warn!(
        "event={} module=coordinator phase={} todo_id={} violations={}",
        event,
        MutationPhase::Rejected.as_str(),
        id,
        result.violations.len()
    );
    MutationError::Rejected(result)
}

fn record_failure(report: &mut PropagationReport, step: &CascadeStep, reason: CascadeFailureReason) {
    warn!(
        "event=cascade_step module=coordinator status=error rule={} source={} target={}",
        step.rule.as_str(),
        step.source,
        step.target
    );
    report.trace.push(CascadeTrace::new(step, StepOutcome::Failed));
    report.failures.push(CascadeFailure {
        todo_id: step.target,
        source: step.source,
        rule: step.rule,
        reason,
    });
}
