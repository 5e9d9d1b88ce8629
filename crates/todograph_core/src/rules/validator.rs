//! Graph-position constraints over a proposed todo state.
//!
//! # Responsibility
//! - Check a todo's proposed attributes and full edge sets against its
//!   neighbours and return every violation found.
//!
//! # Invariants
//! - Validation is pure: it only reads through `GraphView`.
//! - Empty relations never produce a violation.
//! - Checks run in a fixed order: name, precedence, hierarchy, dates, status.

use crate::config::{EngineConfig, TransitiveCheck};
use crate::model::edges::{Relation, TodoEdges};
use crate::model::todo::{format_date, Todo, TodoId};
use crate::repo::graph_store::GraphView;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use time::OffsetDateTime;

/// Field a violation is reported against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationField {
    Name,
    StartDate,
    EndDate,
    Status,
    Dependencies,
    Dependents,
    Children,
    Parents,
}

impl ViolationField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::StartDate => "start_date",
            Self::EndDate => "end_date",
            Self::Status => "status",
            Self::Dependencies => "dependencies",
            Self::Dependents => "dependents",
            Self::Children => "children",
            Self::Parents => "parents",
        }
    }
}

impl From<Relation> for ViolationField {
    fn from(value: Relation) -> Self {
        match value {
            Relation::Dependencies => Self::Dependencies,
            Relation::Dependents => Self::Dependents,
            Relation::Children => Self::Children,
            Relation::Parents => Self::Parents,
        }
    }
}

/// One failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: ViolationField,
    pub message: String,
}

impl Violation {
    pub fn new(field: ViolationField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Outcome of validating one mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            ok: violations.is_empty(),
            violations,
        }
    }

    pub fn violations_for(&self, field: ViolationField) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(move |violation| violation.field == field)
    }

    pub fn has_violation(&self, field: ViolationField) -> bool {
        self.violations_for(field).next().is_some()
    }

    pub fn extend(&mut self, violations: impl IntoIterator<Item = Violation>) {
        self.violations.extend(violations);
        self.ok = self.violations.is_empty();
    }
}

impl Display for ValidationResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.ok {
            return write!(f, "valid");
        }
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", violation.field.as_str(), violation.message)?;
        }
        Ok(())
    }
}

impl Error for ValidationResult {}

/// Which rule set applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
}

/// Proposed final state of one todo.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub todo: &'a Todo,
    pub edges: &'a TodoEdges,
    pub kind: MutationKind,
    /// Status before the mutation, `None` on creation.
    pub previous_status: Option<bool>,
}

/// Stateless checker for graph-position invariants.
#[derive(Debug, Clone)]
pub struct ConstraintValidator {
    transitive_check: TransitiveCheck,
    enforce_child_start_on_create: bool,
}

impl ConstraintValidator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            transitive_check: config.transitive_check,
            enforce_child_start_on_create: config.enforce_child_start_on_create,
        }
    }

    /// Returns every violation of the proposed state.
    pub fn validate<V: GraphView + ?Sized>(
        &self,
        view: &V,
        input: &ValidationInput<'_>,
    ) -> ValidationResult {
        let mut violations = Vec::new();
        if input.todo.name.trim().is_empty() {
            violations.push(Violation::new(ViolationField::Name, "name can't be blank"));
        }
        self.check_precedence(view, input, Relation::Dependencies, &mut violations);
        self.check_precedence(view, input, Relation::Dependents, &mut violations);
        check_hierarchy(view, input, &mut violations);
        self.check_dates(view, input, &mut violations);
        check_status(view, input, &mut violations);
        ValidationResult::from_violations(violations)
    }

    /// Self reference, opposite-side overlap and transitive redundancy on one
    /// side of the precedence axis.
    fn check_precedence<V: GraphView + ?Sized>(
        &self,
        view: &V,
        input: &ValidationInput<'_>,
        relation: Relation,
        out: &mut Vec<Violation>,
    ) {
        let own = input.edges.get(relation);
        if own.is_empty() {
            return;
        }
        let owner = input.todo.id;
        let field = ViolationField::from(relation);
        let role = relation.member_name();
        let opposite = relation.inverse();

        if own.contains(&owner) {
            out.push(Violation::new(field, format!("can't add self as {role}")));
        }

        for other in input.edges.get(opposite) {
            if own.contains(other) {
                out.push(Violation::new(
                    field,
                    format!(
                        "can't add {} {} as {role}",
                        opposite.member_name(),
                        name_of(view, *other)
                    ),
                ));
            }
        }

        let reached = self.reachable(view, owner, own, relation);
        for member in own {
            if reached.contains(member) {
                out.push(Violation::new(
                    field,
                    format!(
                        "can't add {role} {} since it is already reached through another {role}",
                        name_of(view, *member)
                    ),
                ));
            }
        }

        if self.transitive_check == TransitiveCheck::FullClosure {
            let opposite_members = input.edges.get(opposite);
            let beyond = self.reachable(view, owner, opposite_members, opposite);
            for member in own {
                if beyond.contains(member) && !opposite_members.contains(member) {
                    out.push(Violation::new(
                        field,
                        format!(
                            "can't add {role} {} since it would close a precedence cycle",
                            name_of(view, *member)
                        ),
                    ));
                }
            }
        }
    }

    /// Ids reachable from `starts` by following `relation` at least once.
    ///
    /// One hop under `TransitiveCheck::OneHop`, the full closure otherwise.
    /// `owner` is never traversed nor returned.
    fn reachable<V: GraphView + ?Sized>(
        &self,
        view: &V,
        owner: TodoId,
        starts: &[TodoId],
        relation: Relation,
    ) -> HashSet<TodoId> {
        let mut reached = HashSet::new();
        let mut queue: VecDeque<TodoId> = starts
            .iter()
            .copied()
            .filter(|id| *id != owner)
            .collect();
        while let Some(current) = queue.pop_front() {
            for next in view.related(current, relation) {
                if *next == owner || !reached.insert(*next) {
                    continue;
                }
                if self.transitive_check == TransitiveCheck::FullClosure {
                    queue.push_back(*next);
                }
            }
        }
        reached
    }

    fn check_dates<V: GraphView + ?Sized>(
        &self,
        view: &V,
        input: &ValidationInput<'_>,
        out: &mut Vec<Violation>,
    ) {
        let todo = input.todo;
        let creating = input.kind == MutationKind::Create;
        let related = |relation| neighbours(view, input, relation);

        if todo.end_date < todo.start_date {
            out.push(Violation::new(
                ViolationField::EndDate,
                format!(
                    "end date {} can't be earlier than start date {}",
                    format_date(todo.end_date),
                    format_date(todo.start_date)
                ),
            ));
        }

        if let Some(latest) = latest_by(related(Relation::Dependencies), |t| t.end_date) {
            if todo.start_date < latest.end_date {
                out.push(Violation::new(
                    ViolationField::StartDate,
                    format!(
                        "start date {} can't be earlier than dependency {}'s end date {}",
                        format_date(todo.start_date),
                        latest.name,
                        format_date(latest.end_date)
                    ),
                ));
            }
        }

        if creating {
            if let Some(earliest) = earliest_by(related(Relation::Dependents), |t| t.start_date) {
                if todo.end_date > earliest.start_date {
                    out.push(Violation::new(
                        ViolationField::EndDate,
                        format!(
                            "end date {} can't be later than dependent {}'s start date {}",
                            format_date(todo.end_date),
                            earliest.name,
                            format_date(earliest.start_date)
                        ),
                    ));
                }
            }
        }

        if let Some(latest) = latest_by(related(Relation::Parents), |t| t.start_date) {
            if todo.start_date < latest.start_date {
                out.push(Violation::new(
                    ViolationField::StartDate,
                    format!(
                        "start date {} can't be earlier than parent {}'s start date {}",
                        format_date(todo.start_date),
                        latest.name,
                        format_date(latest.start_date)
                    ),
                ));
            }
        }

        if creating && self.enforce_child_start_on_create {
            if let Some(earliest) = earliest_by(related(Relation::Children), |t| t.start_date) {
                if todo.start_date > earliest.start_date {
                    out.push(Violation::new(
                        ViolationField::StartDate,
                        format!(
                            "start date {} can't be later than child {}'s start date {}",
                            format_date(todo.start_date),
                            earliest.name,
                            format_date(earliest.start_date)
                        ),
                    ));
                }
            }
        }

        if creating {
            if let Some(earliest) = earliest_by(related(Relation::Parents), |t| t.end_date) {
                if todo.end_date > earliest.end_date {
                    out.push(Violation::new(
                        ViolationField::EndDate,
                        format!(
                            "end date {} can't be later than parent {}'s end date {}",
                            format_date(todo.end_date),
                            earliest.name,
                            format_date(earliest.end_date)
                        ),
                    ));
                }
            }
        }

        if let Some(latest) = latest_by(related(Relation::Children), |t| t.end_date) {
            if todo.end_date < latest.end_date {
                out.push(Violation::new(
                    ViolationField::EndDate,
                    format!(
                        "end date {} can't be earlier than child {}'s end date {}",
                        format_date(todo.end_date),
                        latest.name,
                        format_date(latest.end_date)
                    ),
                ));
            }
        }
    }
}

fn check_hierarchy<V: GraphView + ?Sized>(
    view: &V,
    input: &ValidationInput<'_>,
    out: &mut Vec<Violation>,
) {
    let owner = input.todo.id;
    let children = input.edges.get(Relation::Children);
    let parents = input.edges.get(Relation::Parents);

    if children.contains(&owner) {
        out.push(Violation::new(
            ViolationField::Children,
            "can't add self as child",
        ));
    }
    if parents.contains(&owner) {
        out.push(Violation::new(
            ViolationField::Parents,
            "can't add self as parent",
        ));
    }
    if parents.len() > 1 {
        out.push(Violation::new(
            ViolationField::Parents,
            format!("can have at most one parent, got {}", parents.len()),
        ));
    }
    if children.is_empty() || parents.is_empty() {
        return;
    }

    for child in children {
        if parents.contains(child) {
            out.push(Violation::new(
                ViolationField::Children,
                format!("can't add parent {} as child", name_of(view, *child)),
            ));
        }
    }

    // Walk the parent chain upwards; meeting a child closes a loop, whichever
    // side the new edge was added on.
    let mut visited = HashSet::from([owner]);
    let mut cursor: Vec<TodoId> = parents.iter().copied().filter(|id| *id != owner).collect();
    while let Some(current) = cursor.pop() {
        if !visited.insert(current) {
            continue;
        }
        if children.contains(&current) && !parents.contains(&current) {
            out.push(Violation::new(
                ViolationField::Children,
                format!(
                    "would create a hierarchy loop through {}",
                    name_of(view, current)
                ),
            ));
        }
        cursor.extend(view.related(current, Relation::Parents).iter().copied());
    }
}

fn check_status<V: GraphView + ?Sized>(
    view: &V,
    input: &ValidationInput<'_>,
    out: &mut Vec<Violation>,
) {
    let becoming_done = input.todo.status && input.previous_status != Some(true);
    if !becoming_done {
        return;
    }
    let open = neighbours(view, input, Relation::Dependencies)
        .into_iter()
        .find(|dependency| !dependency.status);
    if let Some(open) = open {
        out.push(Violation::new(
            ViolationField::Status,
            format!(
                "can't mark todo as done since dependency {} is still open",
                open.name
            ),
        ));
    }
}

/// Stored neighbours on one relation, skipping self references and ids the
/// view can't resolve.
fn neighbours<'v, V: GraphView + ?Sized>(
    view: &'v V,
    input: &ValidationInput<'_>,
    relation: Relation,
) -> Vec<&'v Todo> {
    let owner = input.todo.id;
    input
        .edges
        .get(relation)
        .iter()
        .filter(|id| **id != owner)
        .filter_map(|id| view.todo(*id))
        .collect()
}

/// First todo, in edge order, with the greatest key.
fn latest_by<'v>(
    todos: Vec<&'v Todo>,
    key: impl Fn(&Todo) -> OffsetDateTime,
) -> Option<&'v Todo> {
    todos.into_iter().fold(None, |best: Option<&'v Todo>, todo| match best {
        Some(current) if key(current) >= key(todo) => Some(current),
        _ => Some(todo),
    })
}

/// First todo, in edge order, with the smallest key.
fn earliest_by<'v>(
    todos: Vec<&'v Todo>,
    key: impl Fn(&Todo) -> OffsetDateTime,
) -> Option<&'v Todo> {
    todos.into_iter().fold(None, |best: Option<&'v Todo>, todo| match best {
        Some(current) if key(current) <= key(todo) => Some(current),
        _ => Some(todo),
    })
}

fn name_of<V: GraphView + ?Sized>(view: &V, id: TodoId) -> String {
    view.todo(id)
        .map_or_else(|| id.to_string(), |todo| todo.name.clone())
}
