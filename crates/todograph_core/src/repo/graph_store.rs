//! Todo graph store contracts and in-memory implementation.
//!
//! # Responsibility
//! - Own todo nodes and the four edge relations.
//! - Provide lookup and mutation primitives with referential integrity.
//!
//! # Invariants
//! - Every edge is stored on both endpoints (`A.dependents` holds `B` iff
//!   `B.dependencies` holds `A`; same for children/parents).
//! - An edge never references a missing todo and is never duplicated.
//! - Deleting a todo removes every edge that references it.
//! - Write paths call `Todo::validate()` before mutating.

use crate::model::edges::{EdgeChangeError, EdgeChanges, Relation, TodoEdges};
use crate::model::todo::{ProjectId, Todo, TodoId, TodoValidationError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use time::OffsetDateTime;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level integrity errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Validation(TodoValidationError),
    NotFound(TodoId),
    /// A todo with this id is already stored.
    AlreadyExists(TodoId),
    /// An edge references a todo that does not exist.
    MissingReference { relation: Relation, id: TodoId },
    /// An edge would point back at its owner.
    SelfEdge { relation: Relation, id: TodoId },
    DuplicateEdge { relation: Relation, id: TodoId },
    MissingEdge { relation: Relation, id: TodoId },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "todo not found: {id}"),
            Self::AlreadyExists(id) => write!(f, "todo already exists: {id}"),
            Self::MissingReference { relation, id } => {
                write!(f, "{} references missing todo {id}", relation.member_name())
            }
            Self::SelfEdge { relation, id } => {
                write!(f, "todo {id} can't be its own {}", relation.member_name())
            }
            Self::DuplicateEdge { relation, id } => {
                write!(f, "duplicate {} edge to {id}", relation.member_name())
            }
            Self::MissingEdge { relation, id } => {
                write!(f, "no {} edge to {id}", relation.member_name())
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TodoValidationError> for StoreError {
    fn from(value: TodoValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<EdgeChangeError> for StoreError {
    fn from(value: EdgeChangeError) -> Self {
        match value {
            EdgeChangeError::Duplicate { relation, id } => Self::DuplicateEdge { relation, id },
            EdgeChangeError::Missing { relation, id } => Self::MissingEdge { relation, id },
        }
    }
}

/// Structural filters over the stored graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoShape {
    /// Done, or every dependency is done.
    Actionable,
    /// Open with at least one open dependency.
    Unactionable,
    /// No dependencies.
    Independent,
    /// No dependents.
    Dependentless,
    Childless,
    Parentless,
}

/// Query options for listing todos.
#[derive(Debug, Clone, Default)]
pub struct TodoListQuery {
    pub project_id: Option<ProjectId>,
    pub status: Option<bool>,
    /// Every listed shape must match.
    pub shapes: Vec<TodoShape>,
    /// Keeps todos whose `end_date <= end_before`.
    pub end_before: Option<OffsetDateTime>,
}

/// Read-only access to todos and their edge sets.
pub trait GraphView {
    fn todo(&self, id: TodoId) -> Option<&Todo>;
    fn edges(&self, id: TodoId) -> Option<&TodoEdges>;

    /// Ids on one relation, empty when the todo is unknown.
    fn related(&self, id: TodoId, relation: Relation) -> &[TodoId] {
        self.edges(id).map_or(&[], |edges| edges.get(relation))
    }
}

/// Mutation primitives over the todo graph.
pub trait GraphStore: GraphView {
    /// Inserts a todo together with its edge sets.
    fn insert_todo(&mut self, todo: Todo, edges: TodoEdges) -> StoreResult<TodoId>;
    /// Replaces attributes of an existing todo. Edges are untouched.
    fn replace_todo(&mut self, todo: Todo) -> StoreResult<()>;
    /// Applies add/remove deltas on both endpoints of every edge.
    fn apply_edge_changes(&mut self, id: TodoId, changes: &EdgeChanges) -> StoreResult<()>;
    /// Deletes a todo and every edge referencing it.
    fn delete_todo(&mut self, id: TodoId) -> StoreResult<()>;
    /// All ids in insertion order.
    fn todo_ids(&self) -> Vec<TodoId>;

    fn get_todo(&self, id: TodoId) -> StoreResult<&Todo> {
        self.todo(id).ok_or(StoreError::NotFound(id))
    }

    fn dependencies(&self, id: TodoId) -> StoreResult<Vec<TodoId>> {
        self.related_ids(id, Relation::Dependencies)
    }

    fn dependents(&self, id: TodoId) -> StoreResult<Vec<TodoId>> {
        self.related_ids(id, Relation::Dependents)
    }

    fn children(&self, id: TodoId) -> StoreResult<Vec<TodoId>> {
        self.related_ids(id, Relation::Children)
    }

    fn parents(&self, id: TodoId) -> StoreResult<Vec<TodoId>> {
        self.related_ids(id, Relation::Parents)
    }

    fn related_ids(&self, id: TodoId, relation: Relation) -> StoreResult<Vec<TodoId>> {
        self.edges(id)
            .map(|edges| edges.get(relation).to_vec())
            .ok_or(StoreError::NotFound(id))
    }

    /// Checks that every edge of `owner` points at a distinct, stored todo.
    ///
    /// `owner` itself may be absent from the store (creation path).
    fn check_references(&self, owner: TodoId, edges: &TodoEdges) -> StoreResult<()> {
        for relation in Relation::ALL {
            let mut seen = HashSet::new();
            for id in edges.get(relation) {
                if !seen.insert(*id) {
                    return Err(StoreError::DuplicateEdge { relation, id: *id });
                }
                if *id != owner && self.todo(*id).is_none() {
                    return Err(StoreError::MissingReference { relation, id: *id });
                }
            }
        }
        Ok(())
    }

    /// Lists todos ordered by `start_date`, ties in insertion order.
    fn list_todos(&self, query: &TodoListQuery) -> Vec<Todo> {
        let mut items: Vec<Todo> = self
            .todo_ids()
            .into_iter()
            .filter_map(|id| self.todo(id))
            .filter(|todo| query.project_id.map_or(true, |project| todo.project_id == project))
            .filter(|todo| query.status.map_or(true, |status| todo.status == status))
            .filter(|todo| query.end_before.map_or(true, |limit| todo.end_date <= limit))
            .filter(|todo| query.shapes.iter().all(|shape| self.has_shape(todo, *shape)))
            .cloned()
            .collect();
        items.sort_by_key(|todo| todo.start_date);
        items
    }

    fn has_shape(&self, todo: &Todo, shape: TodoShape) -> bool {
        let open_dependency = || {
            self.related(todo.id, Relation::Dependencies)
                .iter()
                .filter_map(|id| self.todo(*id))
                .any(|dependency| !dependency.status)
        };
        match shape {
            TodoShape::Unactionable => !todo.status && open_dependency(),
            TodoShape::Actionable => todo.status || !open_dependency(),
            TodoShape::Independent => self.related(todo.id, Relation::Dependencies).is_empty(),
            TodoShape::Dependentless => self.related(todo.id, Relation::Dependents).is_empty(),
            TodoShape::Childless => self.related(todo.id, Relation::Children).is_empty(),
            TodoShape::Parentless => self.related(todo.id, Relation::Parents).is_empty(),
        }
    }

    /// Every todo reachable from `id` through any relation, `id` first.
    ///
    /// This is the scope a cascade started at `id` can touch, so callers that
    /// share a store across threads lock at this granularity.
    fn connected_component(&self, id: TodoId) -> StoreResult<Vec<TodoId>> {
        self.get_todo(id)?;
        let mut visited = HashSet::from([id]);
        let mut order = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for (_, next) in self.edges(current).into_iter().flat_map(TodoEdges::iter) {
                if visited.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }
        Ok(order)
    }
}

#[derive(Debug, Clone)]
struct StoredTodo {
    todo: Todo,
    edges: TodoEdges,
}

/// In-memory todo graph.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraphStore {
    records: HashMap<TodoId, StoredTodo>,
    order: Vec<TodoId>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn link(&mut self, owner: TodoId, relation: Relation, other: TodoId) {
        if let Some(record) = self.records.get_mut(&owner) {
            record.edges.get_mut(relation).push(other);
        }
        if let Some(record) = self.records.get_mut(&other) {
            record.edges.get_mut(relation.inverse()).push(owner);
        }
    }

    fn unlink(&mut self, owner: TodoId, relation: Relation, other: TodoId) {
        if let Some(record) = self.records.get_mut(&owner) {
            record.edges.get_mut(relation).retain(|id| *id != other);
        }
        if let Some(record) = self.records.get_mut(&other) {
            record.edges.get_mut(relation.inverse()).retain(|id| *id != owner);
        }
    }
}

impl GraphView for InMemoryGraphStore {
    fn todo(&self, id: TodoId) -> Option<&Todo> {
        self.records.get(&id).map(|record| &record.todo)
    }

    fn edges(&self, id: TodoId) -> Option<&TodoEdges> {
        self.records.get(&id).map(|record| &record.edges)
    }
}

impl GraphStore for InMemoryGraphStore {
    fn insert_todo(&mut self, todo: Todo, edges: TodoEdges) -> StoreResult<TodoId> {
        todo.validate()?;
        let id = todo.id;
        if self.records.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        self.check_references(id, &edges)?;
        if let Some((relation, _)) = edges.iter().find(|(_, other)| *other == id) {
            return Err(StoreError::SelfEdge { relation, id });
        }

        self.records.insert(
            id,
            StoredTodo {
                todo,
                edges: TodoEdges::default(),
            },
        );
        self.order.push(id);
        for (relation, other) in edges.iter() {
            self.link(id, relation, other);
        }
        Ok(id)
    }

    fn replace_todo(&mut self, todo: Todo) -> StoreResult<()> {
        todo.validate()?;
        let record = self
            .records
            .get_mut(&todo.id)
            .ok_or(StoreError::NotFound(todo.id))?;
        record.todo = todo;
        Ok(())
    }

    fn apply_edge_changes(&mut self, id: TodoId, changes: &EdgeChanges) -> StoreResult<()> {
        let current = self.edges(id).ok_or(StoreError::NotFound(id))?;
        let next = changes.apply_to(current)?;
        for relation in Relation::ALL {
            for other in &changes.get(relation).add {
                if *other == id {
                    return Err(StoreError::SelfEdge { relation, id });
                }
                if self.todo(*other).is_none() {
                    return Err(StoreError::MissingReference {
                        relation,
                        id: *other,
                    });
                }
            }
        }

        for relation in Relation::ALL {
            let delta = changes.get(relation);
            for other in &delta.remove {
                self.unlink(id, relation, *other);
            }
            for other in &delta.add {
                self.link(id, relation, *other);
            }
        }
        debug_assert_eq!(self.edges(id), Some(&next));
        Ok(())
    }

    fn delete_todo(&mut self, id: TodoId) -> StoreResult<()> {
        let record = self.records.remove(&id).ok_or(StoreError::NotFound(id))?;
        for (relation, other) in record.edges.iter() {
            if let Some(other_record) = self.records.get_mut(&other) {
                other_record
                    .edges
                    .get_mut(relation.inverse())
                    .retain(|existing| *existing != id);
            }
        }
        self.order.retain(|existing| *existing != id);
        Ok(())
    }

    fn todo_ids(&self) -> Vec<TodoId> {
        self.order.clone()
    }
}
