//! Edge sets for the precedence and hierarchy axes.
//!
//! # Responsibility
//! - Name the four relations a todo participates in.
//! - Express full edge sets and add/remove deltas against them.
//!
//! # Invariants
//! - Edge lists keep insertion order and never hold duplicates.
//! - Every relation has exactly one inverse on the same axis.

use crate::model::todo::TodoId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One directed relation as seen from the owning todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Todos that must finish before the owner starts.
    Dependencies,
    /// Todos that start after the owner finishes.
    Dependents,
    /// Decomposition units of the owner.
    Children,
    /// The unit the owner decomposes (at most one).
    Parents,
}

impl Relation {
    pub const ALL: [Relation; 4] = [
        Relation::Dependencies,
        Relation::Dependents,
        Relation::Children,
        Relation::Parents,
    ];

    /// The same edge seen from the other endpoint.
    pub fn inverse(self) -> Self {
        match self {
            Self::Dependencies => Self::Dependents,
            Self::Dependents => Self::Dependencies,
            Self::Children => Self::Parents,
            Self::Parents => Self::Children,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dependencies => "dependencies",
            Self::Dependents => "dependents",
            Self::Children => "children",
            Self::Parents => "parents",
        }
    }

    /// Singular role name used in messages, e.g. `dependency`.
    pub fn member_name(self) -> &'static str {
        match self {
            Self::Dependencies => "dependency",
            Self::Dependents => "dependent",
            Self::Children => "child",
            Self::Parents => "parent",
        }
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full edge sets of one todo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoEdges {
    pub dependencies: Vec<TodoId>,
    pub dependents: Vec<TodoId>,
    pub children: Vec<TodoId>,
    pub parents: Vec<TodoId>,
}

impl TodoEdges {
    pub fn get(&self, relation: Relation) -> &[TodoId] {
        match relation {
            Relation::Dependencies => &self.dependencies,
            Relation::Dependents => &self.dependents,
            Relation::Children => &self.children,
            Relation::Parents => &self.parents,
        }
    }

    pub fn get_mut(&mut self, relation: Relation) -> &mut Vec<TodoId> {
        match relation {
            Relation::Dependencies => &mut self.dependencies,
            Relation::Dependents => &mut self.dependents,
            Relation::Children => &mut self.children,
            Relation::Parents => &mut self.parents,
        }
    }

    pub fn is_empty(&self) -> bool {
        Relation::ALL
            .iter()
            .all(|relation| self.get(*relation).is_empty())
    }

    /// Iterates `(relation, id)` pairs in relation then insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Relation, TodoId)> + '_ {
        Relation::ALL
            .into_iter()
            .flat_map(move |relation| self.get(relation).iter().map(move |id| (relation, *id)))
    }

    /// Builder-style helper for tests and callers assembling creation edges.
    pub fn with(mut self, relation: Relation, id: TodoId) -> Self {
        self.get_mut(relation).push(id);
        self
    }
}

/// Edge delta rejected against the current edge set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeChangeError {
    /// The edge already exists or is added twice.
    Duplicate { relation: Relation, id: TodoId },
    /// A removal names an edge that does not exist.
    Missing { relation: Relation, id: TodoId },
}

impl Display for EdgeChangeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate { relation, id } => {
                write!(f, "duplicate {} edge to {id}", relation.member_name())
            }
            Self::Missing { relation, id } => {
                write!(f, "no {} edge to {id} to remove", relation.member_name())
            }
        }
    }
}

impl Error for EdgeChangeError {}

/// Add and remove-by-id operations for one relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeDelta {
    pub add: Vec<TodoId>,
    pub remove: Vec<TodoId>,
}

impl EdgeDelta {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Computes the delta that turns `current` into exactly `target`.
    pub fn replace(current: &[TodoId], target: &[TodoId]) -> Self {
        let mut add = Vec::new();
        for id in target {
            if !current.contains(id) && !add.contains(id) {
                add.push(*id);
            }
        }
        let remove = current
            .iter()
            .filter(|id| !target.contains(id))
            .copied()
            .collect();
        Self { add, remove }
    }

    fn apply(&self, relation: Relation, current: &[TodoId]) -> Result<Vec<TodoId>, EdgeChangeError> {
        let mut next = current.to_vec();
        for id in &self.remove {
            let Some(position) = next.iter().position(|existing| existing == id) else {
                return Err(EdgeChangeError::Missing { relation, id: *id });
            };
            next.remove(position);
        }
        for id in &self.add {
            if next.contains(id) {
                return Err(EdgeChangeError::Duplicate { relation, id: *id });
            }
            next.push(*id);
        }
        Ok(next)
    }
}

/// Edge deltas for all four relations of one todo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeChanges {
    pub dependencies: EdgeDelta,
    pub dependents: EdgeDelta,
    pub children: EdgeDelta,
    pub parents: EdgeDelta,
}

impl EdgeChanges {
    pub fn get(&self, relation: Relation) -> &EdgeDelta {
        match relation {
            Relation::Dependencies => &self.dependencies,
            Relation::Dependents => &self.dependents,
            Relation::Children => &self.children,
            Relation::Parents => &self.parents,
        }
    }

    pub fn get_mut(&mut self, relation: Relation) -> &mut EdgeDelta {
        match relation {
            Relation::Dependencies => &mut self.dependencies,
            Relation::Dependents => &mut self.dependents,
            Relation::Children => &mut self.children,
            Relation::Parents => &mut self.parents,
        }
    }

    pub fn is_empty(&self) -> bool {
        Relation::ALL
            .iter()
            .all(|relation| self.get(*relation).is_empty())
    }

    pub fn add(mut self, relation: Relation, id: TodoId) -> Self {
        self.get_mut(relation).add.push(id);
        self
    }

    pub fn remove(mut self, relation: Relation, id: TodoId) -> Self {
        self.get_mut(relation).remove.push(id);
        self
    }

    /// Replaces one relation so that it ends up holding exactly `target`.
    pub fn replace(mut self, current: &TodoEdges, relation: Relation, target: &[TodoId]) -> Self {
        *self.get_mut(relation) = EdgeDelta::replace(current.get(relation), target);
        self
    }

    /// Returns the edge sets after applying every delta.
    ///
    /// Removals are applied before additions, so remove-then-add of the same
    /// id re-appends the edge at the end of the list.
    pub fn apply_to(&self, current: &TodoEdges) -> Result<TodoEdges, EdgeChangeError> {
        let mut next = TodoEdges::default();
        for relation in Relation::ALL {
            *next.get_mut(relation) = self.get(relation).apply(relation, current.get(relation))?;
        }
        Ok(next)
    }
}
