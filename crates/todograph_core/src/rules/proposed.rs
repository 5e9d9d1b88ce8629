//! Staged view of the graph used to validate a mutation before commit.
//!
//! # Responsibility
//! - Overlay staged todos and edge sets on top of a committed view.
//! - Mirror staged edges onto counterpart todos so both endpoints agree.
//!
//! # Invariants
//! - The committed view is never mutated.
//! - Staged entries shadow committed ones; everything else reads through.

use crate::model::edges::{Relation, TodoEdges};
use crate::model::todo::{Todo, TodoId};
use crate::repo::graph_store::GraphView;
use std::collections::HashMap;

/// Graph view with pending changes applied.
pub struct ProposedGraph<'a, V: GraphView + ?Sized> {
    base: &'a V,
    todos: HashMap<TodoId, Todo>,
    edges: HashMap<TodoId, TodoEdges>,
}

impl<'a, V: GraphView + ?Sized> ProposedGraph<'a, V> {
    pub fn new(base: &'a V) -> Self {
        Self {
            base,
            todos: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    pub fn stage_todo(&mut self, todo: Todo) {
        self.todos.insert(todo.id, todo);
    }

    /// Stages the full edge sets of `owner` and mirrors every added or removed
    /// edge onto the other endpoint.
    ///
    /// Returns the counterparts whose edge sets changed, as
    /// `(relation seen from owner, counterpart id)` in relation order.
    pub fn stage_edges(&mut self, owner: TodoId, next: TodoEdges) -> Vec<(Relation, TodoId)> {
        let previous = self.edges(owner).cloned().unwrap_or_default();
        let mut touched = Vec::new();

        for relation in Relation::ALL {
            let before = previous.get(relation);
            let after = next.get(relation);
            let added = after.iter().filter(|id| !before.contains(id));
            let removed = before.iter().filter(|id| !after.contains(id));

            for other in added {
                if *other == owner {
                    continue;
                }
                let mut mirrored = self.edges(*other).cloned().unwrap_or_default();
                let inverse = mirrored.get_mut(relation.inverse());
                if !inverse.contains(&owner) {
                    inverse.push(owner);
                }
                self.edges.insert(*other, mirrored);
                touched.push((relation, *other));
            }
            for other in removed {
                if *other == owner {
                    continue;
                }
                let mut mirrored = self.edges(*other).cloned().unwrap_or_default();
                mirrored
                    .get_mut(relation.inverse())
                    .retain(|existing| *existing != owner);
                self.edges.insert(*other, mirrored);
                touched.push((relation, *other));
            }
        }

        self.edges.insert(owner, next);
        touched
    }
}

impl<V: GraphView + ?Sized> GraphView for ProposedGraph<'_, V> {
    fn todo(&self, id: TodoId) -> Option<&Todo> {
        self.todos.get(&id).or_else(|| self.base.todo(id))
    }

    fn edges(&self, id: TodoId) -> Option<&TodoEdges> {
        self.edges.get(&id).or_else(|| self.base.edges(id))
    }
}
